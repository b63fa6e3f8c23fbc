//! Privileged side of the bridge.

mod dispatcher;
mod registry;

pub use dispatcher::{serve, Host};
pub use registry::OperationRegistry;
