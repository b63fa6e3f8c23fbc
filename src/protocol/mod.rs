//! Bridge data model and wire messages.

mod entry;
mod message;

pub use entry::{FileChangeEvent, FileChangeType, FsEntry};
pub use message::{
    ClientMessage, DeleteOptions, FsOperation, HostMessage, OperationId, OperationOutput,
    TransferOptions, WatchOptions, WriteOptions,
};
