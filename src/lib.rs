//! # fsbridge
//!
//! Message-channel bridge that gives a sandboxed front-end access to the host
//! filesystem and to live change notifications.
//!
//! ## Features
//!
//! - **Client proxy** ([`BridgeClient`]): allocates operation ids, sends
//!   commands, correlates responses and routes watch events to listeners.
//! - **Host** ([`host::Host`]): registry of in-flight operations with
//!   cooperative cancellation and a dispatcher running each command in its
//!   own task.
//! - **Watch sessions**: replay of the current directory state as `created`
//!   events, one `ready` sentinel, then live `created`/`changed`/`deleted`
//!   events until the watch is aborted.
//! - **Providers**: one [`FileSystemProvider`] interface implemented by
//!   [`NativeFs`] (local disk, `file:` URLs), [`MemoryFs`] (virtual roots)
//!   and the client proxy itself.
//! - **Transports**: in-process channel pair or JSON lines over any async
//!   byte stream (see the `fsbridge-host` binary).
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fsbridge::{BridgeClient, CancellationToken, FileSystemProvider, NativeFs, Url};
//!
//! # async fn example() -> fsbridge::Result<()> {
//! let (client, _host) = BridgeClient::in_process(Arc::new(NativeFs::default()), 64);
//! let cancel = CancellationToken::new();
//!
//! let dir = Url::parse("file:///tmp").map_err(|e| fsbridge::BridgeError::InvalidUrl(e.to_string()))?;
//! for entry in client.read_directory(&dir, &cancel).await? {
//!     println!("{} ({:?} bytes)", entry.name, entry.size);
//! }
//! # Ok(())
//! # }
//! ```

pub mod base64;
pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod fs;
pub mod host;
pub mod protocol;
pub mod watch;

// Re-export commonly used types
pub use client::BridgeClient;
pub use config::BridgeConfig;
pub use error::{BridgeError, ErrorKind, FsError, Result};
pub use fs::{FileSystemProvider, MemoryFs, NativeFs, WatchListener};
pub use protocol::{
    DeleteOptions, FileChangeEvent, FileChangeType, FsEntry, FsOperation, OperationId,
    TransferOptions, WatchOptions, WriteOptions,
};
pub use tokio_util::sync::CancellationToken;
pub use url::Url;
