//! Filesystem capability interface and its providers.
//!
//! [`FileSystemProvider`] is the one interface every consumer of the bridge
//! depends on. The host executes commands against a provider ([`NativeFs`]
//! for the real disk, [`MemoryFs`] for virtual roots), and the client proxy
//! ([`crate::BridgeClient`]) implements the same interface over the message
//! channel.

mod memory;
mod native;
pub(crate) mod utils;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{FsError, Result};
use crate::protocol::{
    DeleteOptions, FileChangeEvent, FsEntry, TransferOptions, WatchOptions, WriteOptions,
};

pub use memory::MemoryFs;
pub use native::NativeFs;
pub(crate) use native::entry_from_metadata;

/// Receives event batches of a watch session, in arrival order.
pub type WatchListener = mpsc::UnboundedSender<Vec<FileChangeEvent>>;

/// The eight filesystem operations a bridge consumer can use.
///
/// Every operation takes a cancellation token. Providers check it at their
/// I/O checkpoints and fail with [`crate::ErrorKind::Aborted`] once it is
/// triggered; a section already running may still complete.
#[async_trait]
pub trait FileSystemProvider: Send + Sync {
    /// Stream changes under `url` to `listener`.
    ///
    /// Emits one `created` event per existing entry, then exactly one `ready`
    /// event, then live changes. Resolves only after `cancel` fires and the
    /// underlying watch has been released.
    async fn watch(
        &self,
        url: &Url,
        options: &WatchOptions,
        listener: WatchListener,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// List a directory. Entries whose stat fails are returned name-only.
    async fn read_directory(&self, url: &Url, cancel: &CancellationToken) -> Result<Vec<FsEntry>>;

    async fn create_directory(&self, url: &Url, cancel: &CancellationToken) -> Result<()>;

    async fn read_file(&self, url: &Url, cancel: &CancellationToken) -> Result<Vec<u8>>;

    async fn write_file(
        &self,
        url: &Url,
        content: &[u8],
        options: &WriteOptions,
        cancel: &CancellationToken,
    ) -> Result<()>;

    async fn delete(
        &self,
        url: &Url,
        options: &DeleteOptions,
        cancel: &CancellationToken,
    ) -> Result<()>;

    async fn rename(
        &self,
        old_url: &Url,
        new_url: &Url,
        options: &TransferOptions,
        cancel: &CancellationToken,
    ) -> Result<()>;

    async fn copy(
        &self,
        source: &Url,
        destination: &Url,
        options: &TransferOptions,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

/// Cancellation checkpoint between I/O steps.
pub(crate) fn checkpoint(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(FsError::aborted().into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_checkpoint() {
        let cancel = CancellationToken::new();
        assert!(checkpoint(&cancel).is_ok());
        cancel.cancel();
        let err = checkpoint(&cancel).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Aborted);
    }
}
