//! Provider backed by the host's real filesystem.

use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use url::Url;

use super::{checkpoint, FileSystemProvider, WatchListener};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, ErrorKind, FsError, IoResultExt, Result};
use crate::protocol::{DeleteOptions, FsEntry, TransferOptions, WatchOptions, WriteOptions};
use crate::watch::{start_native_watch, Excludes, WatchSession};

/// Serves `file:` URLs from the local disk.
#[derive(Debug, Clone, Default)]
pub struct NativeFs {
    config: BridgeConfig,
}

impl NativeFs {
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    fn local_path(url: &Url) -> Result<PathBuf> {
        if url.scheme() != "file" {
            return Err(BridgeError::InvalidUrl(format!(
                "unsupported scheme '{}' in {}",
                url.scheme(),
                url
            )));
        }
        url.to_file_path()
            .map_err(|_| BridgeError::InvalidUrl(url.to_string()))
    }

    /// List `path`, stat'ing entries concurrently while keeping enumeration order.
    async fn list_dir(&self, path: &Path, cancel: &CancellationToken) -> Result<Vec<FsEntry>> {
        let mut reader = fs::read_dir(path).await.at(path)?;
        let mut names = Vec::new();
        while let Some(entry) = reader.next_entry().await.at(path)? {
            checkpoint(cancel)?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }

        let entries = stream::iter(names)
            .map(|name| {
                let full = path.join(&name);
                async move { stat_entry(&full, name).await }
            })
            .buffered(self.config.stat_concurrency)
            .collect::<Vec<_>>()
            .await;

        checkpoint(cancel)?;
        Ok(entries)
    }

    async fn copy_tree(&self, from: &Path, to: &Path, cancel: &CancellationToken) -> Result<()> {
        let mut pending = vec![(from.to_path_buf(), to.to_path_buf())];
        while let Some((src, dst)) = pending.pop() {
            checkpoint(cancel)?;
            fs::create_dir(&dst).await.at(&dst)?;
            let mut reader = fs::read_dir(&src).await.at(&src)?;
            while let Some(entry) = reader.next_entry().await.at(&src)? {
                checkpoint(cancel)?;
                let entry_path = entry.path();
                let target = dst.join(entry.file_name());
                let file_type = entry.file_type().await.at(&entry_path)?;
                if file_type.is_dir() {
                    pending.push((entry_path, target));
                } else if file_type.is_symlink() {
                    copy_link(&entry_path, &target).await?;
                } else {
                    fs::copy(&entry_path, &target).await.at(&target)?;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl FileSystemProvider for NativeFs {
    async fn watch(
        &self,
        url: &Url,
        options: &WatchOptions,
        listener: WatchListener,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let root = Self::local_path(url)?;
        let excludes = Excludes::new(&options.excludes)?;
        let is_dir = fs::metadata(&root).await.at(&root)?.is_dir();

        // Watch first, then snapshot: a change racing the snapshot shows up as a
        // live event instead of being lost.
        let (handle, live) =
            start_native_watch(&root, is_dir, options, excludes.clone(), &self.config)?;

        // Only a directory root has existing state to replay.
        let replay = if is_dir {
            self.list_dir(&root, cancel)
                .await?
                .into_iter()
                .filter(|entry| !excludes.is_excluded(&entry.name))
                .collect()
        } else {
            Vec::new()
        };

        debug!(
            root = %root.display(),
            recursive = options.recursive,
            polling = self.config.use_polling,
            "native watch established"
        );
        WatchSession::new(root.display().to_string(), handle)
            .run(replay, live, listener, cancel)
            .await;
        Ok(())
    }

    async fn read_directory(&self, url: &Url, cancel: &CancellationToken) -> Result<Vec<FsEntry>> {
        let path = Self::local_path(url)?;
        checkpoint(cancel)?;
        self.list_dir(&path, cancel).await
    }

    async fn create_directory(&self, url: &Url, cancel: &CancellationToken) -> Result<()> {
        let path = Self::local_path(url)?;
        checkpoint(cancel)?;
        fs::create_dir(&path).await.at(&path)
    }

    async fn read_file(&self, url: &Url, cancel: &CancellationToken) -> Result<Vec<u8>> {
        let path = Self::local_path(url)?;
        checkpoint(cancel)?;

        let mut file = fs::File::open(&path).await.at(&path)?;
        let mut content = Vec::new();
        let mut chunk = vec![0u8; self.config.io_chunk_size];
        loop {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FsError::aborted().into()),
                read = file.read(&mut chunk) => read.at(&path)?,
            };
            if read == 0 {
                break;
            }
            content.extend_from_slice(&chunk[..read]);
        }
        trace!(path = %path.display(), bytes = content.len(), "file read");
        Ok(content)
    }

    async fn write_file(
        &self,
        url: &Url,
        content: &[u8],
        options: &WriteOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let path = Self::local_path(url)?;
        checkpoint(cancel)?;

        let exists = exists(&path).await?;
        if !exists && !options.create {
            return Err(FsError::new(
                ErrorKind::PathNotFound,
                format!("{}: file does not exist", path.display()),
            )
            .into());
        }
        if exists && !options.overwrite {
            return Err(FsError::already_exists(path.display()).into());
        }

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .await
            .at(&path)?;
        for chunk in content.chunks(self.config.io_chunk_size) {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FsError::aborted().into()),
                written = file.write_all(chunk) => written.at(&path)?,
            }
        }
        file.flush().await.at(&path)?;
        trace!(path = %path.display(), bytes = content.len(), "file written");
        Ok(())
    }

    async fn delete(
        &self,
        url: &Url,
        options: &DeleteOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let path = Self::local_path(url)?;
        checkpoint(cancel)?;

        let meta = fs::symlink_metadata(&path).await.at(&path)?;
        if meta.is_dir() {
            if options.recursive {
                fs::remove_dir_all(&path).await.at(&path)
            } else {
                fs::remove_dir(&path).await.at(&path)
            }
        } else {
            fs::remove_file(&path).await.at(&path)
        }
    }

    async fn rename(
        &self,
        old_url: &Url,
        new_url: &Url,
        options: &TransferOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let from = Self::local_path(old_url)?;
        let to = Self::local_path(new_url)?;
        checkpoint(cancel)?;

        fs::symlink_metadata(&from).await.at(&from)?;
        if from == to {
            return Ok(());
        }
        reject_nested(&from, &to, "move")?;
        if let Some(meta) = lstat_if_exists(&to).await? {
            if !options.overwrite {
                return Err(FsError::already_exists(to.display()).into());
            }
            if meta.is_dir() {
                fs::remove_dir_all(&to).await.at(&to)?;
            }
        }
        fs::rename(&from, &to).await.at(&to)
    }

    async fn copy(
        &self,
        source: &Url,
        destination: &Url,
        options: &TransferOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let from = Self::local_path(source)?;
        let to = Self::local_path(destination)?;
        checkpoint(cancel)?;

        let meta = fs::metadata(&from).await.at(&from)?;
        reject_nested(&from, &to, "copy")?;
        if let Some(existing) = lstat_if_exists(&to).await? {
            if !options.overwrite {
                return Err(FsError::already_exists(to.display()).into());
            }
            if existing.is_dir() {
                fs::remove_dir_all(&to).await.at(&to)?;
            } else if meta.is_dir() {
                fs::remove_file(&to).await.at(&to)?;
            }
        }

        if meta.is_dir() {
            self.copy_tree(&from, &to, cancel).await
        } else {
            fs::copy(&from, &to).await.at(&to)?;
            Ok(())
        }
    }
}

/// Source and target must not contain one another; clearing an ancestor
/// target would destroy the source.
fn reject_nested(from: &Path, to: &Path, verb: &str) -> Result<()> {
    if to.starts_with(from) {
        return Err(FsError::new(
            ErrorKind::Unknown,
            format!("cannot {} {} into itself", verb, from.display()),
        )
        .into());
    }
    if from.starts_with(to) {
        return Err(FsError::new(
            ErrorKind::Unknown,
            format!("cannot {} {} onto its ancestor {}", verb, from.display(), to.display()),
        )
        .into());
    }
    Ok(())
}

async fn exists(path: &Path) -> Result<bool> {
    Ok(lstat_if_exists(path).await?.is_some())
}

async fn lstat_if_exists(path: &Path) -> Result<Option<Metadata>> {
    match fs::symlink_metadata(path).await {
        Ok(meta) => Ok(Some(meta)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(FsError::io(&err, path).into()),
    }
}

#[cfg(unix)]
async fn copy_link(link: &Path, target: &Path) -> Result<()> {
    let points_to = fs::read_link(link).await.at(link)?;
    fs::symlink(&points_to, target).await.at(target)
}

#[cfg(not(unix))]
async fn copy_link(link: &Path, target: &Path) -> Result<()> {
    fs::copy(link, target).await.at(target)?;
    Ok(())
}

/// Stat one listed entry; a failure degrades it to name-only.
async fn stat_entry(path: &Path, name: String) -> FsEntry {
    match resolve_metadata(path).await {
        Ok((meta, is_symlink)) => entry_from_metadata(name, &meta, is_symlink),
        Err(err) => {
            trace!(path = %path.display(), error = %err, "stat failed, returning name only");
            FsEntry::named(name)
        }
    }
}

/// lstat, following a symbolic link by exactly one hop.
async fn resolve_metadata(path: &Path) -> io::Result<(Metadata, bool)> {
    let meta = fs::symlink_metadata(path).await?;
    if !meta.file_type().is_symlink() {
        return Ok((meta, false));
    }
    let target = fs::read_link(path).await?;
    let target = match path.parent() {
        Some(parent) => parent.join(target),
        None => target,
    };
    let resolved = fs::symlink_metadata(&target).await?;
    Ok((resolved, true))
}

pub(crate) fn entry_from_metadata(name: String, meta: &Metadata, is_symlink: bool) -> FsEntry {
    let file_type = meta.file_type();
    #[allow(unused_mut)]
    let mut entry = FsEntry {
        name,
        size: Some(meta.len()),
        accessed: meta.accessed().ok().and_then(epoch_millis),
        created: meta.created().ok().and_then(epoch_millis),
        modified: meta.modified().ok().and_then(epoch_millis),
        is_dir: Some(file_type.is_dir()),
        is_file: Some(file_type.is_file()),
        is_symlink: Some(is_symlink),
        ..FsEntry::default()
    };

    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;
        entry.is_block_device = Some(file_type.is_block_device());
        entry.is_character_device = Some(file_type.is_char_device());
        entry.is_fifo = Some(file_type.is_fifo());
        entry.is_socket = Some(file_type.is_socket());
    }

    entry
}

fn epoch_millis(time: SystemTime) -> Option<u64> {
    time.duration_since(UNIX_EPOCH)
        .ok()
        .map(|elapsed| elapsed.as_millis() as u64)
}
