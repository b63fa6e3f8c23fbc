//! Watch sessions.
//!
//! A session replays the current entries of its root as `created` events,
//! emits one `ready` sentinel, and then forwards live changes until it is
//! cancelled. The session owns the native watch handle and drops it before
//! returning, so callers can send the terminal response knowing the handle
//! is gone.

use std::path::{Component, Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use notify::event::{MetadataKind, ModifyKind, RenameMode};
use notify::{
    Config as NotifyConfig, Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode,
    Watcher,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::config::BridgeConfig;
use crate::error::Result;
use crate::fs::{entry_from_metadata, WatchListener};
use crate::protocol::{FileChangeEvent, FileChangeType, FsEntry, WatchOptions};

/// Compiled exclusion globs of a watch.
#[derive(Debug, Clone)]
pub struct Excludes {
    set: GlobSet,
}

impl Excludes {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            builder.add(Glob::new(pattern)?);
        }
        Ok(Self {
            set: builder.build()?,
        })
    }

    pub fn none() -> Self {
        Self {
            set: GlobSet::empty(),
        }
    }

    /// Whether a root-relative path, or any directory above it, matches.
    pub fn is_excluded(&self, relative: &str) -> bool {
        if self.set.is_empty() {
            return false;
        }
        let mut prefix = String::with_capacity(relative.len());
        for component in relative.split('/') {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(component);
            if self.set.is_match(&prefix) {
                return true;
            }
        }
        false
    }
}

/// A live watch over one root, owning its change-source handle.
pub struct WatchSession<H> {
    root: String,
    handle: H,
}

impl<H> WatchSession<H> {
    pub fn new(root: impl Into<String>, handle: H) -> Self {
        Self {
            root: root.into(),
            handle,
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Drive the session until `cancel` fires.
    ///
    /// Changes that arrived while `replay` was being collected are flushed
    /// right after the `ready` sentinel.
    pub async fn run(
        self,
        replay: Vec<FsEntry>,
        mut live: mpsc::UnboundedReceiver<FileChangeEvent>,
        listener: WatchListener,
        cancel: &CancellationToken,
    ) {
        let WatchSession { root, handle } = self;

        let mut batch: Vec<FileChangeEvent> = replay
            .into_iter()
            .map(|entry| FileChangeEvent::created(entry.name.clone(), Some(entry)))
            .collect();
        let replayed = batch.len();
        batch.push(FileChangeEvent::ready());
        while let Ok(event) = live.try_recv() {
            batch.push(event);
        }
        debug!(root = %root, replayed, "watch session ready");
        if listener.send(batch).is_err() {
            trace!(root = %root, "watch listener gone");
        }

        let mut live_open = true;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = live.recv(), if live_open => match event {
                    Some(event) => {
                        trace!(root = %root, kind = ?event.kind, path = ?event.path, "live change");
                        let _ = listener.send(vec![event]);
                    }
                    None => {
                        debug!(root = %root, "change source closed; waiting for abort");
                        live_open = false;
                    }
                },
            }
        }

        drop(handle);
        debug!(root = %root, "watch session released");
    }
}

/// Native watcher handle; dropping it stops the watch.
pub struct NativeWatch {
    _watcher: Box<dyn Watcher + Send>,
}

/// Establish a native watch over `root` and return the translated change feed.
pub(crate) fn start_native_watch(
    root: &Path,
    is_dir: bool,
    options: &WatchOptions,
    excludes: Excludes,
    config: &BridgeConfig,
) -> Result<(NativeWatch, mpsc::UnboundedReceiver<FileChangeEvent>)> {
    let (tx, rx) = mpsc::unbounded_channel();
    let scope = WatchScope {
        root: root.to_path_buf(),
        is_dir,
        recursive: options.recursive,
        excludes,
    };

    // Runs on the watcher's own thread, so the blocking stat inside
    // translate() never lands on the async runtime.
    let handler = move |res: notify::Result<Event>| match res {
        Ok(event) => {
            for change in scope.translate(&event) {
                if tx.send(change).is_err() {
                    return;
                }
            }
        }
        Err(err) => error!(error = %err, root = %scope.root.display(), "native watch error"),
    };

    let mode = if options.recursive {
        RecursiveMode::Recursive
    } else {
        RecursiveMode::NonRecursive
    };

    let mut watcher: Box<dyn Watcher + Send> = if config.use_polling {
        Box::new(PollWatcher::new(
            handler,
            NotifyConfig::default().with_poll_interval(config.poll_interval),
        )?)
    } else {
        Box::new(RecommendedWatcher::new(handler, NotifyConfig::default())?)
    };
    watcher.watch(root, mode)?;

    Ok((NativeWatch { _watcher: watcher }, rx))
}

/// What a native watch reports and how its paths are expressed.
struct WatchScope {
    root: PathBuf,
    is_dir: bool,
    recursive: bool,
    excludes: Excludes,
}

impl WatchScope {
    fn translate(&self, event: &Event) -> Vec<FileChangeEvent> {
        let mut changes: Vec<(FileChangeType, &PathBuf)> = Vec::new();
        match &event.kind {
            EventKind::Create(_) => {
                changes.extend(event.paths.iter().map(|p| (FileChangeType::Created, p)));
            }
            EventKind::Remove(_) => {
                changes.extend(event.paths.iter().map(|p| (FileChangeType::Deleted, p)));
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                changes.extend(event.paths.iter().map(|p| (FileChangeType::Deleted, p)));
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                changes.extend(event.paths.iter().map(|p| (FileChangeType::Created, p)));
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                if let Some((from, to)) = event.paths.split_first() {
                    changes.push((FileChangeType::Deleted, from));
                    changes.extend(to.iter().map(|p| (FileChangeType::Created, p)));
                }
            }
            EventKind::Modify(ModifyKind::Name(_)) => {
                for path in &event.paths {
                    let kind = if path.exists() {
                        FileChangeType::Created
                    } else {
                        FileChangeType::Deleted
                    };
                    changes.push((kind, path));
                }
            }
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::AccessTime)) => {}
            EventKind::Modify(_) => {
                changes.extend(event.paths.iter().map(|p| (FileChangeType::Changed, p)));
            }
            EventKind::Any => {
                for path in &event.paths {
                    let kind = if path.exists() {
                        FileChangeType::Changed
                    } else {
                        FileChangeType::Deleted
                    };
                    changes.push((kind, path));
                }
            }
            EventKind::Access(_) | EventKind::Other => {}
        }

        changes
            .into_iter()
            .filter_map(|(kind, path)| {
                let relative = self.relative(path)?;
                let entry = match kind {
                    FileChangeType::Deleted => None,
                    _ => stat_blocking(path, last_component(&relative)),
                };
                Some(FileChangeEvent::new(kind, relative, entry))
            })
            .collect()
    }

    /// Root-relative, `/`-separated path, or `None` when out of scope.
    fn relative(&self, path: &Path) -> Option<String> {
        let relative = if self.is_dir {
            let rest = path.strip_prefix(&self.root).ok()?;
            let parts: Vec<String> = rest
                .components()
                .filter_map(|c| match c {
                    Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                    _ => None,
                })
                .collect();
            if parts.is_empty() {
                return None;
            }
            if !self.recursive && parts.len() > 1 {
                return None;
            }
            parts.join("/")
        } else {
            if path != self.root {
                return None;
            }
            path.file_name()?.to_string_lossy().into_owned()
        };
        if self.excludes.is_excluded(&relative) {
            return None;
        }
        Some(relative)
    }
}

fn last_component(relative: &str) -> &str {
    relative.rsplit('/').next().unwrap_or(relative)
}

fn stat_blocking(path: &Path, name: &str) -> Option<FsEntry> {
    let meta = std::fs::symlink_metadata(path).ok()?;
    if meta.file_type().is_symlink() {
        let target = std::fs::metadata(path).unwrap_or(meta);
        return Some(entry_from_metadata(name.to_string(), &target, true));
    }
    Some(entry_from_metadata(name.to_string(), &meta, false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn scope(root: &Path, recursive: bool, excludes: &[&str]) -> WatchScope {
        let patterns: Vec<String> = excludes.iter().map(|p| p.to_string()).collect();
        WatchScope {
            root: root.to_path_buf(),
            is_dir: true,
            recursive,
            excludes: Excludes::new(&patterns).unwrap(),
        }
    }

    #[test]
    fn test_excludes_matching() {
        let excludes =
            Excludes::new(&["node_modules".to_string(), "*.log".to_string()]).unwrap();
        assert!(excludes.is_excluded("node_modules"));
        assert!(excludes.is_excluded("node_modules/pkg/index.js"));
        assert!(excludes.is_excluded("debug.log"));
        assert!(excludes.is_excluded("sub/debug.log"));
        assert!(!excludes.is_excluded("src/main.rs"));
        assert!(!Excludes::none().is_excluded("anything"));
    }

    #[test]
    fn test_excludes_invalid_pattern() {
        let err = Excludes::new(&["a[".to_string()]).unwrap_err();
        assert!(matches!(err, crate::BridgeError::InvalidPattern(_)));
    }

    #[test]
    fn test_translate_rename_both() {
        let root = Path::new("/watched");
        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(root.join("old.txt"))
            .add_path(root.join("new.txt"));
        let changes = scope(root, false, &[]).translate(&event);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0], FileChangeEvent::deleted("old.txt"));
        assert_eq!(changes[1].kind, FileChangeType::Created);
        assert_eq!(changes[1].path.as_deref(), Some("new.txt"));
    }

    #[test]
    fn test_translate_scope_filters() {
        let root = Path::new("/watched");
        let flat = scope(root, false, &["*.tmp"]);

        let on_root = Event::new(EventKind::Modify(ModifyKind::Any)).add_path(root.to_path_buf());
        assert!(flat.translate(&on_root).is_empty());

        let nested = Event::new(EventKind::Remove(notify::event::RemoveKind::Any))
            .add_path(root.join("dir/inner.txt"));
        assert!(flat.translate(&nested).is_empty());
        assert_eq!(
            scope(root, true, &[]).translate(&nested),
            vec![FileChangeEvent::deleted("dir/inner.txt")]
        );

        let excluded = Event::new(EventKind::Remove(notify::event::RemoveKind::Any))
            .add_path(root.join("scratch.tmp"));
        assert!(flat.translate(&excluded).is_empty());

        let access = Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path(root.join("a.txt"));
        assert!(flat.translate(&access).is_empty());
    }

    #[test]
    fn test_translate_file_root_uses_file_name() {
        let file = Path::new("/watched/notes.md");
        let single = WatchScope {
            root: file.to_path_buf(),
            is_dir: false,
            recursive: false,
            excludes: Excludes::none(),
        };
        let event = Event::new(EventKind::Remove(notify::event::RemoveKind::File))
            .add_path(file.to_path_buf());
        assert_eq!(
            single.translate(&event),
            vec![FileChangeEvent::deleted("notes.md")]
        );
    }

    struct ReleaseFlag(Arc<AtomicBool>);

    impl Drop for ReleaseFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_session_replay_ready_live_then_release() {
        let released = Arc::new(AtomicBool::new(false));
        let session = WatchSession::new("/root", ReleaseFlag(released.clone()));
        assert_eq!(session.root(), "/root");

        let (live_tx, live_rx) = mpsc::unbounded_channel();
        let (listener, mut events) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        // Raised while the replay was being collected.
        live_tx.send(FileChangeEvent::deleted("early")).unwrap();

        let replay = vec![FsEntry::named("a"), FsEntry::named("b")];
        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move { session.run(replay, live_rx, listener, &cancel).await })
        };

        let first = events.recv().await.unwrap();
        let kinds: Vec<FileChangeType> = first.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                FileChangeType::Created,
                FileChangeType::Created,
                FileChangeType::Ready,
                FileChangeType::Deleted,
            ]
        );
        assert_eq!(first[0].path.as_deref(), Some("a"));
        assert_eq!(first[1].path.as_deref(), Some("b"));

        live_tx.send(FileChangeEvent::changed("a", None)).unwrap();
        let second = events.recv().await.unwrap();
        assert_eq!(second, vec![FileChangeEvent::changed("a", None)]);

        assert!(!released.load(Ordering::SeqCst));
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert!(released.load(Ordering::SeqCst));

        // Listener dropped with the session; nothing more arrives.
        assert!(events.recv().await.is_none());
    }
}
