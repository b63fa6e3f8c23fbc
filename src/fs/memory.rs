//! In-memory provider.
//!
//! Keeps a flat, path-keyed tree behind a mutex. Useful for virtual roots and
//! for exercising the bridge without touching the disk. Any URL scheme is
//! accepted; only the normalized path component is used.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;
use url::Url;

use super::utils::{is_within, join_path, normalize_path, relative_to, split_path};
use super::{checkpoint, FileSystemProvider, WatchListener};
use crate::error::{ErrorKind, FsError, Result};
use crate::protocol::{
    DeleteOptions, FileChangeEvent, FileChangeType, FsEntry, TransferOptions, WatchOptions,
    WriteOptions,
};
use crate::watch::{Excludes, WatchSession};

#[derive(Debug, Clone)]
enum NodeKind {
    Directory,
    File(Vec<u8>),
}

#[derive(Debug, Clone)]
struct MemoryNode {
    kind: NodeKind,
    created: u64,
    modified: u64,
}

impl MemoryNode {
    fn directory() -> Self {
        let now = now_millis();
        Self {
            kind: NodeKind::Directory,
            created: now,
            modified: now,
        }
    }

    fn file(content: Vec<u8>) -> Self {
        let now = now_millis();
        Self {
            kind: NodeKind::File(content),
            created: now,
            modified: now,
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Directory)
    }

    fn entry(&self, name: &str) -> FsEntry {
        let size = match &self.kind {
            NodeKind::Directory => 0,
            NodeKind::File(content) => content.len() as u64,
        };
        FsEntry {
            name: name.to_string(),
            size: Some(size),
            accessed: Some(self.modified),
            created: Some(self.created),
            modified: Some(self.modified),
            is_dir: Some(self.is_dir()),
            is_file: Some(!self.is_dir()),
            is_symlink: Some(false),
            ..FsEntry::default()
        }
    }
}

struct MemoryWatcher {
    root: String,
    root_is_dir: bool,
    recursive: bool,
    excludes: Excludes,
    tx: mpsc::UnboundedSender<FileChangeEvent>,
}

impl MemoryWatcher {
    fn relative(&self, path: &str) -> Option<String> {
        let relative = if self.root_is_dir {
            let rel = relative_to(&self.root, path)?;
            if !self.recursive && rel.contains('/') {
                return None;
            }
            rel
        } else if path == self.root {
            split_path(path)?.1.to_string()
        } else {
            return None;
        };
        if self.excludes.is_excluded(&relative) {
            return None;
        }
        Some(relative)
    }
}

struct MemoryState {
    nodes: BTreeMap<String, MemoryNode>,
    watchers: HashMap<u64, MemoryWatcher>,
    next_watcher: u64,
}

impl Default for MemoryState {
    fn default() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), MemoryNode::directory());
        Self {
            nodes,
            watchers: HashMap::new(),
            next_watcher: 0,
        }
    }
}

impl MemoryState {
    fn node(&self, path: &str) -> Result<&MemoryNode> {
        self.nodes
            .get(path)
            .ok_or_else(|| FsError::not_found(path).into())
    }

    /// Nodes strictly below `path`, in key order.
    fn descendants<'a>(
        &'a self,
        path: &str,
    ) -> impl Iterator<Item = (&'a String, &'a MemoryNode)> + 'a {
        let prefix = join_path(path, "");
        self.nodes
            .range(prefix.clone()..)
            .take_while(move |(key, _)| key.starts_with(&prefix))
            .filter(|(key, _)| key.as_str() != "/")
    }

    fn list(&self, path: &str) -> Vec<FsEntry> {
        self.descendants(path)
            .filter_map(|(key, node)| {
                let rel = relative_to(path, key)?;
                (!rel.contains('/')).then(|| node.entry(&rel))
            })
            .collect()
    }

    fn has_children(&self, path: &str) -> bool {
        self.descendants(path).next().is_some()
    }

    /// Keys of `path` and everything below it, parents first.
    fn subtree(&self, path: &str) -> Vec<String> {
        let mut keys = vec![path.to_string()];
        keys.extend(self.descendants(path).map(|(key, _)| key.clone()));
        keys
    }

    /// The parent of a path about to be created must be an existing directory.
    fn check_parent(&self, path: &str) -> Result<()> {
        let (parent, _) = split_path(path).ok_or_else(|| FsError::already_exists(path))?;
        match self.nodes.get(parent) {
            Some(node) if node.is_dir() => Ok(()),
            Some(_) => Err(FsError::not_a_directory(parent).into()),
            None => Err(FsError::not_found(parent).into()),
        }
    }

    fn remove_subtree(&mut self, path: &str) {
        let keys = self.subtree(path);
        for key in &keys {
            self.nodes.remove(key);
        }
        for key in keys.iter().rev() {
            self.emit(FileChangeType::Deleted, key);
        }
    }

    fn emit(&self, kind: FileChangeType, path: &str) {
        for watcher in self.watchers.values() {
            let Some(relative) = watcher.relative(path) else {
                continue;
            };
            let entry = match kind {
                FileChangeType::Deleted => None,
                _ => self
                    .nodes
                    .get(path)
                    .and_then(|node| split_path(path).map(|(_, name)| node.entry(name))),
            };
            let _ = watcher.tx.send(FileChangeEvent::new(kind, relative, entry));
        }
    }
}

/// Removes its watcher registration when the session releases it.
struct WatcherGuard {
    state: Arc<Mutex<MemoryState>>,
    id: u64,
}

impl Drop for WatcherGuard {
    fn drop(&mut self) {
        self.state.lock().watchers.remove(&self.id);
    }
}

/// Virtual filesystem held entirely in memory.
#[derive(Clone, Default)]
pub struct MemoryFs {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    fn path_of(url: &Url) -> String {
        normalize_path(url.path())
    }

    /// Number of live watch registrations.
    pub fn watcher_count(&self) -> usize {
        self.state.lock().watchers.len()
    }
}

#[async_trait]
impl FileSystemProvider for MemoryFs {
    async fn watch(
        &self,
        url: &Url,
        options: &WatchOptions,
        listener: WatchListener,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let root = Self::path_of(url);
        let excludes = Excludes::new(&options.excludes)?;
        let (tx, live) = mpsc::unbounded_channel();

        // Snapshot and registration happen under one lock, so no mutation
        // falls between replay and live.
        let (replay, id) = {
            let mut state = self.state.lock();
            let root_is_dir = state.node(&root)?.is_dir();
            let replay: Vec<FsEntry> = if root_is_dir {
                state
                    .list(&root)
                    .into_iter()
                    .filter(|entry| !excludes.is_excluded(&entry.name))
                    .collect()
            } else {
                Vec::new()
            };
            let id = state.next_watcher;
            state.next_watcher += 1;
            state.watchers.insert(
                id,
                MemoryWatcher {
                    root: root.clone(),
                    root_is_dir,
                    recursive: options.recursive,
                    excludes,
                    tx,
                },
            );
            (replay, id)
        };
        trace!(root = %root, watcher = id, "memory watch registered");

        let guard = WatcherGuard {
            state: self.state.clone(),
            id,
        };
        WatchSession::new(root, guard)
            .run(replay, live, listener, cancel)
            .await;
        Ok(())
    }

    async fn read_directory(&self, url: &Url, cancel: &CancellationToken) -> Result<Vec<FsEntry>> {
        checkpoint(cancel)?;
        let path = Self::path_of(url);
        let state = self.state.lock();
        if !state.node(&path)?.is_dir() {
            return Err(FsError::not_a_directory(&path).into());
        }
        Ok(state.list(&path))
    }

    async fn create_directory(&self, url: &Url, cancel: &CancellationToken) -> Result<()> {
        checkpoint(cancel)?;
        let path = Self::path_of(url);
        let mut state = self.state.lock();
        if state.nodes.contains_key(&path) {
            return Err(FsError::already_exists(&path).into());
        }
        state.check_parent(&path)?;
        state.nodes.insert(path.clone(), MemoryNode::directory());
        state.emit(FileChangeType::Created, &path);
        Ok(())
    }

    async fn read_file(&self, url: &Url, cancel: &CancellationToken) -> Result<Vec<u8>> {
        checkpoint(cancel)?;
        let path = Self::path_of(url);
        let state = self.state.lock();
        match &state.node(&path)?.kind {
            NodeKind::File(content) => Ok(content.clone()),
            NodeKind::Directory => Err(is_a_directory(&path)),
        }
    }

    async fn write_file(
        &self,
        url: &Url,
        content: &[u8],
        options: &WriteOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        checkpoint(cancel)?;
        let path = Self::path_of(url);
        let mut state = self.state.lock();

        if let Some(node) = state.nodes.get_mut(&path) {
            if node.is_dir() {
                return Err(is_a_directory(&path));
            }
            if !options.overwrite {
                return Err(FsError::already_exists(&path).into());
            }
            node.kind = NodeKind::File(content.to_vec());
            node.modified = now_millis();
            state.emit(FileChangeType::Changed, &path);
            return Ok(());
        }

        if !options.create {
            return Err(FsError::not_found(&path).into());
        }
        state.check_parent(&path)?;
        state
            .nodes
            .insert(path.clone(), MemoryNode::file(content.to_vec()));
        state.emit(FileChangeType::Created, &path);
        Ok(())
    }

    async fn delete(
        &self,
        url: &Url,
        options: &DeleteOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        checkpoint(cancel)?;
        let path = Self::path_of(url);
        let mut state = self.state.lock();
        if path == "/" {
            return Err(FsError::new(ErrorKind::Unknown, "cannot delete the root").into());
        }
        if state.node(&path)?.is_dir() && !options.recursive && state.has_children(&path) {
            return Err(FsError::not_empty(&path).into());
        }
        state.remove_subtree(&path);
        Ok(())
    }

    async fn rename(
        &self,
        old_url: &Url,
        new_url: &Url,
        options: &TransferOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        checkpoint(cancel)?;
        let from = Self::path_of(old_url);
        let to = Self::path_of(new_url);
        let mut state = self.state.lock();

        state.node(&from)?;
        if from == to {
            return Ok(());
        }
        reject_nested(&from, &to, "move")?;
        prepare_target(&mut state, &to, options)?;

        let moved: Vec<(String, MemoryNode)> = state
            .subtree(&from)
            .into_iter()
            .filter_map(|key| state.nodes.get(&key).map(|node| (key, node.clone())))
            .collect();
        state.remove_subtree(&from);
        for (key, node) in moved {
            let target = remap(&key, &from, &to);
            state.nodes.insert(target.clone(), node);
            state.emit(FileChangeType::Created, &target);
        }
        Ok(())
    }

    async fn copy(
        &self,
        source: &Url,
        destination: &Url,
        options: &TransferOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        checkpoint(cancel)?;
        let from = Self::path_of(source);
        let to = Self::path_of(destination);
        let mut state = self.state.lock();

        state.node(&from)?;
        reject_nested(&from, &to, "copy")?;
        prepare_target(&mut state, &to, options)?;

        let now = now_millis();
        let copied: Vec<(String, MemoryNode)> = state
            .subtree(&from)
            .into_iter()
            .filter_map(|key| {
                let mut node = state.nodes.get(&key)?.clone();
                node.created = now;
                Some((remap(&key, &from, &to), node))
            })
            .collect();
        for (key, node) in copied {
            state.nodes.insert(key.clone(), node);
            state.emit(FileChangeType::Created, &key);
        }
        Ok(())
    }
}

/// Source and target must not contain one another; clearing an ancestor
/// target would take the source with it.
fn reject_nested(from: &str, to: &str, verb: &str) -> Result<()> {
    if is_within(from, to) {
        return Err(FsError::new(
            ErrorKind::Unknown,
            format!("cannot {} {} into itself", verb, from),
        )
        .into());
    }
    if is_within(to, from) {
        return Err(FsError::new(
            ErrorKind::Unknown,
            format!("cannot {} {} onto its ancestor {}", verb, from, to),
        )
        .into());
    }
    Ok(())
}

/// Validate the destination of a move or copy, clearing it when overwriting.
fn prepare_target(state: &mut MemoryState, to: &str, options: &TransferOptions) -> Result<()> {
    if state.nodes.contains_key(to) {
        if !options.overwrite {
            return Err(FsError::already_exists(to).into());
        }
        state.remove_subtree(to);
        return Ok(());
    }
    state.check_parent(to)
}

fn remap(key: &str, from: &str, to: &str) -> String {
    match key.strip_prefix(from) {
        Some("") => to.to_string(),
        Some(rest) => join_path(to, rest.trim_start_matches('/')),
        None => key.to_string(),
    }
}

fn is_a_directory(path: &str) -> crate::BridgeError {
    FsError::new(ErrorKind::Unknown, format!("{}: is a directory", path)).into()
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
