//! Directory entry snapshots and change events.

use serde::{Deserialize, Serialize};

/// Best-effort metadata snapshot of one directory entry.
///
/// Every field but `name` is optional: stat can fail for an entry even
/// though the listing that produced it succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FsEntry {
    /// Entry name (last path component)
    pub name: String,
    /// Size in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Last access time, milliseconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessed: Option<u64>,
    /// Creation time, milliseconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<u64>,
    /// Last modification time, milliseconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_dir: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_file: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_symlink: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_block_device: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_character_device: Option<bool>,
    #[serde(default, rename = "isFIFO", skip_serializing_if = "Option::is_none")]
    pub is_fifo: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_socket: Option<bool>,
}

impl FsEntry {
    /// Entry carrying only its name, used when stat failed.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Check if this entry is known to be a directory.
    pub fn is_dir(&self) -> bool {
        self.is_dir == Some(true)
    }

    /// Check if this entry is known to be a regular file.
    pub fn is_file(&self) -> bool {
        self.is_file == Some(true)
    }

    /// Check if stat data is present at all.
    pub fn has_metadata(&self) -> bool {
        self.is_dir.is_some() || self.is_file.is_some() || self.size.is_some()
    }
}

/// Kind of a file change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FileChangeType {
    /// Entry appeared (initial replay or live add)
    Created,
    /// Entry content or metadata changed
    Changed,
    /// Entry disappeared
    Deleted,
    /// Boundary between replayed state and live changes
    Ready,
}

/// One event of a watch session's stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChangeEvent {
    #[serde(rename = "type")]
    pub kind: FileChangeType,
    /// Path relative to the watch root; absent on the ready sentinel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Snapshot of the entry; absent when it could not be stat'ed (always for `deleted`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<FsEntry>,
}

impl FileChangeEvent {
    pub fn new(kind: FileChangeType, path: impl Into<String>, entry: Option<FsEntry>) -> Self {
        Self {
            kind,
            path: Some(path.into()),
            entry,
        }
    }

    pub fn created(path: impl Into<String>, entry: Option<FsEntry>) -> Self {
        Self::new(FileChangeType::Created, path, entry)
    }

    pub fn changed(path: impl Into<String>, entry: Option<FsEntry>) -> Self {
        Self::new(FileChangeType::Changed, path, entry)
    }

    pub fn deleted(path: impl Into<String>) -> Self {
        Self::new(FileChangeType::Deleted, path, None)
    }

    /// The replay/live boundary sentinel.
    pub fn ready() -> Self {
        Self {
            kind: FileChangeType::Ready,
            path: None,
            entry: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.kind == FileChangeType::Ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_entry_serializes_name_only() {
        let entry = FsEntry::named("b");
        assert!(!entry.has_metadata());
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(json, r#"{"name":"b"}"#);
    }

    #[test]
    fn test_entry_field_names() {
        let entry = FsEntry {
            name: "pipe".to_string(),
            size: Some(0),
            is_file: Some(false),
            is_fifo: Some(true),
            is_character_device: Some(false),
            ..FsEntry::default()
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["isFIFO"], true);
        assert_eq!(json["isFile"], false);
        assert_eq!(json["isCharacterDevice"], false);
        assert!(json.get("isDir").is_none());

        let restored: FsEntry = serde_json::from_value(json).unwrap();
        assert_eq!(restored, entry);
    }

    #[test]
    fn test_entry_helpers() {
        let dir = FsEntry {
            name: "src".to_string(),
            is_dir: Some(true),
            is_file: Some(false),
            ..FsEntry::default()
        };
        assert!(dir.is_dir());
        assert!(!dir.is_file());
        assert!(dir.has_metadata());
    }

    #[test]
    fn test_event_json_shape() {
        let created = FileChangeEvent::created("a.txt", Some(FsEntry::named("a.txt")));
        let json = serde_json::to_value(&created).unwrap();
        assert_eq!(json["type"], "created");
        assert_eq!(json["path"], "a.txt");
        assert_eq!(json["entry"]["name"], "a.txt");

        let deleted = serde_json::to_value(FileChangeEvent::deleted("gone")).unwrap();
        assert_eq!(deleted["type"], "deleted");
        assert!(deleted.get("entry").is_none());

        let ready = serde_json::to_string(&FileChangeEvent::ready()).unwrap();
        assert_eq!(ready, r#"{"type":"ready"}"#);
    }

    #[test]
    fn test_event_parse_ready() {
        let event: FileChangeEvent = serde_json::from_str(r#"{"type":"ready"}"#).unwrap();
        assert!(event.is_ready());
        assert_eq!(event.path, None);
    }
}
