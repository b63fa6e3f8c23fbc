//! Error types for the fsbridge library.

use std::fmt;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::OperationId;

/// Failure categories reported back to the caller of a bridged operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Target path does not exist
    PathNotFound,
    /// Host refused access to the target
    PermissionDenied,
    /// Target already exists (e.g. rename/copy without `overwrite`)
    AlreadyExists,
    /// A path component that must be a directory is not one
    NotADirectory,
    /// Non-recursive delete of a non-empty directory
    NotEmpty,
    /// Operation cancelled before natural completion
    Aborted,
    /// Opaque native error, message forwarded verbatim
    Unknown,
}

impl ErrorKind {
    /// Get human-readable description of the error kind.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorKind::PathNotFound => "Path not found",
            ErrorKind::PermissionDenied => "Permission denied",
            ErrorKind::AlreadyExists => "Already exists",
            ErrorKind::NotADirectory => "Not a directory",
            ErrorKind::NotEmpty => "Directory not empty",
            ErrorKind::Aborted => "Operation aborted",
            ErrorKind::Unknown => "Unknown error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

impl From<io::ErrorKind> for ErrorKind {
    fn from(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::NotFound => ErrorKind::PathNotFound,
            io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            io::ErrorKind::AlreadyExists => ErrorKind::AlreadyExists,
            io::ErrorKind::NotADirectory => ErrorKind::NotADirectory,
            io::ErrorKind::DirectoryNotEmpty => ErrorKind::NotEmpty,
            _ => ErrorKind::Unknown,
        }
    }
}

/// Filesystem failure as carried in the `err` field of a terminal response.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct FsError {
    pub kind: ErrorKind,
    pub message: String,
}

impl FsError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn aborted() -> Self {
        Self::new(ErrorKind::Aborted, "operation was cancelled")
    }

    pub fn not_found(path: impl fmt::Display) -> Self {
        Self::new(ErrorKind::PathNotFound, path.to_string())
    }

    pub fn already_exists(path: impl fmt::Display) -> Self {
        Self::new(ErrorKind::AlreadyExists, path.to_string())
    }

    pub fn not_a_directory(path: impl fmt::Display) -> Self {
        Self::new(ErrorKind::NotADirectory, path.to_string())
    }

    pub fn not_empty(path: impl fmt::Display) -> Self {
        Self::new(ErrorKind::NotEmpty, path.to_string())
    }

    /// Wrap a native I/O failure, keeping its message and naming the path it hit.
    pub fn io(err: &io::Error, path: &Path) -> Self {
        Self::new(
            ErrorKind::from(err.kind()),
            format!("{}: {}", path.display(), err),
        )
    }
}

impl From<io::Error> for FsError {
    fn from(err: io::Error) -> Self {
        Self::new(ErrorKind::from(err.kind()), err.to_string())
    }
}

/// Main error type for fsbridge operations.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Filesystem operation failed (locally or on the host).
    #[error(transparent)]
    Fs(#[from] FsError),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Native watcher could not be established.
    #[error("Watch error: {0}")]
    WatchError(#[from] notify::Error),

    /// Exclusion pattern is not a valid glob.
    #[error("Invalid exclude pattern: {0}")]
    InvalidPattern(#[from] globset::Error),

    /// Target URL cannot be served by this provider.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The id is already registered for an in-flight operation.
    #[error("Operation {0} is already in flight")]
    DuplicateOperation(OperationId),

    /// The message channel to the other side is gone.
    #[error("Message channel closed")]
    ChannelClosed,

    /// Terminal response carried data of the wrong shape.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Configuration value out of range.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

impl BridgeError {
    /// Failure category of this error; non-filesystem failures are `Unknown`.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::Fs(err) => err.kind,
            _ => ErrorKind::Unknown,
        }
    }

    /// Convert into the error sent over the wire.
    pub fn to_wire(&self) -> FsError {
        match self {
            BridgeError::Fs(err) => err.clone(),
            other => FsError::new(ErrorKind::Unknown, other.to_string()),
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.kind() == ErrorKind::Aborted
    }
}

impl From<io::Error> for BridgeError {
    fn from(err: io::Error) -> Self {
        BridgeError::Fs(err.into())
    }
}

/// Result type alias for fsbridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Attach the offending path to native I/O failures.
pub(crate) trait IoResultExt<T> {
    fn at(self, path: &Path) -> Result<T>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn at(self, path: &Path) -> Result<T> {
        self.map_err(|err| BridgeError::Fs(FsError::io(&err, path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_kind_conversion() {
        assert_eq!(ErrorKind::from(io::ErrorKind::NotFound), ErrorKind::PathNotFound);
        assert_eq!(
            ErrorKind::from(io::ErrorKind::PermissionDenied),
            ErrorKind::PermissionDenied
        );
        assert_eq!(
            ErrorKind::from(io::ErrorKind::AlreadyExists),
            ErrorKind::AlreadyExists
        );
        assert_eq!(
            ErrorKind::from(io::ErrorKind::NotADirectory),
            ErrorKind::NotADirectory
        );
        assert_eq!(
            ErrorKind::from(io::ErrorKind::DirectoryNotEmpty),
            ErrorKind::NotEmpty
        );
        assert_eq!(ErrorKind::from(io::ErrorKind::Other), ErrorKind::Unknown);
    }

    #[test]
    fn test_io_error_keeps_message_and_path() {
        let err = io::Error::new(io::ErrorKind::NotFound, "No such file or directory");
        let fs_err = FsError::io(&err, Path::new("/tmp/missing"));
        assert_eq!(fs_err.kind, ErrorKind::PathNotFound);
        assert!(fs_err.message.contains("/tmp/missing"));
        assert!(fs_err.message.contains("No such file or directory"));
    }

    #[test]
    fn test_wire_conversion() {
        let err = BridgeError::from(FsError::aborted());
        assert!(err.is_aborted());
        assert_eq!(err.to_wire(), FsError::aborted());

        let err = BridgeError::ChannelClosed;
        assert_eq!(err.kind(), ErrorKind::Unknown);
        let wire = err.to_wire();
        assert_eq!(wire.kind, ErrorKind::Unknown);
        assert_eq!(wire.message, "Message channel closed");
    }

    #[test]
    fn test_wire_error_json_shape() {
        let err = FsError::already_exists("/a/b");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "AlreadyExists");
        assert_eq!(json["message"], "/a/b");

        let restored: FsError = serde_json::from_value(json).unwrap();
        assert_eq!(restored, err);
    }
}
