//! Wire messages exchanged between the client proxy and the host.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use super::entry::{FileChangeEvent, FsEntry};
use crate::error::{BridgeError, FsError, Result};

/// Identifier of one request/response (or request/stream) exchange.
///
/// Unique among the operations a single client has in flight; not
/// meaningful across process restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(pub u64);

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for OperationId {
    fn from(id: u64) -> Self {
        OperationId(id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchOptions {
    /// Follow changes below direct children
    #[serde(default)]
    pub recursive: bool,
    /// Glob patterns, matched against paths relative to the watch root
    #[serde(default)]
    pub excludes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteOptions {
    /// Create the file if it does not exist
    #[serde(default = "default_true")]
    pub create: bool,
    /// Replace the file if it exists
    #[serde(default = "default_true")]
    pub overwrite: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            create: true,
            overwrite: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOptions {
    #[serde(default)]
    pub recursive: bool,
}

/// Options for `rename` and `copy`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferOptions {
    /// Replace the target if it exists
    #[serde(default)]
    pub overwrite: bool,
}

fn default_true() -> bool {
    true
}

/// One filesystem command, tagged by `cmd` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "camelCase")]
pub enum FsOperation {
    Watch {
        url: Url,
        #[serde(default)]
        options: WatchOptions,
    },
    /// Stop the watch running under `watch_id`; same effect as aborting it.
    #[serde(alias = "watch.stop", rename_all = "camelCase")]
    WatchStop { watch_id: OperationId },
    ReadDirectory {
        url: Url,
    },
    CreateDirectory {
        url: Url,
    },
    ReadFile {
        url: Url,
    },
    WriteFile {
        url: Url,
        #[serde(with = "crate::base64::bytes")]
        content: Vec<u8>,
        #[serde(default)]
        options: WriteOptions,
    },
    Delete {
        url: Url,
        #[serde(default)]
        options: DeleteOptions,
    },
    #[serde(rename_all = "camelCase")]
    Rename {
        old_url: Url,
        new_url: Url,
        #[serde(default)]
        options: TransferOptions,
    },
    Copy {
        source: Url,
        destination: Url,
        #[serde(default)]
        options: TransferOptions,
    },
}

impl FsOperation {
    /// Wire name of the command.
    pub fn name(&self) -> &'static str {
        match self {
            FsOperation::Watch { .. } => "watch",
            FsOperation::WatchStop { .. } => "watchStop",
            FsOperation::ReadDirectory { .. } => "readDirectory",
            FsOperation::CreateDirectory { .. } => "createDirectory",
            FsOperation::ReadFile { .. } => "readFile",
            FsOperation::WriteFile { .. } => "writeFile",
            FsOperation::Delete { .. } => "delete",
            FsOperation::Rename { .. } => "rename",
            FsOperation::Copy { .. } => "copy",
        }
    }

    /// Whether the command streams events until aborted.
    pub fn is_watch(&self) -> bool {
        matches!(self, FsOperation::Watch { .. })
    }
}

/// Client → host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientMessage {
    /// `{id, operation}`
    Start {
        id: OperationId,
        operation: FsOperation,
    },
    /// `{abort: true, id}`
    Abort { abort: bool, id: OperationId },
}

impl ClientMessage {
    pub fn start(id: OperationId, operation: FsOperation) -> Self {
        ClientMessage::Start { id, operation }
    }

    pub fn abort(id: OperationId) -> Self {
        ClientMessage::Abort { abort: true, id }
    }

    pub fn id(&self) -> OperationId {
        match self {
            ClientMessage::Start { id, .. } | ClientMessage::Abort { id, .. } => *id,
        }
    }
}

/// Successful payload of a terminal response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OperationOutput {
    /// Commands without a result value (serialized as `null`)
    #[default]
    None,
    /// `readDirectory` listing
    Entries(Vec<FsEntry>),
    /// `readFile` bytes
    Content(#[serde(with = "crate::base64::bytes")] Vec<u8>),
}

impl OperationOutput {
    pub fn into_entries(self) -> Result<Vec<FsEntry>> {
        match self {
            OperationOutput::Entries(entries) => Ok(entries),
            other => Err(BridgeError::UnexpectedResponse(format!(
                "expected directory entries, got {}",
                other.shape()
            ))),
        }
    }

    pub fn into_content(self) -> Result<Vec<u8>> {
        match self {
            OperationOutput::Content(bytes) => Ok(bytes),
            other => Err(BridgeError::UnexpectedResponse(format!(
                "expected file content, got {}",
                other.shape()
            ))),
        }
    }

    pub fn into_unit(self) -> Result<()> {
        match self {
            OperationOutput::None => Ok(()),
            other => Err(BridgeError::UnexpectedResponse(format!(
                "expected no data, got {}",
                other.shape()
            ))),
        }
    }

    fn shape(&self) -> &'static str {
        match self {
            OperationOutput::None => "no data",
            OperationOutput::Entries(_) => "directory entries",
            OperationOutput::Content(_) => "file content",
        }
    }
}

/// Host → client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HostMessage {
    /// `{id, events}`: a batch of watch events, watch ids only
    Events {
        id: OperationId,
        events: Vec<FileChangeEvent>,
    },
    /// `{id, err, data}`: the single terminal response for `id`
    ///
    /// `data` is required (`null` when there is none), so a malformed event
    /// batch is rejected rather than read as a bare success.
    Result {
        id: OperationId,
        #[serde(default)]
        err: Option<FsError>,
        data: OperationOutput,
    },
}

impl HostMessage {
    pub fn events(id: OperationId, events: Vec<FileChangeEvent>) -> Self {
        HostMessage::Events { id, events }
    }

    /// Terminal response built from an operation's outcome.
    pub fn terminal(id: OperationId, outcome: &Result<OperationOutput>) -> Self {
        match outcome {
            Ok(data) => HostMessage::Result {
                id,
                err: None,
                data: data.clone(),
            },
            Err(err) => HostMessage::Result {
                id,
                err: Some(err.to_wire()),
                data: OperationOutput::None,
            },
        }
    }

    pub fn id(&self) -> OperationId {
        match self {
            HostMessage::Events { id, .. } | HostMessage::Result { id, .. } => *id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, HostMessage::Result { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_start_message_shape() {
        let msg = ClientMessage::start(
            OperationId(7),
            FsOperation::ReadDirectory {
                url: url("file:///tmp"),
            },
        );
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({"id": 7, "operation": {"cmd": "readDirectory", "url": "file:///tmp"}})
        );
    }

    #[test]
    fn test_abort_message_shape() {
        let value = serde_json::to_value(ClientMessage::abort(OperationId(3))).unwrap();
        assert_eq!(value, json!({"abort": true, "id": 3}));

        let parsed: ClientMessage = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, ClientMessage::abort(OperationId(3)));
        assert_eq!(parsed.id(), OperationId(3));
    }

    #[test]
    fn test_rename_fields_are_camel_case() {
        let op = FsOperation::Rename {
            old_url: url("file:///a"),
            new_url: url("file:///b"),
            options: TransferOptions { overwrite: true },
        };
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value["cmd"], "rename");
        assert_eq!(value["oldUrl"], "file:///a");
        assert_eq!(value["newUrl"], "file:///b");
        assert_eq!(value["options"]["overwrite"], true);
    }

    #[test]
    fn test_write_file_content_is_base64() {
        let op = FsOperation::WriteFile {
            url: url("file:///tmp/x"),
            content: b"hello".to_vec(),
            options: WriteOptions::default(),
        };
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value["content"], "aGVsbG8=");
        assert_eq!(value["options"], json!({"create": true, "overwrite": true}));

        let parsed: FsOperation = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, op);
    }

    #[test]
    fn test_options_default_when_missing() {
        let op: FsOperation = serde_json::from_value(json!({
            "cmd": "delete",
            "url": "file:///tmp/x"
        }))
        .unwrap();
        assert_eq!(
            op,
            FsOperation::Delete {
                url: url("file:///tmp/x"),
                options: DeleteOptions { recursive: false },
            }
        );

        let op: FsOperation = serde_json::from_value(json!({
            "cmd": "writeFile",
            "url": "file:///tmp/x",
            "content": "",
            "options": {"overwrite": false}
        }))
        .unwrap();
        match op {
            FsOperation::WriteFile { options, .. } => {
                assert!(options.create);
                assert!(!options.overwrite);
            }
            other => panic!("unexpected operation: {:?}", other),
        }
    }

    #[test]
    fn test_watch_stop_alias() {
        let legacy: FsOperation =
            serde_json::from_value(json!({"cmd": "watch.stop", "watchId": 4})).unwrap();
        let current: FsOperation =
            serde_json::from_value(json!({"cmd": "watchStop", "watchId": 4})).unwrap();
        assert_eq!(legacy, current);
        assert_eq!(
            current,
            FsOperation::WatchStop {
                watch_id: OperationId(4)
            }
        );
        assert_eq!(current.name(), "watchStop");
    }

    #[test]
    fn test_terminal_success_shape() {
        let msg = HostMessage::terminal(OperationId(1), &Ok(OperationOutput::None));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value, json!({"id": 1, "err": null, "data": null}));
        assert!(msg.is_terminal());
    }

    #[test]
    fn test_terminal_error_shape() {
        let outcome: Result<OperationOutput> = Err(FsError::not_empty("/x").into());
        let msg = HostMessage::terminal(OperationId(2), &outcome);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["err"]["kind"], "NotEmpty");
        assert_eq!(value["data"], json!(null));
    }

    #[test]
    fn test_host_message_parse() {
        let events: HostMessage = serde_json::from_value(json!({
            "id": 5,
            "events": [{"type": "created", "path": "a"}, {"type": "ready"}]
        }))
        .unwrap();
        match events {
            HostMessage::Events { id, events } => {
                assert_eq!(id, OperationId(5));
                assert_eq!(events.len(), 2);
                assert!(events[1].is_ready());
            }
            other => panic!("unexpected message: {:?}", other),
        }

        let content: HostMessage =
            serde_json::from_value(json!({"id": 6, "err": null, "data": "aGk="})).unwrap();
        match content {
            HostMessage::Result { data, err, .. } => {
                assert!(err.is_none());
                assert_eq!(data.into_content().unwrap(), b"hi");
            }
            other => panic!("unexpected message: {:?}", other),
        }

        let listing: HostMessage =
            serde_json::from_value(json!({"id": 8, "data": [{"name": "b"}]})).unwrap();
        match listing {
            HostMessage::Result { data, .. } => {
                assert_eq!(data.into_entries().unwrap(), vec![FsEntry::named("b")]);
            }
            other => panic!("unexpected message: {:?}", other),
        }

        let failed: HostMessage = serde_json::from_value(json!({
            "id": 9,
            "err": {"kind": "PathNotFound", "message": "/nope"},
            "data": null
        }))
        .unwrap();
        match failed {
            HostMessage::Result { err: Some(err), .. } => {
                assert_eq!(err.kind, ErrorKind::PathNotFound)
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_events_are_rejected() {
        let parsed = serde_json::from_str::<HostMessage>(r#"{"id":5,"events":[{"type":"bogus"}]}"#);
        assert!(parsed.is_err());
        assert!(serde_json::from_value::<HostMessage>(json!({"id": 5})).is_err());

        let done: HostMessage =
            serde_json::from_str(r#"{"id":1,"err":null,"data":null}"#).unwrap();
        assert!(done.is_terminal());
        assert_eq!(done, HostMessage::terminal(OperationId(1), &Ok(OperationOutput::None)));
    }

    #[test]
    fn test_output_shape_mismatch() {
        let err = OperationOutput::None.into_content().unwrap_err();
        assert!(matches!(err, BridgeError::UnexpectedResponse(_)));
        assert!(OperationOutput::Entries(vec![]).into_unit().is_err());
    }
}
