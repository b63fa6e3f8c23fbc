//! Client proxy: the sandboxed side of the bridge.
//!
//! [`BridgeClient`] implements [`FileSystemProvider`] by sending each call
//! over the message channel under a fresh id and correlating the host's
//! responses back to the waiting caller.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use url::Url;

use crate::channel::{pair, ClientEndpoint};
use crate::error::{BridgeError, FsError, Result};
use crate::fs::{FileSystemProvider, WatchListener};
use crate::host::serve;
use crate::protocol::{
    ClientMessage, DeleteOptions, FsEntry, FsOperation, HostMessage, OperationId, OperationOutput,
    TransferOptions, WatchOptions, WriteOptions,
};

type Reply = oneshot::Sender<Result<OperationOutput>>;

enum PendingCall {
    Call {
        reply: Reply,
    },
    Watch {
        /// Taken once abort is sent; later batches are dropped.
        listener: Option<WatchListener>,
        reply: Reply,
    },
}

impl PendingCall {
    fn into_reply(self) -> Reply {
        match self {
            PendingCall::Call { reply } | PendingCall::Watch { reply, .. } => reply,
        }
    }
}

#[derive(Default)]
struct PendingCalls {
    calls: HashMap<OperationId, PendingCall>,
    closed: bool,
}

/// Handle to a host over a message channel. Cheap to clone.
///
/// Dropping every clone closes the channel, which the host treats as an
/// abort of everything still running.
#[derive(Clone)]
pub struct BridgeClient {
    tx: mpsc::Sender<ClientMessage>,
    pending: Arc<Mutex<PendingCalls>>,
    next_id: Arc<AtomicU64>,
}

impl BridgeClient {
    pub fn new(endpoint: ClientEndpoint) -> Self {
        let (tx, rx) = endpoint.into_parts();
        let pending = Arc::new(Mutex::new(PendingCalls::default()));
        tokio::spawn(route_responses(rx, pending.clone()));
        Self {
            tx,
            pending,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Start a host serving `provider` in this process and connect to it.
    pub fn in_process(
        provider: Arc<dyn FileSystemProvider>,
        capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let (client, host) = pair(capacity);
        let handle = serve(provider, host);
        (Self::new(client), handle)
    }

    /// Number of calls waiting for their terminal response.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().calls.len()
    }

    fn next_id(&self) -> OperationId {
        OperationId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    async fn call(
        &self,
        operation: FsOperation,
        listener: Option<WatchListener>,
        cancel: &CancellationToken,
    ) -> Result<OperationOutput> {
        if cancel.is_cancelled() {
            return Err(FsError::aborted().into());
        }

        let id = self.next_id();
        // Only these hand data back; a cancelled mutation reports what the
        // host actually did.
        let returns_data = matches!(
            operation,
            FsOperation::ReadFile { .. } | FsOperation::ReadDirectory { .. }
        );
        let (reply, mut outcome) = oneshot::channel();
        let call = match listener {
            Some(listener) => PendingCall::Watch {
                listener: Some(listener),
                reply,
            },
            None => PendingCall::Call { reply },
        };
        {
            let mut pending = self.pending.lock();
            if pending.closed {
                return Err(BridgeError::ChannelClosed);
            }
            pending.calls.insert(id, call);
        }
        let _guard = PendingGuard { client: self, id };

        trace!(%id, cmd = operation.name(), "sending command");
        if self
            .tx
            .send(ClientMessage::start(id, operation))
            .await
            .is_err()
        {
            return Err(BridgeError::ChannelClosed);
        }

        let mut abort_sent = false;
        let result = loop {
            tokio::select! {
                biased;
                reply = &mut outcome => break reply.unwrap_or(Err(BridgeError::ChannelClosed)),
                _ = cancel.cancelled(), if !abort_sent => {
                    abort_sent = true;
                    self.abort(id).await;
                }
            }
        };

        match result {
            // A cancelled read never hands back data, even if the host
            // finished before the abort reached it.
            Ok(_) if abort_sent && returns_data => Err(FsError::aborted().into()),
            other => other,
        }
    }

    async fn abort(&self, id: OperationId) {
        let still_pending = match self.pending.lock().calls.get_mut(&id) {
            Some(PendingCall::Watch { listener, .. }) => {
                listener.take();
                true
            }
            Some(PendingCall::Call { .. }) => true,
            None => false,
        };
        if still_pending {
            debug!(%id, "sending abort");
            let _ = self.tx.send(ClientMessage::abort(id)).await;
        }
    }
}

/// Aborts a call whose future is dropped before its terminal response.
struct PendingGuard<'a> {
    client: &'a BridgeClient,
    id: OperationId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        // Gone already when the terminal response arrived or the channel closed.
        if self.client.pending.lock().calls.remove(&self.id).is_none() {
            return;
        }
        debug!(id = %self.id, "call dropped, sending abort");
        match self.client.tx.try_send(ClientMessage::abort(self.id)) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(message)) => {
                if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                    let tx = self.client.tx.clone();
                    runtime.spawn(async move {
                        let _ = tx.send(message).await;
                    });
                }
            }
        }
    }
}

/// Route host messages to the pending call they belong to.
async fn route_responses(
    mut rx: mpsc::Receiver<HostMessage>,
    pending: Arc<Mutex<PendingCalls>>,
) {
    while let Some(message) = rx.recv().await {
        match message {
            HostMessage::Events { id, events } => {
                let pending = pending.lock();
                match pending.calls.get(&id) {
                    Some(PendingCall::Watch {
                        listener: Some(listener),
                        ..
                    }) => {
                        let _ = listener.send(events);
                    }
                    Some(PendingCall::Watch { listener: None, .. }) => {
                        trace!(%id, "dropping events after abort");
                    }
                    _ => debug!(%id, "events without a pending watch"),
                }
            }
            HostMessage::Result { id, err, data } => {
                let call = pending.lock().calls.remove(&id);
                let Some(call) = call else {
                    debug!(%id, "response without pending call");
                    continue;
                };
                let outcome = match err {
                    Some(err) => Err(BridgeError::Fs(err)),
                    None => Ok(data),
                };
                let _ = call.into_reply().send(outcome);
            }
        }
    }

    let drained: Vec<PendingCall> = {
        let mut pending = pending.lock();
        pending.closed = true;
        pending.calls.drain().map(|(_, call)| call).collect()
    };
    debug!(failed = drained.len(), "host channel closed");
    for call in drained {
        let _ = call.into_reply().send(Err(BridgeError::ChannelClosed));
    }
}

#[async_trait]
impl FileSystemProvider for BridgeClient {
    async fn watch(
        &self,
        url: &Url,
        options: &WatchOptions,
        listener: WatchListener,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let operation = FsOperation::Watch {
            url: url.clone(),
            options: options.clone(),
        };
        self.call(operation, Some(listener), cancel)
            .await?
            .into_unit()
    }

    async fn read_directory(&self, url: &Url, cancel: &CancellationToken) -> Result<Vec<FsEntry>> {
        let operation = FsOperation::ReadDirectory { url: url.clone() };
        self.call(operation, None, cancel).await?.into_entries()
    }

    async fn create_directory(&self, url: &Url, cancel: &CancellationToken) -> Result<()> {
        let operation = FsOperation::CreateDirectory { url: url.clone() };
        self.call(operation, None, cancel).await?.into_unit()
    }

    async fn read_file(&self, url: &Url, cancel: &CancellationToken) -> Result<Vec<u8>> {
        let operation = FsOperation::ReadFile { url: url.clone() };
        self.call(operation, None, cancel).await?.into_content()
    }

    async fn write_file(
        &self,
        url: &Url,
        content: &[u8],
        options: &WriteOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let operation = FsOperation::WriteFile {
            url: url.clone(),
            content: content.to_vec(),
            options: *options,
        };
        self.call(operation, None, cancel).await?.into_unit()
    }

    async fn delete(
        &self,
        url: &Url,
        options: &DeleteOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let operation = FsOperation::Delete {
            url: url.clone(),
            options: *options,
        };
        self.call(operation, None, cancel).await?.into_unit()
    }

    async fn rename(
        &self,
        old_url: &Url,
        new_url: &Url,
        options: &TransferOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let operation = FsOperation::Rename {
            old_url: old_url.clone(),
            new_url: new_url.clone(),
            options: *options,
        };
        self.call(operation, None, cancel).await?.into_unit()
    }

    async fn copy(
        &self,
        source: &Url,
        destination: &Url,
        options: &TransferOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let operation = FsOperation::Copy {
            source: source.clone(),
            destination: destination.clone(),
            options: *options,
        };
        self.call(operation, None, cancel).await?.into_unit()
    }
}
