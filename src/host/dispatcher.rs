//! Host actor: decodes client messages and runs commands against a provider.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, error, info, trace, warn, Instrument};
use url::Url;

use super::registry::OperationRegistry;
use crate::channel::HostEndpoint;
use crate::error::Result;
use crate::fs::FileSystemProvider;
use crate::protocol::{
    ClientMessage, FsOperation, HostMessage, OperationId, OperationOutput, WatchOptions,
};

/// Serves one client over one message channel.
///
/// Every command runs in its own task so a long operation never blocks the
/// inbound queue. When the channel closes, all running operations are
/// cancelled and awaited before [`Host::run`] returns.
pub struct Host {
    provider: Arc<dyn FileSystemProvider>,
    registry: Arc<OperationRegistry>,
    tx: mpsc::Sender<HostMessage>,
    rx: mpsc::Receiver<ClientMessage>,
    tasks: JoinSet<()>,
}

impl Host {
    pub fn new(provider: Arc<dyn FileSystemProvider>, endpoint: HostEndpoint) -> Self {
        let (tx, rx) = endpoint.into_parts();
        Self {
            provider,
            registry: Arc::new(OperationRegistry::new()),
            tx,
            rx,
            tasks: JoinSet::new(),
        }
    }

    pub fn registry(&self) -> Arc<OperationRegistry> {
        self.registry.clone()
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                message = self.rx.recv() => {
                    let Some(message) = message else { break; };
                    self.handle_message(message);
                }
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    if let Err(err) = joined {
                        error!(error = %err, "operation task failed");
                    }
                }
            }
        }

        let aborted = self.registry.cancel_all();
        info!(aborted, "message channel closed, stopping host");
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(err) = joined {
                error!(error = %err, "operation task failed during shutdown");
            }
        }
    }

    fn handle_message(&mut self, message: ClientMessage) {
        match message {
            ClientMessage::Start { id, operation } => self.dispatch(id, operation),
            ClientMessage::Abort { id, abort: true } => {
                let known = self.registry.cancel(id);
                debug!(%id, known, "abort requested");
            }
            ClientMessage::Abort { id, abort: false } => {
                trace!(%id, "abort message with abort=false ignored");
            }
        }
    }

    fn dispatch(&mut self, id: OperationId, operation: FsOperation) {
        let cancel = match self.registry.register(id) {
            Ok(cancel) => cancel,
            Err(err) => {
                warn!(%id, cmd = operation.name(), error = %err, "ignoring command");
                return;
            }
        };
        let span = debug_span!("operation", %id, cmd = operation.name());
        let context = OperationContext {
            id,
            provider: self.provider.clone(),
            registry: self.registry.clone(),
            tx: self.tx.clone(),
            cancel,
        };
        self.tasks.spawn(context.execute(operation).instrument(span));
    }
}

/// Everything one running command needs.
struct OperationContext {
    id: OperationId,
    provider: Arc<dyn FileSystemProvider>,
    registry: Arc<OperationRegistry>,
    tx: mpsc::Sender<HostMessage>,
    cancel: CancellationToken,
}

impl OperationContext {
    async fn execute(self, operation: FsOperation) {
        debug!("operation started");
        let outcome = self.run(operation).await;
        match &outcome {
            Ok(_) => debug!("operation finished"),
            Err(err) if err.is_aborted() => debug!("operation aborted"),
            Err(err) => debug!(error = %err, "operation failed"),
        }

        self.registry.complete(self.id);
        if self
            .tx
            .send(HostMessage::terminal(self.id, &outcome))
            .await
            .is_err()
        {
            trace!("channel closed before terminal response");
        }
    }

    async fn run(&self, operation: FsOperation) -> Result<OperationOutput> {
        let provider = self.provider.as_ref();
        let cancel = &self.cancel;
        match operation {
            FsOperation::Watch { url, options } => {
                self.watch(&url, &options).await?;
                Ok(OperationOutput::None)
            }
            FsOperation::WatchStop { watch_id } => {
                let stopped = self.registry.cancel(watch_id);
                debug!(%watch_id, stopped, "watch stop requested");
                Ok(OperationOutput::None)
            }
            FsOperation::ReadDirectory { url } => provider
                .read_directory(&url, cancel)
                .await
                .map(OperationOutput::Entries),
            FsOperation::CreateDirectory { url } => {
                provider.create_directory(&url, cancel).await?;
                Ok(OperationOutput::None)
            }
            FsOperation::ReadFile { url } => provider
                .read_file(&url, cancel)
                .await
                .map(OperationOutput::Content),
            FsOperation::WriteFile {
                url,
                content,
                options,
            } => {
                provider.write_file(&url, &content, &options, cancel).await?;
                Ok(OperationOutput::None)
            }
            FsOperation::Delete { url, options } => {
                provider.delete(&url, &options, cancel).await?;
                Ok(OperationOutput::None)
            }
            FsOperation::Rename {
                old_url,
                new_url,
                options,
            } => {
                provider.rename(&old_url, &new_url, &options, cancel).await?;
                Ok(OperationOutput::None)
            }
            FsOperation::Copy {
                source,
                destination,
                options,
            } => {
                provider.copy(&source, &destination, &options, cancel).await?;
                Ok(OperationOutput::None)
            }
        }
    }

    /// Run the provider's watch, forwarding every event batch under this id.
    ///
    /// Returns only after the session ended and all its batches were sent.
    async fn watch(&self, url: &Url, options: &WatchOptions) -> Result<()> {
        let (listener, mut batches) = mpsc::unbounded_channel();
        let forward = async {
            while let Some(events) = batches.recv().await {
                if self
                    .tx
                    .send(HostMessage::events(self.id, events))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        };
        let (outcome, ()) = tokio::join!(
            self.provider.watch(url, options, listener, &self.cancel),
            forward
        );
        outcome
    }
}

/// Serve `provider` over `endpoint` on a background task.
pub fn serve(provider: Arc<dyn FileSystemProvider>, endpoint: HostEndpoint) -> JoinHandle<()> {
    Host::new(provider, endpoint).spawn()
}
