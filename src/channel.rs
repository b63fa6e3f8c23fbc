//! Message channel between the client proxy and the host.
//!
//! An [`Endpoint`] is a bounded sender/receiver pair. [`pair`] connects a
//! client and a host inside one process; [`json_lines`] frames messages as one
//! JSON object per line over any async byte stream (stdio, pipes, sockets).
//! Either side observes teardown as its receiver yielding `None`.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::protocol::{ClientMessage, HostMessage};

/// One side of a message channel.
#[derive(Debug)]
pub struct Endpoint<Out, In> {
    pub tx: mpsc::Sender<Out>,
    pub rx: mpsc::Receiver<In>,
}

/// The client's view: sends commands, receives responses and events.
pub type ClientEndpoint = Endpoint<ClientMessage, HostMessage>;

/// The host's view: sends responses and events, receives commands.
pub type HostEndpoint = Endpoint<HostMessage, ClientMessage>;

impl<Out, In> Endpoint<Out, In> {
    pub fn into_parts(self) -> (mpsc::Sender<Out>, mpsc::Receiver<In>) {
        (self.tx, self.rx)
    }
}

/// Connect a client and a host in-process.
pub fn pair(capacity: usize) -> (ClientEndpoint, HostEndpoint) {
    let (to_host, from_client) = mpsc::channel(capacity);
    let (to_client, from_host) = mpsc::channel(capacity);
    (
        Endpoint {
            tx: to_host,
            rx: from_host,
        },
        Endpoint {
            tx: to_client,
            rx: from_client,
        },
    )
}

/// Serve an endpoint over a byte stream, one JSON object per line.
///
/// Spawns a writer task and a reader task. Lines that fail to decode are
/// logged and skipped. The reader ends on EOF or a read error, which closes
/// the returned receiver; the writer ends once every sender is dropped.
pub fn json_lines<Out, In, R, W>(reader: R, writer: W, capacity: usize) -> Endpoint<Out, In>
where
    Out: Serialize + Send + 'static,
    In: DeserializeOwned + Send + 'static,
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (out_tx, mut out_rx) = mpsc::channel::<Out>(capacity);
    let (in_tx, in_rx) = mpsc::channel::<In>(capacity);

    tokio::spawn(async move {
        let mut writer = writer;
        while let Some(message) = out_rx.recv().await {
            let mut line = match serde_json::to_string(&message) {
                Ok(line) => line,
                Err(err) => {
                    warn!(error = %err, "failed to encode outbound message");
                    continue;
                }
            };
            line.push('\n');
            if let Err(err) = writer.write_all(line.as_bytes()).await {
                debug!(error = %err, "transport write failed");
                break;
            }
            if let Err(err) = writer.flush().await {
                debug!(error = %err, "transport flush failed");
                break;
            }
        }
        let _ = writer.shutdown().await;
        debug!("transport writer finished");
    });

    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<In>(trimmed) {
                        Ok(message) => {
                            if in_tx.send(message).await.is_err() {
                                break;
                            }
                        }
                        Err(err) => warn!(error = %err, line = %trimmed, "undecodable frame"),
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    debug!(error = %err, "transport read failed");
                    break;
                }
            }
        }
        debug!("transport reader finished");
    });

    Endpoint {
        tx: out_tx,
        rx: in_rx,
    }
}
