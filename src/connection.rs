//! Live connection definition
//!
//! A `LiveConnection` is the server-side handle of one user's WebSocket.
//! Outbound envelopes go through a bounded channel to a dedicated writer
//! task; the read half is handed back to the router as [`Inbound`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::Message;
use futures_util::stream::BoxStream;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, error, warn};

use crate::error::SendError;
use crate::message::Envelope;
use crate::types::UserId;

/// Read half of a live connection
pub type Inbound = BoxStream<'static, Result<Message, axum::Error>>;

/// Default capacity of the per-connection outbound queue
pub const DEFAULT_OUTBOUND_BUFFER: usize = 32;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Connected user's stream handle
///
/// Cheap to share behind an `Arc`; the registry and every task that
/// delivers to this user hold clones.
#[derive(Debug)]
pub struct LiveConnection {
    /// Process-unique connection number
    id: u64,
    /// User this stream is bound to
    user: UserId,
    /// Server → client envelope channel
    sender: mpsc::Sender<Envelope>,
    /// Cancelled once the connection is closed
    closed: CancellationToken,
}

impl LiveConnection {
    /// Create a connection handle writing into `sender`
    pub fn new(user: UserId, sender: mpsc::Sender<Envelope>) -> Self {
        Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            user,
            sender,
            closed: CancellationToken::new(),
        }
    }

    /// Bind an upgraded socket to `user`.
    ///
    /// Spawns the writer task and returns the read half to the caller.
    /// Envelopes queued before a close are still written, then the socket
    /// is closed.
    pub fn open<S>(user: UserId, socket: S, buffer: usize) -> (Arc<Self>, Inbound)
    where
        S: Stream<Item = Result<Message, axum::Error>>
            + Sink<Message, Error = axum::Error>
            + Send
            + 'static,
    {
        let (mut ws_sender, ws_receiver) = socket.split();
        let (msg_tx, mut msg_rx) = mpsc::channel::<Envelope>(buffer.max(1));
        let conn = Arc::new(Self::new(user, msg_tx));

        let closed = conn.closed.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = closed.cancelled() => {
                        while let Ok(envelope) = msg_rx.try_recv() {
                            if write_envelope(&mut ws_sender, user, envelope).await.is_err() {
                                break;
                            }
                        }
                        break;
                    }
                    next = msg_rx.recv() => match next {
                        Some(envelope) => {
                            if let Err(e) = write_envelope(&mut ws_sender, user, envelope).await {
                                debug!(%user, error = %e, "WebSocket send failed, ending write task");
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }

            // A dead writer means a dead connection
            closed.cancel();

            if let Err(e) = ws_sender.close().await {
                warn!(%user, error = %e, "failed to close connection");
            }
            debug!(%user, "write task ended");
        });

        (conn, ws_receiver.boxed())
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn user(&self) -> UserId {
        self.user
    }

    /// Queue an envelope for this connection
    ///
    /// Waits while the outbound queue is full. Returns an error once the
    /// connection has been closed.
    pub async fn send(&self, envelope: Envelope) -> Result<(), SendError> {
        if self.is_closed() {
            return Err(SendError::ConnectionClosed);
        }
        self.sender
            .send(envelope)
            .await
            .map_err(|_| SendError::ConnectionClosed)
    }

    /// Close the connection. Idempotent, never blocks.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the connection is closed
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closed.cancelled()
    }
}

/// Encode and write one envelope. Encoding failures are logged and skipped.
async fn write_envelope<W>(
    ws_sender: &mut W,
    user: UserId,
    envelope: Envelope,
) -> Result<(), axum::Error>
where
    W: Sink<Message, Error = axum::Error> + Unpin,
{
    match envelope.encode() {
        Ok(json) => ws_sender.send(Message::Text(json.into())).await,
        Err(e) => {
            error!(%user, error = %e, "failed to serialize envelope");
            Ok(())
        }
    }
}
