//! Per-connection session handling
//!
//! Binds an upgraded WebSocket to a user, reads frames strictly in
//! arrival order and runs every decoded command on its own task so a slow
//! handler never stalls the read loop.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::Message;
use futures_util::{Sink, Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::connection::{Inbound, LiveConnection, DEFAULT_OUTBOUND_BUFFER};
use crate::delivery::Notifier;
use crate::error::AppError;
use crate::group::GroupBroadcaster;
use crate::membership::MembershipCoordinator;
use crate::message::{self, Command, Envelope, SessionContext};
use crate::private_chat::PrivateChatResolver;
use crate::registry::ConnectionRegistry;
use crate::store::Store;
use crate::types::UserId;

/// Pending transport upgrade
///
/// Only performed when the user has no live connection yet.
#[async_trait]
pub trait Handshake: Send + Sized {
    type Socket: Stream<Item = Result<Message, axum::Error>>
        + Sink<Message, Error = axum::Error>
        + Send
        + 'static;

    /// Complete the WebSocket handshake
    async fn upgrade(self) -> Result<Self::Socket, AppError>;

    /// Drop the transport because an existing connection is reused
    async fn decline(self) {}
}

/// Freshly opened connection together with its read half
pub struct Session {
    conn: Arc<LiveConnection>,
    inbound: Inbound,
}

impl Session {
    pub fn connection(&self) -> &Arc<LiveConnection> {
        &self.conn
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("conn", &self.conn).finish_non_exhaustive()
    }
}

/// Outcome of [`ChatRouter::connect`]
#[derive(Debug)]
pub enum Attached {
    /// New connection; the caller must drive it with `run_session`
    Opened(Session),
    /// The user was already connected
    Reused(Arc<LiveConnection>),
}

impl Attached {
    pub fn connection(&self) -> &Arc<LiveConnection> {
        match self {
            Attached::Opened(session) => &session.conn,
            Attached::Reused(conn) => conn,
        }
    }
}

/// Releases the connection when the session scope ends, on every path
struct SessionGuard {
    registry: Arc<ConnectionRegistry>,
    user: UserId,
    conn: Arc<LiveConnection>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.release(self.user, &self.conn);
        info!(user = %self.user, conn_id = self.conn.id(), "session ended");
    }
}

/// Routes frames from live connections to the chat handlers
#[derive(Clone)]
pub struct ChatRouter {
    registry: Arc<ConnectionRegistry>,
    notifier: Notifier,
    private_chats: PrivateChatResolver,
    groups: GroupBroadcaster,
    memberships: MembershipCoordinator,
    outbound_buffer: usize,
}

impl ChatRouter {
    pub fn new(store: Arc<dyn Store>, registry: Arc<ConnectionRegistry>) -> Self {
        let notifier = Notifier::new(registry.clone());
        Self {
            private_chats: PrivateChatResolver::new(store.clone()),
            groups: GroupBroadcaster::new(store.clone(), notifier.clone()),
            memberships: MembershipCoordinator::new(store, notifier.clone()),
            registry,
            notifier,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
        }
    }

    /// Set the per-connection outbound queue size
    pub fn with_outbound_buffer(mut self, outbound_buffer: usize) -> Self {
        self.outbound_buffer = outbound_buffer;
        self
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Return `user`'s live connection, upgrading `handshake` only if
    /// there is none.
    pub async fn connect<H: Handshake>(
        &self,
        user: UserId,
        handshake: H,
    ) -> Result<Attached, AppError> {
        if let Some(existing) = self.registry.get(user).filter(|c| !c.is_closed()) {
            debug!(%user, conn_id = existing.id(), "user already connected");
            handshake.decline().await;
            return Ok(Attached::Reused(existing));
        }

        let socket = handshake.upgrade().await.map_err(|e| {
            warn!(%user, error = %e, "handshake failed");
            match e {
                AppError::HandshakeFailed(_) => e,
                other => AppError::HandshakeFailed(other.to_string()),
            }
        })?;

        let (conn, inbound) = LiveConnection::open(user, socket, self.outbound_buffer);
        let registered = self.registry.put(user, conn.clone());
        if !Arc::ptr_eq(&registered, &conn) {
            // Lost a race against a concurrent connect for the same user
            conn.close();
            return Ok(Attached::Reused(registered));
        }

        info!(%user, conn_id = conn.id(), "client connected");
        Ok(Attached::Opened(Session { conn, inbound }))
    }

    /// Read and dispatch frames until the peer goes away, a read fails or
    /// the connection is closed. Always releases the connection on return.
    pub async fn run_session(&self, session: Session, context: SessionContext) {
        let Session { conn, mut inbound } = session;
        let user = conn.user();
        let _guard = SessionGuard {
            registry: self.registry.clone(),
            user,
            conn: conn.clone(),
        };

        loop {
            let next = tokio::select! {
                _ = conn.closed() => {
                    debug!(%user, "connection closed, ending session");
                    break;
                }
                next = inbound.next() => next,
            };

            let frame = match next {
                None => {
                    debug!(%user, "stream ended");
                    break;
                }
                Some(Ok(frame)) => frame,
                Some(Err(e)) if is_disconnect(&e) => {
                    debug!(%user, error = %e, "peer went away");
                    break;
                }
                Some(Err(e)) => {
                    // The transport yields nothing after an error
                    warn!(%user, error = %e, "failed to read frame, ending session");
                    reply(&conn, AppError::Read(e.to_string())).await;
                    break;
                }
            };

            let payload = match frame {
                Message::Close(close_frame) => {
                    debug!(%user, ?close_frame, "client sent close frame");
                    break;
                }
                Message::Ping(_) | Message::Pong(_) => continue,
                data @ (Message::Text(_) | Message::Binary(_)) => data.into_data(),
            };

            match message::decode(&payload, &context) {
                Ok(command) => self.dispatch(user, conn.clone(), command),
                Err(e) => {
                    warn!(%user, error = %e, "failed to parse message");
                    reply(&conn, e).await;
                }
            }
        }
    }

    /// Run `command` on its own task; errors go back to the sender
    fn dispatch(&self, user: UserId, conn: Arc<LiveConnection>, command: Command) {
        let router = self.clone();
        tokio::spawn(async move {
            if let Err(e) = router.execute(user, command).await {
                warn!(%user, error = %e, "command failed");
                reply(&conn, e).await;
            }
        });
    }

    /// Execute one command on behalf of `user`
    pub async fn execute(&self, user: UserId, command: Command) -> Result<(), AppError> {
        match command {
            Command::PrivateMessage {
                receiver,
                kind,
                content,
            } => {
                let receiver = self
                    .private_chats
                    .send_private_message(user, receiver, kind, content.clone())
                    .await?;
                self.notifier.deliver(receiver, Envelope::ok(content)).await;
            }
            Command::GroupMessage {
                group,
                kind,
                content,
            } => {
                self.groups
                    .send_group_message(user, group, kind, content)
                    .await?;
            }
            Command::CreateGroup {
                name,
                description,
                members,
            } => {
                self.groups
                    .create_group(user, name, description, members)
                    .await?;
            }
            Command::MembershipChange {
                group,
                member,
                action,
            } => {
                self.memberships
                    .handle_membership(group, user, member, action)
                    .await?;
            }
        }
        Ok(())
    }
}

/// Best-effort error envelope to the acting connection
async fn reply(conn: &LiveConnection, err: AppError) {
    if let Err(e) = conn.send(Envelope::from(&err)).await {
        debug!(user = %conn.user(), error = %e, "could not report error");
    }
}

/// Transport failures caused by the peer vanishing; these end a session
/// silently
fn is_disconnect(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut source = Some(err);
    while let Some(e) = source {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            return matches!(
                io.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
            );
        }
        source = e.source();
    }
    false
}
