//! Shared unit-test helpers

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::Message;
use futures_util::{Sink, Stream};
use tokio::sync::mpsc;

use crate::connection::LiveConnection;
use crate::memory::MemoryStore;
use crate::message::Envelope;
use crate::models::{
    Group, GroupMember, GroupMessage, GroupRole, PrivateChat, PrivateMessage, User,
};
use crate::registry::ConnectionRegistry;
use crate::store::{Store, StoreError, StoreResult};
use crate::types::{GroupId, UserId};

/// Insert a user named `name` and return its id
pub async fn seed_user(store: &dyn Store, name: &str) -> UserId {
    let id = UserId::new();
    store
        .create_user(User {
            id,
            name: name.to_string(),
            email: format!("{}-{}@example.com", name, id),
            password_hash: String::new(),
        })
        .await
        .unwrap();
    id
}

/// Register a channel-backed connection and return its receiving end
pub fn go_online(registry: &ConnectionRegistry, user: UserId) -> mpsc::Receiver<Envelope> {
    let (tx, rx) = mpsc::channel(16);
    registry.put(user, std::sync::Arc::new(LiveConnection::new(user, tx)));
    rx
}

/// MemoryStore with switchable failures
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    fail_private_chats: AtomicBool,
    fail_group_members: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_private_chats(&self) {
        self.fail_private_chats.store(true, Ordering::SeqCst);
    }

    pub fn fail_group_members(&self) {
        self.fail_group_members.store(true, Ordering::SeqCst);
    }

    fn unavailable() -> StoreError {
        StoreError::Unavailable("injected failure".to_string())
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn create_user(&self, user: User) -> StoreResult<()> {
        self.inner.create_user(user).await
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.inner.find_user_by_email(email).await
    }

    async fn user_exists(&self, id: UserId) -> StoreResult<bool> {
        self.inner.user_exists(id).await
    }

    async fn find_private_chat(&self, a: UserId, b: UserId) -> StoreResult<Option<PrivateChat>> {
        self.inner.find_private_chat(a, b).await
    }

    async fn create_private_chat(
        &self,
        chat: PrivateChat,
        first_message: PrivateMessage,
    ) -> StoreResult<()> {
        if self.fail_private_chats.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.inner.create_private_chat(chat, first_message).await
    }

    async fn create_private_message(&self, message: PrivateMessage) -> StoreResult<()> {
        self.inner.create_private_message(message).await
    }

    async fn find_group(&self, id: GroupId) -> StoreResult<Option<Group>> {
        self.inner.find_group(id).await
    }

    async fn create_group(&self, group: Group, members: Vec<GroupMember>) -> StoreResult<()> {
        self.inner.create_group(group, members).await
    }

    async fn create_group_message(&self, message: GroupMessage) -> StoreResult<()> {
        self.inner.create_group_message(message).await
    }

    async fn group_members(&self, group: GroupId) -> StoreResult<Vec<GroupMember>> {
        if self.fail_group_members.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.inner.group_members(group).await
    }

    async fn group_member_role(
        &self,
        group: GroupId,
        user: UserId,
    ) -> StoreResult<Option<GroupRole>> {
        self.inner.group_member_role(group, user).await
    }

    async fn create_membership(&self, member: GroupMember) -> StoreResult<()> {
        self.inner.create_membership(member).await
    }

    async fn delete_membership(&self, group: GroupId, user: UserId) -> StoreResult<bool> {
        self.inner.delete_membership(group, user).await
    }
}

/// In-memory socket: never yields inbound frames, records outbound ones
pub struct TestSocket {
    outbound: mpsc::UnboundedSender<Message>,
    closed: Arc<AtomicBool>,
}

/// Observer side of a [`TestSocket`]
pub struct SocketWatch {
    pub outbound: mpsc::UnboundedReceiver<Message>,
    closed: Arc<AtomicBool>,
}

impl TestSocket {
    pub fn new() -> (Self, SocketWatch) {
        let (tx, rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        (
            Self {
                outbound: tx,
                closed: closed.clone(),
            },
            SocketWatch {
                outbound: rx,
                closed,
            },
        )
    }
}

impl SocketWatch {
    /// Wait until the writer closed the socket
    pub async fn wait_closed(&self) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !self.closed.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("socket was not closed");
    }
}

impl Stream for TestSocket {
    type Item = Result<Message, axum::Error>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Pending
    }
}

impl Sink<Message> for TestSocket {
    type Error = axum::Error;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), Self::Error> {
        let _ = self.outbound.send(item);
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.closed.store(true, Ordering::SeqCst);
        Poll::Ready(Ok(()))
    }
}
