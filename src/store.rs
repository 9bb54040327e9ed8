//! Storage collaborator interface
//!
//! The routing core only talks to storage through [`Store`]. Composite
//! writes (`create_private_chat`, `create_group`) are single calls so the
//! implementation can make them atomic.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{
    Group, GroupMember, GroupMessage, GroupRole, PrivateChat, PrivateMessage, User,
};
use crate::types::{GroupId, UserId};

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Unique constraint violated
    #[error("conflict: {0}")]
    Conflict(String),

    /// Referenced row does not exist
    #[error("foreign key violation: {0}")]
    ForeignKey(String),

    /// Backend failure
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence operations used by the chat core
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a user; `Conflict` if the email is taken
    async fn create_user(&self, user: User) -> StoreResult<()>;

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn user_exists(&self, id: UserId) -> StoreResult<bool>;

    /// Find the relation of an unordered pair; `(a, b)` and `(b, a)` are equal
    async fn find_private_chat(&self, a: UserId, b: UserId) -> StoreResult<Option<PrivateChat>>;

    /// Insert a relation together with its first message, all or nothing.
    ///
    /// `Conflict` if the pair already has a relation.
    async fn create_private_chat(
        &self,
        chat: PrivateChat,
        first_message: PrivateMessage,
    ) -> StoreResult<()>;

    async fn create_private_message(&self, message: PrivateMessage) -> StoreResult<()>;

    async fn find_group(&self, id: GroupId) -> StoreResult<Option<Group>>;

    /// Insert a group together with its initial memberships, all or nothing
    async fn create_group(&self, group: Group, members: Vec<GroupMember>) -> StoreResult<()>;

    async fn create_group_message(&self, message: GroupMessage) -> StoreResult<()>;

    async fn group_members(&self, group: GroupId) -> StoreResult<Vec<GroupMember>>;

    async fn group_member_role(&self, group: GroupId, user: UserId)
        -> StoreResult<Option<GroupRole>>;

    /// Insert one membership; `Conflict` if the user is already a member
    async fn create_membership(&self, member: GroupMember) -> StoreResult<()>;

    /// Delete a membership. Returns whether a row was removed.
    async fn delete_membership(&self, group: GroupId, user: UserId) -> StoreResult<bool>;
}
