//! In-memory store
//!
//! All tables sit behind one mutex, so every trait call is one
//! transaction. Composite writes validate every row before touching any
//! table.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::models::{
    pair_key, Group, GroupMember, GroupMessage, GroupRole, PrivateChat, PrivateMessage, User,
};
use crate::store::{Store, StoreError, StoreResult};
use crate::types::{ChatId, GroupId, UserId};

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    emails: HashMap<String, UserId>,
    chats: HashMap<ChatId, PrivateChat>,
    chat_pairs: HashMap<(UserId, UserId), ChatId>,
    private_messages: Vec<PrivateMessage>,
    groups: HashMap<GroupId, Group>,
    memberships: HashMap<(GroupId, UserId), GroupMember>,
    group_messages: Vec<GroupMessage>,
}

impl Tables {
    fn require_user(&self, id: UserId) -> StoreResult<()> {
        if self.users.contains_key(&id) {
            Ok(())
        } else {
            Err(StoreError::ForeignKey(format!("user {} does not exist", id)))
        }
    }

    fn require_group(&self, id: GroupId) -> StoreResult<()> {
        if self.groups.contains_key(&id) {
            Ok(())
        } else {
            Err(StoreError::ForeignKey(format!("group {} does not exist", id)))
        }
    }

    fn check_private_message(&self, message: &PrivateMessage, chat: &PrivateChat) -> StoreResult<()> {
        if message.chat_id != chat.id {
            return Err(StoreError::ForeignKey(format!(
                "chat {} does not exist",
                message.chat_id
            )));
        }
        if !chat.contains(message.sender_id) {
            return Err(StoreError::ForeignKey(format!(
                "sender {} is not a member of chat {}",
                message.sender_id, chat.id
            )));
        }
        self.require_user(message.sender_id)
    }
}

/// Thread-safe in-memory implementation of [`Store`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All private chats, in no particular order
    pub fn private_chats(&self) -> Vec<PrivateChat> {
        self.tables.lock().chats.values().cloned().collect()
    }

    /// Messages of one private chat in insertion order
    pub fn private_messages(&self, chat: ChatId) -> Vec<PrivateMessage> {
        self.tables
            .lock()
            .private_messages
            .iter()
            .filter(|m| m.chat_id == chat)
            .cloned()
            .collect()
    }

    /// Messages of one group in insertion order
    pub fn group_messages(&self, group: GroupId) -> Vec<GroupMessage> {
        self.tables
            .lock()
            .group_messages
            .iter()
            .filter(|m| m.group_id == group)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, mut user: User) -> StoreResult<()> {
        user.email = user.email.trim().to_lowercase();

        let mut tables = self.tables.lock();
        if tables.emails.contains_key(&user.email) {
            return Err(StoreError::Conflict(format!("email {} is taken", user.email)));
        }
        if tables.users.contains_key(&user.id) {
            return Err(StoreError::Conflict(format!("user {} exists", user.id)));
        }
        tables.emails.insert(user.email.clone(), user.id);
        tables.users.insert(user.id, user);
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.lock();
        Ok(tables
            .emails
            .get(&email.trim().to_lowercase())
            .and_then(|id| tables.users.get(id))
            .cloned())
    }

    async fn user_exists(&self, id: UserId) -> StoreResult<bool> {
        Ok(self.tables.lock().users.contains_key(&id))
    }

    async fn find_private_chat(&self, a: UserId, b: UserId) -> StoreResult<Option<PrivateChat>> {
        let tables = self.tables.lock();
        Ok(tables
            .chat_pairs
            .get(&pair_key(a, b))
            .and_then(|id| tables.chats.get(id))
            .cloned())
    }

    async fn create_private_chat(
        &self,
        chat: PrivateChat,
        first_message: PrivateMessage,
    ) -> StoreResult<()> {
        let mut tables = self.tables.lock();

        let key = chat.pair_key();
        if tables.chat_pairs.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "private chat between {} and {} exists",
                key.0, key.1
            )));
        }
        tables.require_user(chat.first_member)?;
        tables.require_user(chat.second_member)?;
        tables.check_private_message(&first_message, &chat)?;

        tables.chat_pairs.insert(key, chat.id);
        tables.chats.insert(chat.id, chat);
        tables.private_messages.push(first_message);
        Ok(())
    }

    async fn create_private_message(&self, message: PrivateMessage) -> StoreResult<()> {
        let mut tables = self.tables.lock();
        let chat = tables.chats.get(&message.chat_id).cloned().ok_or_else(|| {
            StoreError::ForeignKey(format!("chat {} does not exist", message.chat_id))
        })?;
        tables.check_private_message(&message, &chat)?;
        tables.private_messages.push(message);
        Ok(())
    }

    async fn find_group(&self, id: GroupId) -> StoreResult<Option<Group>> {
        Ok(self.tables.lock().groups.get(&id).cloned())
    }

    async fn create_group(&self, group: Group, members: Vec<GroupMember>) -> StoreResult<()> {
        let mut tables = self.tables.lock();

        if tables.groups.contains_key(&group.id) {
            return Err(StoreError::Conflict(format!("group {} exists", group.id)));
        }
        tables.require_user(group.creator_id)?;

        let mut seen = HashSet::new();
        for member in &members {
            if member.group_id != group.id {
                return Err(StoreError::ForeignKey(format!(
                    "group {} does not exist",
                    member.group_id
                )));
            }
            tables.require_user(member.user_id)?;
            if !seen.insert(member.user_id) {
                return Err(StoreError::Conflict(format!(
                    "duplicate membership for user {}",
                    member.user_id
                )));
            }
        }

        for member in members {
            tables
                .memberships
                .insert((member.group_id, member.user_id), member);
        }
        tables.groups.insert(group.id, group);
        Ok(())
    }

    async fn create_group_message(&self, message: GroupMessage) -> StoreResult<()> {
        let mut tables = self.tables.lock();
        tables.require_group(message.group_id)?;
        tables.require_user(message.sender_id)?;
        tables.group_messages.push(message);
        Ok(())
    }

    async fn group_members(&self, group: GroupId) -> StoreResult<Vec<GroupMember>> {
        Ok(self
            .tables
            .lock()
            .memberships
            .values()
            .filter(|m| m.group_id == group)
            .copied()
            .collect())
    }

    async fn group_member_role(
        &self,
        group: GroupId,
        user: UserId,
    ) -> StoreResult<Option<GroupRole>> {
        Ok(self
            .tables
            .lock()
            .memberships
            .get(&(group, user))
            .map(|m| m.role))
    }

    async fn create_membership(&self, member: GroupMember) -> StoreResult<()> {
        let mut tables = self.tables.lock();
        tables.require_group(member.group_id)?;
        tables.require_user(member.user_id)?;

        let key = (member.group_id, member.user_id);
        if tables.memberships.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "user {} is already in group {}",
                member.user_id, member.group_id
            )));
        }
        tables.memberships.insert(key, member);
        Ok(())
    }

    async fn delete_membership(&self, group: GroupId, user: UserId) -> StoreResult<bool> {
        Ok(self
            .tables
            .lock()
            .memberships
            .remove(&(group, user))
            .is_some())
    }
}
