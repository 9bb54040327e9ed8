//! Persisted entities
//!
//! Plain data handed to and returned from the [`Store`](crate::store::Store).

use serde::{Deserialize, Serialize};

use crate::message::MessageKind;
use crate::types::{ChatId, GroupId, MessageId, UserId};

/// Registered account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub name: String,
    /// Unique, stored lowercase
    pub email: String,
    /// `salt$digest`, see [`accounts`](crate::accounts)
    pub password_hash: String,
}

/// Private conversation between two users
///
/// Member order records who wrote first; lookups ignore it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateChat {
    pub id: ChatId,
    pub first_member: UserId,
    pub second_member: UserId,
}

impl PrivateChat {
    /// Create a new relation opened by `first`
    pub fn between(first: UserId, second: UserId) -> Self {
        Self {
            id: ChatId::new(),
            first_member: first,
            second_member: second,
        }
    }

    /// Order-independent key of the member pair
    pub fn pair_key(&self) -> (UserId, UserId) {
        pair_key(self.first_member, self.second_member)
    }

    /// Check if a user is one of the two members
    pub fn contains(&self, user: UserId) -> bool {
        self.first_member == user || self.second_member == user
    }
}

/// Order-independent key for an unordered user pair
pub fn pair_key(a: UserId, b: UserId) -> (UserId, UserId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Message in a private chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateMessage {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub kind: MessageKind,
    pub content: String,
}

impl PrivateMessage {
    pub fn new(chat_id: ChatId, sender_id: UserId, kind: MessageKind, content: String) -> Self {
        Self {
            id: MessageId::new(),
            chat_id,
            sender_id,
            kind,
            content,
        }
    }
}

/// Group conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub description: Option<String>,
    pub creator_id: UserId,
}

/// Message posted to a group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMessage {
    pub id: MessageId,
    pub group_id: GroupId,
    pub sender_id: UserId,
    pub kind: MessageKind,
    pub content: String,
}

impl GroupMessage {
    pub fn new(group_id: GroupId, sender_id: UserId, kind: MessageKind, content: String) -> Self {
        Self {
            id: MessageId::new(),
            group_id,
            sender_id,
            kind,
            content,
        }
    }
}

/// Role of a user inside a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupRole {
    Admin,
    Member,
}

/// Membership row, unique per (user, group)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupMember {
    pub user_id: UserId,
    pub group_id: GroupId,
    pub role: GroupRole,
}

impl GroupMember {
    pub fn admin(group_id: GroupId, user_id: UserId) -> Self {
        Self {
            user_id,
            group_id,
            role: GroupRole::Admin,
        }
    }

    pub fn member(group_id: GroupId, user_id: UserId) -> Self {
        Self {
            user_id,
            group_id,
            role: GroupRole::Member,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_key_is_symmetric() {
        let a = UserId::new();
        let b = UserId::new();
        assert_eq!(pair_key(a, b), pair_key(b, a));
    }

    #[test]
    fn test_private_chat_contains() {
        let a = UserId::new();
        let b = UserId::new();
        let chat = PrivateChat::between(a, b);

        assert!(chat.contains(a));
        assert!(chat.contains(b));
        assert!(!chat.contains(UserId::new()));
        assert_eq!(chat.pair_key(), PrivateChat::between(b, a).pair_key());
    }

    #[test]
    fn test_member_roles() {
        let group = GroupId::new();
        let user = UserId::new();
        assert_eq!(GroupMember::admin(group, user).role, GroupRole::Admin);
        assert_eq!(GroupMember::member(group, user).role, GroupRole::Member);
    }
}
