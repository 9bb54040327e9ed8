//! Group messaging
//!
//! Persists group messages and new groups, then fans notifications out
//! to members without waiting for the deliveries.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::delivery::{FanOut, Notifier};
use crate::error::AppError;
use crate::message::{Envelope, MessageKind};
use crate::models::{Group, GroupMember, GroupMessage};
use crate::store::Store;
use crate::types::{GroupId, UserId};

/// Result of a successful group creation
#[derive(Debug)]
pub struct CreatedGroup {
    pub group: Group,
    /// Invitees that became members (creator excluded)
    pub members: Vec<UserId>,
    /// "added to group" deliveries in flight
    pub notifications: FanOut,
}

#[derive(Clone)]
pub struct GroupBroadcaster {
    store: Arc<dyn Store>,
    notifier: Notifier,
}

impl GroupBroadcaster {
    pub fn new(store: Arc<dyn Store>, notifier: Notifier) -> Self {
        Self { store, notifier }
    }

    /// Persist a group message and deliver it to every other member.
    ///
    /// Returns once the message is stored; deliveries continue in the
    /// background.
    pub async fn send_group_message(
        &self,
        sender: UserId,
        group: GroupId,
        kind: MessageKind,
        content: String,
    ) -> Result<FanOut, AppError> {
        if self.store.find_group(group).await?.is_none() {
            return Err(AppError::GroupNotFound);
        }

        self.store
            .create_group_message(GroupMessage::new(group, sender, kind, content.clone()))
            .await?;

        let members = self.store.group_members(group).await?;
        let recipients: Vec<UserId> = members
            .into_iter()
            .map(|m| m.user_id)
            .filter(|user| *user != sender)
            .collect();

        debug!(%sender, %group, recipients = recipients.len(), "broadcasting group message");
        Ok(self.notifier.fan_out(recipients, Envelope::ok(content)))
    }

    /// Create a group with `creator` as admin and `member_ids` as members.
    ///
    /// Unusable member ids (malformed, unknown, repeated, or the creator)
    /// are skipped one by one. Group and memberships are written in one
    /// storage call.
    pub async fn create_group(
        &self,
        creator: UserId,
        name: String,
        description: String,
        member_ids: Vec<String>,
    ) -> Result<CreatedGroup, AppError> {
        let mut members = Vec::new();
        let mut seen = HashSet::from([creator]);

        for raw in &member_ids {
            let user: UserId = match raw.parse() {
                Ok(user) => user,
                Err(e) => {
                    warn!(%creator, member = %raw, error = %e, "skipping invalid member id");
                    continue;
                }
            };
            if !seen.insert(user) {
                debug!(%creator, member = %user, "skipping repeated member");
                continue;
            }
            if !self.store.user_exists(user).await? {
                warn!(%creator, member = %user, "skipping unknown member");
                continue;
            }
            members.push(user);
        }

        let group = Group {
            id: GroupId::new(),
            name,
            description: Some(description).filter(|d| !d.trim().is_empty()),
            creator_id: creator,
        };

        let rows = std::iter::once(GroupMember::admin(group.id, creator))
            .chain(members.iter().map(|user| GroupMember::member(group.id, *user)))
            .collect();

        if let Err(e) = self.store.create_group(group.clone(), rows).await {
            warn!(%creator, error = %e, "failed to create group");
            return Err(e.into());
        }

        info!(%creator, group = %group.id, name = %group.name, members = members.len(), "group created");

        let notifications = self.notifier.fan_out(
            members.iter().copied(),
            Envelope::ok(format!("you have been added to {}", group.name)),
        );

        Ok(CreatedGroup {
            group,
            members,
            notifications,
        })
    }
}
