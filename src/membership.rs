//! Group membership changes
//!
//! Admin-gated add/remove followed by a notification to every member of
//! the updated group. The notification step has no rollback: a failed
//! member fetch is reported but the change stays committed.

use std::sync::Arc;

use tracing::{info, warn};

use crate::delivery::{FanOut, Notifier};
use crate::error::AppError;
use crate::message::{Envelope, MembershipAction};
use crate::models::{GroupMember, GroupRole};
use crate::store::{Store, StoreError};
use crate::types::{GroupId, UserId};

#[derive(Clone)]
pub struct MembershipCoordinator {
    store: Arc<dyn Store>,
    notifier: Notifier,
}

impl MembershipCoordinator {
    pub fn new(store: Arc<dyn Store>, notifier: Notifier) -> Self {
        Self { store, notifier }
    }

    /// Apply `action` for `target` in `group` on behalf of `acting`
    pub async fn handle_membership(
        &self,
        group: GroupId,
        acting: UserId,
        target: UserId,
        action: MembershipAction,
    ) -> Result<FanOut, AppError> {
        // Role is read fresh for every request
        if self.store.group_member_role(group, acting).await? != Some(GroupRole::Admin) {
            return Err(AppError::NotAdmin);
        }

        match action {
            MembershipAction::Add => self.add(group, target).await?,
            MembershipAction::Remove => self.remove(group, target).await?,
        }
        info!(%group, %acting, %target, action = action.past_tense(), "membership changed");

        let members = self.store.group_members(group).await.map_err(|e| {
            warn!(%group, error = %e, "membership changed but members could not be fetched");
            AppError::from(e)
        })?;

        let notice = format!("{} has been {}", target, action.past_tense());
        Ok(self
            .notifier
            .fan_out(members.into_iter().map(|m| m.user_id), Envelope::ok(notice)))
    }

    async fn add(&self, group: GroupId, target: UserId) -> Result<(), AppError> {
        if !self.store.user_exists(target).await? {
            return Err(AppError::UserNotFound);
        }
        if self.store.find_group(group).await?.is_none() {
            return Err(AppError::GroupNotFound);
        }

        match self
            .store
            .create_membership(GroupMember::member(group, target))
            .await
        {
            Ok(()) => Ok(()),
            Err(StoreError::Conflict(_)) => Err(AppError::AlreadyMember),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, group: GroupId, target: UserId) -> Result<(), AppError> {
        if self.store.delete_membership(group, target).await? {
            Ok(())
        } else {
            Err(AppError::NotMember)
        }
    }
}
