//! Private (1:1) chat resolution
//!
//! Finds or lazily creates the relation between two users and persists a
//! message into it. Delivery is left to the caller and must only follow a
//! successful return.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::message::MessageKind;
use crate::models::{PrivateChat, PrivateMessage};
use crate::store::{Store, StoreError};
use crate::types::UserId;

#[derive(Clone)]
pub struct PrivateChatResolver {
    store: Arc<dyn Store>,
}

impl PrivateChatResolver {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Relation between two users, independent of argument order
    async fn find_relation(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Option<PrivateChat>, AppError> {
        Ok(self.store.find_private_chat(a, b).await?)
    }

    /// Persist a private message from `sender` to `receiver`.
    ///
    /// Returns the receiver so the caller can attempt live delivery.
    pub async fn send_private_message(
        &self,
        sender: UserId,
        receiver: UserId,
        kind: MessageKind,
        content: String,
    ) -> Result<UserId, AppError> {
        if let Some(chat) = self.find_relation(sender, receiver).await? {
            self.store
                .create_private_message(PrivateMessage::new(chat.id, sender, kind, content))
                .await?;
            debug!(%sender, %receiver, chat_id = %chat.id, "private message stored");
            return Ok(receiver);
        }

        if !self.store.user_exists(receiver).await? {
            return Err(AppError::UserNotFound);
        }

        let chat = PrivateChat::between(sender, receiver);
        let chat_id = chat.id;
        let first = PrivateMessage::new(chat_id, sender, kind, content.clone());

        match self.store.create_private_chat(chat, first).await {
            Ok(()) => {
                info!(%sender, %receiver, %chat_id, "private chat created");
                Ok(receiver)
            }
            Err(StoreError::Conflict(_)) => {
                // A concurrent first message created the relation
                let chat = self
                    .find_relation(sender, receiver)
                    .await?
                    .ok_or(AppError::ChatCreationFailed)?;
                self.store
                    .create_private_message(PrivateMessage::new(chat.id, sender, kind, content))
                    .await?;
                debug!(%sender, %receiver, chat_id = %chat.id, "private message stored after race");
                Ok(receiver)
            }
            Err(e) => {
                warn!(%sender, %receiver, error = %e, "failed to create private chat");
                Err(AppError::ChatCreationFailed)
            }
        }
    }
}
