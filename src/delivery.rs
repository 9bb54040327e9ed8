//! Best-effort live delivery
//!
//! Delivery only reaches users that are connected right now. Offline
//! recipients are skipped; nothing is queued or retried.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::message::Envelope;
use crate::registry::ConnectionRegistry;
use crate::types::UserId;

/// Delivers envelopes to registered connections
#[derive(Debug, Clone)]
pub struct Notifier {
    registry: Arc<ConnectionRegistry>,
}

impl Notifier {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Write `envelope` to `user` if online. Returns whether it was queued.
    pub async fn deliver(&self, user: UserId, envelope: Envelope) -> bool {
        let Some(conn) = self.registry.get(user) else {
            debug!(%user, "recipient is not online, skipping delivery");
            return false;
        };

        match conn.send(envelope).await {
            Ok(()) => true,
            Err(e) => {
                debug!(%user, error = %e, "delivery failed");
                false
            }
        }
    }

    /// Spawn one independent delivery task per recipient.
    ///
    /// Returns immediately. Dropping the returned [`FanOut`] detaches the
    /// tasks; they still run to completion.
    pub fn fan_out<I>(&self, recipients: I, envelope: Envelope) -> FanOut
    where
        I: IntoIterator<Item = UserId>,
    {
        let handles = recipients
            .into_iter()
            .map(|user| {
                let notifier = self.clone();
                let envelope = envelope.clone();
                tokio::spawn(async move { notifier.deliver(user, envelope).await })
            })
            .collect();

        FanOut { handles }
    }
}

/// Handles of the delivery tasks started by [`Notifier::fan_out`]
#[derive(Debug, Default)]
pub struct FanOut {
    handles: Vec<JoinHandle<bool>>,
}

impl FanOut {
    /// Number of delivery attempts started
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every attempt and count the successful deliveries
    pub async fn join(self) -> usize {
        let mut delivered = 0;
        for handle in self.handles {
            if let Ok(true) = handle.await {
                delivered += 1;
            }
        }
        delivered
    }
}
