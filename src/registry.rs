//! Connection registry
//!
//! Single-process map from user to live connection. Every operation takes
//! the lock only for the map access itself; closing a removed connection
//! just signals its writer task.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::connection::LiveConnection;
use crate::types::UserId;

/// Registry of live connections keyed by user
///
/// Invariant: at most one connection per user. `put` never replaces an
/// entry whose connection is still open.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<UserId, Arc<LiveConnection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the live connection of `user`
    pub fn get(&self, user: UserId) -> Option<Arc<LiveConnection>> {
        self.connections.read().get(&user).cloned()
    }

    /// Register `conn` for `user` unless a live one is already registered.
    ///
    /// Returns the connection that is registered after the call: `conn`
    /// itself, or the pre-existing one. An entry whose connection is
    /// already closed counts as absent.
    pub fn put(&self, user: UserId, conn: Arc<LiveConnection>) -> Arc<LiveConnection> {
        let mut connections = self.connections.write();
        match connections.entry(user) {
            Entry::Occupied(entry) if !entry.get().is_closed() => {
                debug!(%user, conn_id = entry.get().id(), "reusing registered connection");
                entry.get().clone()
            }
            Entry::Occupied(mut entry) => {
                entry.insert(conn.clone());
                info!(%user, conn_id = conn.id(), "stale connection replaced");
                conn
            }
            Entry::Vacant(entry) => {
                entry.insert(conn.clone());
                info!(%user, conn_id = conn.id(), "connection registered");
                conn
            }
        }
    }

    /// Remove and close the connection of `user`, if any. Idempotent.
    pub fn remove(&self, user: UserId) {
        let removed = self.connections.write().remove(&user);
        if let Some(conn) = removed {
            conn.close();
            info!(%user, conn_id = conn.id(), "connection removed");
        }
    }

    /// Remove `user`'s entry only if it is still `conn`, then close `conn`.
    ///
    /// Used by session teardown so a finished session can never evict a
    /// newer connection of the same user.
    pub fn release(&self, user: UserId, conn: &Arc<LiveConnection>) {
        {
            let mut connections = self.connections.write();
            if connections
                .get(&user)
                .is_some_and(|registered| Arc::ptr_eq(registered, conn))
            {
                connections.remove(&user);
                info!(%user, conn_id = conn.id(), total = connections.len(), "connection released");
            }
        }
        conn.close();
    }

    /// Number of registered connections
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
