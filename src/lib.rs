//! Real-time Chat Relay Library
//!
//! A WebSocket chat backend served by axum. Authenticated users hold one
//! live connection each and exchange private messages, group messages and
//! group membership changes over it.
//!
//! # Features
//! - One live connection per user, reused on reconnect
//! - Private chats created lazily on the first message
//! - Group creation and broadcast to online members
//! - Admin-only membership changes with notifications
//! - Bearer token accounts (register / login)
//!
//! # Architecture
//! - `ConnectionRegistry` maps users to live connections
//! - Each connection has a writer task fed through an `mpsc` channel
//! - `ChatRouter` reads frames in order and runs each command on its own task
//! - Handlers persist through the `Store` trait before notifying anyone
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use chat_relay::{ChatServer, Config, ConnectionRegistry, MemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let config = Config::from_env();
//!     let listener = TcpListener::bind(&config.addr).await?;
//!     let registry = Arc::new(ConnectionRegistry::new());
//!     ChatServer::new(&config, Arc::new(MemoryStore::new()), registry)
//!         .run(listener)
//!         .await
//! }
//! ```

pub mod accounts;
pub mod auth;
pub mod config;
pub mod connection;
pub mod delivery;
pub mod error;
pub mod group;
pub mod membership;
pub mod memory;
pub mod message;
pub mod models;
pub mod private_chat;
pub mod registry;
pub mod router;
pub mod server;
pub mod store;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use config::Config;
pub use connection::LiveConnection;
pub use delivery::{FanOut, Notifier};
pub use error::{AppError, SendError};
pub use group::GroupBroadcaster;
pub use membership::MembershipCoordinator;
pub use memory::MemoryStore;
pub use message::{Command, Envelope, MembershipAction, MessageKind, SessionContext};
pub use private_chat::PrivateChatResolver;
pub use registry::ConnectionRegistry;
pub use router::{Attached, ChatRouter, Handshake, Session};
pub use server::{AxumHandshake, ChatServer};
pub use store::{Store, StoreError};
pub use types::{ChatId, GroupId, MessageId, UserId};
