//! Chat Relay Server - Entry Point
//!
//! Loads configuration, binds the TCP listener and serves the HTTP routes.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chat_relay::{ChatServer, Config, ConnectionRegistry, MemoryStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Use RUST_LOG to control log level, e.g. RUST_LOG=chat_relay=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_relay=info")),
        )
        .init();

    let config = Config::from_env();

    let listener = TcpListener::bind(&config.addr).await?;
    info!("Chat relay listening on {}", config.addr);

    let registry = Arc::new(ConnectionRegistry::new());
    let server = ChatServer::new(&config, Arc::new(MemoryStore::new()), registry);
    server.run(listener).await?;

    Ok(())
}
