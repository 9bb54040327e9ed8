//! Shared harness: a real server on an ephemeral port plus WebSocket and
//! raw HTTP clients

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;

use chat_relay::auth::TokenAuthority;
use chat_relay::models::User;
use chat_relay::{ChatServer, Config, ConnectionRegistry, Envelope, MemoryStore, Store, UserId};

pub const WAIT: Duration = Duration::from_secs(5);
pub const SECRET: &str = "integration-secret";

pub type Client = WebSocketStream<TcpStream>;

pub struct TestServer {
    pub addr: String,
    pub store: Arc<MemoryStore>,
    pub registry: Arc<ConnectionRegistry>,
    tokens: TokenAuthority,
}

impl TestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let config = Config {
            addr: addr.clone(),
            app_secret: SECRET.to_string(),
            // Cheapest bcrypt cost keeps account tests fast
            password_cost: 4,
            ..Config::default()
        };
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let server = ChatServer::new(&config, store.clone(), registry.clone());
        tokio::spawn(server.run(listener));

        Self {
            addr,
            store,
            registry,
            tokens: TokenAuthority::new(SECRET.as_bytes(), config.token_ttl),
        }
    }

    /// Insert a user directly into the store
    pub async fn user(&self, name: &str) -> UserId {
        let id = UserId::new();
        self.store
            .create_user(User {
                id,
                name: name.to_string(),
                email: format!("{}-{}@example.com", name, id),
                password_hash: String::new(),
            })
            .await
            .unwrap();
        id
    }

    pub fn token(&self, user: UserId) -> String {
        self.tokens.issue(user).unwrap()
    }

    /// Attempt a WebSocket upgrade on `path`
    pub async fn open_socket(&self, path: &str, token: Option<&str>) -> Result<Client, WsError> {
        let mut request = format!("ws://{}{}", self.addr, path)
            .into_client_request()
            .unwrap();
        if let Some(token) = token {
            request.headers_mut().insert(
                "authorization",
                HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
            );
        }
        let stream = TcpStream::connect(&self.addr).await.unwrap();
        let (ws, _) = timeout(WAIT, tokio_tungstenite::client_async(request, stream))
            .await
            .unwrap()?;
        Ok(ws)
    }

    /// Open a session for `user` and wait until it is registered
    pub async fn connect(&self, user: UserId, path: &str) -> Client {
        let client = self
            .open_socket(path, Some(&self.token(user)))
            .await
            .unwrap();
        self.wait_until(|| self.registry.get(user).is_some()).await;
        client
    }

    pub async fn wait_until(&self, condition: impl Fn() -> bool) {
        timeout(WAIT, async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }
}

/// Next text frame decoded as an envelope
pub async fn next_envelope(client: &mut Client) -> Envelope {
    loop {
        let frame = timeout(WAIT, client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

pub async fn send_json(client: &mut Client, value: serde_json::Value) {
    client
        .send(Message::Text(value.to_string().into()))
        .await
        .unwrap();
}

/// Wait until the server closes `client`
pub async fn wait_closed(client: &mut Client) {
    timeout(WAIT, async {
        loop {
            match client.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await
    .expect("server did not close the socket");
}

/// Write a raw HTTP/1.1 request and return (status, envelope)
pub async fn raw_request(addr: &str, request: &str) -> (u16, Envelope) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    timeout(WAIT, stream.read_to_string(&mut response))
        .await
        .unwrap()
        .unwrap();

    let status = response
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap();
    let (_, json) = response.split_once("\r\n\r\n").unwrap();
    (status, serde_json::from_str(json).unwrap())
}

/// POST a JSON body with a Content-Length
pub async fn post(addr: &str, path: &str, body: serde_json::Value) -> (u16, Envelope) {
    let body = body.to_string();
    let request = format!(
        "POST {} HTTP/1.1\r\nHost: {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        path,
        addr,
        body.len(),
        body
    );
    raw_request(addr, &request).await
}
