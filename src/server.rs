//! HTTP front door
//!
//! An axum [`Router`] serving the account endpoints and the two WebSocket
//! entry points. Socket requests are authenticated from their bearer token
//! before the [`ChatRouter`] decides whether the upgrade happens at all.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::rejection::JsonRejection;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::accounts::{Accounts, LoginRequest, SignUpRequest};
use crate::auth::{AuthError, TokenAuthority};
use crate::config::Config;
use crate::error::AppError;
use crate::message::{Envelope, SessionContext};
use crate::registry::ConnectionRegistry;
use crate::router::{Attached, ChatRouter, Handshake};
use crate::store::Store;
use crate::types::GroupId;

/// Upgrade of an accepted socket request
///
/// The HTTP response is handed back through `respond` so the handler can
/// return it while the session keeps running on its own task.
pub struct AxumHandshake {
    upgrade: WebSocketUpgrade,
    respond: oneshot::Sender<Response>,
}

#[async_trait]
impl Handshake for AxumHandshake {
    type Socket = WebSocket;

    async fn upgrade(self) -> Result<WebSocket, AppError> {
        let (socket_tx, socket_rx) = oneshot::channel();
        let response = self
            .upgrade
            .on_failed_upgrade(|e| debug!(error = %e, "websocket upgrade failed"))
            .on_upgrade(move |socket| async move {
                let _ = socket_tx.send(socket);
            });

        self.respond
            .send(response)
            .map_err(|_| AppError::HandshakeFailed("client went away".to_string()))?;
        socket_rx
            .await
            .map_err(|_| AppError::HandshakeFailed("upgrade did not complete".to_string()))
    }

    async fn decline(self) {
        let _ = self
            .respond
            .send(Envelope::error(409, "user already connected").into_response());
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

/// Shared handler state: the session router plus account handling
#[derive(Clone)]
pub struct ChatServer {
    router: ChatRouter,
    accounts: Accounts,
}

impl ChatServer {
    pub fn new(config: &Config, store: Arc<dyn Store>, registry: Arc<ConnectionRegistry>) -> Self {
        let tokens = Arc::new(TokenAuthority::new(
            config.app_secret.as_bytes(),
            config.token_ttl,
        ));
        let router =
            ChatRouter::new(store.clone(), registry).with_outbound_buffer(config.outbound_buffer);

        Self {
            router,
            accounts: Accounts::new(store, tokens, config.password_cost),
        }
    }

    /// Build the HTTP routes
    pub fn app(self) -> Router {
        Router::new()
            .route("/api/v1/register", post(register))
            .route("/api/v1/login", post(login))
            .route("/ws", get(open_socket))
            .route("/ws/groups/{group_id}", get(open_group_socket))
            .fallback(not_found)
            .with_state(self)
            .layer(TraceLayer::new_for_http())
    }

    /// Serve until the listener fails
    pub async fn run(self, listener: TcpListener) -> io::Result<()> {
        if let Ok(addr) = listener.local_addr() {
            info!("chat server listening on {}", addr);
        }
        axum::serve(listener, self.app()).await
    }

    /// Authenticate a socket request and hand it to the session router
    async fn attach(
        &self,
        headers: &HeaderMap,
        upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
        context: SessionContext,
    ) -> Response {
        let authorization = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
        let user = match self.accounts.authenticate(authorization).await {
            Ok(user) => user,
            Err(e) => {
                debug!(error = %e, "unauthorized upgrade");
                return auth_failure(e).into_response();
            }
        };
        let upgrade = match upgrade {
            Ok(upgrade) => upgrade,
            Err(rejection) => return rejection.into_response(),
        };

        let (respond, response) = oneshot::channel();
        let router = self.router.clone();
        tokio::spawn(async move {
            match router.connect(user, AxumHandshake { upgrade, respond }).await {
                Ok(Attached::Opened(session)) => router.run_session(session, context).await,
                Ok(Attached::Reused(conn)) => {
                    info!(%user, conn_id = conn.id(), "kept existing connection");
                }
                Err(e) => warn!(%user, error = %e, "could not open session"),
            }
        });

        response
            .await
            .unwrap_or_else(|_| Envelope::error(500, "upgrade failed").into_response())
    }
}

async fn register(
    State(server): State<ChatServer>,
    body: Result<Json<SignUpRequest>, JsonRejection>,
) -> Envelope {
    match body {
        Ok(Json(request)) => account_reply(server.accounts.sign_up(request).await),
        Err(rejection) => Envelope::error(rejection.status().as_u16(), rejection.body_text()),
    }
}

async fn login(
    State(server): State<ChatServer>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Envelope {
    match body {
        Ok(Json(request)) => account_reply(server.accounts.login(request).await),
        Err(rejection) => Envelope::error(rejection.status().as_u16(), rejection.body_text()),
    }
}

async fn open_socket(
    State(server): State<ChatServer>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    server
        .attach(&headers, upgrade, SessionContext::default())
        .await
}

async fn open_group_socket(
    State(server): State<ChatServer>,
    Path(group_id): Path<String>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let Ok(group) = group_id.parse::<GroupId>() else {
        return Envelope::error(422, "invalid group id").into_response();
    };
    server
        .attach(&headers, upgrade, SessionContext::for_group(group))
        .await
}

async fn not_found() -> Envelope {
    Envelope::error(404, "not found")
}

fn account_reply(result: Result<String, AuthError>) -> Envelope {
    match result {
        Ok(token) => Envelope::ok(token),
        Err(e) => auth_failure(e),
    }
}

fn auth_failure(e: AuthError) -> Envelope {
    if e.status_code() >= 500 {
        warn!(error = %e, "account request failed");
    }
    Envelope::error(e.status_code(), e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::memory::MemoryStore;

    fn make_app() -> Router {
        let config = Config {
            password_cost: crate::config::BCRYPT_MIN_COST,
            ..Config::default()
        };
        ChatServer::new(
            &config,
            Arc::new(MemoryStore::new()),
            Arc::new(ConnectionRegistry::new()),
        )
        .app()
    }

    async fn envelope(resp: Response) -> Envelope {
        let body = axum::body::to_bytes(resp.into_body(), 10_000)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_register_returns_token() {
        let req = post_json(
            "/api/v1/register",
            serde_json::json!({ "name": "ada", "email": "ada@example.com", "password": "long enough" }),
        );

        let resp = make_app().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = envelope(resp).await;
        assert_eq!(body.status_code, 200);
        assert!(!body.data.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_account_body_reported_as_envelope() {
        let req = Request::builder()
            .method("POST")
            .uri("/api/v1/login")
            .header("content-type", "application/json")
            .body(Body::from("{ nope"))
            .unwrap();

        let resp = make_app().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(envelope(resp).await.status_code, 400);
    }

    #[tokio::test]
    async fn test_unknown_route_returns_404() {
        let req = Request::builder()
            .uri("/nonexistent")
            .body(Body::empty())
            .unwrap();

        let resp = make_app().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(envelope(resp).await.error_msg, "not found");
    }

    #[tokio::test]
    async fn test_socket_without_token_returns_401() {
        let req = Request::builder().uri("/ws").body(Body::empty()).unwrap();

        let resp = make_app().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(envelope(resp).await.error_msg, "credentials required");
    }

    #[tokio::test]
    async fn test_invalid_group_id_returns_422() {
        let req = Request::builder()
            .uri("/ws/groups/not-a-uuid")
            .body(Body::empty())
            .unwrap();

        let resp = make_app().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(envelope(resp).await.error_msg, "invalid group id");
    }
}
