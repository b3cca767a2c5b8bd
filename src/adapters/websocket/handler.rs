//! WebSocket upgrade handler for real-time dashboard connections.
//!
//! Connection lifecycle:
//! 1. Validate the `token` query parameter
//! 2. Upgrade and register with the `ConnectionRegistry`
//! 3. Queue the `connected` greeting, then mark the connection routable
//! 4. Run one reader and one writer task until either ends
//! 5. Deregister

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::domain::foundation::{AuthError, AuthenticatedUser};
use crate::ports::SessionValidator;

use super::connections::{ConnectionId, ConnectionRegistry, Registration};
use super::messages::{codes, Envelope, PING};

/// Per-connection deadlines.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    /// A single frame write taking longer than this closes the connection.
    pub write_timeout: Duration,
    /// Closing after this long without an inbound frame.
    pub idle_timeout: Duration,
}

impl ConnectionSettings {
    pub fn new(write_timeout: Duration, idle_timeout: Duration) -> Self {
        Self {
            write_timeout,
            idle_timeout,
        }
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), Duration::from_secs(60))
    }
}

/// State shared by the upgrade and health handlers.
#[derive(Clone)]
pub struct WebSocketState {
    pub validator: Arc<dyn SessionValidator>,
    pub registry: Arc<ConnectionRegistry>,
    pub settings: ConnectionSettings,
}

impl WebSocketState {
    pub fn new(validator: Arc<dyn SessionValidator>, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            validator,
            registry,
            settings: ConnectionSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ConnectionSettings) -> Self {
        self.settings = settings;
        self
    }
}

#[derive(Debug, Deserialize)]
pub struct UpgradeQuery {
    token: Option<String>,
}

fn reject(status: StatusCode, code: &str, message: &str) -> Response {
    (status, Json(json!({ "code": code, "message": message }))).into_response()
}

/// Route: `GET /ws?token=<bearer>`
///
/// The token is checked before the upgrade is accepted. A request that
/// passes auth but is not a WebSocket handshake gets 426.
pub async fn ws_handler(
    ws: Option<WebSocketUpgrade>,
    Query(query): Query<UpgradeQuery>,
    State(state): State<WebSocketState>,
) -> Response {
    let Some(token) = query.token.filter(|t| !t.is_empty()) else {
        return reject(StatusCode::UNAUTHORIZED, "MISSING_TOKEN", "token query parameter is required");
    };

    let user = match state.validator.validate(&token).await {
        Ok(user) => user,
        Err(AuthError::ServiceUnavailable(reason)) => {
            tracing::warn!(%reason, "Session validator unavailable");
            return reject(
                StatusCode::SERVICE_UNAVAILABLE,
                "AUTH_UNAVAILABLE",
                "authentication is temporarily unavailable",
            );
        }
        Err(e) => {
            tracing::debug!(error = %e, "Rejected WebSocket upgrade");
            return reject(StatusCode::UNAUTHORIZED, "INVALID_TOKEN", "token is invalid or expired");
        }
    };

    let Some(ws) = ws else {
        return reject(
            StatusCode::UPGRADE_REQUIRED,
            "UPGRADE_REQUIRED",
            "expected a WebSocket handshake",
        );
    };

    ws.on_upgrade(move |socket| handle_socket(socket, user, state))
}

/// Route: `GET /health`
pub async fn health_handler(State(state): State<WebSocketState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "activeConnections": state.registry.count().await,
    }))
}

async fn handle_socket(socket: WebSocket, user: AuthenticatedUser, state: WebSocketState) {
    let Registration {
        id,
        outbound,
        queue,
    } = state.registry.register(user.clone()).await;

    // Fresh queue, so the greeting always fits and lands before any event.
    if outbound.try_send(Envelope::connected(id, &user)).is_err() {
        state.registry.deregister(id).await;
        return;
    }
    state.registry.mark_open(id).await;
    tracing::info!(
        connection_id = %id,
        user_id = %user.id,
        organization_id = %user.organization_id,
        "WebSocket connected"
    );

    let (sink, stream) = socket.split();
    let mut writer = tokio::spawn(write_loop(sink, queue, id, state.settings.write_timeout));
    let mut reader = tokio::spawn(read_loop(stream, outbound, id, state.settings.idle_timeout));

    tokio::select! {
        _ = &mut writer => {
            state.registry.mark_closing(id).await;
            reader.abort();
        }
        _ = &mut reader => {
            state.registry.mark_closing(id).await;
            writer.abort();
        }
    }

    if state.registry.deregister(id).await {
        tracing::info!(connection_id = %id, "WebSocket disconnected");
    }
}

/// Sole owner of the socket sink. Drains the outbound queue in order.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut queue: mpsc::Receiver<Envelope>,
    id: ConnectionId,
    write_timeout: Duration,
) {
    while let Some(envelope) = queue.recv().await {
        let text = match envelope.to_text() {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(connection_id = %id, error = %e, "Failed to encode envelope");
                continue;
            }
        };

        match timeout(write_timeout, sink.send(Message::Text(text))).await {
            Ok(Ok(())) => {
                tracing::trace!(connection_id = %id, event_name = %envelope.event_name, "Frame written");
            }
            Ok(Err(e)) => {
                tracing::debug!(connection_id = %id, error = %e, "Write failed, closing connection");
                break;
            }
            Err(_) => {
                tracing::warn!(connection_id = %id, "Write timed out, closing connection");
                break;
            }
        }
    }

    let _ = timeout(write_timeout, sink.close()).await;
}

async fn read_loop(
    mut stream: SplitStream<WebSocket>,
    outbound: mpsc::Sender<Envelope>,
    id: ConnectionId,
    idle_timeout: Duration,
) {
    loop {
        let message = match timeout(idle_timeout, stream.next()).await {
            Err(_) => {
                tracing::info!(connection_id = %id, "Idle timeout, closing connection");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                tracing::debug!(connection_id = %id, error = %e, "Read failed");
                break;
            }
            Ok(Some(Ok(message))) => message,
        };

        let reply = match message {
            Message::Text(text) => reply_to(text.as_bytes()),
            Message::Binary(bytes) => reply_to(&bytes),
            Message::Close(_) => {
                tracing::debug!(connection_id = %id, "Client sent close frame");
                break;
            }
            // Protocol-level ping/pong is answered by axum.
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        if outbound.send(reply).await.is_err() {
            break;
        }
    }
}

/// Answer for one client frame.
fn reply_to(frame: &[u8]) -> Envelope {
    match serde_json::from_slice::<Envelope>(frame) {
        Err(e) => Envelope::error(codes::INVALID_ENVELOPE, format!("invalid envelope: {}", e), None),
        Ok(envelope) if envelope.event_name == PING => Envelope::pong(envelope.message_id),
        Ok(envelope) => Envelope::error(
            codes::UNKNOWN_EVENT,
            format!("unknown event '{}'", envelope.event_name),
            envelope.message_id,
        ),
    }
}

/// Router with `/ws` and `/health`.
///
/// # Example
///
/// ```ignore
/// let app = websocket_router().with_state(state);
/// ```
pub fn websocket_router() -> Router<WebSocketState> {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
}
