//! Relay HTTP Surface
//!
//! # Endpoints
//!
//! - `GET /hubs/market` - Websocket hub: join/leave symbol groups, receive `tickerUpdate`
//! - `GET /api/market/tickers` - Latest relayed update per symbol
//! - `GET /health` - Upstream connection state and hub counts
//!
//! CORS is permissive so browser dev servers on other origins can connect.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use crate::domain::TickerPayload;
use crate::infrastructure::hub::{ConnectionId, GroupHub};
use crate::infrastructure::protocol::{ClientMessage, ServerEvent};
use crate::infrastructure::upstream::{RelayState, RelayStateSnapshot};

// =============================================================================
// State and Responses
// =============================================================================

/// Shared state for the HTTP handlers.
pub struct RelayHttpState {
    hub: Arc<GroupHub>,
    relay_state: Arc<RelayState>,
    cancel: CancellationToken,
    started_at: Instant,
}

impl RelayHttpState {
    /// Create handler state. `cancel` closes open websockets on shutdown.
    #[must_use]
    pub fn new(hub: Arc<GroupHub>, relay_state: Arc<RelayState>, cancel: CancellationToken) -> Self {
        Self {
            hub,
            relay_state,
            cancel,
            started_at: Instant::now(),
        }
    }
}

/// Response for `GET /health`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayHealthResponse {
    /// `healthy` while the upstream stream is open, else `degraded`.
    pub status: &'static str,
    /// Seconds since start.
    pub uptime_secs: u64,
    /// Upstream connection counters.
    pub upstream: RelayStateSnapshot,
    /// Connected websocket clients.
    pub clients: usize,
    /// Groups with at least one member.
    pub groups: usize,
}

/// Build the HTTP router.
pub fn router(state: Arc<RelayHttpState>) -> Router {
    Router::new()
        .route("/hubs/market", get(ws_handler))
        .route("/api/market/tickers", get(tickers_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

// =============================================================================
// Server
// =============================================================================

/// HTTP server for the hub, snapshot and health endpoints.
pub struct RelayHttpServer {
    port: u16,
    state: Arc<RelayHttpState>,
}

impl RelayHttpServer {
    /// Create a new server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<RelayHttpState>) -> Self {
        Self { port, state }
    }

    /// Bind and serve until the state's token is cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HttpServerError` if binding fails or the server fails
    /// while running.
    pub async fn run(self) -> Result<(), HttpServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HttpServerError::BindFailed(self.port, e.to_string()))?;
        serve(listener, self.state).await
    }
}

/// Serve on an already bound listener until the state's token is cancelled.
///
/// # Errors
///
/// Returns `HttpServerError::ServerFailed` if the server fails while running.
pub async fn serve(listener: TcpListener, state: Arc<RelayHttpState>) -> Result<(), HttpServerError> {
    let cancel = state.cancel.clone();
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "relay HTTP server listening");
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| HttpServerError::ServerFailed(e.to_string()))?;

    tracing::info!("relay HTTP server stopped");
    Ok(())
}

// =============================================================================
// Handlers
// =============================================================================

async fn tickers_handler(State(state): State<Arc<RelayHttpState>>) -> Json<Vec<TickerPayload>> {
    Json(state.hub.latest_tickers())
}

async fn health_handler(State(state): State<Arc<RelayHttpState>>) -> Json<RelayHealthResponse> {
    let upstream = state.relay_state.snapshot();
    Json(RelayHealthResponse {
        status: if upstream.upstream_connected {
            "healthy"
        } else {
            "degraded"
        },
        uptime_secs: state.started_at.elapsed().as_secs(),
        upstream,
        clients: state.hub.connection_count(),
        groups: state.hub.group_count(),
    })
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<RelayHttpState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Drive one hub connection until the client leaves or shutdown.
async fn handle_socket(socket: WebSocket, state: Arc<RelayHttpState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (id, mut outbound) = state.hub.register();
    tracing::info!(connection = %id, "hub client connected");

    // Single writer: relayed updates and replies share the connection queue
    let send_task = tokio::spawn(async move {
        while let Some(text) = outbound.recv().await {
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    loop {
        tokio::select! {
            () = state.cancel.cancelled() => break,
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => handle_text(&state.hub, id, text.as_str()),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(connection = %id, error = %e, "hub socket error");
                    break;
                }
            },
        }
    }

    state.hub.remove_connection(id);
    send_task.abort();
    tracing::info!(connection = %id, "hub client disconnected");
}

fn handle_text(hub: &GroupHub, id: ConnectionId, text: &str) {
    let reply = match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Join { symbol }) => match hub.join(id, &symbol) {
            Ok(symbol) => ServerEvent::Joined { symbol },
            Err(e) => ServerEvent::Error {
                message: e.to_string(),
            },
        },
        Ok(ClientMessage::Leave { symbol }) => match hub.leave(id, &symbol) {
            Ok(symbol) => ServerEvent::Left { symbol },
            Err(e) => ServerEvent::Error {
                message: e.to_string(),
            },
        },
        Ok(ClientMessage::Ping) => ServerEvent::Pong,
        Err(e) => {
            tracing::debug!(connection = %id, error = %e, "unrecognized hub message");
            ServerEvent::Error {
                message: "unrecognized message".to_string(),
            }
        }
    };

    if !hub.send_to(id, &reply) {
        tracing::debug!(connection = %id, "reply dropped");
    }
}

// =============================================================================
// Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================
