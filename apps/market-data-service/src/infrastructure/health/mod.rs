//! Health, Info, Stats and Metrics Endpoint
//!
//! HTTP surface for orchestrators, dashboards and Prometheus.
//!
//! # Endpoints
//!
//! - `GET /` - Service info: source, symbols and endpoint names
//! - `GET /health` - JSON health status with feed state
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /readyz` - Readiness probe (ready once the feed has produced a tick)
//! - `GET /stats` - Per-symbol feed statistics
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::domain::stats::SymbolStats;
use crate::infrastructure::broadcast::Broadcaster;
use crate::infrastructure::feeds::{ConnectionState, FeedStateSnapshot, SharedFeedState};
use crate::infrastructure::metrics::get_metrics_handle;
use crate::infrastructure::monitor::FeedMonitor;

// =============================================================================
// Response Types
// =============================================================================

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Feed is producing.
    Healthy,
    /// Feed is connecting or waiting to reconnect.
    Degraded,
    /// Feed has stopped.
    Unhealthy,
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Service version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Feed lifecycle state.
    pub feed: FeedStateSnapshot,
    /// Live broadcaster subscriptions.
    pub subscribers: usize,
}

/// Service info response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoResponse {
    /// Service name.
    pub service: &'static str,
    /// One-line description.
    pub description: &'static str,
    /// Active source name.
    pub source: String,
    /// Configured symbols.
    pub symbols: Vec<String>,
    /// Endpoint names.
    pub endpoints: InfoEndpoints,
}

/// Endpoint names listed by the info response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoEndpoints {
    /// Health endpoint path.
    pub health: &'static str,
    /// Stats endpoint path.
    pub stats: &'static str,
    /// Streaming RPC name.
    pub grpc_service: &'static str,
}

/// Stats response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    /// Time of the snapshot.
    pub timestamp: DateTime<Utc>,
    /// Number of symbols seen.
    pub symbol_count: usize,
    /// Per-symbol statistics.
    pub symbols: Vec<SymbolStatsView>,
}

/// One symbol in the stats response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolStatsView {
    /// Symbol.
    pub symbol: String,
    /// Ticks observed.
    pub update_count: u64,
    /// Most recent price.
    pub last_price: Decimal,
    /// Time of the most recent tick.
    pub last_update_time: DateTime<Utc>,
    /// Rate formatted as `"{rate:.2}/sec"`.
    pub update_rate: String,
}

impl From<&SymbolStats> for SymbolStatsView {
    fn from(stats: &SymbolStats) -> Self {
        Self {
            symbol: stats.symbol.clone(),
            update_count: stats.update_count,
            last_price: stats.last_price,
            last_update_time: stats.last_update_time,
            update_rate: format!("{:.2}/sec", stats.update_rate()),
        }
    }
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the HTTP server.
#[derive(Debug)]
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    source: String,
    symbols: Vec<String>,
    feed_state: SharedFeedState,
    broadcaster: Arc<Broadcaster>,
    monitor: Arc<FeedMonitor>,
}

impl HealthServerState {
    /// Create new server state.
    #[must_use]
    pub fn new(
        source: &str,
        symbols: Vec<String>,
        feed_state: SharedFeedState,
        broadcaster: Arc<Broadcaster>,
        monitor: Arc<FeedMonitor>,
    ) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Instant::now(),
            source: source.to_string(),
            symbols,
            feed_state,
            broadcaster,
            monitor,
        }
    }
}

/// Build the HTTP router.
pub fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/", get(info_handler))
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/stats", get(stats_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// Health Server
// =============================================================================

/// HTTP server for health, info, stats and metrics.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "HTTP server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn info_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    Json(InfoResponse {
        service: "MarketDataService",
        description: "gRPC streaming market data",
        source: state.source.clone(),
        symbols: state.symbols.clone(),
        endpoints: InfoEndpoints {
            health: "/health",
            stats: "/stats",
            grpc_service: "MarketDataStreamer.StreamTickers",
        },
    })
}

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.feed_state.ticks_produced() > 0 {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn stats_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let snapshot = state.monitor.snapshot();
    Json(StatsResponse {
        timestamp: Utc::now(),
        symbol_count: snapshot.len(),
        symbols: snapshot.iter().map(SymbolStatsView::from).collect(),
    })
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let feed = state.feed_state.snapshot();
    HealthResponse {
        status: determine_health_status(feed.connection),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        feed,
        subscribers: state.broadcaster.subscriber_count(),
    }
}

const fn determine_health_status(connection: ConnectionState) -> HealthStatus {
    match connection {
        ConnectionState::Connected => HealthStatus::Healthy,
        ConnectionState::Idle | ConnectionState::Connecting | ConnectionState::Reconnecting => {
            HealthStatus::Degraded
        }
        ConnectionState::Stopped => HealthStatus::Unhealthy,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
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

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::domain::tick::Tick;
    use crate::infrastructure::feeds::FeedState;
    use crate::infrastructure::metrics::SourceLabel;

    fn test_state() -> (Arc<HealthServerState>, SharedFeedState, Arc<FeedMonitor>) {
        let feed_state = FeedState::new(SourceLabel::Synthetic);
        let monitor = FeedMonitor::new();
        let state = Arc::new(HealthServerState::new(
            "mock",
            vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
            SharedFeedState::clone(&feed_state),
            Broadcaster::with_defaults(),
            Arc::clone(&monitor),
        ));
        (state, feed_state, monitor)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Degraded).unwrap(),
            "\"degraded\""
        );
    }

    #[test]
    fn status_follows_connection_state() {
        assert_eq!(determine_health_status(ConnectionState::Connected), HealthStatus::Healthy);
        assert_eq!(determine_health_status(ConnectionState::Reconnecting), HealthStatus::Degraded);
        assert_eq!(determine_health_status(ConnectionState::Stopped), HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn info_lists_source_and_symbols() {
        let (state, _, _) = test_state();
        let (status, body) = get_json(router(state), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["source"], "mock");
        assert_eq!(body["symbols"][1], "ETHUSDT");
        assert_eq!(body["endpoints"]["grpcService"], "MarketDataStreamer.StreamTickers");
    }

    #[tokio::test]
    async fn stats_formats_rate() {
        let (state, _, monitor) = test_state();
        let t0 = Utc::now() - chrono::Duration::seconds(20);
        let tick = Tick::now("BTCUSDT", Decimal::from_str("43000.5").unwrap()).unwrap();
        monitor.record(&tick, t0);
        for i in 1..100 {
            monitor.record(&tick, t0 + chrono::Duration::milliseconds(i * 202));
        }
        monitor.record(&tick, t0 + chrono::Duration::seconds(20));

        let (status, body) = get_json(router(state), "/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["symbolCount"], 1);
        assert_eq!(body["symbols"][0]["symbol"], "BTCUSDT");
        assert_eq!(body["symbols"][0]["updateCount"], 101);
        assert_eq!(body["symbols"][0]["updateRate"], "5.05/sec");
    }

    #[tokio::test]
    async fn readiness_waits_for_first_tick() {
        let (state, feed_state, _) = test_state();
        let app = router(state);

        let response = app
            .clone()
            .oneshot(Request::get("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        feed_state.record_tick();
        let response = app
            .oneshot(Request::get("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn health_reports_feed_state() {
        let (state, feed_state, _) = test_state();
        feed_state.set_connection(ConnectionState::Connected);

        let (status, body) = get_json(router(state), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["feed"]["connection"], "connected");
        assert_eq!(body["subscribers"], 0);
    }
}
