//! Upstream Relay Loop
//!
//! A single task holds a server stream on `MarketDataStreamer.StreamTickers`
//! with an empty filter and republishes each update to the group named by
//! its symbol. Any transport error, status or end of stream waits the fixed
//! delay and connects again, until cancelled. Hub clients only ever notice a
//! pause.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use marketpulse_proto::TickerSubscription;
use marketpulse_proto::v1::market_data_streamer_client::MarketDataStreamerClient;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tonic::transport::Endpoint;

use crate::application::ports::TickerSink;
use crate::domain::{TickerPayload, group_key};

/// Default upstream endpoint.
pub const DEFAULT_UPSTREAM_URL: &str = "http://localhost:5001";

/// Default delay between connection attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(30);
const KEEP_ALIVE_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Error Type
// =============================================================================

/// Errors from the upstream connection.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The configured URL cannot be used as an endpoint.
    #[error("invalid upstream URL {url}: {source}")]
    InvalidEndpoint {
        /// Configured URL.
        url: String,
        /// Parse error.
        source: tonic::transport::Error,
    },

    /// Connection or transport failure.
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// The server answered with an error status.
    #[error("upstream status: {0}")]
    Status(#[from] tonic::Status),

    /// The server finished the stream.
    #[error("upstream stream ended")]
    StreamEnded,
}

// =============================================================================
// Shared State
// =============================================================================

/// Upstream connection state read by the health endpoint.
#[derive(Debug, Default)]
pub struct RelayState {
    connected: AtomicBool,
    reconnect_attempts: AtomicU64,
    updates_relayed: AtomicU64,
}

/// Point-in-time copy of [`RelayState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStateSnapshot {
    /// Whether the upstream stream is open.
    pub upstream_connected: bool,
    /// Failed or lost connections so far.
    pub reconnect_attempts: u64,
    /// Updates received from upstream.
    pub updates_relayed: u64,
}

impl RelayState {
    /// Create shared state.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Whether the upstream stream is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Failed or lost connections so far.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }

    /// Updates received from upstream.
    #[must_use]
    pub fn updates_relayed(&self) -> u64 {
        self.updates_relayed.load(Ordering::Relaxed)
    }

    /// Copy the current values.
    #[must_use]
    pub fn snapshot(&self) -> RelayStateSnapshot {
        RelayStateSnapshot {
            upstream_connected: self.is_connected(),
            reconnect_attempts: self.reconnect_attempts(),
            updates_relayed: self.updates_relayed(),
        }
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    fn record_reconnect(&self) {
        self.set_connected(false);
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    fn record_update(&self) {
        self.updates_relayed.fetch_add(1, Ordering::Relaxed);
    }
}

// =============================================================================
// Relay
// =============================================================================

/// Upstream connection settings.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// StreamTickers endpoint, e.g. `http://localhost:5001`.
    pub url: String,
    /// Fixed delay between connection attempts.
    pub reconnect_delay: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_UPSTREAM_URL.to_string(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

/// Upstream-to-hub relay.
pub struct UpstreamRelay {
    endpoint: Endpoint,
    reconnect_delay: Duration,
    sink: Arc<dyn TickerSink>,
    state: Arc<RelayState>,
}

impl UpstreamRelay {
    /// Validate the upstream URL and build the relay.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidEndpoint`] when the URL cannot be parsed.
    pub fn new(
        config: &UpstreamConfig,
        sink: Arc<dyn TickerSink>,
        state: Arc<RelayState>,
    ) -> Result<Self, RelayError> {
        let endpoint = Endpoint::from_shared(config.url.clone())
            .map_err(|source| RelayError::InvalidEndpoint {
                url: config.url.clone(),
                source,
            })?
            .http2_keep_alive_interval(KEEP_ALIVE_INTERVAL)
            .keep_alive_timeout(KEEP_ALIVE_TIMEOUT)
            .keep_alive_while_idle(true);

        Ok(Self {
            endpoint,
            reconnect_delay: config.reconnect_delay,
            sink,
            state,
        })
    }

    /// Reconnect loop. Runs until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                break;
            }

            match self.connect_and_relay(&cancel).await {
                Ok(()) => break,
                Err(e) => {
                    self.state.record_reconnect();
                    tracing::warn!(
                        error = %e,
                        attempt = self.state.reconnect_attempts(),
                        delay_ms = self.reconnect_delay.as_millis(),
                        "upstream stream lost, reconnecting"
                    );

                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(self.reconnect_delay) => {}
                    }
                }
            }
        }

        self.state.set_connected(false);
        tracing::info!("upstream relay stopped");
    }

    /// Open one stream and relay until it fails or `cancel` fires.
    ///
    /// `Ok` only on cancellation; a stream the server finishes is an error.
    async fn connect_and_relay(&self, cancel: &CancellationToken) -> Result<(), RelayError> {
        tracing::info!(url = %self.endpoint.uri(), "connecting to market data service");

        let channel = tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            result = self.endpoint.connect() => result?,
        };
        let mut client = MarketDataStreamerClient::new(channel);

        let request = TickerSubscription {
            symbol: String::new(),
        };
        let response = tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            result = client.stream_tickers(request) => result?,
        };
        let mut stream = response.into_inner();

        self.state.set_connected(true);
        tracing::info!("upstream ticker stream open");

        loop {
            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                message = stream.message() => match message? {
                    Some(update) => self.relay(TickerPayload::from(update)),
                    None => return Err(RelayError::StreamEnded),
                },
            }
        }
    }

    fn relay(&self, payload: TickerPayload) {
        self.state.record_update();
        let Some(group) = group_key(&payload.symbol) else {
            tracing::debug!("dropping update without symbol");
            return;
        };
        let delivered = self.sink.publish(&group, &payload);
        tracing::trace!(group = %group, delivered, "ticker update relayed");
    }
}

// =============================================================================
// Tests
// =============================================================================
