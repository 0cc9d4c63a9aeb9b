//! Exchange WebSocket Client
//!
//! Each produce session is a lazy stream that owns the websocket and runs
//! inside whichever task polls it, so fan-out happens in the same task that
//! reads the socket. Any connection loss or protocol error drops the socket,
//! waits the fixed reconnect delay and connects again until cancelled.
//! Dropping the stream ends the session. Errors are logged and never reach
//! the tick stream.

use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt, stream};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::messages::decode_trade;
use crate::application::ports::{FeedSource, TickStream};
use crate::domain::tick::{Tick, normalize_symbols};
use crate::infrastructure::feeds::reconnect::{DEFAULT_RECONNECT_DELAY, ReconnectPolicy};
use crate::infrastructure::feeds::synthetic::DEFAULT_SYMBOLS;
use crate::infrastructure::feeds::{ConnectionState, FeedState, SharedFeedState};
use crate::infrastructure::metrics::{self, SourceLabel};

/// Production combined-stream base URL.
pub const DEFAULT_BASE_URL: &str = "wss://stream.binance.com:9443";

/// Testnet combined-stream base URL.
pub const TESTNET_BASE_URL: &str = "wss://testnet.binance.vision";

// =============================================================================
// Error Type
// =============================================================================

/// Errors that end one connection attempt.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeFeedError {
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Server closed the connection.
    #[error("connection closed")]
    ConnectionClosed,
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the exchange feed.
#[derive(Debug, Clone)]
pub struct ExchangeFeedConfig {
    /// Base websocket URL without path.
    pub base_url: String,
    /// Uppercase, deduplicated symbols.
    pub symbols: Vec<String>,
    /// Fixed delay between reconnection attempts.
    pub reconnect_delay: Duration,
}

impl Default for ExchangeFeedConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL, DEFAULT_SYMBOLS)
    }
}

impl ExchangeFeedConfig {
    /// Create a configuration, falling back to the default symbols when the
    /// list is empty after normalization.
    #[must_use]
    pub fn new<I, S>(base_url: &str, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut symbols = normalize_symbols(symbols);
        if symbols.is_empty() {
            symbols = normalize_symbols(DEFAULT_SYMBOLS);
        }
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            symbols,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    /// Set the reconnect delay.
    #[must_use]
    pub const fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Combined-stream URL subscribing to trades for every symbol.
    #[must_use]
    pub fn stream_url(&self) -> String {
        let streams = self
            .symbols
            .iter()
            .map(|symbol| format!("{}@trade", symbol.to_lowercase()))
            .collect::<Vec<_>>()
            .join("/");
        format!("{}/stream?streams={streams}", self.base_url)
    }
}

// =============================================================================
// Feed Source
// =============================================================================

/// Exchange trade stream [`FeedSource`].
#[derive(Debug)]
pub struct ExchangeFeed {
    config: ExchangeFeedConfig,
    state: SharedFeedState,
}

impl ExchangeFeed {
    /// Create an exchange feed.
    #[must_use]
    pub fn new(config: ExchangeFeedConfig) -> Self {
        Self {
            config,
            state: FeedState::new(SourceLabel::Exchange),
        }
    }

    /// Shared lifecycle state.
    #[must_use]
    pub fn state(&self) -> SharedFeedState {
        SharedFeedState::clone(&self.state)
    }
}

impl FeedSource for ExchangeFeed {
    fn name(&self) -> &'static str {
        "binance"
    }

    fn symbols(&self) -> &[String] {
        &self.config.symbols
    }

    fn produce(&self, cancel: CancellationToken) -> TickStream {
        let session = ExchangeSession {
            url: self.config.stream_url(),
            policy: ReconnectPolicy::new(self.config.reconnect_delay),
            state: SharedFeedState::clone(&self.state),
            cancel,
            socket: None,
            retry_delay: None,
        };

        Box::pin(stream::unfold(session, |mut session| async move {
            let tick = session.next_tick().await?;
            Some((tick, session))
        }))
    }
}

// =============================================================================
// Session
// =============================================================================

type ExchangeSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One produce session. Polled inline by the stream consumer; dropping the
/// stream drops the socket and ends all reconnect activity.
struct ExchangeSession {
    url: String,
    policy: ReconnectPolicy,
    state: SharedFeedState,
    cancel: CancellationToken,
    socket: Option<ExchangeSocket>,
    /// Set after a connection loss; waited out before the next connect.
    retry_delay: Option<Duration>,
}

impl ExchangeSession {
    /// Next decoded tick, reconnecting as needed. `None` once cancelled.
    async fn next_tick(&mut self) -> Option<Tick> {
        loop {
            if self.cancel.is_cancelled() {
                self.close().await;
                return None;
            }

            if self.socket.is_none() {
                if let Some(delay) = self.retry_delay.take() {
                    tokio::select! {
                        () = self.cancel.cancelled() => {
                            tracing::info!("exchange feed cancelled during reconnect delay");
                            return None;
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }

                match self.connect().await {
                    Ok(Some(socket)) => self.socket = Some(socket),
                    Ok(None) => return None,
                    Err(e) => {
                        self.connection_lost(&e);
                        continue;
                    }
                }
            }

            let Some(socket) = self.socket.as_mut() else {
                continue;
            };

            let frame = tokio::select! {
                () = self.cancel.cancelled() => continue,
                frame = socket.next() => frame,
            };

            match frame {
                Some(Ok(Message::Text(text))) => match decode_trade(text.as_str(), Utc::now()) {
                    Ok(tick) => {
                        self.state.record_tick();
                        return Some(tick);
                    }
                    Err(e) => {
                        metrics::record_malformed_message(e.reason());
                        tracing::debug!(error = %e, "dropping malformed exchange message");
                    }
                },
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = socket.send(Message::Pong(data)).await {
                        self.connection_lost(&e.into());
                    }
                }
                Some(Ok(Message::Close(_))) => {
                    tracing::info!("server sent close frame");
                    self.connection_lost(&ExchangeFeedError::ConnectionClosed);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => self.connection_lost(&e.into()),
                None => {
                    tracing::info!("exchange stream ended");
                    self.connection_lost(&ExchangeFeedError::ConnectionClosed);
                }
            }
        }
    }

    /// Open the websocket. `Ok(None)` when cancelled first.
    async fn connect(&mut self) -> Result<Option<ExchangeSocket>, ExchangeFeedError> {
        tracing::info!(url = %self.url, "connecting to exchange stream");
        self.state.set_connection(ConnectionState::Connecting);

        let connect = tokio_tungstenite::connect_async(self.url.as_str());
        let (socket, _response) = tokio::select! {
            () = self.cancel.cancelled() => return Ok(None),
            result = connect => result?,
        };

        self.state.set_connection(ConnectionState::Connected);
        self.policy.reset();
        tracing::info!("exchange stream connected");
        Ok(Some(socket))
    }

    fn connection_lost(&mut self, error: &ExchangeFeedError) {
        self.socket = None;
        let delay = self.policy.next_delay();
        self.retry_delay = Some(delay);
        self.state.record_reconnect();
        tracing::warn!(
            error = %error,
            attempt = self.policy.attempt_count(),
            delay_ms = delay.as_millis(),
            "exchange connection lost, reconnecting"
        );
    }

    async fn close(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            let _ = socket.close(None).await;
        }
    }
}

impl Drop for ExchangeSession {
    fn drop(&mut self) {
        self.state.set_connection(ConnectionState::Stopped);
        tracing::info!("exchange feed stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_url_lowercases_and_dedups() {
        let config = ExchangeFeedConfig::new(DEFAULT_BASE_URL, ["BTCUSDT", "ethusdt", "btcusdt"]);
        assert_eq!(
            config.stream_url(),
            "wss://stream.binance.com:9443/stream?streams=btcusdt@trade/ethusdt@trade"
        );
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let config = ExchangeFeedConfig::new("wss://testnet.binance.vision/", ["SOLUSDT"]);
        assert_eq!(
            config.stream_url(),
            "wss://testnet.binance.vision/stream?streams=solusdt@trade"
        );
    }

    #[test]
    fn empty_symbols_use_defaults() {
        let config = ExchangeFeedConfig::new(DEFAULT_BASE_URL, Vec::<String>::new());
        assert_eq!(config.symbols.len(), 5);
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
    }

    fn unreachable_feed() -> ExchangeFeed {
        // port 9 is discard; nothing listens there in the test environment
        ExchangeFeed::new(
            ExchangeFeedConfig::new("ws://127.0.0.1:9", ["BTCUSDT"])
                .with_reconnect_delay(Duration::from_millis(20)),
        )
    }

    #[tokio::test]
    async fn unreachable_upstream_keeps_retrying_until_cancelled() {
        let feed = unreachable_feed();
        let cancel = CancellationToken::new();
        let mut ticks = feed.produce(cancel.clone());

        let pending = tokio::time::timeout(Duration::from_millis(150), ticks.next()).await;
        assert!(pending.is_err());
        assert!(feed.state().reconnect_attempts() >= 2);

        cancel.cancel();
        let end = tokio::time::timeout(Duration::from_secs(1), ticks.next())
            .await
            .unwrap();
        assert!(end.is_none());
        assert_eq!(feed.state().connection(), ConnectionState::Stopped);
    }

    #[tokio::test]
    async fn nothing_happens_until_polled() {
        let feed = unreachable_feed();
        let _ticks = feed.produce(CancellationToken::new());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(feed.state().reconnect_attempts(), 0);
        assert_eq!(feed.state().connection(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn dropping_stream_stops_reconnecting() {
        let feed = unreachable_feed();
        let mut ticks = feed.produce(CancellationToken::new());

        let _ = tokio::time::timeout(Duration::from_millis(100), ticks.next()).await;
        let attempts = feed.state().reconnect_attempts();
        assert!(attempts >= 1);

        drop(ticks);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(feed.state().reconnect_attempts(), attempts);
        assert_eq!(feed.state().connection(), ConnectionState::Stopped);
    }
}
