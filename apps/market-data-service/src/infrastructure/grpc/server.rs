//! gRPC Streaming Server Implementation
//!
//! Implements the `MarketDataStreamer` service on top of the
//! [`Broadcaster`].

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use futures::{Stream, StreamExt, future};
use rust_decimal::Decimal;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tonic::{Request, Response, Status};

use marketpulse_proto::v1::market_data_streamer_server::{
    MarketDataStreamer, MarketDataStreamerServer,
};
use marketpulse_proto::v1::{TickerSubscription, TickerUpdate};

use crate::domain::tick::{SymbolFilter, Tick, TickUpdate};
use crate::infrastructure::broadcast::Broadcaster;
use crate::infrastructure::metrics;

// =============================================================================
// Type Aliases
// =============================================================================

type StreamResult<T> = Result<Response<T>, Status>;
type BoxedStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send>>;

/// Default spread applied around the last price.
pub const DEFAULT_FIXED_SPREAD: Decimal = Decimal::TEN;

// =============================================================================
// Errors
// =============================================================================

/// Errors from running the gRPC server.
#[derive(Debug, thiserror::Error)]
pub enum GrpcServerError {
    /// Failed to bind the listen address.
    #[error("failed to bind gRPC listener: {0}")]
    Bind(#[from] std::io::Error),

    /// Transport error while serving.
    #[error("gRPC transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

// =============================================================================
// Server Configuration
// =============================================================================

/// Configuration for the streaming service.
#[derive(Debug, Clone, Copy)]
pub struct StreamerConfig {
    /// Full spread; half is applied to each side of the last price.
    pub fixed_spread: Decimal,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            fixed_spread: DEFAULT_FIXED_SPREAD,
        }
    }
}

// =============================================================================
// Service
// =============================================================================

/// gRPC `MarketDataStreamer` implementation.
#[derive(Debug, Clone)]
pub struct MarketDataStreamerService {
    config: StreamerConfig,
    broadcaster: Arc<Broadcaster>,
    active_calls: Arc<AtomicUsize>,
}

impl MarketDataStreamerService {
    /// Create the service over a shared broadcaster.
    #[must_use]
    pub fn new(config: StreamerConfig, broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            config,
            broadcaster,
            active_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of open `StreamTickers` calls.
    #[must_use]
    pub fn active_calls(&self) -> usize {
        self.active_calls.load(Ordering::Relaxed)
    }

    /// Wrap in the generated tonic server.
    #[must_use]
    pub fn into_server(self) -> MarketDataStreamerServer<Self> {
        MarketDataStreamerServer::new(self)
    }

    /// Serve on an already bound listener until `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails.
    pub async fn serve(
        self,
        listener: TcpListener,
        cancel: CancellationToken,
    ) -> Result<(), GrpcServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(%addr, "gRPC server listening");

        Server::builder()
            .add_service(self.into_server())
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), cancel.cancelled_owned())
            .await?;

        tracing::info!("gRPC server stopped");
        Ok(())
    }
}

#[tonic::async_trait]
impl MarketDataStreamer for MarketDataStreamerService {
    type StreamTickersStream = BoxedStream<TickerUpdate>;

    async fn stream_tickers(
        &self,
        request: Request<TickerSubscription>,
    ) -> StreamResult<Self::StreamTickersStream> {
        let filter = SymbolFilter::parse(&request.into_inner().symbol);
        let request_id = uuid::Uuid::new_v4();
        let subscription = self.broadcaster.subscribe();

        let guard = CallGuard::open(Arc::clone(&self.active_calls), request_id);
        tracing::info!(
            %request_id,
            subscriber = %subscription.id(),
            filter = ?filter,
            "ticker stream opened"
        );

        let spread = self.config.fixed_spread;
        let stream = subscription
            .filter(move |tick| future::ready(filter.matches(tick.symbol())))
            .map(move |tick| {
                let _call = &guard;
                metrics::record_update_streamed();
                Ok(to_proto(&tick, spread))
            });

        Ok(Response::new(Box::pin(stream) as Self::StreamTickersStream))
    }
}

/// Tracks one open call; logs and decrements on drop.
#[derive(Debug)]
struct CallGuard {
    active: Arc<AtomicUsize>,
    request_id: uuid::Uuid,
}

impl CallGuard {
    fn open(active: Arc<AtomicUsize>, request_id: uuid::Uuid) -> Self {
        let count = active.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::set_grpc_clients(count);
        Self { active, request_id }
    }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        let count = self.active.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
        metrics::set_grpc_clients(count);
        tracing::debug!(request_id = %self.request_id, "ticker stream closed");
    }
}

/// Derive the wire update for a tick at the current time.
#[must_use]
pub fn to_proto(tick: &Tick, spread: Decimal) -> TickerUpdate {
    let update = TickUpdate::derive(tick, spread, Utc::now());
    TickerUpdate {
        symbol: update.symbol,
        last_price: update.last_price,
        bid_price: update.bid_price,
        ask_price: update.ask_price,
        ts_unix_ms: update.ts_unix_ms,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::time::Duration;

    use super::*;

    fn tick(symbol: &str, price: &str) -> Tick {
        Tick::now(symbol, Decimal::from_str(price).unwrap()).unwrap()
    }

    #[test]
    fn to_proto_applies_half_spread() {
        let update = to_proto(&tick("BTCUSDT", "43000"), Decimal::TEN);
        assert_eq!(update.symbol, "BTCUSDT");
        assert!((update.bid_price - 42_995.0).abs() < f64::EPSILON);
        assert!((update.ask_price - 43_005.0).abs() < f64::EPSILON);
        assert!(update.ts_unix_ms > 0);
    }

    #[tokio::test]
    async fn stream_filters_and_releases_subscription() {
        let hub = Broadcaster::with_defaults();
        let service = MarketDataStreamerService::new(StreamerConfig::default(), Arc::clone(&hub));

        let response = service
            .stream_tickers(Request::new(TickerSubscription {
                symbol: "ethusdt".to_string(),
            }))
            .await
            .unwrap();
        let mut stream = response.into_inner();
        assert_eq!(hub.subscriber_count(), 1);
        assert_eq!(service.active_calls(), 1);

        hub.broadcast(&tick("BTCUSDT", "43000"));
        hub.broadcast(&tick("ETHUSDT", "3200"));

        let update = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(update.symbol, "ETHUSDT");
        assert!((update.bid_price - 3_195.0).abs() < f64::EPSILON);

        drop(stream);
        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(service.active_calls(), 0);
    }

    #[tokio::test]
    async fn stream_ends_when_broadcaster_closes() {
        let hub = Broadcaster::with_defaults();
        let service = MarketDataStreamerService::new(StreamerConfig::default(), Arc::clone(&hub));
        let mut stream = service
            .stream_tickers(Request::new(TickerSubscription::default()))
            .await
            .unwrap()
            .into_inner();

        hub.close_all();
        assert!(stream.next().await.is_none());
    }
}
