//! Market Data Service Binary
//!
//! Starts the tick broadcaster, the gRPC streaming server and the HTTP
//! surface.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin market-data-service
//! ```
//!
//! # Environment Variables
//!
//! - `MARKET_DATA_SOURCE`: mock | binance (default: mock)
//! - `MARKET_DATA_SYMBOLS`: Comma-separated symbols (default: BTCUSDT,ETHUSDT,SOLUSDT,BNBUSDT,XRPUSDT)
//! - `MARKET_DATA_TICK_INTERVAL_MS`: Synthetic cadence (default: 200)
//! - `MARKET_DATA_FIXED_SPREAD`: Bid/ask spread (default: 10)
//! - `MARKET_DATA_SUBSCRIBER_CAPACITY`: Per-subscriber queue bound (default: 1024)
//! - `MARKET_DATA_GRPC_PORT`: gRPC server port (default: 5001)
//! - `MARKET_DATA_HTTP_PORT`: Health/stats/metrics port (default: 5002)
//! - `BINANCE_WS_URL`: Exchange base URL (default: wss://stream.binance.com:9443)
//! - `BINANCE_USE_TESTNET`: Use the testnet base URL (default: false)
//! - `BINANCE_RECONNECT_DELAY_SECS`: Reconnect delay (default: 5)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use market_data_service::infrastructure::telemetry;
use market_data_service::{
    Broadcaster, ExchangeFeed, FeedMonitor, FeedSource, FeedSourceKind, HealthServer,
    HealthServerState, MarketDataStreamerService, ServiceConfig, SharedFeedState, StreamerConfig,
    SyntheticFeed, init_metrics,
};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Market Data Service");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = ServiceConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let (source, feed_state) = build_source(&config);
    let broadcaster = Broadcaster::new(config.broadcast.subscriber_capacity);
    let monitor = FeedMonitor::new();

    // Bind before spawning so a taken port aborts startup
    let grpc_listener = TcpListener::bind(config.server.grpc_addr()).await?;

    let health_state = Arc::new(HealthServerState::new(
        config.source.as_str(),
        source.symbols().to_vec(),
        feed_state,
        Arc::clone(&broadcaster),
        Arc::clone(&monitor),
    ));
    let health_server = HealthServer::new(
        config.server.http_port,
        health_state,
        shutdown_token.clone(),
    );

    let streamer = MarketDataStreamerService::new(
        StreamerConfig {
            fixed_spread: config.broadcast.fixed_spread,
        },
        Arc::clone(&broadcaster),
    );

    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    tasks.push(tokio::spawn(
        Arc::clone(&monitor).run(Arc::clone(&broadcaster), shutdown_token.clone()),
    ));

    tasks.push(tokio::spawn(
        Arc::clone(&broadcaster).run(source, shutdown_token.clone()),
    ));

    let grpc_shutdown = shutdown_token.clone();
    tasks.push(tokio::spawn(async move {
        if let Err(e) = streamer.serve(grpc_listener, grpc_shutdown).await {
            tracing::error!(error = %e, "gRPC server error");
        }
    }));

    tasks.push(tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "HTTP server error");
        }
    }));

    tracing::info!("Market Data Service ready");

    await_shutdown(shutdown_token).await;

    let joined = tokio::time::timeout(SHUTDOWN_TIMEOUT, futures::future::join_all(tasks)).await;
    if joined.is_err() {
        tracing::warn!("Shutdown timed out with tasks still running");
    }

    tracing::info!("Market Data Service stopped");
    Ok(())
}

/// Select the feed source named by the configuration.
fn build_source(config: &ServiceConfig) -> (Arc<dyn FeedSource>, SharedFeedState) {
    match config.source {
        FeedSourceKind::Mock => {
            let feed = SyntheticFeed::new(config.synthetic_config());
            let state = feed.state();
            let source: Arc<dyn FeedSource> = Arc::new(feed);
            (source, state)
        }
        FeedSourceKind::Binance => {
            let feed = ExchangeFeed::new(config.exchange_config());
            let state = feed.state();
            let source: Arc<dyn FeedSource> = Arc::new(feed);
            (source, state)
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &ServiceConfig) {
    tracing::info!(
        source = config.source.as_str(),
        symbols = ?config.feed.symbols,
        grpc_port = config.server.grpc_port,
        http_port = config.server.http_port,
        subscriber_capacity = config.broadcast.subscriber_capacity,
        fixed_spread = %config.broadcast.fixed_spread,
        "Configuration loaded"
    );
    if config.source == FeedSourceKind::Binance {
        tracing::debug!(
            stream_url = %config.exchange_config().stream_url(),
            "Exchange endpoint"
        );
    }
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
