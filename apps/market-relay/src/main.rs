//! Market Relay Binary
//!
//! # Environment Variables
//!
//! - `RELAY_UPSTREAM_GRPC_URL`: Market data service endpoint (default: http://localhost:5001)
//! - `RELAY_RECONNECT_DELAY_MS`: Delay between upstream attempts (default: 2000)
//! - `RELAY_HTTP_PORT`: Hub, snapshot and health port (default: 5000)
//! - `RELAY_CLIENT_CAPACITY`: Per-client outbound queue bound (default: 256)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use market_relay::infrastructure::telemetry;
use market_relay::{GroupHub, RelayConfig, RelayHttpServer, RelayHttpState, RelayState, UpstreamRelay};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_dotenv();
    telemetry::init();

    let config = RelayConfig::from_env();
    tracing::info!(
        upstream = %config.upstream.url,
        reconnect_delay_ms = config.upstream.reconnect_delay.as_millis(),
        http_port = config.http_port,
        client_capacity = config.client_capacity,
        "Starting Market Relay"
    );

    let shutdown_token = CancellationToken::new();
    let hub = GroupHub::new(config.client_capacity);
    let relay_state = RelayState::new();

    let relay = UpstreamRelay::new(&config.upstream, hub.clone(), Arc::clone(&relay_state))?;

    let http_state = Arc::new(RelayHttpState::new(
        Arc::clone(&hub),
        relay_state,
        shutdown_token.clone(),
    ));
    let http_server = RelayHttpServer::new(config.http_port, http_state);

    let relay_task = tokio::spawn(relay.run(shutdown_token.clone()));
    let http_task = tokio::spawn(async move {
        if let Err(e) = http_server.run().await {
            tracing::error!(error = %e, "relay HTTP server error");
        }
    });

    await_shutdown(shutdown_token).await;

    let joined = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        let _ = relay_task.await;
        let _ = http_task.await;
    })
    .await;
    if joined.is_err() {
        tracing::warn!("Shutdown timed out with tasks still running");
    }

    tracing::info!("Market Relay stopped");
    Ok(())
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
        () = ctrl_c => tracing::info!("Received Ctrl+C, initiating shutdown"),
        () = terminate => tracing::info!("Received SIGTERM, initiating shutdown"),
    }

    shutdown_token.cancel();
}
