#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::cast_possible_truncation
    )
)]

//! Market Data Service - Tick Fan-out
//!
//! Owns a single price feed and fans its ticks out to any number of
//! independent subscribers: remote gRPC callers streaming tickers and the
//! in-process feed monitor.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core price types
//!   - `tick`: Ticks, bid/ask updates and symbol filters
//!   - `stats`: Per-symbol counters
//!
//! - **Application**: Port definitions
//!   - `ports`: The `FeedSource` capability
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `feeds`: Synthetic generator and exchange trade stream
//!   - `broadcast`: Per-subscriber queues with drop-on-full
//!   - `grpc`: `MarketDataStreamer` server
//!   - `monitor`: Feed statistics subscriber
//!   - `config`: Environment configuration
//!   - `health`: Health, info, stats and metrics endpoint
//!
//! # Data Flow
//!
//! ```text
//!                                    ┌──► StreamTickers caller 1
//! FeedSource ──► Broadcaster ────────┼──► StreamTickers caller N
//!   (one task)   (inline fan-out)    └──► FeedMonitor ──► /stats
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core price types with no I/O.
pub mod domain;

/// Application layer - Port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::stats::SymbolStats;
pub use domain::tick::{SymbolFilter, Tick, TickError, TickUpdate};

// Ports
pub use application::ports::{FeedSource, TickStream};

// Infrastructure config
pub use infrastructure::config::{
    BinanceSettings, BroadcastSettings, ConfigError, FeedSettings, FeedSourceKind, ServerSettings,
    ServiceConfig,
};

// Feed sources
pub use infrastructure::feeds::{
    ConnectionState, ExchangeFeed, ExchangeFeedConfig, FeedState, SharedFeedState, SyntheticFeed,
    SyntheticFeedConfig,
};

// Broadcaster
pub use infrastructure::broadcast::{Broadcaster, SubscriberId, Subscription};

// gRPC server (for integration tests)
pub use infrastructure::grpc::{MarketDataStreamerService, StreamerConfig, proto};

// Monitor and HTTP surface
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};
pub use infrastructure::monitor::FeedMonitor;

// Metrics
pub use infrastructure::metrics::{SourceLabel as MetricsSourceLabel, init_metrics};

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
