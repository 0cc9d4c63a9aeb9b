#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines
    )
)]

//! Market Relay - Ticker Groups over Websockets
//!
//! Holds one all-symbols `StreamTickers` call against the market data
//! service and republishes each update to the websocket clients that joined
//! the update's symbol group.
//!
//! # Layers
//!
//! - **Domain**: `TickerPayload` and group naming
//! - **Application**: The `TickerSink` port
//! - **Infrastructure**: Upstream loop, group hub, websocket/HTTP surface,
//!   configuration and logging
//!
//! # Data Flow
//!
//! ```text
//! MarketDataStreamer ──► UpstreamRelay ──► GroupHub ──┬──► "BTCUSDT" members
//!   (empty filter)        (2s retry)                  └──► "ETHUSDT" members
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Domain layer - Relayed ticker types.
pub mod domain;

/// Application layer - Port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

pub use application::ports::TickerSink;
pub use domain::{TickerPayload, group_key};
pub use infrastructure::config::RelayConfig;
pub use infrastructure::http::{HttpServerError, RelayHttpServer, RelayHttpState};
pub use infrastructure::hub::{ConnectionId, GroupHub, HubError};
pub use infrastructure::protocol::{ClientMessage, ServerEvent};
pub use infrastructure::upstream::{
    RelayError, RelayState, RelayStateSnapshot, UpstreamConfig, UpstreamRelay,
};
