//! Feed Source Adapters
//!
//! Concrete [`FeedSource`](crate::application::ports::FeedSource)
//! strategies:
//!
//! - [`synthetic`]: bounded random walk on a fixed cadence
//! - [`binance`]: combined trade stream from the exchange, with fixed-delay
//!   reconnection
//!
//! Both publish their lifecycle on a shared [`FeedState`] read by the health
//! endpoint.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::infrastructure::metrics::{self, SourceLabel};

/// Exchange trade stream adapter.
pub mod binance;

/// Fixed-delay reconnection policy.
pub mod reconnect;

/// Synthetic random-walk generator.
pub mod synthetic;

pub use binance::{ExchangeFeed, ExchangeFeedConfig, ExchangeFeedError};
pub use reconnect::ReconnectPolicy;
pub use synthetic::{SyntheticFeed, SyntheticFeedConfig};

// =============================================================================
// Feed State
// =============================================================================

/// Connection lifecycle of a feed source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No session started yet.
    Idle,
    /// Opening the upstream connection.
    Connecting,
    /// Producing ticks.
    Connected,
    /// Waiting out the reconnect delay after a loss.
    Reconnecting,
    /// Session ended by cancellation.
    Stopped,
}

impl ConnectionState {
    /// Get the state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Stopped => "stopped",
        }
    }
}

/// Shared lifecycle counters for the active feed source.
#[derive(Debug)]
pub struct FeedState {
    source: SourceLabel,
    connection: RwLock<ConnectionState>,
    reconnect_attempts: AtomicU64,
    ticks_produced: AtomicU64,
    last_tick_at: RwLock<Option<DateTime<Utc>>>,
}

/// Shared reference to a [`FeedState`].
pub type SharedFeedState = Arc<FeedState>;

impl FeedState {
    /// Create an idle state for `source`.
    #[must_use]
    pub fn new(source: SourceLabel) -> SharedFeedState {
        Arc::new(Self {
            source,
            connection: RwLock::new(ConnectionState::Idle),
            reconnect_attempts: AtomicU64::new(0),
            ticks_produced: AtomicU64::new(0),
            last_tick_at: RwLock::new(None),
        })
    }

    /// Source this state describes.
    #[must_use]
    pub const fn source(&self) -> SourceLabel {
        self.source
    }

    /// Current connection state.
    #[must_use]
    pub fn connection(&self) -> ConnectionState {
        *self.connection.read()
    }

    /// Move to a new connection state.
    pub fn set_connection(&self, state: ConnectionState) {
        *self.connection.write() = state;
        if self.source == SourceLabel::Exchange {
            metrics::set_feed_connected(state == ConnectionState::Connected);
        }
    }

    /// Count a reconnection attempt.
    pub fn record_reconnect(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
        self.set_connection(ConnectionState::Reconnecting);
        metrics::record_reconnect();
    }

    /// Count a produced tick.
    pub fn record_tick(&self) {
        self.ticks_produced.fetch_add(1, Ordering::Relaxed);
        *self.last_tick_at.write() = Some(Utc::now());
        metrics::record_tick_produced(self.source);
    }

    /// Total reconnection attempts.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }

    /// Total ticks produced.
    #[must_use]
    pub fn ticks_produced(&self) -> u64 {
        self.ticks_produced.load(Ordering::Relaxed)
    }

    /// Point-in-time copy for reporting.
    #[must_use]
    pub fn snapshot(&self) -> FeedStateSnapshot {
        FeedStateSnapshot {
            source: self.source.as_str(),
            connection: self.connection(),
            reconnect_attempts: self.reconnect_attempts(),
            ticks_produced: self.ticks_produced(),
            last_tick_at: *self.last_tick_at.read(),
        }
    }
}

/// Serializable copy of a [`FeedState`].
#[derive(Debug, Clone, Serialize)]
pub struct FeedStateSnapshot {
    /// Source name.
    pub source: &'static str,
    /// Connection state.
    pub connection: ConnectionState,
    /// Total reconnection attempts.
    pub reconnect_attempts: u64,
    /// Total ticks produced.
    pub ticks_produced: u64,
    /// Time the last tick was produced.
    pub last_tick_at: Option<DateTime<Utc>>,
}
