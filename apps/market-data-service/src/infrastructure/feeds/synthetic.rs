//! Synthetic Feed
//!
//! Bounded random walk used when no exchange connection is wanted. Each
//! symbol is seeded once per session with a price in `[20000, 60000)`;
//! every cycle applies a uniform delta in `[-25, 25)` at cent resolution,
//! floors the result at zero and emits one tick per symbol.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{ConnectionState, FeedState, SharedFeedState};
use crate::application::ports::{FeedSource, TickStream};
use crate::domain::tick::{Tick, normalize_symbols};
use crate::infrastructure::metrics::SourceLabel;

/// Symbols used when none are configured.
pub const DEFAULT_SYMBOLS: [&str; 5] = ["BTCUSDT", "ETHUSDT", "SOLUSDT", "BNBUSDT", "XRPUSDT"];

/// Default generation cadence.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(200);

// Prices and deltas are sampled in cents.
const SEED_RANGE_CENTS: std::ops::Range<i64> = 2_000_000..6_000_000;
const DELTA_RANGE_CENTS: std::ops::Range<i64> = -2_500..2_500;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the synthetic feed.
#[derive(Debug, Clone)]
pub struct SyntheticFeedConfig {
    /// Uppercase, deduplicated symbols.
    pub symbols: Vec<String>,
    /// Time between generation cycles.
    pub interval: Duration,
    /// Fixed RNG seed. Sessions are seeded from the OS when `None`.
    pub seed: Option<u64>,
}

impl Default for SyntheticFeedConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SYMBOLS, DEFAULT_TICK_INTERVAL)
    }
}

impl SyntheticFeedConfig {
    /// Create a configuration, falling back to [`DEFAULT_SYMBOLS`] when the
    /// list is empty after normalization.
    #[must_use]
    pub fn new<I, S>(symbols: I, interval: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut symbols = normalize_symbols(symbols);
        if symbols.is_empty() {
            symbols = normalize_symbols(DEFAULT_SYMBOLS);
        }
        Self {
            symbols,
            interval,
            seed: None,
        }
    }

    /// Use a fixed RNG seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

// =============================================================================
// Random Walk
// =============================================================================

/// Apply a price delta, flooring the result at zero.
#[must_use]
pub fn apply_delta(price: Decimal, delta: Decimal) -> Decimal {
    (price + delta).max(Decimal::ZERO)
}

/// Per-symbol random-walk state for one session.
#[derive(Debug)]
pub struct RandomWalk {
    prices: Vec<(String, Decimal)>,
    rng: StdRng,
}

impl RandomWalk {
    /// Seed every symbol with a random starting price.
    #[must_use]
    pub fn seeded(symbols: &[String], mut rng: StdRng) -> Self {
        let prices = symbols
            .iter()
            .map(|symbol| {
                let cents = rng.random_range(SEED_RANGE_CENTS);
                (symbol.clone(), Decimal::new(cents, 2))
            })
            .collect();
        Self { prices, rng }
    }

    /// Start from explicit prices.
    #[must_use]
    pub const fn with_prices(prices: Vec<(String, Decimal)>, rng: StdRng) -> Self {
        Self { prices, rng }
    }

    /// Advance every symbol by one delta and emit one tick each.
    pub fn step(&mut self, at: DateTime<Utc>) -> Vec<Tick> {
        let mut ticks = Vec::with_capacity(self.prices.len());
        for (symbol, price) in &mut self.prices {
            let delta = Decimal::new(self.rng.random_range(DELTA_RANGE_CENTS), 2);
            *price = apply_delta(*price, delta);
            if let Ok(tick) = Tick::new(symbol, *price, at) {
                ticks.push(tick);
            }
        }
        ticks
    }

    /// Current price per symbol.
    #[must_use]
    pub fn prices(&self) -> &[(String, Decimal)] {
        &self.prices
    }
}

// =============================================================================
// Feed Source
// =============================================================================

/// Synthetic random-walk [`FeedSource`].
#[derive(Debug)]
pub struct SyntheticFeed {
    config: SyntheticFeedConfig,
    state: SharedFeedState,
}

impl SyntheticFeed {
    /// Create a synthetic feed.
    #[must_use]
    pub fn new(config: SyntheticFeedConfig) -> Self {
        Self {
            config,
            state: FeedState::new(SourceLabel::Synthetic),
        }
    }

    /// Shared lifecycle state.
    #[must_use]
    pub fn state(&self) -> SharedFeedState {
        SharedFeedState::clone(&self.state)
    }
}

impl FeedSource for SyntheticFeed {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn symbols(&self) -> &[String] {
        &self.config.symbols
    }

    fn produce(&self, cancel: CancellationToken) -> TickStream {
        let session = Session {
            config: self.config.clone(),
            state: SharedFeedState::clone(&self.state),
            cancel,
            walk: None,
            ticker: None,
        };

        let batches = stream::unfold(session, |mut session| async move {
            let batch = session.next_batch().await?;
            Some((batch, session))
        });

        Box::pin(batches.flat_map(stream::iter))
    }
}

/// One produce session. Seeded on first poll.
struct Session {
    config: SyntheticFeedConfig,
    state: SharedFeedState,
    cancel: CancellationToken,
    walk: Option<RandomWalk>,
    ticker: Option<Interval>,
}

impl Session {
    async fn next_batch(&mut self) -> Option<Vec<Tick>> {
        if self.walk.is_none() {
            let rng = self
                .config
                .seed
                .map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
            self.walk = Some(RandomWalk::seeded(&self.config.symbols, rng));
            self.state.set_connection(ConnectionState::Connected);
            tracing::info!(symbols = ?self.config.symbols, "synthetic feed started");
        }

        let period = self.config.interval;
        let ticker = self.ticker.get_or_insert_with(|| {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                self.state.set_connection(ConnectionState::Stopped);
                tracing::info!("synthetic feed stopped");
                return None;
            }
            _ = ticker.tick() => {}
        }

        let batch = self.walk.as_mut()?.step(Utc::now());
        for _ in &batch {
            self.state.record_tick();
        }
        Some(batch)
    }
}

// =============================================================================
// Tests
// =============================================================================
