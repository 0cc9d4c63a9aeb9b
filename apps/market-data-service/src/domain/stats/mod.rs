//! Per-Symbol Feed Statistics
//!
//! Counters aggregated by the feed monitor for diagnostics.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// Update counters for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolStats {
    /// Uppercase symbol.
    pub symbol: String,
    /// Number of ticks observed.
    pub update_count: u64,
    /// Most recent price.
    pub last_price: Decimal,
    /// Time of the first observation. Set once.
    pub first_update_time: DateTime<Utc>,
    /// Time of the most recent observation.
    pub last_update_time: DateTime<Utc>,
}

impl SymbolStats {
    /// Start counters from a first observation.
    #[must_use]
    pub fn first(symbol: &str, price: Decimal, at: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.to_string(),
            update_count: 1,
            last_price: price,
            first_update_time: at,
            last_update_time: at,
        }
    }

    /// Record a subsequent observation.
    pub fn record(&mut self, price: Decimal, at: DateTime<Utc>) {
        self.update_count += 1;
        self.last_price = price;
        self.last_update_time = at;
    }

    /// Updates per second between the first and last observation.
    ///
    /// Zero when no time has elapsed.
    #[must_use]
    pub fn update_rate(&self) -> f64 {
        let elapsed = self.last_update_time - self.first_update_time;
        #[allow(clippy::cast_precision_loss)]
        let elapsed_secs = elapsed.num_milliseconds() as f64 / 1_000.0;
        if elapsed_secs <= 0.0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let count = self.update_count as f64;
        count / elapsed_secs
    }
}
