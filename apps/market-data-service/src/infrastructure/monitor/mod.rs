//! Feed Monitor
//!
//! Passive broadcaster subscriber that keeps per-symbol [`SymbolStats`]
//! for the diagnostics endpoint. It never touches feed state; a failure
//! here ends only the monitor's own loop.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::domain::stats::SymbolStats;
use crate::domain::tick::Tick;
use crate::infrastructure::broadcast::Broadcaster;

/// Summary log cadence per symbol.
const SUMMARY_EVERY: u64 = 100;

/// Per-symbol statistics aggregated from the tick stream.
#[derive(Debug, Default)]
pub struct FeedMonitor {
    stats: DashMap<String, SymbolStats>,
}

impl FeedMonitor {
    /// Create an empty monitor.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Consume a broadcaster subscription until it ends or `cancel` fires.
    pub async fn run(self: Arc<Self>, broadcaster: Arc<Broadcaster>, cancel: CancellationToken) {
        let mut ticks = broadcaster.subscribe();
        tracing::info!(subscriber = %ticks.id(), "feed monitor started");

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                next = ticks.next() => match next {
                    Some(tick) => self.record(&tick, Utc::now()),
                    None => break,
                },
            }
        }

        tracing::info!(symbols = self.stats.len(), "feed monitor stopped");
    }

    /// Fold one tick into the stats for its symbol.
    pub fn record(&self, tick: &Tick, at: DateTime<Utc>) {
        let mut entry = self
            .stats
            .entry(tick.symbol().to_string())
            .and_modify(|stats| stats.record(tick.price(), at))
            .or_insert_with(|| SymbolStats::first(tick.symbol(), tick.price(), at));

        let stats = entry.value_mut();
        if stats.update_count == 1 {
            tracing::info!(symbol = %stats.symbol, price = %stats.last_price, "first update");
        } else if stats.update_count % SUMMARY_EVERY == 0 {
            tracing::info!(
                symbol = %stats.symbol,
                updates = stats.update_count,
                price = %stats.last_price,
                rate = format!("{:.2}/sec", stats.update_rate()),
                "feed summary"
            );
        }
    }

    /// Copy of the current stats, sorted by symbol.
    #[must_use]
    pub fn snapshot(&self) -> Vec<SymbolStats> {
        let mut out: Vec<SymbolStats> = self.stats.iter().map(|e| e.value().clone()).collect();
        out.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        out
    }

    /// Stats for one symbol, if seen.
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<SymbolStats> {
        self.stats
            .get(&symbol.to_uppercase())
            .map(|e| e.value().clone())
    }

    /// Number of symbols seen.
    #[must_use]
    pub fn symbol_count(&self) -> usize {
        self.stats.len()
    }
}
