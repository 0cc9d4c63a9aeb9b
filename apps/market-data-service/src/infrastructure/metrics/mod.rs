//! Prometheus Metrics Module
//!
//! Exposes feed and fan-out metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Ticks**: produced by the active source, streamed to callers and
//!   dropped for slow subscribers
//! - **Subscribers**: live broadcaster subscriptions and streaming callers
//! - **Feed**: exchange connection state, reconnects and malformed messages
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the HTTP port.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "marketpulse_ticks_produced_total",
        "Ticks produced by the active feed source"
    );
    describe_counter!(
        "marketpulse_updates_streamed_total",
        "Ticker updates written to StreamTickers callers"
    );
    describe_counter!(
        "marketpulse_ticks_dropped_total",
        "Ticks dropped because a subscriber queue was full"
    );

    describe_gauge!(
        "marketpulse_subscribers",
        "Live broadcaster subscriptions"
    );
    describe_gauge!(
        "marketpulse_grpc_clients",
        "Active StreamTickers calls"
    );

    describe_gauge!(
        "marketpulse_feed_connected",
        "1 while the exchange stream is connected"
    );
    describe_counter!(
        "marketpulse_feed_reconnects_total",
        "Exchange stream reconnection attempts"
    );
    describe_counter!(
        "marketpulse_feed_malformed_total",
        "Exchange messages discarded as malformed"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric label for the active source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceLabel {
    /// Synthetic random-walk generator.
    Synthetic,
    /// Exchange trade stream.
    Exchange,
}

impl SourceLabel {
    /// Label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Synthetic => "synthetic",
            Self::Exchange => "exchange",
        }
    }
}

/// Record a tick produced by a source.
pub fn record_tick_produced(source: SourceLabel) {
    counter!(
        "marketpulse_ticks_produced_total",
        "source" => source.as_str()
    )
    .increment(1);
}

/// Record a ticker update written to a streaming caller.
pub fn record_update_streamed() {
    counter!("marketpulse_updates_streamed_total").increment(1);
}

/// Record ticks dropped for a slow subscriber.
pub fn record_ticks_dropped(count: u64) {
    counter!("marketpulse_ticks_dropped_total").increment(count);
}

/// Update the live subscription count.
#[allow(clippy::cast_precision_loss)]
pub fn set_subscribers(count: usize) {
    gauge!("marketpulse_subscribers").set(count as f64);
}

/// Update the active streaming caller count.
#[allow(clippy::cast_precision_loss)]
pub fn set_grpc_clients(count: usize) {
    gauge!("marketpulse_grpc_clients").set(count as f64);
}

/// Update the exchange connection state.
pub fn set_feed_connected(connected: bool) {
    gauge!("marketpulse_feed_connected").set(if connected { 1.0 } else { 0.0 });
}

/// Record an exchange reconnection attempt.
pub fn record_reconnect() {
    counter!("marketpulse_feed_reconnects_total").increment(1);
}

/// Record a discarded exchange message.
pub fn record_malformed_message(reason: &'static str) {
    counter!(
        "marketpulse_feed_malformed_total",
        "reason" => reason
    )
    .increment(1);
}

// =============================================================================
// Tests
// =============================================================================
