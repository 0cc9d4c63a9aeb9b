//! Port Interfaces
//!
//! ## Driven Ports (Outbound)
//!
//! - [`FeedSource`]: produces the tick sequence consumed by the broadcaster.
//!   Implemented by the synthetic generator and the exchange adapter.

use std::pin::Pin;

use futures::Stream;
use tokio_util::sync::CancellationToken;

use crate::domain::tick::Tick;

/// Lazily evaluated, unbounded sequence of ticks.
pub type TickStream = Pin<Box<dyn Stream<Item = Tick> + Send>>;

/// A producer of price ticks for a fixed set of symbols.
///
/// Each call to [`FeedSource::produce`] starts an independent session; it
/// never replays ticks from an earlier session. Transient failures are
/// retried inside the source and never surface as stream errors. The
/// sequence ends only once `cancel` fires.
pub trait FeedSource: Send + Sync {
    /// Short source name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Uppercase symbols this source produces ticks for.
    fn symbols(&self) -> &[String];

    /// Start a new tick session.
    fn produce(&self, cancel: CancellationToken) -> TickStream;
}
