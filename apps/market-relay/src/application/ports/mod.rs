//! Relay Ports
//!
//! The upstream loop hands every update to a [`TickerSink`]; the websocket
//! hub is the production implementation.

use crate::domain::TickerPayload;

/// Destination for relayed ticker updates.
pub trait TickerSink: Send + Sync {
    /// Deliver `payload` to every member of `group`.
    ///
    /// Returns the number of members the update was queued for.
    fn publish(&self, group: &str, payload: &TickerPayload) -> usize;
}
