//! Application Layer - Port definitions.

/// Outbound port for relayed updates.
pub mod ports;
