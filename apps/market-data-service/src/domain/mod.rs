//! Domain Layer - Core price feed types.
//!
//! Pure types with no I/O: ticks, derived updates, symbol filters and
//! per-symbol statistics.

/// Ticks, derived updates and symbol filters.
pub mod tick;

/// Per-symbol feed statistics.
pub mod stats;
