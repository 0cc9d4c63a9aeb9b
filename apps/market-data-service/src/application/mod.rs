//! Application Layer - Port definitions.
//!
//! Defines the capabilities the broadcaster depends on, implemented by
//! infrastructure adapters and selected at startup.

/// Port interfaces for tick producers.
pub mod ports;
