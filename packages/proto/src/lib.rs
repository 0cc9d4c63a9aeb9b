//! MarketPulse gRPC contract.
//!
//! Generated prost messages and tonic stubs for the `marketpulse.v1`
//! package. The market data service implements
//! [`v1::market_data_streamer_server::MarketDataStreamer`]; the relay consumes
//! it through [`v1::market_data_streamer_client::MarketDataStreamerClient`].

#![forbid(unsafe_code)]

/// `marketpulse.v1` package.
#[allow(
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::unwrap_used,
    clippy::expect_used
)]
pub mod v1 {
    include!(concat!(env!("OUT_DIR"), "/marketpulse.v1.rs"));
}

pub use v1::{TickerSubscription, TickerUpdate};
