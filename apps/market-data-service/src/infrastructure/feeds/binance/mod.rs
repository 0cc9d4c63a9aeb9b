//! Exchange Trade Stream
//!
//! Connects to the exchange's combined-stream websocket and turns trade
//! events into ticks.
//!
//! # Stream URL
//!
//! - Production: `wss://stream.binance.com:9443`
//! - Testnet: `wss://testnet.binance.vision`
//!
//! Subscriptions are encoded in the URL path:
//! `{base}/stream?streams=btcusdt@trade/ethusdt@trade`.

/// Connection loop and [`FeedSource`](crate::application::ports::FeedSource)
/// implementation.
pub mod client;

/// Combined stream wire types.
pub mod messages;

pub use client::{
    DEFAULT_BASE_URL, ExchangeFeed, ExchangeFeedConfig, ExchangeFeedError, TESTNET_BASE_URL,
};
pub use messages::{DecodeError, decode_trade};
