//! Configuration Module
//!
//! Configuration loading for the market data service.

mod settings;

pub use settings::{
    BinanceSettings, BroadcastSettings, ConfigError, FeedSettings, FeedSourceKind, ServerSettings,
    ServiceConfig,
};
