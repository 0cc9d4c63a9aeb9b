//! Service Configuration Settings
//!
//! Configuration types for the market data service, loaded from environment
//! variables. Values are read through a lookup function so the same code
//! path serves the process environment and in-memory maps in tests.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::domain::tick::normalize_symbols;
use crate::infrastructure::broadcast::DEFAULT_SUBSCRIBER_CAPACITY;
use crate::infrastructure::feeds::binance::{DEFAULT_BASE_URL, TESTNET_BASE_URL};
use crate::infrastructure::feeds::reconnect::DEFAULT_RECONNECT_DELAY;
use crate::infrastructure::feeds::synthetic::{DEFAULT_SYMBOLS, DEFAULT_TICK_INTERVAL};
use crate::infrastructure::feeds::{ExchangeFeedConfig, SyntheticFeedConfig};
use crate::infrastructure::grpc::server::DEFAULT_FIXED_SPREAD;

/// Which feed source the broadcaster owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedSourceKind {
    /// Synthetic random walk.
    #[default]
    Mock,
    /// Exchange combined trade stream.
    Binance,
}

impl FeedSourceKind {
    /// Parse a source name, case-insensitively.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "mock" | "synthetic" => Some(Self::Mock),
            "binance" | "exchange" => Some(Self::Binance),
            _ => None,
        }
    }

    /// Get the source name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Mock => "mock",
            Self::Binance => "binance",
        }
    }
}

/// Symbol set and generator cadence.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// Uppercase, deduplicated symbols.
    pub symbols: Vec<String>,
    /// Synthetic generation cadence.
    pub tick_interval: Duration,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            symbols: normalize_symbols(DEFAULT_SYMBOLS),
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

/// Exchange connection settings.
#[derive(Debug, Clone)]
pub struct BinanceSettings {
    /// Production base URL.
    pub base_url: String,
    /// Use the testnet base URL instead.
    pub use_testnet: bool,
    /// Fixed delay between reconnection attempts.
    pub reconnect_delay: Duration,
}

impl Default for BinanceSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            use_testnet: false,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl BinanceSettings {
    /// Base URL after applying the testnet override.
    #[must_use]
    pub fn effective_base_url(&self) -> &str {
        if self.use_testnet {
            TESTNET_BASE_URL
        } else {
            &self.base_url
        }
    }
}

/// Fan-out settings.
#[derive(Debug, Clone, Copy)]
pub struct BroadcastSettings {
    /// Per-subscriber queue bound.
    pub subscriber_capacity: usize,
    /// Spread applied around the last price; half on each side.
    pub fixed_spread: Decimal,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
            fixed_spread: DEFAULT_FIXED_SPREAD,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone, Copy)]
pub struct ServerSettings {
    /// gRPC server port.
    pub grpc_port: u16,
    /// HTTP port for health, stats and metrics.
    pub http_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            grpc_port: 5001,
            http_port: 5002,
        }
    }
}

impl ServerSettings {
    /// gRPC listen address on all interfaces.
    #[must_use]
    pub fn grpc_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.grpc_port))
    }

    /// HTTP listen address on all interfaces.
    #[must_use]
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.http_port))
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    /// Active feed source.
    pub source: FeedSourceKind,
    /// Symbols and cadence.
    pub feed: FeedSettings,
    /// Exchange settings.
    pub binance: BinanceSettings,
    /// Fan-out settings.
    pub broadcast: BroadcastSettings,
    /// Server ports.
    pub server: ServerSettings,
}

impl ServiceConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is present but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// Absent or unparsable numeric values fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown source name or a negative spread.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let source = match lookup("MARKET_DATA_SOURCE") {
            Some(raw) if !raw.trim().is_empty() => FeedSourceKind::from_str_case_insensitive(&raw)
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: "MARKET_DATA_SOURCE".to_string(),
                    value: raw,
                })?,
            _ => FeedSourceKind::default(),
        };

        let symbols = lookup("MARKET_DATA_SYMBOLS")
            .map(|raw| normalize_symbols(raw.split(',')))
            .filter(|symbols| !symbols.is_empty())
            .unwrap_or_else(|| FeedSettings::default().symbols);

        let feed = FeedSettings {
            symbols,
            tick_interval: Some(parse_or(&lookup, "MARKET_DATA_TICK_INTERVAL_MS", 0_u64))
                .filter(|ms| *ms > 0)
                .map_or(DEFAULT_TICK_INTERVAL, Duration::from_millis),
        };

        let binance = BinanceSettings {
            base_url: lookup("BINANCE_WS_URL")
                .filter(|url| !url.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            use_testnet: parse_bool(lookup("BINANCE_USE_TESTNET").as_deref()),
            reconnect_delay: Duration::from_secs(parse_or(
                &lookup,
                "BINANCE_RECONNECT_DELAY_SECS",
                DEFAULT_RECONNECT_DELAY.as_secs(),
            )),
        };

        let fixed_spread: Decimal = parse_or(&lookup, "MARKET_DATA_FIXED_SPREAD", DEFAULT_FIXED_SPREAD);
        if fixed_spread < Decimal::ZERO {
            return Err(ConfigError::InvalidValue {
                key: "MARKET_DATA_FIXED_SPREAD".to_string(),
                value: fixed_spread.to_string(),
            });
        }

        let broadcast = BroadcastSettings {
            subscriber_capacity: parse_or(
                &lookup,
                "MARKET_DATA_SUBSCRIBER_CAPACITY",
                DEFAULT_SUBSCRIBER_CAPACITY,
            )
            .max(1),
            fixed_spread,
        };

        let server = ServerSettings {
            grpc_port: parse_or(&lookup, "MARKET_DATA_GRPC_PORT", ServerSettings::default().grpc_port),
            http_port: parse_or(&lookup, "MARKET_DATA_HTTP_PORT", ServerSettings::default().http_port),
        };

        Ok(Self {
            source,
            feed,
            binance,
            broadcast,
            server,
        })
    }

    /// Synthetic feed configuration for the configured symbols.
    #[must_use]
    pub fn synthetic_config(&self) -> SyntheticFeedConfig {
        SyntheticFeedConfig::new(&self.feed.symbols, self.feed.tick_interval)
    }

    /// Exchange feed configuration for the configured symbols.
    #[must_use]
    pub fn exchange_config(&self) -> ExchangeFeedConfig {
        ExchangeFeedConfig::new(self.binance.effective_base_url(), &self.feed.symbols)
            .with_reconnect_delay(self.binance.reconnect_delay)
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Value is present but not acceptable.
    #[error("invalid value for {key}: {value}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Rejected value.
        value: String,
    },
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_bool(value: Option<&str>) -> bool {
    value.is_some_and(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
}
