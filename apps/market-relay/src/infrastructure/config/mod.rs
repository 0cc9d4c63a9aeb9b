//! Configuration Module
//!
//! Environment configuration for the relay.
//!
//! | Variable | Default |
//! |---|---|
//! | `RELAY_UPSTREAM_GRPC_URL` | `http://localhost:5001` |
//! | `RELAY_RECONNECT_DELAY_MS` | `2000` |
//! | `RELAY_HTTP_PORT` | `5000` |
//! | `RELAY_CLIENT_CAPACITY` | `256` |

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::infrastructure::hub::DEFAULT_CLIENT_CAPACITY;
use crate::infrastructure::upstream::{DEFAULT_RECONNECT_DELAY, DEFAULT_UPSTREAM_URL, UpstreamConfig};

/// Default HTTP port for the hub, snapshot and health endpoints.
pub const DEFAULT_HTTP_PORT: u16 = 5000;

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Upstream StreamTickers endpoint.
    pub upstream: UpstreamConfig,
    /// HTTP listen port.
    pub http_port: u16,
    /// Outbound queue bound per websocket client.
    pub client_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            upstream: UpstreamConfig::default(),
            http_port: DEFAULT_HTTP_PORT,
            client_capacity: DEFAULT_CLIENT_CAPACITY,
        }
    }
}

impl RelayConfig {
    /// Load from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Absent or unparsable values fall
    /// back to defaults.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("RELAY_UPSTREAM_GRPC_URL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_UPSTREAM_URL.to_string());

        let reconnect_delay = Some(parse_or(&lookup, "RELAY_RECONNECT_DELAY_MS", 0_u64))
            .filter(|ms| *ms > 0)
            .map_or(DEFAULT_RECONNECT_DELAY, Duration::from_millis);

        let client_capacity = Some(parse_or(&lookup, "RELAY_CLIENT_CAPACITY", 0_usize))
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_CLIENT_CAPACITY);

        Self {
            upstream: UpstreamConfig {
                url,
                reconnect_delay,
            },
            http_port: parse_or(&lookup, "RELAY_HTTP_PORT", DEFAULT_HTTP_PORT),
            client_capacity,
        }
    }

    /// HTTP listen address on all interfaces.
    #[must_use]
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.http_port))
    }
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
