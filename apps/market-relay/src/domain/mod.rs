//! Domain Layer - Relayed ticker types.
//!
//! The ticker payload pushed to websocket clients and the symbol group
//! naming rule.

use marketpulse_proto::TickerUpdate;
use serde::{Deserialize, Serialize};

/// Ticker update as pushed to websocket clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerPayload {
    /// Uppercase symbol.
    pub symbol: String,
    /// Last traded price.
    pub last_price: f64,
    /// Synthesized bid.
    pub bid_price: f64,
    /// Synthesized ask.
    pub ask_price: f64,
    /// Emission time in Unix milliseconds.
    pub ts_unix_ms: i64,
}

impl From<TickerUpdate> for TickerPayload {
    fn from(update: TickerUpdate) -> Self {
        Self {
            symbol: update.symbol,
            last_price: update.last_price,
            bid_price: update.bid_price,
            ask_price: update.ask_price,
            ts_unix_ms: update.ts_unix_ms,
        }
    }
}

/// Group name for a symbol: trimmed and uppercased.
///
/// Returns `None` for a blank symbol.
#[must_use]
pub fn group_key(symbol: &str) -> Option<String> {
    let trimmed = symbol.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("btcusdt", Some("BTCUSDT") ; "lowercase")]
    #[test_case("  EthUsdt ", Some("ETHUSDT") ; "padded mixed case")]
    #[test_case("", None ; "empty")]
    #[test_case("   ", None ; "whitespace")]
    fn group_key_normalizes(raw: &str, expected: Option<&str>) {
        assert_eq!(group_key(raw).as_deref(), expected);
    }

    #[test]
    fn payload_uses_camel_case_fields() {
        let payload = TickerPayload::from(TickerUpdate {
            symbol: "BTCUSDT".to_string(),
            last_price: 100.0,
            bid_price: 95.0,
            ask_price: 105.0,
            ts_unix_ms: 1_700_000_000_000,
        });
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["lastPrice"], 100.0);
        assert_eq!(json["bidPrice"], 95.0);
        assert_eq!(json["askPrice"], 105.0);
        assert_eq!(json["tsUnixMs"], 1_700_000_000_000_i64);
    }
}
