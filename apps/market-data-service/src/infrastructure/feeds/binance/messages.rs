//! Combined Stream Message Types
//!
//! Wire format of the exchange's combined trade stream. Only the symbol
//! (`data.s`) and price (`data.p`) are read; every other field is ignored.
//!
//! # Wire Format (JSON)
//! ```json
//! {"stream":"btcusdt@trade","data":{"e":"trade","s":"BTCUSDT","p":"43000.10","q":"0.01"}}
//! ```

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::domain::tick::Tick;

/// Combined stream envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamEnvelope {
    /// Stream name, e.g. `btcusdt@trade`.
    #[serde(default)]
    pub stream: Option<String>,
    /// Event payload.
    #[serde(default)]
    pub data: Option<TradePayload>,
}

/// Trade event payload.
#[derive(Debug, Clone, Deserialize)]
pub struct TradePayload {
    /// Symbol.
    #[serde(default)]
    pub s: Option<String>,
    /// Price. Sent as a string, accepted as a number too.
    #[serde(default)]
    pub p: Option<Value>,
}

/// Why an inbound message was discarded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Not valid JSON or not an object.
    #[error("invalid JSON envelope")]
    InvalidJson,
    /// `data`, `data.s` or `data.p` absent.
    #[error("missing field: {0}")]
    MissingField(&'static str),
    /// `data.p` is not a decimal number.
    #[error("non-numeric price: {0}")]
    InvalidPrice(String),
    /// Symbol blank or price negative.
    #[error("invalid tick: {0}")]
    InvalidTick(String),
}

impl DecodeError {
    /// Short reason used as a metric label.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::InvalidJson => "invalid_json",
            Self::MissingField(_) => "missing_field",
            Self::InvalidPrice(_) => "invalid_price",
            Self::InvalidTick(_) => "invalid_tick",
        }
    }
}

/// Decode one text frame into a tick stamped `received_at`.
///
/// # Errors
///
/// Returns [`DecodeError`] for any message that does not carry a usable
/// symbol and price.
pub fn decode_trade(text: &str, received_at: DateTime<Utc>) -> Result<Tick, DecodeError> {
    let envelope: StreamEnvelope =
        serde_json::from_str(text).map_err(|_| DecodeError::InvalidJson)?;
    let data = envelope.data.ok_or(DecodeError::MissingField("data"))?;
    let symbol = data.s.ok_or(DecodeError::MissingField("data.s"))?;
    let raw_price = data.p.ok_or(DecodeError::MissingField("data.p"))?;

    let price = match raw_price {
        Value::String(s) => Decimal::from_str(s.trim()).map_err(|_| DecodeError::InvalidPrice(s))?,
        Value::Number(n) => {
            let s = n.to_string();
            Decimal::from_str(&s)
                .or_else(|_| Decimal::from_scientific(&s))
                .map_err(|_| DecodeError::InvalidPrice(s))?
        }
        other => return Err(DecodeError::InvalidPrice(other.to_string())),
    };

    Tick::new(&symbol, price, received_at).map_err(|e| DecodeError::InvalidTick(e.to_string()))
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test]
    fn decodes_trade_and_uppercases_symbol() {
        let text = r#"{"stream":"btcusdt@trade","data":{"e":"trade","E":1,"s":"btcusdt","t":9,"p":"43000.10","q":"0.5","m":true}}"#;
        let tick = decode_trade(text, Utc::now()).unwrap();
        assert_eq!(tick.symbol(), "BTCUSDT");
        assert_eq!(tick.price(), Decimal::from_str("43000.10").unwrap());
    }

    #[test]
    fn accepts_numeric_price() {
        let text = r#"{"data":{"s":"ETHUSDT","p":3200.5}}"#;
        let tick = decode_trade(text, Utc::now()).unwrap();
        assert_eq!(tick.price(), Decimal::from_str("3200.5").unwrap());
    }

    #[test_case("not json", DecodeError::InvalidJson ; "garbage")]
    #[test_case("[1,2,3]", DecodeError::InvalidJson ; "array")]
    #[test_case(r#"{"stream":"x"}"#, DecodeError::MissingField("data") ; "no data")]
    #[test_case(r#"{"data":{"p":"1.0"}}"#, DecodeError::MissingField("data.s") ; "no symbol")]
    #[test_case(r#"{"data":{"s":"BTCUSDT"}}"#, DecodeError::MissingField("data.p") ; "no price")]
    #[test_case(r#"{"data":{"s":"BTCUSDT","p":"abc"}}"#, DecodeError::InvalidPrice("abc".to_string()) ; "non numeric")]
    #[test_case(r#"{"data":{"s":"BTCUSDT","p":true}}"#, DecodeError::InvalidPrice("true".to_string()) ; "bool price")]
    fn rejects_malformed(text: &str, expected: DecodeError) {
        assert_eq!(decode_trade(text, Utc::now()), Err(expected));
    }

    #[test]
    fn rejects_blank_symbol_and_negative_price() {
        let blank = r#"{"data":{"s":"  ","p":"1"}}"#;
        let negative = r#"{"data":{"s":"BTCUSDT","p":"-1"}}"#;
        assert_eq!(decode_trade(blank, Utc::now()).unwrap_err().reason(), "invalid_tick");
        assert_eq!(decode_trade(negative, Utc::now()).unwrap_err().reason(), "invalid_tick");
    }
}
