//! Tick Types
//!
//! Core domain types for price observations: the immutable [`Tick`]
//! produced by feed sources, the [`TickUpdate`] view derived for remote
//! callers, and the [`SymbolFilter`] applied by streaming queries.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

// =============================================================================
// Tick
// =============================================================================

/// Errors raised when constructing a [`Tick`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TickError {
    /// Symbol was empty after trimming.
    #[error("tick symbol cannot be empty")]
    EmptySymbol,

    /// Price was below zero.
    #[error("tick price cannot be negative: {0}")]
    NegativePrice(Decimal),
}

/// One price observation for one symbol at a point in time.
///
/// Symbols are always uppercase and non-empty; prices are never negative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    symbol: String,
    price: Decimal,
    timestamp: DateTime<Utc>,
}

impl Tick {
    /// Create a tick, normalizing the symbol to uppercase.
    ///
    /// # Errors
    ///
    /// Returns [`TickError`] if the symbol is blank or the price is negative.
    pub fn new(
        symbol: &str,
        price: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, TickError> {
        let symbol = normalize_symbol(symbol).ok_or(TickError::EmptySymbol)?;
        if price < Decimal::ZERO {
            return Err(TickError::NegativePrice(price));
        }
        Ok(Self {
            symbol,
            price,
            timestamp,
        })
    }

    /// Create a tick stamped with the current wall-clock time.
    ///
    /// # Errors
    ///
    /// Returns [`TickError`] if the symbol is blank or the price is negative.
    pub fn now(symbol: &str, price: Decimal) -> Result<Self, TickError> {
        Self::new(symbol, price, Utc::now())
    }

    /// Uppercase symbol.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Observed price.
    #[must_use]
    pub const fn price(&self) -> Decimal {
        self.price
    }

    /// Production time.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

// =============================================================================
// Derived View
// =============================================================================

/// Bid/ask view of a tick, derived with a fixed spread at emission time.
#[derive(Debug, Clone, PartialEq)]
pub struct TickUpdate {
    /// Uppercase symbol.
    pub symbol: String,
    /// Last traded price.
    pub last_price: f64,
    /// Last price minus half the spread.
    pub bid_price: f64,
    /// Last price plus half the spread.
    pub ask_price: f64,
    /// Emission wall-clock time in Unix milliseconds.
    pub ts_unix_ms: i64,
}

impl TickUpdate {
    /// Derive an update from a tick using `spread` split evenly on each side.
    #[must_use]
    pub fn derive(tick: &Tick, spread: Decimal, emitted_at: DateTime<Utc>) -> Self {
        let half = spread / Decimal::TWO;
        let last = tick.price();
        Self {
            symbol: tick.symbol().to_string(),
            last_price: decimal_to_f64(last),
            bid_price: decimal_to_f64(last - half),
            ask_price: decimal_to_f64(last + half),
            ts_unix_ms: emitted_at.timestamp_millis(),
        }
    }
}

/// Lossy conversion used at the wire boundary.
#[must_use]
pub fn decimal_to_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

// =============================================================================
// Symbols
// =============================================================================

/// Trim and uppercase a symbol, returning `None` when nothing is left.
#[must_use]
pub fn normalize_symbol(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_uppercase())
    }
}

/// Normalize a symbol list, dropping blanks and case-insensitive duplicates.
///
/// First occurrence wins, so configured order is preserved.
#[must_use]
pub fn normalize_symbols<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for symbol in raw {
        if let Some(normalized) = normalize_symbol(symbol.as_ref())
            && !out.contains(&normalized)
        {
            out.push(normalized);
        }
    }
    out
}

/// Symbol filter for a streaming query.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SymbolFilter {
    /// Every symbol matches.
    #[default]
    All,
    /// Only the given uppercase symbol matches.
    Only(String),
}

impl SymbolFilter {
    /// Parse a caller-supplied filter; blank means all symbols.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        normalize_symbol(raw).map_or(Self::All, Self::Only)
    }

    /// Case-insensitive exact match.
    #[must_use]
    pub fn matches(&self, symbol: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(wanted) => wanted.eq_ignore_ascii_case(symbol),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use proptest::prelude::*;
    use test_case::test_case;

    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn tick_uppercases_symbol() {
        let tick = Tick::now(" btcusdt ", dec("43000.5")).unwrap();
        assert_eq!(tick.symbol(), "BTCUSDT");
        assert_eq!(tick.price(), dec("43000.5"));
    }

    #[test]
    fn tick_rejects_blank_symbol() {
        assert_eq!(Tick::now("   ", Decimal::ONE), Err(TickError::EmptySymbol));
    }

    #[test]
    fn tick_rejects_negative_price() {
        assert!(matches!(
            Tick::now("BTCUSDT", dec("-0.01")),
            Err(TickError::NegativePrice(_))
        ));
        assert!(Tick::now("BTCUSDT", Decimal::ZERO).is_ok());
    }

    #[test]
    fn update_applies_half_spread() {
        let tick = Tick::now("BTCUSDT", dec("43000")).unwrap();
        let emitted = Utc::now();
        let update = TickUpdate::derive(&tick, dec("10"), emitted);

        assert_eq!(update.symbol, "BTCUSDT");
        assert!((update.last_price - 43000.0).abs() < f64::EPSILON);
        assert!((update.bid_price - 42995.0).abs() < f64::EPSILON);
        assert!((update.ask_price - 43005.0).abs() < f64::EPSILON);
        assert_eq!(update.ts_unix_ms, emitted.timestamp_millis());
    }

    #[test]
    fn update_uses_emission_time_not_tick_time() {
        let produced = Utc::now() - chrono::Duration::seconds(30);
        let tick = Tick::new("ETHUSDT", dec("3200"), produced).unwrap();
        let emitted = Utc::now();
        let update = TickUpdate::derive(&tick, dec("10"), emitted);
        assert_eq!(update.ts_unix_ms, emitted.timestamp_millis());
        assert_ne!(update.ts_unix_ms, produced.timestamp_millis());
    }

    #[test_case("btcusdt", "BTCUSDT", true ; "lowercase filter")]
    #[test_case("BTCUSDT", "BTCUSDT", true ; "exact filter")]
    #[test_case("  BtcUsdt ", "BTCUSDT", true ; "padded mixed case")]
    #[test_case("BTC", "BTCUSDT", false ; "prefix does not match")]
    #[test_case("ETHUSDT", "BTCUSDT", false ; "other symbol")]
    #[test_case("", "BTCUSDT", true ; "empty means all")]
    #[test_case("   ", "SOLUSDT", true ; "whitespace means all")]
    fn filter_matching(filter: &str, symbol: &str, expected: bool) {
        assert_eq!(SymbolFilter::parse(filter).matches(symbol), expected);
    }

    #[test]
    fn filter_parse_normalizes() {
        assert_eq!(SymbolFilter::parse(""), SymbolFilter::All);
        assert_eq!(
            SymbolFilter::parse(" ethusdt"),
            SymbolFilter::Only("ETHUSDT".to_string())
        );
    }

    #[test]
    fn normalize_symbols_dedups_case_insensitively() {
        let symbols = normalize_symbols(["btcusdt", "ETHUSDT", "BtcUsdt", " ", "solusdt"]);
        assert_eq!(symbols, vec!["BTCUSDT", "ETHUSDT", "SOLUSDT"]);
    }

    proptest! {
        #[test]
        fn filter_matches_any_casing_of_itself(symbol in "[A-Z]{2,10}") {
            let filter = SymbolFilter::parse(&symbol.to_lowercase());
            prop_assert!(filter.matches(&symbol));
        }

        #[test]
        fn filter_never_matches_strict_prefix(symbol in "[A-Z]{3,10}") {
            let prefix = &symbol[..symbol.len() - 1];
            prop_assert!(!SymbolFilter::parse(prefix).matches(&symbol));
        }
    }
}
