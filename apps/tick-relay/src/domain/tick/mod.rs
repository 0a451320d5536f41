//! Trade Tick Types
//!
//! Core domain types for price observations. A [`Tick`] is one price
//! observation for one symbol at a point in time; an [`EnrichedTick`] is a
//! tick plus whatever optional fields the internal enrichment endpoint
//! returned for it.
//!
//! # Wire Format (JSON)
//!
//! ```json
//! {"symbol": "BTCUSDT", "price": "50000.00", "timestamp": "2024-01-15T10:00:00Z"}
//! ```
//!
//! Enrichment fields are flattened into the same object, mirroring how the
//! relay merges the enrichment response into the tick view.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Errors raised by tick validation.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TickError {
    /// Symbol was empty or whitespace.
    #[error("tick symbol must be non-empty")]
    EmptySymbol,

    /// Price was zero or negative.
    #[error("tick price must be positive, got {0}")]
    NonPositivePrice(Decimal),
}

/// One price observation for one symbol at a point in time.
///
/// Immutable once constructed; [`Tick::new`] enforces the invariants
/// (positive price, non-empty uppercased symbol).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    /// Uppercased ticker, e.g. `BTCUSDT`.
    pub symbol: String,
    /// Trade price. Always positive.
    pub price: Decimal,
    /// Observation time.
    pub timestamp: DateTime<Utc>,
}

impl Tick {
    /// Create a validated tick. The symbol is trimmed and uppercased.
    ///
    /// # Errors
    ///
    /// Returns `TickError` if the symbol is empty or the price is not
    /// strictly positive.
    pub fn new(
        symbol: impl AsRef<str>,
        price: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, TickError> {
        let symbol = symbol.as_ref().trim().to_uppercase();
        if symbol.is_empty() {
            return Err(TickError::EmptySymbol);
        }
        if price <= Decimal::ZERO {
            return Err(TickError::NonPositivePrice(price));
        }
        Ok(Self {
            symbol,
            price,
            timestamp,
        })
    }
}

/// A tick merged with optional enrichment fields.
///
/// Enrichment is best-effort: when the internal endpoint is unreachable the
/// `extra` map is simply empty and the serialized form is identical to the
/// bare tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedTick {
    /// The underlying price observation.
    #[serde(flatten)]
    pub tick: Tick,

    /// Fields merged in from the enrichment endpoint.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl EnrichedTick {
    /// Wrap a tick with no enrichment.
    #[must_use]
    pub fn bare(tick: Tick) -> Self {
        Self {
            tick,
            extra: serde_json::Map::new(),
        }
    }

    /// Merge enrichment fields into this tick's view.
    ///
    /// Core tick fields always win on key collision so enrichment can never
    /// corrupt `symbol`, `price`, or `timestamp`.
    pub fn merge(&mut self, fields: serde_json::Map<String, serde_json::Value>) {
        for (key, value) in fields {
            if key == "symbol" || key == "price" || key == "timestamp" {
                continue;
            }
            self.extra.insert(key, value);
        }
    }

    /// Whether any enrichment fields are present.
    #[must_use]
    pub fn is_enriched(&self) -> bool {
        !self.extra.is_empty()
    }
}

impl From<Tick> for EnrichedTick {
    fn from(tick: Tick) -> Self {
        Self::bare(tick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn tick_uppercases_symbol() {
        let tick = Tick::new("btcusdt", dec("50000"), Utc::now()).unwrap();
        assert_eq!(tick.symbol, "BTCUSDT");
    }

    #[test]
    fn tick_rejects_empty_symbol() {
        let err = Tick::new("  ", dec("1"), Utc::now()).unwrap_err();
        assert_eq!(err, TickError::EmptySymbol);
    }

    #[test]
    fn tick_rejects_non_positive_price() {
        let err = Tick::new("BTCUSDT", Decimal::ZERO, Utc::now()).unwrap_err();
        assert_eq!(err, TickError::NonPositivePrice(Decimal::ZERO));

        let err = Tick::new("BTCUSDT", dec("-1.5"), Utc::now()).unwrap_err();
        assert!(matches!(err, TickError::NonPositivePrice(_)));
    }

    #[test]
    fn enriched_tick_merge_keeps_core_fields() {
        let tick = Tick::new("ETHUSDT", dec("3000"), Utc::now()).unwrap();
        let mut enriched = EnrichedTick::bare(tick.clone());

        let mut fields = serde_json::Map::new();
        fields.insert("volume_24h".to_string(), serde_json::json!("12345.6"));
        fields.insert("price".to_string(), serde_json::json!("0"));
        enriched.merge(fields);

        assert!(enriched.is_enriched());
        assert_eq!(enriched.tick.price, tick.price);
        assert_eq!(
            enriched.extra.get("volume_24h"),
            Some(&serde_json::json!("12345.6"))
        );
        assert!(!enriched.extra.contains_key("price"));
    }

    #[test]
    fn enriched_tick_serializes_flat() {
        let tick = Tick::new("BTCUSDT", dec("50000.00"), Utc::now()).unwrap();
        let mut enriched = EnrichedTick::bare(tick);
        let mut fields = serde_json::Map::new();
        fields.insert("trend".to_string(), serde_json::json!("up"));
        enriched.merge(fields);

        let value = serde_json::to_value(&enriched).unwrap();
        assert_eq!(value["symbol"], "BTCUSDT");
        assert_eq!(value["trend"], "up");
        // Flattened: no nested "tick" or "extra" objects on the wire.
        assert!(value.get("tick").is_none());
        assert!(value.get("extra").is_none());
    }
}
