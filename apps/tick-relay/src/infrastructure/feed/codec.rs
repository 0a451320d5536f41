//! Trade Stream Codec
//!
//! Decodes combined-stream frames from the exchange into domain ticks.
//!
//! # Wire Format (JSON)
//!
//! ```json
//! {"stream": "btcusdt@trade", "data": {"e": "trade", "p": "50000.00", "q": "0.01", ...}}
//! ```
//!
//! The symbol is derived from the stream identifier (the part before `@`),
//! uppercased. Only the price field of the payload is required; everything
//! else the exchange sends is ignored.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::tick::{Tick, TickError};

/// Codec errors. A codec error means one frame is skipped; it never tears
/// down the connection.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame was valid JSON but not a combined-stream trade frame.
    #[error("invalid frame format: {0}")]
    InvalidFormat(String),

    /// Decoded fields failed tick validation.
    #[error("tick validation failed: {0}")]
    Tick(#[from] TickError),
}

/// Combined-stream envelope.
#[derive(Debug, Deserialize)]
struct CombinedFrame {
    stream: String,
    data: TradePayload,
}

/// Trade event payload. Prices arrive as decimal strings.
#[derive(Debug, Deserialize)]
struct TradePayload {
    #[serde(rename = "p")]
    price: Decimal,
}

/// Decoder for the exchange's combined trade streams.
#[derive(Debug, Default, Clone)]
pub struct TradeStreamCodec;

impl TradeStreamCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one text frame into a tick, stamped with the arrival time.
    ///
    /// # Errors
    ///
    /// Returns `CodecError` if the frame is not a well-formed trade frame or
    /// its fields fail tick validation.
    pub fn decode(&self, text: &str) -> Result<Tick, CodecError> {
        let frame: CombinedFrame = serde_json::from_str(text)?;

        let symbol = frame
            .stream
            .split('@')
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                CodecError::InvalidFormat(format!("stream id has no symbol: {}", frame.stream))
            })?;

        Ok(Tick::new(symbol, frame.data.price, Utc::now())?)
    }

    /// Build the combined-stream subscription path for a symbol set, e.g.
    /// `stream?streams=btcusdt@trade/ethusdt@trade`.
    #[must_use]
    pub fn stream_query(symbols: &[String]) -> String {
        let streams: Vec<String> = symbols
            .iter()
            .map(|s| format!("{}@trade", s.to_lowercase()))
            .collect();
        format!("stream?streams={}", streams.join("/"))
    }
}
