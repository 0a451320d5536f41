//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following the
//! Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`Enrich`]: best-effort tick enrichment from the internal API
//! - [`FeedConnector`] / [`FeedStream`]: upstream exchange connections,
//!   injectable so reconnect behavior is testable without network I/O
//! - [`Publish`]: delivery of composed updates to the fan-out hub

use async_trait::async_trait;

use crate::domain::tick::{EnrichedTick, Tick};

// =============================================================================
// Enrichment
// =============================================================================

/// Best-effort tick enrichment.
///
/// Implementations must never fail: on any enrichment error the tick is
/// returned unmodified. Implementations bound their own latency (the relay
/// expects a fetch timeout of roughly two seconds or less).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Enrich: Send + Sync {
    /// Augment `tick` with fields from the internal endpoint, or return it
    /// bare when enrichment is unavailable.
    async fn enrich(&self, tick: Tick) -> EnrichedTick;
}

// =============================================================================
// Upstream Feed Connection
// =============================================================================

/// Transport errors surfaced by a feed connection.
#[derive(Debug, thiserror::Error)]
pub enum FeedTransportError {
    /// Establishing the connection failed.
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    /// An established connection failed mid-stream.
    #[error("stream error: {0}")]
    Stream(String),

    /// The server closed the connection.
    #[error("connection closed")]
    Closed,
}

/// A single frame read from or written to the upstream socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedFrame {
    /// Text payload (JSON).
    Text(String),
    /// Ping control frame with payload.
    Ping(Vec<u8>),
    /// Pong control frame with payload.
    Pong(Vec<u8>),
    /// Close control frame.
    Close,
}

/// One established upstream connection.
#[async_trait]
pub trait FeedStream: Send {
    /// Read the next frame. `None` means the stream ended.
    async fn next_frame(&mut self) -> Option<Result<FeedFrame, FeedTransportError>>;

    /// Write a frame.
    async fn send_frame(&mut self, frame: FeedFrame) -> Result<(), FeedTransportError>;
}

/// Factory for upstream connections.
///
/// The production implementation dials a WebSocket; tests inject scripted
/// connectors to drive the reconnect state machine deterministically.
#[async_trait]
pub trait FeedConnector: Send + Sync {
    /// Establish a new connection to `url`.
    async fn connect(&self, url: &str) -> Result<Box<dyn FeedStream>, FeedTransportError>;
}

// =============================================================================
// Downstream Publishing
// =============================================================================

/// The composed per-symbol message the relay fans out: the freshest enriched
/// tick plus the bounded recent history for chart seeding.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SymbolUpdate {
    /// Most recent enriched tick for the symbol.
    pub latest: EnrichedTick,
    /// Recent ticks, oldest first.
    pub chart: Vec<Tick>,
}

/// Sink for composed updates.
///
/// Delivery is fire-and-forget from the aggregator's point of view: a full
/// or closed hub is not an error the pipeline can act on.
#[async_trait]
pub trait Publish: Send + Sync {
    /// Hand an update to the fan-out hub.
    async fn publish(&self, update: SymbolUpdate);
}
