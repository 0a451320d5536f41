#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Tick Relay - Market Data Fan-Out Service
//!
//! Maintains a single WebSocket connection to the exchange's combined trade
//! streams, keeps a bounded rolling history per symbol, best-effort enriches
//! each tick from an internal HTTP endpoint, and fans the merged result out
//! to any number of WebSocket subscribers. New subscribers get a full
//! snapshot on connect; a small control channel lets any subscriber toggle a
//! process-wide bot state, rebroadcast to everyone.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core relay types with no I/O
//!   - `tick`: Trade ticks and enrichment merging
//!   - `history`: Per-symbol bounded ring buffers
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Interfaces for enrichment, upstream connections, publishing
//!   - `aggregator`: The single-writer tick pipeline
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `feed`: WebSocket client, codec, reconnect policy, heartbeat
//!   - `enrich`: HTTP enrichment adapter
//!   - `broadcast`: Fan-out actor owning sessions and bot state
//!   - `ws`: Subscriber WebSocket server and health endpoints
//!   - `config`: Environment-driven configuration
//!   - `telemetry`: Tracing setup
//!
//! # Data Flow
//!
//! ```text
//! Exchange WS ──► FeedClient ──► Aggregator ──► Broadcaster ──► Session 1
//!                              (enrich+history)      ▲      ├─► Session 2
//!                                                    │      └─► Session N
//!                              control messages ─────┘  (from any session)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core relay types with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::history::SymbolHistory;
pub use domain::tick::{EnrichedTick, Tick, TickError};

// Application ports and pipeline
pub use application::aggregator::Aggregator;
pub use application::ports::{
    Enrich, FeedConnector, FeedFrame, FeedStream, FeedTransportError, Publish, SymbolUpdate,
};

// Infrastructure config
pub use infrastructure::config::{
    ChannelSettings, ConfigError, EnrichSettings, RelayConfig, ServerSettings, UpstreamSettings,
};

// Feed client (for integration tests)
pub use infrastructure::feed::{
    ConnectionState, FeedClient, FeedClientConfig, FeedClientError, FeedStatus, WsConnector,
};

// Fan-out hub (for integration tests)
pub use infrastructure::broadcast::{
    Broadcaster, BroadcasterConfig, BroadcasterHandle, HubStats, OutboundMessage, Registration,
    SessionId,
    control::{BalancePolicy, ControlMessage, HoldBalance, ProcessState},
};

// Enrichment adapters
pub use infrastructure::enrich::{HttpEnricher, NoopEnricher};

// Subscriber server
pub use infrastructure::ws::{WsServer, WsServerError, WsServerState};

// Telemetry
pub use infrastructure::telemetry::init as init_telemetry;
