//! Application Layer - Use cases and port definitions.
//!
//! - `ports`: Interfaces the relay core depends on (enrichment, upstream
//!   connections, downstream publishing)
//! - `aggregator`: Orchestrates enrichment, history, and the latest view

/// Port interfaces for external systems.
pub mod ports;

/// Tick aggregation pipeline.
pub mod aggregator;
