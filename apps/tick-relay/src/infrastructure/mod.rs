//! Infrastructure Layer - Adapters and external integrations.
//!
//! - `feed`: WebSocket client for the upstream exchange trade stream
//! - `enrich`: HTTP adapter for the internal enrichment endpoint
//! - `broadcast`: fan-out hub owning subscriber sessions and process state
//! - `ws`: axum WebSocket server and health endpoints
//! - `config`: environment-driven configuration
//! - `telemetry`: tracing subscriber setup

/// Upstream exchange feed client.
pub mod feed;

/// Internal enrichment HTTP adapter.
pub mod enrich;

/// Fan-out hub and control channel.
pub mod broadcast;

/// Subscriber WebSocket server and health endpoints.
pub mod ws;

/// Configuration loading.
pub mod config;

/// Tracing setup.
pub mod telemetry;
