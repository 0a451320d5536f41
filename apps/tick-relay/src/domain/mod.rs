//! Domain Layer - Core relay types and business logic.
//!
//! This layer contains the core domain types for the tick relay with
//! no network dependencies. All types here are pure Rust with
//! serialization support.

/// Trade tick types and validation.
pub mod tick;

/// Per-symbol bounded tick history.
pub mod history;
