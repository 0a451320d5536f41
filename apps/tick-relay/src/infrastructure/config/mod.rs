//! Configuration Module
//!
//! Configuration loading for the relay service.

mod settings;

pub use settings::{
    ChannelSettings, ConfigError, EnrichSettings, RelayConfig, ServerSettings, UpstreamSettings,
};
