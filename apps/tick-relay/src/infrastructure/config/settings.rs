//! Relay Configuration Settings
//!
//! Configuration types for the tick relay, loaded from environment variables.

use std::time::Duration;

use crate::domain::history::DEFAULT_CAPACITY;

/// Upstream feed connection settings.
#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    /// Base WebSocket URL of the exchange stream endpoint.
    pub ws_url: String,
    /// Symbols to subscribe to on the combined trade stream.
    pub symbols: Vec<String>,
    /// Heartbeat ping interval.
    pub heartbeat_interval: Duration,
    /// Heartbeat timeout before considering the connection dead.
    pub heartbeat_timeout: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            ws_url: "wss://stream.binance.com:9443".to_string(),
            symbols: vec!["BTCUSDT".to_string()],
            heartbeat_interval: Duration::from_secs(20),
            heartbeat_timeout: Duration::from_secs(60),
            reconnect_delay_initial: Duration::from_millis(500),
            reconnect_delay_max: Duration::from_secs(30),
            reconnect_delay_multiplier: 2.0,
            max_reconnect_attempts: 0, // Unlimited
        }
    }
}

/// Enrichment endpoint settings.
#[derive(Debug, Clone)]
pub struct EnrichSettings {
    /// URL of the internal `market_data` endpoint. `None` disables
    /// enrichment entirely.
    pub url: Option<String>,
    /// Per-fetch timeout; enrichment never delays a tick past this.
    pub timeout: Duration,
}

impl Default for EnrichSettings {
    fn default() -> Self {
        Self {
            url: None,
            timeout: Duration::from_secs(2),
        }
    }
}

/// Subscriber-facing server settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Port serving `/ws` and the health endpoints.
    pub port: u16,
    /// Per-session socket send timeout; a session slower than this is
    /// dropped so it cannot stall the fan-out.
    pub send_timeout: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 8080,
            send_timeout: Duration::from_secs(5),
        }
    }
}

/// Bounded channel capacities between pipeline stages.
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    /// Feed client → aggregator tick channel.
    pub tick_capacity: usize,
    /// Broadcaster command channel.
    pub command_capacity: usize,
    /// Per-session outbound queue; a session whose queue fills is dropped.
    pub session_queue_capacity: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            tick_capacity: 1024,
            command_capacity: 1024,
            session_queue_capacity: 256,
        }
    }
}

/// Complete relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Upstream feed settings.
    pub upstream: UpstreamSettings,
    /// Enrichment settings.
    pub enrich: EnrichSettings,
    /// Subscriber server settings.
    pub server: ServerSettings,
    /// Channel capacities.
    pub channels: ChannelSettings,
    /// Ticks retained per symbol.
    pub history_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            upstream: UpstreamSettings::default(),
            enrich: EnrichSettings::default(),
            server: ServerSettings::default(),
            channels: ChannelSettings::default(),
            history_capacity: DEFAULT_CAPACITY,
        }
    }
}

impl RelayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `RELAY_SYMBOLS` is set but empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        let symbols = match std::env::var("RELAY_SYMBOLS") {
            Ok(raw) => {
                let symbols: Vec<String> = raw
                    .split(',')
                    .map(|s| s.trim().to_uppercase())
                    .filter(|s| !s.is_empty())
                    .collect();
                if symbols.is_empty() {
                    return Err(ConfigError::EmptyValue("RELAY_SYMBOLS".to_string()));
                }
                symbols
            }
            Err(_) => UpstreamSettings::default().symbols,
        };

        let upstream = UpstreamSettings {
            ws_url: std::env::var("RELAY_UPSTREAM_WS_URL")
                .unwrap_or_else(|_| UpstreamSettings::default().ws_url),
            symbols,
            heartbeat_interval: parse_env_duration_secs(
                "RELAY_HEARTBEAT_INTERVAL_SECS",
                UpstreamSettings::default().heartbeat_interval,
            ),
            heartbeat_timeout: parse_env_duration_secs(
                "RELAY_HEARTBEAT_TIMEOUT_SECS",
                UpstreamSettings::default().heartbeat_timeout,
            ),
            reconnect_delay_initial: parse_env_duration_millis(
                "RELAY_RECONNECT_DELAY_INITIAL_MS",
                UpstreamSettings::default().reconnect_delay_initial,
            ),
            reconnect_delay_max: parse_env_duration_secs(
                "RELAY_RECONNECT_DELAY_MAX_SECS",
                UpstreamSettings::default().reconnect_delay_max,
            ),
            reconnect_delay_multiplier: parse_env_f64(
                "RELAY_RECONNECT_DELAY_MULTIPLIER",
                UpstreamSettings::default().reconnect_delay_multiplier,
            ),
            max_reconnect_attempts: parse_env_u32(
                "RELAY_MAX_RECONNECT_ATTEMPTS",
                UpstreamSettings::default().max_reconnect_attempts,
            ),
        };

        let enrich = EnrichSettings {
            url: std::env::var("RELAY_ENRICH_URL")
                .ok()
                .filter(|v| !v.is_empty()),
            timeout: parse_env_duration_millis(
                "RELAY_ENRICH_TIMEOUT_MS",
                EnrichSettings::default().timeout,
            ),
        };

        let server = ServerSettings {
            port: parse_env_u16("RELAY_PORT", ServerSettings::default().port),
            send_timeout: parse_env_duration_millis(
                "RELAY_SEND_TIMEOUT_MS",
                ServerSettings::default().send_timeout,
            ),
        };

        let channels = ChannelSettings {
            tick_capacity: parse_env_usize(
                "RELAY_TICK_CHANNEL_CAPACITY",
                ChannelSettings::default().tick_capacity,
            ),
            command_capacity: parse_env_usize(
                "RELAY_COMMAND_CHANNEL_CAPACITY",
                ChannelSettings::default().command_capacity,
            ),
            session_queue_capacity: parse_env_usize(
                "RELAY_SESSION_QUEUE_CAPACITY",
                ChannelSettings::default().session_queue_capacity,
            ),
        };

        Ok(Self {
            upstream,
            enrich,
            server,
            channels,
            history_capacity: parse_env_usize("RELAY_HISTORY_CAPACITY", DEFAULT_CAPACITY),
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

fn parse_env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_defaults() {
        let settings = UpstreamSettings::default();
        assert_eq!(settings.symbols, vec!["BTCUSDT".to_string()]);
        assert_eq!(settings.heartbeat_interval, Duration::from_secs(20));
        assert_eq!(settings.heartbeat_timeout, Duration::from_secs(60));
        assert_eq!(settings.reconnect_delay_initial, Duration::from_millis(500));
        assert_eq!(settings.reconnect_delay_max, Duration::from_secs(30));
        assert!((settings.reconnect_delay_multiplier - 2.0).abs() < f64::EPSILON);
        assert_eq!(settings.max_reconnect_attempts, 0);
    }

    #[test]
    fn enrich_defaults_to_disabled() {
        let settings = EnrichSettings::default();
        assert!(settings.url.is_none());
        assert_eq!(settings.timeout, Duration::from_secs(2));
    }

    #[test]
    fn server_defaults() {
        let settings = ServerSettings::default();
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.send_timeout, Duration::from_secs(5));
    }

    #[test]
    fn channel_defaults() {
        let settings = ChannelSettings::default();
        assert_eq!(settings.tick_capacity, 1024);
        assert_eq!(settings.command_capacity, 1024);
        assert_eq!(settings.session_queue_capacity, 256);
    }

    #[test]
    fn relay_config_default_history_capacity() {
        let config = RelayConfig::default();
        assert_eq!(config.history_capacity, DEFAULT_CAPACITY);
    }
}
