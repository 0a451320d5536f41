//! Tick Relay Binary
//!
//! Starts the trade-tick relay service.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin tick-relay
//! ```
//!
//! # Environment Variables (all optional)
//!
//! - `RELAY_SYMBOLS`: Comma-separated symbols (default: BTCUSDT)
//! - `RELAY_UPSTREAM_WS_URL`: Exchange stream base URL
//!   (default: <wss://stream.binance.com:9443>)
//! - `RELAY_ENRICH_URL`: Internal enrichment endpoint (unset = no enrichment)
//! - `RELAY_ENRICH_TIMEOUT_MS`: Enrichment fetch timeout (default: 2000)
//! - `RELAY_PORT`: Subscriber/health port (default: 8080)
//! - `RELAY_HISTORY_CAPACITY`: Ticks retained per symbol (default: 50)
//! - `RELAY_SEND_TIMEOUT_MS`: Per-session socket send timeout (default: 5000)
//! - `RELAY_RECONNECT_DELAY_INITIAL_MS` / `RELAY_RECONNECT_DELAY_MAX_SECS` /
//!   `RELAY_RECONNECT_DELAY_MULTIPLIER` / `RELAY_MAX_RECONNECT_ATTEMPTS`
//! - `RELAY_HEARTBEAT_INTERVAL_SECS` / `RELAY_HEARTBEAT_TIMEOUT_SECS`
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use tick_relay::application::aggregator::Aggregator;
use tick_relay::application::ports::Enrich;
use tick_relay::infrastructure::broadcast::control::HoldBalance;
use tick_relay::infrastructure::broadcast::{Broadcaster, BroadcasterConfig};
use tick_relay::infrastructure::enrich::{HttpEnricher, NoopEnricher};
use tick_relay::infrastructure::feed::heartbeat::HeartbeatConfig;
use tick_relay::infrastructure::feed::{FeedClient, FeedClientConfig, FeedStatus, WsConnector};
use tick_relay::infrastructure::feed::reconnect::ReconnectConfig;
use tick_relay::infrastructure::telemetry;
use tick_relay::infrastructure::ws::{WsServer, WsServerState};
use tick_relay::RelayConfig;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    load_dotenv();

    telemetry::init();

    tracing::info!("Starting Tick Relay");

    let config = RelayConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Enricher: HTTP adapter when an endpoint is configured, no-op otherwise.
    let enricher: Arc<dyn Enrich> = match &config.enrich.url {
        Some(url) => Arc::new(HttpEnricher::new(url.clone(), config.enrich.timeout)?),
        None => {
            tracing::info!("No enrichment endpoint configured, ticks pass through bare");
            Arc::new(NoopEnricher)
        }
    };

    // Fan-out hub actor.
    let broadcaster_config = BroadcasterConfig {
        command_capacity: config.channels.command_capacity,
        session_queue_capacity: config.channels.session_queue_capacity,
    };
    let (broadcaster, hub) = Broadcaster::new(broadcaster_config, Arc::new(HoldBalance));
    tokio::spawn(broadcaster.run(shutdown_token.clone()));

    // Aggregator task: single writer over history and the latest view.
    let (tick_tx, tick_rx) = mpsc::channel(config.channels.tick_capacity);
    let aggregator = Aggregator::new(enricher, Arc::new(hub.clone()), config.history_capacity);
    tokio::spawn(aggregator.run(tick_rx, shutdown_token.clone()));

    // Upstream feed client.
    let feed_status = Arc::new(FeedStatus::new());
    let mut feed_config = FeedClientConfig::new(&config.upstream.ws_url, &config.upstream.symbols);
    feed_config.reconnect = ReconnectConfig::from_settings(&config.upstream);
    feed_config.heartbeat = HeartbeatConfig {
        ping_interval: config.upstream.heartbeat_interval,
        timeout: config.upstream.heartbeat_timeout,
    };
    let feed_client = FeedClient::new(
        feed_config,
        Arc::new(WsConnector),
        tick_tx,
        Arc::clone(&feed_status),
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = feed_client.run().await {
            tracing::error!(error = %e, "Feed client error");
        }
    });

    // Subscriber server. A bind failure here is the one fatal startup error.
    let ws_state = Arc::new(WsServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        config.server.send_timeout,
        hub,
        Arc::clone(&feed_status),
    ));
    let ws_server = WsServer::new(config.server.port, ws_state, shutdown_token.clone());
    let server_task = tokio::spawn(ws_server.run());

    tracing::info!("Tick relay ready");

    tokio::select! {
        () = await_shutdown(shutdown_token.clone()) => {}
        result = server_task => {
            shutdown_token.cancel();
            if let Ok(Err(e)) = result {
                // Typically a port bind failure, the one fatal startup error.
                return Err(e.into());
            }
        }
    }

    tracing::info!("Tick relay stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Log the parsed configuration.
fn log_config(config: &RelayConfig) {
    tracing::info!(
        symbols = ?config.upstream.symbols,
        upstream = %config.upstream.ws_url,
        port = config.server.port,
        history_capacity = config.history_capacity,
        enrichment = config.enrich.url.is_some(),
        "Configuration loaded"
    );
}

/// Load .env file from any ancestor directory.
fn load_dotenv_from_ancestors() {
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT), then cancel.
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
