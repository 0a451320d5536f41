//! Upstream Feed Client
//!
//! Maintains the single streaming connection to the exchange's combined
//! trade streams, decodes frames into ticks, and forwards them to the
//! aggregator over a bounded channel.
//!
//! Connection lifecycle is an explicit state machine
//! (DISCONNECTED → CONNECTING → CONNECTED → DISCONNECTED) with automatic
//! reconnection under an exponential-backoff policy. The transport is
//! injected through [`FeedConnector`] so the whole lifecycle is testable
//! without network I/O.
//!
//! Parse errors skip the offending frame and leave the connection open; a
//! heartbeat watchdog tears down silently dead connections so the reconnect
//! policy can take over.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{FeedConnector, FeedFrame, FeedStream, FeedTransportError};
use crate::domain::tick::Tick;

pub mod codec;
pub mod heartbeat;
pub mod reconnect;

use codec::TradeStreamCodec;
use heartbeat::{Heartbeat, HeartbeatAction, HeartbeatConfig};
use reconnect::{ReconnectConfig, ReconnectPolicy};

// =============================================================================
// Connection State
// =============================================================================

/// Upstream connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection and no attempt in flight.
    #[default]
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// Connected and streaming.
    Connected,
    /// Waiting out the backoff delay before the next attempt.
    Reconnecting,
}

impl ConnectionState {
    /// Lowercase name for logs and the health endpoint.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

/// Shared feed status read by the health endpoint.
#[derive(Debug, Default)]
pub struct FeedStatus {
    state: RwLock<ConnectionState>,
    messages_received: AtomicU64,
    reconnect_attempts: AtomicU32,
    last_error: RwLock<Option<String>>,
}

impl FeedStatus {
    /// Create a fresh status (disconnected).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Whether the feed is currently connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Total decoded ticks since startup.
    #[must_use]
    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    /// Reconnect attempts since the last successful connection.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }

    /// Most recent connection error, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }

    fn increment_messages(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    fn set_reconnect_attempts(&self, attempts: u32) {
        self.reconnect_attempts.store(attempts, Ordering::Relaxed);
    }

    fn set_error(&self, error: impl Into<String>) {
        *self.last_error.write() = Some(error.into());
    }
}

// =============================================================================
// WebSocket Connector
// =============================================================================

/// Production connector dialing the exchange over WebSocket (TLS).
#[derive(Debug, Default, Clone)]
pub struct WsConnector;

#[async_trait]
impl FeedConnector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn FeedStream>, FeedTransportError> {
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| FeedTransportError::ConnectFailed(e.to_string()))?;
        Ok(Box::new(WsFeedStream { inner: stream }))
    }
}

struct WsFeedStream {
    inner: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
}

#[async_trait]
impl FeedStream for WsFeedStream {
    async fn next_frame(&mut self) -> Option<Result<FeedFrame, FeedTransportError>> {
        loop {
            return match self.inner.next().await? {
                Ok(Message::Text(text)) => Some(Ok(FeedFrame::Text(text))),
                Ok(Message::Ping(data)) => Some(Ok(FeedFrame::Ping(data))),
                Ok(Message::Pong(data)) => Some(Ok(FeedFrame::Pong(data))),
                Ok(Message::Close(_)) => Some(Ok(FeedFrame::Close)),
                Ok(_) => continue,
                Err(e) => Some(Err(FeedTransportError::Stream(e.to_string()))),
            };
        }
    }

    async fn send_frame(&mut self, frame: FeedFrame) -> Result<(), FeedTransportError> {
        let message = match frame {
            FeedFrame::Text(text) => Message::Text(text),
            FeedFrame::Ping(data) => Message::Ping(data),
            FeedFrame::Pong(data) => Message::Pong(data),
            FeedFrame::Close => Message::Close(None),
        };
        self.inner
            .send(message)
            .await
            .map_err(|e| FeedTransportError::Stream(e.to_string()))
    }
}

// =============================================================================
// Feed Client
// =============================================================================

/// Errors that end the feed client for good.
#[derive(Debug, thiserror::Error)]
pub enum FeedClientError {
    /// The reconnect policy gave up.
    #[error("maximum reconnection attempts exceeded")]
    MaxReconnectAttemptsExceeded,
}

/// Configuration for the feed client.
#[derive(Debug, Clone)]
pub struct FeedClientConfig {
    /// Full combined-stream URL including the stream query.
    pub url: String,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
    /// Heartbeat configuration.
    pub heartbeat: HeartbeatConfig,
}

impl FeedClientConfig {
    /// Build the combined-stream URL for a symbol set.
    #[must_use]
    pub fn new(base_url: &str, symbols: &[String]) -> Self {
        Self {
            url: format!(
                "{}/{}",
                base_url.trim_end_matches('/'),
                TradeStreamCodec::stream_query(symbols)
            ),
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
        }
    }
}

/// Upstream feed client.
///
/// Owns the connection loop; decoded ticks go out through a bounded channel
/// and the shared [`FeedStatus`] tracks state for the health endpoint.
pub struct FeedClient {
    config: FeedClientConfig,
    connector: Arc<dyn FeedConnector>,
    codec: TradeStreamCodec,
    tick_tx: mpsc::Sender<Tick>,
    status: Arc<FeedStatus>,
    cancel: CancellationToken,
}

impl FeedClient {
    /// Create a new feed client.
    #[must_use]
    pub fn new(
        config: FeedClientConfig,
        connector: Arc<dyn FeedConnector>,
        tick_tx: mpsc::Sender<Tick>,
        status: Arc<FeedStatus>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            connector,
            codec: TradeStreamCodec::new(),
            tick_tx,
            status,
            cancel,
        }
    }

    /// Run the connection loop until cancelled or the reconnect policy gives
    /// up. Never panics and never drops the process on transient errors.
    ///
    /// # Errors
    ///
    /// Returns `FeedClientError::MaxReconnectAttemptsExceeded` when a
    /// bounded reconnect policy is exhausted.
    pub async fn run(self) -> Result<(), FeedClientError> {
        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("Feed client cancelled");
                self.status.set_state(ConnectionState::Disconnected);
                return Ok(());
            }

            self.status.set_state(ConnectionState::Connecting);

            match self.connect_and_run(&mut policy).await {
                Ok(()) => {
                    tracing::info!("Feed connection closed gracefully");
                    self.status.set_state(ConnectionState::Disconnected);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Feed connection error");
                    self.status.set_error(e.to_string());
                    self.status.set_state(ConnectionState::Disconnected);

                    let Some(delay) = policy.next_delay() else {
                        tracing::error!("Feed reconnect attempts exhausted");
                        return Err(FeedClientError::MaxReconnectAttemptsExceeded);
                    };

                    let attempt = policy.attempt_count();
                    self.status.set_state(ConnectionState::Reconnecting);
                    self.status.set_reconnect_attempts(attempt);
                    tracing::info!(
                        attempt,
                        delay_ms = delay.as_millis(),
                        "Reconnecting to feed"
                    );

                    tokio::select! {
                        () = self.cancel.cancelled() => {
                            tracing::info!("Feed client cancelled during reconnect delay");
                            self.status.set_state(ConnectionState::Disconnected);
                            return Ok(());
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Connect and stream until error or cancellation.
    async fn connect_and_run(
        &self,
        policy: &mut ReconnectPolicy,
    ) -> Result<(), FeedTransportError> {
        tracing::info!(url = %self.config.url, "Connecting to feed");

        let mut stream = self.connector.connect(&self.config.url).await?;

        self.status.set_state(ConnectionState::Connected);
        self.status.set_reconnect_attempts(0);
        policy.reset();
        tracing::info!("Feed connected");

        let mut heartbeat = Heartbeat::new(self.config.heartbeat.clone(), Instant::now());
        let mut heartbeat_interval = tokio::time::interval(Duration::from_secs(1));
        heartbeat_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    return Ok(());
                }
                _ = heartbeat_interval.tick() => {
                    match heartbeat.poll(Instant::now()) {
                        HeartbeatAction::Healthy => {}
                        HeartbeatAction::SendPing => {
                            stream.send_frame(FeedFrame::Ping(Vec::new())).await?;
                        }
                        HeartbeatAction::Timeout => {
                            tracing::warn!("Feed heartbeat timeout");
                            return Err(FeedTransportError::Stream(
                                "heartbeat timeout".to_string(),
                            ));
                        }
                    }
                }
                frame = stream.next_frame() => {
                    match frame {
                        Some(Ok(FeedFrame::Text(text))) => {
                            heartbeat.record_activity(Instant::now());
                            self.handle_text_frame(&text).await?;
                        }
                        Some(Ok(FeedFrame::Ping(data))) => {
                            heartbeat.record_activity(Instant::now());
                            stream.send_frame(FeedFrame::Pong(data)).await?;
                        }
                        Some(Ok(FeedFrame::Pong(_))) => {
                            heartbeat.record_activity(Instant::now());
                        }
                        Some(Ok(FeedFrame::Close)) => {
                            tracing::info!("Feed sent close frame");
                            return Err(FeedTransportError::Closed);
                        }
                        Some(Err(e)) => {
                            return Err(e);
                        }
                        None => {
                            tracing::info!("Feed stream ended");
                            return Err(FeedTransportError::Closed);
                        }
                    }
                }
            }
        }
    }

    /// Decode one text frame and forward the tick. Undecodable frames are
    /// logged and skipped; the connection stays open.
    async fn handle_text_frame(&self, text: &str) -> Result<(), FeedTransportError> {
        match self.codec.decode(text) {
            Ok(tick) => {
                self.status.increment_messages();
                if self.tick_tx.send(tick).await.is_err() {
                    tracing::info!("Tick channel closed, stopping feed");
                    return Err(FeedTransportError::Closed);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Skipping undecodable feed frame");
            }
        }
        Ok(())
    }
}
