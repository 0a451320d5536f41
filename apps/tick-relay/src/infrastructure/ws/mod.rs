//! Subscriber WebSocket Server
//!
//! Serves the persistent push connection for downstream subscribers plus the
//! health endpoints, all on the single configured port.
//!
//! # Endpoints
//!
//! - `GET /ws` - Subscriber WebSocket (snapshot on connect, then live updates)
//! - `GET /health` - JSON health status including feed state
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /readyz` - Readiness probe (checks the upstream feed)
//!
//! Each accepted socket becomes two tasks: a writer draining the session's
//! outbound queue with a per-send timeout, and a reader parsing control
//! messages. Either side ending tears the session down and unregisters it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    Json, Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use chrono::{DateTime, Utc};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::infrastructure::broadcast::{BroadcasterHandle, OutboundMessage, SessionId};
use crate::infrastructure::broadcast::control::ControlMessage;
use crate::infrastructure::feed::FeedStatus;

// =============================================================================
// Server State
// =============================================================================

/// Shared state for the subscriber server.
pub struct WsServerState {
    version: String,
    started_at: Instant,
    send_timeout: Duration,
    broadcaster: BroadcasterHandle,
    feed_status: Arc<FeedStatus>,
}

impl WsServerState {
    /// Create new server state.
    #[must_use]
    pub fn new(
        version: String,
        send_timeout: Duration,
        broadcaster: BroadcasterHandle,
        feed_status: Arc<FeedStatus>,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            send_timeout,
            broadcaster,
            feed_status,
        }
    }
}

// =============================================================================
// Server
// =============================================================================

/// Subscriber server errors. A bind failure is the one startup error the
/// process treats as fatal.
#[derive(Debug, thiserror::Error)]
pub enum WsServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

/// Subscriber WebSocket + health HTTP server.
pub struct WsServer {
    port: u16,
    state: Arc<WsServerState>,
    cancel: CancellationToken,
}

impl WsServer {
    /// Create a new server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<WsServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `WsServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), WsServerError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| WsServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Subscriber server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| WsServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Subscriber server stopped");
        Ok(())
    }
}

/// Build the subscriber router. Split out so tests can serve it on an
/// ephemeral port.
#[must_use]
pub fn router(state: Arc<WsServerState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .with_state(state)
}

// =============================================================================
// WebSocket Session
// =============================================================================

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<WsServerState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Run one subscriber session to completion.
async fn handle_socket(socket: WebSocket, state: Arc<WsServerState>) {
    let Some(registration) = state.broadcaster.register().await else {
        tracing::warn!("Hub stopped, rejecting new session");
        return;
    };
    let session_id = registration.id;
    tracing::info!(session = %session_id, "Subscriber connected");

    let (sender, receiver) = socket.split();

    let mut write_task = tokio::spawn(write_loop(
        sender,
        registration.rx,
        session_id,
        state.send_timeout,
    ));
    let mut read_task = tokio::spawn(read_loop(receiver, session_id, state.broadcaster.clone()));

    // Either side ending closes the session.
    tokio::select! {
        _ = &mut write_task => read_task.abort(),
        _ = &mut read_task => write_task.abort(),
    }

    state.broadcaster.unregister(session_id).await;
    tracing::info!(session = %session_id, "Subscriber disconnected");
}

/// Drain the session queue onto the socket. Each send is bounded by the
/// configured timeout so a stalled client ends its own session instead of
/// backing up the queue forever.
async fn write_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut rx: tokio::sync::mpsc::Receiver<OutboundMessage>,
    session_id: SessionId,
    send_timeout: Duration,
) {
    while let Some(message) = rx.recv().await {
        let json = match serde_json::to_string(&message) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(session = %session_id, error = %e, "Failed to encode message");
                continue;
            }
        };

        match tokio::time::timeout(send_timeout, sender.send(Message::Text(json.into()))).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::info!(session = %session_id, error = %e, "Session send failed");
                return;
            }
            Err(_) => {
                tracing::warn!(session = %session_id, "Session send timed out");
                return;
            }
        }
    }
}

/// Parse inbound control messages. Malformed input is logged and ignored;
/// it never closes the session.
async fn read_loop(
    mut receiver: SplitStream<WebSocket>,
    session_id: SessionId,
    broadcaster: BroadcasterHandle,
) {
    while let Some(result) = receiver.next().await {
        let message = match result {
            Ok(message) => message,
            Err(e) => {
                tracing::info!(session = %session_id, error = %e, "Session receive error");
                return;
            }
        };

        match message {
            Message::Text(text) => match serde_json::from_str::<ControlMessage>(&text) {
                Ok(control) => broadcaster.control(session_id, control).await,
                Err(e) => {
                    tracing::warn!(
                        session = %session_id,
                        error = %e,
                        "Ignoring malformed control message"
                    );
                }
            },
            Message::Binary(_) => {
                tracing::warn!(session = %session_id, "Ignoring binary message");
            }
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(_) => {
                tracing::debug!(session = %session_id, "Session sent close");
                return;
            }
        }
    }
}

// =============================================================================
// Health Endpoints
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy" or "degraded".
    pub status: HealthStatus,
    /// Relay version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Upstream feed status.
    pub feed: FeedInfo,
    /// Connected subscriber sessions.
    pub sessions: usize,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Feed connected, sessions being served.
    Healthy,
    /// Feed down but existing sessions still served from last known state.
    Degraded,
}

/// Upstream feed status.
#[derive(Debug, Clone, Serialize)]
pub struct FeedInfo {
    /// Connection state.
    pub state: String,
    /// Whether the feed is connected.
    pub connected: bool,
    /// Ticks decoded since startup.
    pub messages_received: u64,
    /// Reconnect attempts since the last successful connection.
    pub reconnect_attempts: u32,
    /// Most recent connection error, if any.
    pub last_error: Option<String>,
}

async fn health_handler(State(state): State<Arc<WsServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state).await;
    // A dropped feed degrades the relay but never makes it unavailable:
    // open sessions keep the last known state.
    (StatusCode::OK, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<WsServerState>>) -> impl IntoResponse {
    if state.feed_status.is_connected() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn build_health_response(state: &WsServerState) -> HealthResponse {
    let feed_state = state.feed_status.state();
    let connected = state.feed_status.is_connected();

    let sessions = state
        .broadcaster
        .stats()
        .await
        .map_or(0, |stats| stats.sessions);

    HealthResponse {
        status: if connected {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        },
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        feed: FeedInfo {
            state: feed_state.as_str().to_string(),
            connected,
            messages_received: state.feed_status.messages_received(),
            reconnect_attempts: state.feed_status.reconnect_attempts(),
            last_error: state.feed_status.last_error(),
        },
        sessions,
    }
}

// =============================================================================
// Tests
// =============================================================================
