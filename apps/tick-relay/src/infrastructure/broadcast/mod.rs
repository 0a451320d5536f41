//! Fan-Out Hub
//!
//! The broadcaster is a single actor task that owns the subscriber session
//! set, a per-symbol cache of the last composed update (the snapshot source
//! for new sessions), and the process-wide bot state. All mutation flows
//! through its command channel, so the feed pipeline, new connections, and
//! per-session control readers never need their own locking.
//!
//! Delivery is isolation-first: the actor only ever `try_send`s into each
//! session's bounded queue, so one slow or dead subscriber can neither block
//! the actor nor delay the other sessions. A session whose queue is full or
//! closed is unregistered on the spot; the publisher never sees the failure.
//! Socket writes happen in per-session writer tasks (see the `ws` module),
//! outside this actor.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::application::ports::{Publish, SymbolUpdate};

pub mod control;

use control::{BalancePolicy, ControlMessage, ProcessState};

/// Opaque subscriber session identifier.
pub type SessionId = Uuid;

// =============================================================================
// Outbound Messages
// =============================================================================

/// Server→client messages fanned out to every session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Latest enriched tick plus recent history for one symbol.
    Update(SymbolUpdate),
    /// Bot state after a control toggle (also part of the connect snapshot).
    BotStatus {
        /// Whether the bot is running.
        running: bool,
        /// Current bot balance.
        balance: Decimal,
    },
}

// =============================================================================
// Commands and Handle
// =============================================================================

/// A freshly registered session: its id and the outbound queue to drain.
#[derive(Debug)]
pub struct Registration {
    /// Session id, used for unregistering and attributing control messages.
    pub id: SessionId,
    /// Outbound message queue; the snapshot is already queued at the front.
    pub rx: mpsc::Receiver<OutboundMessage>,
}

/// Point-in-time hub statistics for the health endpoint.
#[derive(Debug, Clone, Copy)]
pub struct HubStats {
    /// Connected sessions.
    pub sessions: usize,
    /// Symbols with a cached update.
    pub symbols: usize,
    /// Current bot state.
    pub state: ProcessState,
}

enum Command {
    Register {
        reply: oneshot::Sender<Registration>,
    },
    Unregister {
        id: SessionId,
    },
    Publish {
        update: SymbolUpdate,
    },
    Control {
        from: SessionId,
        message: ControlMessage,
    },
    Stats {
        reply: oneshot::Sender<HubStats>,
    },
}

/// Cloneable handle to the broadcaster actor.
///
/// Every method is fire-and-forget against a stopped actor: once the hub is
/// gone (shutdown) there is nobody left to deliver to anyway.
#[derive(Clone)]
pub struct BroadcasterHandle {
    tx: mpsc::Sender<Command>,
}

impl BroadcasterHandle {
    /// Register a new session. The returned queue already contains the full
    /// snapshot (one update per known symbol, then the bot status), so the
    /// subscriber never sees a gap before live updates.
    ///
    /// Returns `None` if the hub has stopped.
    pub async fn register(&self) -> Option<Registration> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Command::Register { reply }).await.ok()?;
        rx.await.ok()
    }

    /// Remove a session. Idempotent; unknown ids are ignored.
    pub async fn unregister(&self, id: SessionId) {
        let _ = self.tx.send(Command::Unregister { id }).await;
    }

    /// Apply a control message from `from` and broadcast the resulting
    /// state to every session, including the originator.
    pub async fn control(&self, from: SessionId, message: ControlMessage) {
        let _ = self.tx.send(Command::Control { from, message }).await;
    }

    /// Current hub statistics, or `None` if the hub has stopped.
    pub async fn stats(&self) -> Option<HubStats> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Command::Stats { reply }).await.ok()?;
        rx.await.ok()
    }
}

#[async_trait::async_trait]
impl Publish for BroadcasterHandle {
    async fn publish(&self, update: SymbolUpdate) {
        let _ = self.tx.send(Command::Publish { update }).await;
    }
}

// =============================================================================
// Broadcaster Actor
// =============================================================================

/// Configuration for the broadcaster actor.
#[derive(Debug, Clone, Copy)]
pub struct BroadcasterConfig {
    /// Command channel capacity.
    pub command_capacity: usize,
    /// Per-session outbound queue capacity.
    pub session_queue_capacity: usize,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            command_capacity: 1024,
            session_queue_capacity: 256,
        }
    }
}

/// The fan-out actor. Single owner of the session set, the per-symbol
/// snapshot cache, and the bot state.
pub struct Broadcaster {
    rx: mpsc::Receiver<Command>,
    config: BroadcasterConfig,
    policy: Arc<dyn BalancePolicy>,
    sessions: HashMap<SessionId, mpsc::Sender<OutboundMessage>>,
    snapshots: HashMap<String, SymbolUpdate>,
    state: ProcessState,
}

impl Broadcaster {
    /// Create the actor and its handle.
    #[must_use]
    pub fn new(
        config: BroadcasterConfig,
        policy: Arc<dyn BalancePolicy>,
    ) -> (Self, BroadcasterHandle) {
        let (tx, rx) = mpsc::channel(config.command_capacity);
        let actor = Self {
            rx,
            config,
            policy,
            sessions: HashMap::new(),
            snapshots: HashMap::new(),
            state: ProcessState::initial(),
        };
        (actor, BroadcasterHandle { tx })
    }

    /// Run until every handle is dropped or shutdown is signalled.
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!(sessions = self.sessions.len(), "Broadcaster shutting down");
                    return;
                }
                command = self.rx.recv() => {
                    match command {
                        Some(command) => self.handle(command),
                        None => {
                            tracing::info!("All broadcaster handles dropped, stopping");
                            return;
                        }
                    }
                }
            }
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Register { reply } => {
                let registration = self.register();
                let _ = reply.send(registration);
            }
            Command::Unregister { id } => {
                if self.sessions.remove(&id).is_some() {
                    tracing::info!(session = %id, "Session unregistered");
                }
            }
            Command::Publish { update } => self.publish(update),
            Command::Control { from, message } => self.control(from, message),
            Command::Stats { reply } => {
                let _ = reply.send(HubStats {
                    sessions: self.sessions.len(),
                    symbols: self.snapshots.len(),
                    state: self.state,
                });
            }
        }
    }

    /// Create a session and queue its snapshot before it becomes eligible
    /// for live updates, so snapshot-then-live ordering holds per session.
    fn register(&mut self) -> Registration {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.config.session_queue_capacity);

        // Snapshot size is known up front (one update per symbol plus the
        // bot status). A queue too small to hold it queues nothing, so the
        // subscriber sees a clean close instead of a truncated snapshot.
        if self.snapshots.len() < self.config.session_queue_capacity {
            for update in self.snapshots.values() {
                let _ = tx.try_send(OutboundMessage::Update(update.clone()));
            }
            let _ = tx.try_send(self.bot_status());
            self.sessions.insert(id, tx);
            tracing::info!(session = %id, symbols = self.snapshots.len(), "Session registered");
        } else {
            tracing::warn!(session = %id, "Session queue cannot hold snapshot, closing");
        }

        Registration { id, rx }
    }

    /// Cache the update as the symbol's snapshot and fan it out.
    fn publish(&mut self, update: SymbolUpdate) {
        self.snapshots
            .insert(update.latest.tick.symbol.clone(), update.clone());
        self.fan_out(&OutboundMessage::Update(update));
    }

    fn control(&mut self, from: SessionId, message: ControlMessage) {
        match message {
            ControlMessage::ToggleBot => {
                self.state.toggle(self.policy.as_ref());
                tracing::info!(
                    session = %from,
                    running = self.state.running,
                    "Bot toggled"
                );
                let status = self.bot_status();
                self.fan_out(&status);
            }
        }
    }

    /// Deliver to every session without blocking. A full or closed queue
    /// unregisters that session; the others are unaffected.
    fn fan_out(&mut self, message: &OutboundMessage) {
        let mut dropped: Vec<SessionId> = Vec::new();

        for (id, tx) in &self.sessions {
            match tx.try_send(message.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(session = %id, "Session queue full, dropping session");
                    dropped.push(*id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    dropped.push(*id);
                }
            }
        }

        for id in dropped {
            self.sessions.remove(&id);
        }
    }

    const fn bot_status(&self) -> OutboundMessage {
        OutboundMessage::BotStatus {
            running: self.state.running,
            balance: self.state.balance,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tick::{EnrichedTick, Tick};
    use chrono::Utc;
    use control::HoldBalance;

    fn update(symbol: &str, price: i64) -> SymbolUpdate {
        let tick = Tick::new(symbol, Decimal::from(price), Utc::now()).unwrap();
        SymbolUpdate {
            latest: EnrichedTick::bare(tick.clone()),
            chart: vec![tick],
        }
    }

    fn spawn_hub(config: BroadcasterConfig) -> (BroadcasterHandle, CancellationToken) {
        let (actor, handle) = Broadcaster::new(config, Arc::new(HoldBalance));
        let cancel = CancellationToken::new();
        tokio::spawn(actor.run(cancel.clone()));
        (handle, cancel)
    }

    #[tokio::test]
    async fn fresh_hub_snapshot_is_bot_status_only() {
        let (hub, _cancel) = spawn_hub(BroadcasterConfig::default());

        let mut registration = hub.register().await.unwrap();
        let first = registration.rx.recv().await.unwrap();

        assert_eq!(
            first,
            OutboundMessage::BotStatus {
                running: false,
                balance: Decimal::ZERO,
            }
        );
    }

    #[tokio::test]
    async fn snapshot_precedes_live_updates() {
        let (hub, _cancel) = spawn_hub(BroadcasterConfig::default());

        hub.publish(update("BTCUSDT", 50000)).await;
        hub.publish(update("BTCUSDT", 50010)).await;

        let mut registration = hub.register().await.unwrap();

        // Snapshot first: the cached latest update, then the bot status.
        let first = registration.rx.recv().await.unwrap();
        match first {
            OutboundMessage::Update(u) => {
                assert_eq!(u.latest.tick.symbol, "BTCUSDT");
                assert_eq!(u.latest.tick.price, Decimal::from(50010));
            }
            other => panic!("expected snapshot update, got {other:?}"),
        }
        assert!(matches!(
            registration.rx.recv().await.unwrap(),
            OutboundMessage::BotStatus { .. }
        ));

        // Only then the live stream.
        hub.publish(update("BTCUSDT", 50020)).await;
        match registration.rx.recv().await.unwrap() {
            OutboundMessage::Update(u) => {
                assert_eq!(u.latest.tick.price, Decimal::from(50020));
            }
            other => panic!("expected live update, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn publish_reaches_every_session() {
        let (hub, _cancel) = spawn_hub(BroadcasterConfig::default());

        let mut a = hub.register().await.unwrap();
        let mut b = hub.register().await.unwrap();

        // Drain the connect snapshots.
        let _ = a.rx.recv().await.unwrap();
        let _ = b.rx.recv().await.unwrap();

        hub.publish(update("ETHUSDT", 3000)).await;

        for rx in [&mut a.rx, &mut b.rx] {
            match rx.recv().await.unwrap() {
                OutboundMessage::Update(u) => assert_eq!(u.latest.tick.symbol, "ETHUSDT"),
                other => panic!("expected update, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn full_session_queue_drops_only_that_session() {
        let (hub, _cancel) = spawn_hub(BroadcasterConfig {
            command_capacity: 64,
            session_queue_capacity: 2,
        });

        let mut stuck = hub.register().await.unwrap();
        let mut healthy = hub.register().await.unwrap();
        let _ = healthy.rx.recv().await.unwrap(); // bot status

        // The stuck session never drains: bot status + one update fill its
        // queue, the next publish overflows it.
        hub.publish(update("BTCUSDT", 50000)).await;
        match healthy.rx.recv().await.unwrap() {
            OutboundMessage::Update(_) => {}
            other => panic!("expected update, got {other:?}"),
        }

        hub.publish(update("BTCUSDT", 50010)).await;
        match healthy.rx.recv().await.unwrap() {
            OutboundMessage::Update(u) => assert_eq!(u.latest.tick.price, Decimal::from(50010)),
            other => panic!("expected update, got {other:?}"),
        }

        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.sessions, 1);

        // The dropped session's queue ends after what was delivered.
        let mut seen = 0;
        while stuck.rx.recv().await.is_some() {
            seen += 1;
        }
        assert_eq!(seen, 2);
    }

    #[tokio::test]
    async fn snapshot_larger_than_queue_closes_session_with_nothing_delivered() {
        let (hub, _cancel) = spawn_hub(BroadcasterConfig {
            command_capacity: 64,
            session_queue_capacity: 2,
        });

        // Two symbols plus the bot status is three snapshot messages; the
        // queue holds two. The session must not see a truncated snapshot.
        hub.publish(update("BTCUSDT", 50000)).await;
        hub.publish(update("ETHUSDT", 3000)).await;

        let mut registration = hub.register().await.unwrap();

        assert!(registration.rx.recv().await.is_none());
        assert_eq!(hub.stats().await.unwrap().sessions, 0);
    }

    #[tokio::test]
    async fn toggle_broadcasts_to_all_including_originator() {
        let (hub, _cancel) = spawn_hub(BroadcasterConfig::default());

        let mut a = hub.register().await.unwrap();
        let mut b = hub.register().await.unwrap();
        let _ = a.rx.recv().await.unwrap();
        let _ = b.rx.recv().await.unwrap();

        hub.control(a.id, ControlMessage::ToggleBot).await;

        for rx in [&mut a.rx, &mut b.rx] {
            match rx.recv().await.unwrap() {
                OutboundMessage::BotStatus { running, balance } => {
                    assert!(running);
                    assert_eq!(balance, Decimal::ZERO);
                }
                other => panic!("expected bot status, got {other:?}"),
            }
        }

        // Second toggle restores the original value, observed by everyone.
        hub.control(b.id, ControlMessage::ToggleBot).await;
        for rx in [&mut a.rx, &mut b.rx] {
            match rx.recv().await.unwrap() {
                OutboundMessage::BotStatus { running, .. } => assert!(!running),
                other => panic!("expected bot status, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn injected_policy_controls_balance() {
        struct FixedBalance(Decimal);
        impl BalancePolicy for FixedBalance {
            fn next_balance(&self, _running: bool, _current: Decimal) -> Decimal {
                self.0
            }
        }

        let (actor, hub) = Broadcaster::new(
            BroadcasterConfig::default(),
            Arc::new(FixedBalance(Decimal::from(123))),
        );
        let cancel = CancellationToken::new();
        tokio::spawn(actor.run(cancel.clone()));

        let mut session = hub.register().await.unwrap();
        let _ = session.rx.recv().await.unwrap();

        hub.control(session.id, ControlMessage::ToggleBot).await;
        match session.rx.recv().await.unwrap() {
            OutboundMessage::BotStatus { balance, .. } => {
                assert_eq!(balance, Decimal::from(123));
            }
            other => panic!("expected bot status, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let (hub, _cancel) = spawn_hub(BroadcasterConfig::default());

        let registration = hub.register().await.unwrap();
        hub.unregister(registration.id).await;
        hub.unregister(registration.id).await;

        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.sessions, 0);
    }

    #[test]
    fn outbound_message_wire_format() {
        let message = OutboundMessage::Update(update("BTCUSDT", 50000));
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["type"], "update");
        assert_eq!(value["latest"]["symbol"], "BTCUSDT");
        assert!(value["chart"].is_array());

        let status = OutboundMessage::BotStatus {
            running: true,
            balance: Decimal::from(10),
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["type"], "bot_status");
        assert_eq!(value["running"], true);
    }
}
