//! Feed Heartbeat Watchdog
//!
//! Detects silently dead upstream connections. Any inbound frame counts as
//! activity; if the connection stays quiet past the ping interval a ping is
//! due, and if it stays quiet past the timeout the connection is declared
//! dead so the client can reconnect.

use std::time::{Duration, Instant};

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Quiet time after which a ping is sent.
    pub ping_interval: Duration,
    /// Quiet time after which the connection is considered dead.
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(20),
            timeout: Duration::from_secs(60),
        }
    }
}

/// What the connection loop should do at a poll point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Connection is healthy, nothing to do.
    Healthy,
    /// Quiet for a while, send a ping.
    SendPing,
    /// Quiet past the timeout, tear the connection down.
    Timeout,
}

/// Pure heartbeat state machine; the caller supplies the clock.
#[derive(Debug)]
pub struct Heartbeat {
    config: HeartbeatConfig,
    last_activity: Instant,
    last_ping: Option<Instant>,
}

impl Heartbeat {
    /// Start tracking from `now`.
    #[must_use]
    pub const fn new(config: HeartbeatConfig, now: Instant) -> Self {
        Self {
            config,
            last_activity: now,
            last_ping: None,
        }
    }

    /// Record inbound activity (any frame, including pongs).
    pub fn record_activity(&mut self, now: Instant) {
        self.last_activity = now;
        self.last_ping = None;
    }

    /// Decide what the connection loop should do at `now`.
    pub fn poll(&mut self, now: Instant) -> HeartbeatAction {
        let quiet = now.duration_since(self.last_activity);

        if quiet >= self.config.timeout {
            return HeartbeatAction::Timeout;
        }

        if quiet >= self.config.ping_interval && self.last_ping.is_none() {
            self.last_ping = Some(now);
            return HeartbeatAction::SendPing;
        }

        HeartbeatAction::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(ping_secs: u64, timeout_secs: u64) -> HeartbeatConfig {
        HeartbeatConfig {
            ping_interval: Duration::from_secs(ping_secs),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    #[test]
    fn healthy_while_active() {
        let start = Instant::now();
        let mut hb = Heartbeat::new(config(20, 60), start);

        assert_eq!(hb.poll(start + Duration::from_secs(5)), HeartbeatAction::Healthy);
    }

    #[test]
    fn ping_after_quiet_interval() {
        let start = Instant::now();
        let mut hb = Heartbeat::new(config(20, 60), start);

        assert_eq!(
            hb.poll(start + Duration::from_secs(25)),
            HeartbeatAction::SendPing
        );
        // Only one ping per quiet period.
        assert_eq!(
            hb.poll(start + Duration::from_secs(30)),
            HeartbeatAction::Healthy
        );
    }

    #[test]
    fn activity_resets_ping_cycle() {
        let start = Instant::now();
        let mut hb = Heartbeat::new(config(20, 60), start);

        assert_eq!(
            hb.poll(start + Duration::from_secs(25)),
            HeartbeatAction::SendPing
        );
        hb.record_activity(start + Duration::from_secs(26));
        assert_eq!(
            hb.poll(start + Duration::from_secs(30)),
            HeartbeatAction::Healthy
        );
        assert_eq!(
            hb.poll(start + Duration::from_secs(47)),
            HeartbeatAction::SendPing
        );
    }

    #[test]
    fn timeout_when_quiet_too_long() {
        let start = Instant::now();
        let mut hb = Heartbeat::new(config(20, 60), start);

        assert_eq!(
            hb.poll(start + Duration::from_secs(61)),
            HeartbeatAction::Timeout
        );
    }
}
