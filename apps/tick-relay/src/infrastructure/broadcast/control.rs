//! Control Channel Types
//!
//! Inbound control verbs from subscriber sessions and the process-wide
//! state they mutate. Malformed control input is the session reader's
//! problem (logged and ignored there); everything arriving here is typed.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Client→server control verbs.
///
/// # Wire Format (JSON)
///
/// ```json
/// {"type": "toggle_bot"}
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Flip the background bot's running state.
    ToggleBot,
}

/// Process-wide bot state, mutated only via control messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessState {
    /// Whether the bot is running.
    pub running: bool,
    /// Bot balance. Transition semantics on toggle are supplied by the
    /// integrating system through a [`BalancePolicy`].
    pub balance: Decimal,
}

impl ProcessState {
    /// Startup state: not running, zero balance.
    #[must_use]
    pub const fn initial() -> Self {
        Self {
            running: false,
            balance: Decimal::ZERO,
        }
    }

    /// Flip `running` and let `policy` decide the new balance.
    pub fn toggle(&mut self, policy: &dyn BalancePolicy) {
        self.running = !self.running;
        self.balance = policy.next_balance(self.running, self.balance);
    }
}

impl Default for ProcessState {
    fn default() -> Self {
        Self::initial()
    }
}

/// Balance transition applied on each toggle.
///
/// The reference behavior assigned a placeholder random balance; that is
/// demo logic, not product behavior, so the transition is injected and the
/// default keeps the balance unchanged.
pub trait BalancePolicy: Send + Sync {
    /// Compute the balance after a toggle to `running`.
    fn next_balance(&self, running: bool, current: Decimal) -> Decimal;
}

/// Default policy: the balance never changes.
#[derive(Debug, Default, Clone, Copy)]
pub struct HoldBalance;

impl BalancePolicy for HoldBalance {
    fn next_balance(&self, _running: bool, current: Decimal) -> Decimal {
        current
    }
}
