//! Per-Symbol Tick History
//!
//! Bounded rolling window of recent ticks per trading symbol, used to seed
//! new subscribers with chart data. Each symbol gets an independent
//! fixed-capacity ring: appends are O(1) amortized and the oldest tick is
//! evicted first once the window is full.

use std::collections::{HashMap, VecDeque};

use crate::domain::tick::Tick;

/// Default number of ticks retained per symbol.
pub const DEFAULT_CAPACITY: usize = 50;

/// Bounded per-symbol tick buffers with FIFO eviction.
///
/// Not thread-safe by itself; the aggregator task is the single writer.
#[derive(Debug, Clone)]
pub struct SymbolHistory {
    capacity: usize,
    buffers: HashMap<String, VecDeque<Tick>>,
}

impl Default for SymbolHistory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl SymbolHistory {
    /// Create a history with the given per-symbol capacity.
    ///
    /// A capacity of zero is clamped to one so every symbol always retains
    /// its latest tick.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            buffers: HashMap::new(),
        }
    }

    /// Per-symbol capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a tick to its symbol's buffer, evicting the oldest tick once
    /// the buffer is full. A first-seen symbol gets a fresh buffer.
    pub fn append(&mut self, tick: Tick) {
        let buffer = self
            .buffers
            .entry(tick.symbol.clone())
            .or_insert_with(|| VecDeque::with_capacity(self.capacity));

        if buffer.len() == self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(tick);
    }

    /// Copy of the current buffer for `symbol`, oldest first.
    ///
    /// Returns an empty vec for unknown symbols. The copy never mutates
    /// retroactively as new ticks arrive.
    #[must_use]
    pub fn snapshot(&self, symbol: &str) -> Vec<Tick> {
        self.buffers
            .get(symbol)
            .map(|buffer| buffer.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of every symbol seen so far.
    #[must_use]
    pub fn snapshot_all(&self) -> HashMap<String, Vec<Tick>> {
        self.buffers
            .keys()
            .map(|symbol| (symbol.clone(), self.snapshot(symbol)))
            .collect()
    }

    /// Number of ticks currently held for `symbol`.
    #[must_use]
    pub fn len(&self, symbol: &str) -> usize {
        self.buffers.get(symbol).map_or(0, VecDeque::len)
    }

    /// Whether no ticks have been recorded for any symbol.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers.values().all(VecDeque::is_empty)
    }

    /// Symbols with at least one recorded tick.
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.buffers.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;
    use rust_decimal::prelude::ToPrimitive;
    use rust_decimal::Decimal;

    fn tick(symbol: &str, price: i64) -> Tick {
        Tick::new(symbol, Decimal::from(price), Utc::now()).unwrap()
    }

    fn prices(history: &SymbolHistory, symbol: &str) -> Vec<i64> {
        history
            .snapshot(symbol)
            .iter()
            .map(|t| t.price.to_i64().unwrap())
            .collect()
    }

    #[test]
    fn append_creates_buffer_for_new_symbol() {
        let mut history = SymbolHistory::new(3);
        assert_eq!(history.snapshot("BTCUSDT"), vec![]);

        history.append(tick("BTCUSDT", 50000));
        assert_eq!(history.len("BTCUSDT"), 1);
    }

    #[test]
    fn fifo_eviction_at_capacity_two() {
        // Feed emits 50000 then 50010 with capacity 2, then a third tick.
        let mut history = SymbolHistory::new(2);

        history.append(tick("BTCUSDT", 50000));
        history.append(tick("BTCUSDT", 50010));
        assert_eq!(prices(&history, "BTCUSDT"), vec![50000, 50010]);

        history.append(tick("BTCUSDT", 50020));
        assert_eq!(prices(&history, "BTCUSDT"), vec![50010, 50020]);
    }

    #[test]
    fn symbols_have_independent_buffers() {
        let mut history = SymbolHistory::new(2);
        history.append(tick("BTCUSDT", 50000));
        history.append(tick("ETHUSDT", 3000));
        history.append(tick("BTCUSDT", 50010));
        history.append(tick("BTCUSDT", 50020));

        assert_eq!(prices(&history, "BTCUSDT"), vec![50010, 50020]);
        assert_eq!(prices(&history, "ETHUSDT"), vec![3000]);
    }

    #[test]
    fn snapshot_is_a_copy() {
        let mut history = SymbolHistory::new(5);
        history.append(tick("BTCUSDT", 50000));

        let snapshot = history.snapshot("BTCUSDT");
        history.append(tick("BTCUSDT", 50010));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(history.len("BTCUSDT"), 2);
    }

    #[test]
    fn snapshot_all_covers_every_symbol() {
        let mut history = SymbolHistory::new(5);
        history.append(tick("BTCUSDT", 50000));
        history.append(tick("ETHUSDT", 3000));

        let all = history.snapshot_all();
        assert_eq!(all.len(), 2);
        assert_eq!(all["BTCUSDT"].len(), 1);
        assert_eq!(all["ETHUSDT"].len(), 1);
    }

    #[test]
    fn zero_capacity_clamped_to_one() {
        let mut history = SymbolHistory::new(0);
        history.append(tick("BTCUSDT", 50000));
        history.append(tick("BTCUSDT", 50010));
        assert_eq!(prices(&history, "BTCUSDT"), vec![50010]);
    }

    proptest! {
        // For any tick sequence, buffer length is min(N, count) and content
        // equals the last N ticks in arrival order.
        #[test]
        fn window_holds_last_n_in_order(
            capacity in 1usize..20,
            sequence in proptest::collection::vec(1i64..1_000_000, 0..100),
        ) {
            let mut history = SymbolHistory::new(capacity);
            for price in &sequence {
                history.append(tick("BTCUSDT", *price));
            }

            let expected: Vec<i64> = sequence
                .iter()
                .copied()
                .skip(sequence.len().saturating_sub(capacity))
                .collect();

            prop_assert_eq!(history.len("BTCUSDT"), sequence.len().min(capacity));
            prop_assert_eq!(prices(&history, "BTCUSDT"), expected);
        }
    }
}
