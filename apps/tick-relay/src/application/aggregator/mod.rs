//! Tick Aggregation Pipeline
//!
//! The aggregator is the single writer over the shared feed state: for each
//! raw tick it runs best-effort enrichment, appends to the per-symbol
//! history, refreshes the latest view, and hands the composed update to the
//! fan-out hub. Internal failures degrade to "unenriched tick, history still
//! updated" and are never surfaced to the caller.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{Enrich, Publish, SymbolUpdate};
use crate::domain::history::SymbolHistory;
use crate::domain::tick::{EnrichedTick, Tick};

/// Orchestrates enrichment, history, and the latest view.
///
/// Owns `SymbolHistory` and the latest-view map exclusively; callers never
/// need their own locking. Enrichment happens before any state is touched,
/// so no shared state is held across the enrichment fetch.
pub struct Aggregator {
    enricher: Arc<dyn Enrich>,
    hub: Arc<dyn Publish>,
    history: SymbolHistory,
    latest: HashMap<String, EnrichedTick>,
}

impl Aggregator {
    /// Create an aggregator with the given history capacity.
    #[must_use]
    pub fn new(enricher: Arc<dyn Enrich>, hub: Arc<dyn Publish>, history_capacity: usize) -> Self {
        Self {
            enricher,
            hub,
            history: SymbolHistory::new(history_capacity),
            latest: HashMap::new(),
        }
    }

    /// Process one raw tick end to end. Infallible by contract.
    pub async fn on_tick(&mut self, tick: Tick) {
        let enriched = self.enricher.enrich(tick.clone()).await;

        self.history.append(tick.clone());
        self.latest.insert(tick.symbol.clone(), enriched.clone());

        let update = SymbolUpdate {
            latest: enriched,
            chart: self.history.snapshot(&tick.symbol),
        };
        self.hub.publish(update).await;
    }

    /// Latest enriched tick for `symbol`, if any tick has arrived.
    #[must_use]
    pub fn latest(&self, symbol: &str) -> Option<&EnrichedTick> {
        self.latest.get(symbol)
    }

    /// Read-only view of the history buffers.
    #[must_use]
    pub const fn history(&self) -> &SymbolHistory {
        &self.history
    }

    /// Consume ticks from `rx` until the channel closes or shutdown.
    pub async fn run(mut self, mut rx: mpsc::Receiver<Tick>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("Aggregator cancelled");
                    return;
                }
                tick = rx.recv() => {
                    match tick {
                        Some(tick) => self.on_tick(tick).await,
                        None => {
                            tracing::info!("Tick channel closed, aggregator stopping");
                            return;
                        }
                    }
                }
            }
        }
    }
}
