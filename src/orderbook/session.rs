//! Per-coin order-book session.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;
use tracing::trace;

use super::normalizer::normalize_book;
use super::types::OrderbookSnapshot;
use crate::feed::{BookUpdate, InboundMessage};

/// Owns the latest normalized book for one coin.
///
/// Updates for any other coin are ignored, so late frames from a previously
/// selected market never overwrite this session's state.
#[derive(Debug)]
pub struct OrderbookSession {
    coin: String,
    snapshot_tx: watch::Sender<OrderbookSnapshot>,
    updates: AtomicU64,
}

impl OrderbookSession {
    /// Create an empty session for `coin`.
    pub fn new(coin: impl Into<String>) -> Self {
        let coin = coin.into();
        let (snapshot_tx, _) = watch::channel(OrderbookSnapshot::empty(coin.clone()));
        Self {
            coin,
            snapshot_tx,
            updates: AtomicU64::new(0),
        }
    }

    /// Coin this session tracks.
    pub fn coin(&self) -> &str {
        &self.coin
    }

    /// Replace the snapshot if `update` is for this coin.
    pub fn apply(&self, update: &BookUpdate) -> bool {
        if update.coin != self.coin {
            trace!(expected = %self.coin, received = %update.coin, "Ignoring book for other coin");
            return false;
        }
        self.snapshot_tx.send_replace(normalize_book(update));
        self.updates.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Message handler entry point.
    pub fn handle(&self, message: &InboundMessage) -> anyhow::Result<()> {
        if let InboundMessage::L2Book(update) = message {
            self.apply(update);
        }
        Ok(())
    }

    /// Latest snapshot.
    pub fn snapshot(&self) -> OrderbookSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Observe snapshot replacements.
    pub fn watch(&self) -> watch::Receiver<OrderbookSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Number of updates applied.
    pub fn update_count(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }
}
