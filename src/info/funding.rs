//! Periodic funding-rate polling for the selected coin.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::types::FundingSnapshot;
use super::MarketDataSource;
use crate::metrics;

/// Polls funding for one coin at a time.
///
/// [`start`](Self::start) cancels any previous polling task before the new
/// one begins; a fetch that completes after its coin was replaced is
/// discarded. Failed fetches keep the previous value.
pub struct FundingPoller {
    source: Arc<dyn MarketDataSource>,
    period: Duration,
    latest: Arc<watch::Sender<Option<FundingSnapshot>>>,
    generation: Arc<AtomicU64>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl FundingPoller {
    /// Create a poller with the given period.
    pub fn new(source: Arc<dyn MarketDataSource>, period: Duration) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            source,
            period,
            latest: Arc::new(latest),
            generation: Arc::new(AtomicU64::new(0)),
            task: Mutex::new(None),
        }
    }

    /// Start polling `coin` immediately, replacing any previous task.
    pub fn start(&self, coin: impl Into<String>) {
        let coin = coin.into();
        let mut task = self.task.lock();
        if let Some(previous) = task.take() {
            previous.abort();
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.latest.send_replace(None);

        let source = Arc::clone(&self.source);
        let latest = Arc::clone(&self.latest);
        let current = Arc::clone(&self.generation);
        let period = self.period;

        info!(coin = %coin, period_s = period.as_secs(), "Funding polling started");
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;

                let started = Instant::now();
                let result = source.funding(coin.clone()).await;
                metrics::record_funding_latency(started.elapsed());

                if current.load(Ordering::SeqCst) != generation {
                    debug!(coin = %coin, "Discarding funding for replaced coin");
                    return;
                }
                match result {
                    Ok(snapshot) => {
                        debug!(coin = %coin, rate = %snapshot.funding_rate, "Funding updated");
                        latest.send_replace(Some(snapshot));
                    }
                    Err(e) => {
                        warn!(coin = %coin, error = %e, "Funding fetch failed, keeping previous value");
                    }
                }
            }
        }));
    }

    /// Stop polling.
    pub fn stop(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = self.task.lock().take() {
            task.abort();
            debug!("Funding polling stopped");
        }
    }

    /// Latest successfully fetched snapshot.
    pub fn latest(&self) -> Option<FundingSnapshot> {
        self.latest.borrow().clone()
    }

    /// Observe snapshot updates.
    pub fn watch(&self) -> watch::Receiver<Option<FundingSnapshot>> {
        self.latest.subscribe()
    }

    /// Polling period.
    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Drop for FundingPoller {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for FundingPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FundingPoller")
            .field("period", &self.period)
            .field("latest", &*self.latest.borrow())
            .finish()
    }
}
