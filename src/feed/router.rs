//! Reference-counted subscription routing over the shared connection.
//!
//! Consumers declare interest with [`SubscriptionRouter::acquire`] and drop it
//! with [`SubscriptionRouter::release`]. The wire `subscribe` goes out once per
//! distinct subscription, the `unsubscribe` once the last consumer releases it.
//! Subscriptions requested while disconnected are (re)issued by the status
//! observer on the next transition into `Connected`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::connection::{ConnectionManager, ConnectionStatus};
use super::messages::{ControlMessage, Subscription};

/// Where control messages go.
pub trait ControlSink: Send + Sync {
    /// Write a control message; `false` if the transport is not open.
    fn send_control(&self, message: &ControlMessage) -> bool;
    /// Current connection status.
    fn status(&self) -> ConnectionStatus;
    /// Number of successful opens so far.
    fn connection_epoch(&self) -> u64;
}

impl ControlSink for ConnectionManager {
    fn send_control(&self, message: &ControlMessage) -> bool {
        self.send(message)
    }

    fn status(&self) -> ConnectionStatus {
        ConnectionManager::status(self)
    }

    fn connection_epoch(&self) -> u64 {
        ConnectionManager::connection_epoch(self)
    }
}

#[derive(Debug, Default)]
struct RouterState {
    /// Desired subscriptions and their consumer counts.
    refcounts: HashMap<Subscription, usize>,
    /// Subscriptions sent on the current connection.
    active: HashSet<Subscription>,
    /// Connection epoch `active` refers to.
    epoch: u64,
}

/// Tracks consumer interest and emits subscribe/unsubscribe exactly once.
pub struct SubscriptionRouter {
    sink: Arc<dyn ControlSink>,
    state: Mutex<RouterState>,
}

impl SubscriptionRouter {
    /// Create a router writing through `sink`.
    pub fn new(sink: Arc<dyn ControlSink>) -> Self {
        Self {
            sink,
            state: Mutex::new(RouterState::default()),
        }
    }

    /// Register one consumer's interest in `subscription`.
    pub fn acquire(&self, subscription: Subscription) {
        let mut state = self.state.lock();
        let count = state.refcounts.entry(subscription.clone()).or_insert(0);
        *count += 1;
        if *count > 1 {
            debug!(?subscription, consumers = *count, "Subscription shared");
            return;
        }

        if self.sink.status() != ConnectionStatus::Connected {
            debug!(?subscription, "Not connected, subscribe deferred");
            return;
        }
        self.sync_epoch(&mut state);
        self.send_subscribe(&mut state, subscription);
    }

    /// Drop one consumer's interest in `subscription`.
    pub fn release(&self, subscription: &Subscription) {
        let mut state = self.state.lock();
        let Some(count) = state.refcounts.get_mut(subscription) else {
            warn!(?subscription, "Release of a subscription that was never acquired");
            return;
        };
        *count -= 1;
        if *count > 0 {
            return;
        }
        state.refcounts.remove(subscription);

        if self.sink.status() != ConnectionStatus::Connected {
            state.active.remove(subscription);
            return;
        }
        self.sync_epoch(&mut state);
        if state.active.remove(subscription) {
            let message = ControlMessage::unsubscribe(subscription.clone());
            if self.sink.send_control(&message) {
                info!(?subscription, "Unsubscribed");
            }
        }
    }

    /// Move one consumer from `old` to `new`.
    pub fn switch(&self, old: &Subscription, new: Subscription) {
        if *old == new {
            return;
        }
        self.release(old);
        self.acquire(new);
    }

    /// React to a connection status transition.
    pub fn on_status(&self, status: ConnectionStatus) {
        let mut state = self.state.lock();
        if status != ConnectionStatus::Connected {
            // The exchange forgets subscriptions with the connection.
            state.active.clear();
            return;
        }

        self.sync_epoch(&mut state);
        let pending: Vec<Subscription> = state
            .refcounts
            .keys()
            .filter(|sub| !state.active.contains(*sub))
            .cloned()
            .collect();
        if !pending.is_empty() {
            info!(count = pending.len(), epoch = state.epoch, "Issuing subscriptions on connect");
        }
        for subscription in pending {
            self.send_subscribe(&mut state, subscription);
        }
    }

    /// Follow `status` until the sender is dropped.
    pub fn spawn_observer(
        self: &Arc<Self>,
        mut status: watch::Receiver<ConnectionStatus>,
    ) -> JoinHandle<()> {
        let router = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let current = *status.borrow_and_update();
                router.on_status(current);
                if status.changed().await.is_err() {
                    debug!("Connection status channel closed, router observer exiting");
                    break;
                }
            }
        })
    }

    /// Number of consumers interested in `subscription`.
    pub fn consumers(&self, subscription: &Subscription) -> usize {
        self.state.lock().refcounts.get(subscription).copied().unwrap_or(0)
    }

    /// Whether `subscription` has been sent on the current connection.
    pub fn is_active(&self, subscription: &Subscription) -> bool {
        self.state.lock().active.contains(subscription)
    }

    /// Currently desired subscriptions.
    pub fn desired(&self) -> Vec<Subscription> {
        self.state.lock().refcounts.keys().cloned().collect()
    }

    fn sync_epoch(&self, state: &mut RouterState) {
        let epoch = self.sink.connection_epoch();
        if epoch != state.epoch {
            state.active.clear();
            state.epoch = epoch;
        }
    }

    fn send_subscribe(&self, state: &mut RouterState, subscription: Subscription) {
        let message = ControlMessage::subscribe(subscription.clone());
        if self.sink.send_control(&message) {
            info!(?subscription, "Subscribed");
            state.active.insert(subscription);
        }
    }
}

impl std::fmt::Debug for SubscriptionRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRouter")
            .field("state", &*self.state.lock())
            .finish()
    }
}
