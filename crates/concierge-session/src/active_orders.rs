//! Confirmed orders tracked against their one-hour window.
//!
//! The tracker never expires orders itself. [`ActiveOrderTracker::visible`]
//! is the display filter; the persisted list keeps everything until it is
//! cleared.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use concierge_store::{read_document, write_document, LocalStore};
use concierge_types::ActiveOrder;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

/// Local-state key holding the active order list.
pub const ACTIVE_ORDERS_KEY: &str = "activeOrders";

const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

pub struct ActiveOrderTracker {
    store: Arc<dyn LocalStore>,
    orders: watch::Sender<Vec<ActiveOrder>>,
}

impl ActiveOrderTracker {
    /// Loads the persisted list. A missing or unreadable list starts empty.
    pub async fn load(store: Arc<dyn LocalStore>) -> Self {
        let orders = match read_document::<Vec<ActiveOrder>>(store.as_ref(), ACTIVE_ORDERS_KEY).await {
            Ok(list) => list.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "failed to read active orders; starting with none");
                Vec::new()
            }
        };
        let (orders, _) = watch::channel(orders);
        Self { store, orders }
    }

    pub fn orders(&self) -> Vec<ActiveOrder> {
        self.orders.borrow().clone()
    }

    /// Orders whose window has not yet elapsed, paired with the time left.
    pub fn visible(&self, now: DateTime<Utc>) -> Vec<(ActiveOrder, chrono::Duration)> {
        self.orders
            .borrow()
            .iter()
            .map(|order| (order.clone(), order.remaining(now)))
            .filter(|(_, remaining)| *remaining > chrono::Duration::zero())
            .collect()
    }

    /// Receives the full list after every change.
    pub fn subscribe(&self) -> watch::Receiver<Vec<ActiveOrder>> {
        self.orders.subscribe()
    }

    pub async fn add(&self, order: ActiveOrder) {
        self.orders.send_modify(|orders| orders.push(order));
        self.persist().await;
    }

    /// Replaces the list, as when a checkpoint is loaded, and persists it.
    pub async fn replace_all(&self, orders: Vec<ActiveOrder>) {
        self.orders.send_replace(orders);
        self.persist().await;
    }

    /// Empties the list and removes the persisted key.
    pub async fn clear(&self) {
        self.orders.send_replace(Vec::new());
        if let Err(e) = self.store.remove(ACTIVE_ORDERS_KEY).await {
            warn!(error = %e, "failed to remove persisted active orders");
        }
    }

    async fn persist(&self) {
        let orders = self.orders();
        if let Err(e) = write_document(self.store.as_ref(), ACTIVE_ORDERS_KEY, &orders).await {
            warn!(error = %e, "failed to persist active orders");
        }
    }

    /// Starts a once-per-second ticker publishing the visible orders.
    pub fn spawn_countdown(&self) -> CountdownTicker {
        let orders = self.orders.subscribe();
        let (tx, rx) = watch::channel(Vec::new());
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(COUNTDOWN_TICK);
            loop {
                interval.tick().await;
                let now = Utc::now();
                let visible: Vec<_> = orders
                    .borrow()
                    .iter()
                    .map(|order| (order.reference.clone(), order.remaining(now)))
                    .filter(|(_, remaining)| *remaining > chrono::Duration::zero())
                    .collect();
                if tx.send(visible).is_err() {
                    break;
                }
            }
        });
        CountdownTicker { handle, rx }
    }
}

/// Periodic countdown over the active orders. Stops when dropped.
pub struct CountdownTicker {
    handle: JoinHandle<()>,
    rx: watch::Receiver<Vec<(String, chrono::Duration)>>,
}

impl CountdownTicker {
    /// `(reference, remaining)` for each order still inside its window.
    pub fn receiver(&self) -> watch::Receiver<Vec<(String, chrono::Duration)>> {
        self.rx.clone()
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for CountdownTicker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
