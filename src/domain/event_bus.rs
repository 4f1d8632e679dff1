//! Broadcast bus for telemetry events.
//!
//! [`EventBus`] wraps a [`tokio::sync::broadcast`] channel. Producers
//! publish [`TelemetryEvent`]s through the bus, and every WebSocket
//! connection drains a [`BusSubscriber`] to receive them.
//!
//! Delivery is best-effort freshness, not guaranteed: the broadcast ring
//! bounds how far any subscriber may lag, and a lagging subscriber loses
//! its *oldest* undelivered events first. Every lost event increments the
//! shared drop counter, which is observability-only and never surfaced as
//! a client error. Per subscriber, delivered events always arrive in
//! publish order.
//!
//! The bus also owns the central subscription table (which connection
//! wants which event names) and the last-known-value cache served to
//! late subscribers.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{RwLock, broadcast};

use super::connection::ConnectionId;
use super::event::TelemetryEvent;
use super::subscription::SubscriptionSet;

/// Broadcast bus for [`TelemetryEvent`]s.
///
/// Cheap to clone; all clones share the same ring, subscription table,
/// cache and drop counter.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<TelemetryEvent>,
    inner: Arc<BusInner>,
}

#[derive(Debug)]
struct BusInner {
    subscriptions: RwLock<HashMap<ConnectionId, SubscriptionSet>>,
    last_values: RwLock<HashMap<String, serde_json::Value>>,
    dropped: AtomicU64,
}

impl EventBus {
    /// Creates a new `EventBus` whose broadcast ring holds `capacity`
    /// events. The capacity is also the per-subscriber lag bound.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            inner: Arc::new(BusInner {
                subscriptions: RwLock::new(HashMap::new()),
                last_values: RwLock::new(HashMap::new()),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Publishes an event to all subscribers, then updates the
    /// last-known-value cache for its name.
    ///
    /// Never blocks beyond enqueuing into the ring; safe to call
    /// concurrently from any number of producers. Returns the number of
    /// active receivers at publish time (0 when nobody is listening).
    pub async fn publish(&self, event: TelemetryEvent) -> usize {
        let name = event.name.clone();
        let payload = event.payload.clone();
        let delivered = self.sender.send(event).unwrap_or(0);
        self.inner.last_values.write().await.insert(name, payload);
        delivered
    }

    /// Registers interest of `connection_id` in `pattern` (exact event
    /// name or `"*"`). Idempotent.
    pub async fn subscribe(&self, connection_id: ConnectionId, pattern: &str) {
        let mut subs = self.inner.subscriptions.write().await;
        subs.entry(connection_id).or_default().subscribe(pattern);
    }

    /// Removes interest of `connection_id` in `pattern`. Idempotent.
    pub async fn unsubscribe(&self, connection_id: ConnectionId, pattern: &str) {
        let mut subs = self.inner.subscriptions.write().await;
        if let Some(set) = subs.get_mut(&connection_id) {
            set.unsubscribe(pattern);
        }
    }

    /// Drops every subscription held by `connection_id`. Called from the
    /// disconnect cascade; idempotent.
    pub async fn unsubscribe_all(&self, connection_id: ConnectionId) {
        self.inner.subscriptions.write().await.remove(&connection_id);
    }

    /// Returns `true` if `connection_id` has a subscription matching the
    /// event's name.
    pub async fn matches(&self, connection_id: ConnectionId, event: &TelemetryEvent) -> bool {
        let subs = self.inner.subscriptions.read().await;
        subs.get(&connection_id)
            .is_some_and(|set| set.matches(&event.name))
    }

    /// Returns the cached most-recent payload for `name`, if any.
    pub async fn last_value(&self, name: &str) -> Option<serde_json::Value> {
        self.inner.last_values.read().await.get(name).cloned()
    }

    /// Returns the cached payloads for the requested names, or for every
    /// cached name when `names` is `None`.
    pub async fn last_values(
        &self,
        names: Option<&[String]>,
    ) -> HashMap<String, serde_json::Value> {
        let cache = self.inner.last_values.read().await;
        match names {
            Some(wanted) => wanted
                .iter()
                .filter_map(|n| cache.get(n).map(|v| (n.clone(), v.clone())))
                .collect(),
            None => cache.clone(),
        }
    }

    /// Creates a new delivery handle that will observe all future events.
    ///
    /// Each WebSocket connection calls this once on connect.
    #[must_use]
    pub fn subscriber(&self) -> BusSubscriber {
        BusSubscriber {
            rx: self.sender.subscribe(),
            inner: Arc::clone(&self.inner),
        }
    }

    /// Total events lost to lagging subscribers since startup.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Returns the current number of active delivery handles.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Receiving side of the bus for one subscriber.
///
/// Folds broadcast lag into the shared drop counter so callers only ever
/// see a clean, in-order stream of the freshest events.
#[derive(Debug)]
pub struct BusSubscriber {
    rx: broadcast::Receiver<TelemetryEvent>,
    inner: Arc<BusInner>,
}

impl BusSubscriber {
    /// Receives the next event, skipping over any interval the
    /// subscriber lagged through. Returns `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<TelemetryEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    self.inner.dropped.fetch_add(n, Ordering::Relaxed);
                    tracing::warn!(lost = n, "subscriber lagged behind event bus");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
