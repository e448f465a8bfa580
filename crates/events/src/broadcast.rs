//! Fan-out of forwarded payloads to live subscribers.
//!
//! The registry maps [`SubscriberId`] to the sending half of that
//! subscriber's bounded queue and sits behind a single mutex. Delivery
//! copies the live senders under the lock, releases it, then enqueues into
//! every copy concurrently with a per-subscriber timeout. One `Arc<str>`
//! per payload is shared by every queue. A subscriber that cannot accept a
//! payload in time is torn down; the others only ever wait for that one
//! timeout.
//!
//! Removing a subscriber drops the registry's sender only. A copy taken by
//! an in-flight delivery keeps the queue open until that delivery is done,
//! so a payload is never pushed into a closed queue.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

/// Registry key for one connected subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    /// Per-subscriber queue capacity.
    pub subscriber_buffer: usize,
    /// How long one enqueue may block before the subscriber is dropped.
    pub send_timeout: Duration,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: 64,
            send_timeout: Duration::from_secs(5),
        }
    }
}

/// Public view of a registry entry.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriberInfo {
    pub id: SubscriberId,
    pub connected_at: DateTime<Utc>,
}

struct Slot {
    sender: mpsc::Sender<Arc<str>>,
    connected_at: DateTime<Utc>,
}

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    slots: HashMap<SubscriberId, Slot>,
}

#[derive(Default)]
struct Registry {
    inner: Mutex<RegistryInner>,
}

impl Registry {
    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, sender: mpsc::Sender<Arc<str>>) -> SubscriberId {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = SubscriberId(inner.next_id);
        inner.slots.insert(
            id,
            Slot {
                sender,
                connected_at: Utc::now(),
            },
        );
        id
    }

    /// Registered -> torn down. Returns `false` if already torn down.
    fn remove(&self, id: SubscriberId) -> bool {
        self.lock().slots.remove(&id).is_some()
    }

    fn snapshot(&self) -> Vec<(SubscriberId, mpsc::Sender<Arc<str>>)> {
        self.lock()
            .slots
            .iter()
            .map(|(id, slot)| (*id, slot.sender.clone()))
            .collect()
    }
}

/// Outcome of delivering one payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    /// Subscribers torn down because their queue was closed or stalled.
    pub dropped: usize,
}

/// Shared fan-out hub. Cheap to clone.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<Registry>,
    config: BroadcastConfig,
}

impl Broadcaster {
    pub fn new(config: BroadcastConfig) -> Self {
        Self {
            registry: Arc::default(),
            config,
        }
    }

    /// Register a new subscriber. It receives every payload delivered from
    /// now on, and nothing delivered before.
    pub fn register(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.config.subscriber_buffer.max(1));
        let id = self.registry.insert(tx);
        tracing::debug!(subscriber = %id, "Subscriber registered");

        Subscription {
            id,
            receiver: rx,
            teardown: Teardown {
                id,
                registry: Arc::clone(&self.registry),
            },
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().slots.len()
    }

    pub fn subscribers(&self) -> Vec<SubscriberInfo> {
        let mut list: Vec<_> = self
            .registry
            .lock()
            .slots
            .iter()
            .map(|(id, slot)| SubscriberInfo {
                id: *id,
                connected_at: slot.connected_at,
            })
            .collect();
        list.sort_by_key(|info| info.id);
        list
    }

    /// Deliver one payload to every subscriber registered right now.
    ///
    /// Resolves once every enqueue finished or timed out, so consecutive
    /// calls preserve order per subscriber.
    pub async fn deliver(&self, payload: &str) -> DeliveryReport {
        let snapshot = self.registry.snapshot();
        let mut report = DeliveryReport::default();
        if snapshot.is_empty() {
            return report;
        }

        let timeout = self.config.send_timeout;
        let payload: Arc<str> = Arc::from(payload);
        let sends = snapshot.into_iter().map(|(id, sender)| {
            let payload = Arc::clone(&payload);
            async move {
                let outcome = tokio::time::timeout(timeout, sender.send(payload)).await;
                (id, outcome)
            }
        });

        for (id, outcome) in futures::future::join_all(sends).await {
            match outcome {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(_)) => {
                    tracing::debug!(subscriber = %id, "Subscriber queue closed, removing");
                    self.registry.remove(id);
                    report.dropped += 1;
                }
                Err(_) => {
                    tracing::warn!(
                        subscriber = %id,
                        timeout_ms = timeout.as_millis() as u64,
                        "Subscriber stalled, tearing down",
                    );
                    self.registry.remove(id);
                    report.dropped += 1;
                }
            }
        }

        report
    }

    /// Delivery loop: consume the inbox until it closes.
    pub async fn run(self, mut inbox: mpsc::Receiver<String>) {
        tracing::info!("Broadcaster started");
        while let Some(payload) = inbox.recv().await {
            let report = self.deliver(&payload).await;
            tracing::debug!(
                delivered = report.delivered,
                dropped = report.dropped,
                "Payload broadcast",
            );
        }
        tracing::info!("Broadcaster inbox closed, stopping");
    }

    /// Tear down every subscriber. Their queues close once drained.
    pub fn shutdown_all(&self) {
        let mut inner = self.registry.lock();
        let count = inner.slots.len();
        inner.slots.clear();
        tracing::info!(count, "Closed all subscriber queues");
    }
}

/// Idempotent removal of one subscriber. Cloneable so both the session and
/// an external shutdown watcher can hold it.
#[derive(Clone)]
pub struct Teardown {
    id: SubscriberId,
    registry: Arc<Registry>,
}

impl Teardown {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Remove the subscriber. Returns `true` only for the call that actually
    /// removed it; later calls are no-ops.
    pub fn teardown(&self) -> bool {
        let removed = self.registry.remove(self.id);
        if removed {
            tracing::debug!(subscriber = %self.id, "Subscriber torn down");
        }
        removed
    }
}

impl fmt::Debug for Teardown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Teardown").field("id", &self.id).finish()
    }
}

/// Read side of a registration. Dropping it tears the subscriber down.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    receiver: mpsc::Receiver<Arc<str>>,
    teardown: Teardown,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next payload. `None` once torn down and drained.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        self.receiver.recv().await
    }

    pub fn teardown_handle(&self) -> Teardown {
        self.teardown.clone()
    }

    pub fn teardown(&self) -> bool {
        self.teardown.teardown()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.teardown.teardown();
    }
}
