//! Subscriber registry
//!
//! Every subscriber is represented by the sending half of its bounded
//! outbound queue. A dedicated writer task per connection drains the queue,
//! so the registry lock is never held across a socket write.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::metrics::Metrics;

pub type SubscriberId = u64;

/// Serialized snapshot shared by every queue of a tick
pub type Payload = Arc<str>;

/// Outcome of one broadcast pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub pruned: usize,
}

pub struct SubscriberRegistry {
    subscribers: Mutex<HashMap<SubscriberId, mpsc::Sender<Payload>>>,
    next_id: AtomicU64,
    metrics: Metrics,
}

impl SubscriberRegistry {
    pub fn new(metrics: Metrics) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            metrics,
        }
    }

    /// Register a subscriber's outbound queue
    pub async fn add(&self, sink: mpsc::Sender<Payload>) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut guard = self.subscribers.lock().await;
        guard.insert(id, sink);
        self.metrics.subscribers_active.set(guard.len() as i64);
        info!(subscriber = id, total = guard.len(), "New client connected");
        id
    }

    /// Remove a subscriber; returns false if it was already gone
    pub async fn remove(&self, id: SubscriberId) -> bool {
        let mut guard = self.subscribers.lock().await;
        let removed = guard.remove(&id).is_some();
        self.metrics.subscribers_active.set(guard.len() as i64);
        if removed {
            info!(subscriber = id, total = guard.len(), "Client disconnected");
        }
        removed
    }

    /// Visit every subscriber under the registry lock
    pub async fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(SubscriberId, &mpsc::Sender<Payload>),
    {
        let guard = self.subscribers.lock().await;
        for (id, sink) in guard.iter() {
            f(*id, sink);
        }
    }

    /// Queue `payload` for every subscriber.
    ///
    /// A subscriber whose queue is closed or full is removed in the same pass.
    pub async fn broadcast(&self, payload: Payload) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let mut guard = self.subscribers.lock().await;

        guard.retain(|id, sink| match sink.try_send(payload.clone()) {
            Ok(()) => {
                report.delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(subscriber = id, "Subscriber queue full, dropping slow client");
                report.pruned += 1;
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(subscriber = id, "Subscriber queue closed");
                report.pruned += 1;
                false
            }
        });

        self.metrics.subscribers_active.set(guard.len() as i64);
        self.metrics.subscribers_pruned.inc_by(report.pruned as u64);
        report
    }

    pub async fn len(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
