//! Tracking of live push subscribers and snapshot fan-out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use super::types::Snapshot;

/// Identifies one registered subscriber
pub type SubscriberId = u64;

/// Registry of live push subscribers.
///
/// Each subscriber owns the receiving half of an unbounded channel; the
/// broadcaster pushes snapshots into the sending halves. A failed push
/// means the receiver is gone, so that subscriber is removed on the spot
/// while the others keep their registration.
pub struct SubscriberRegistry {
    subscribers: Mutex<HashMap<SubscriberId, mpsc::UnboundedSender<Arc<Snapshot>>>>,
    next_id: AtomicU64,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new subscriber. Returns its id and the channel carrying
    /// pushed snapshots.
    pub async fn register(&self) -> (SubscriberId, mpsc::UnboundedReceiver<Arc<Snapshot>>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().await.insert(id, tx);
        debug!(subscriber = id, "Subscriber registered");
        (id, rx)
    }

    /// Remove a subscriber. Unknown ids are a no-op, so disconnect handlers
    /// may race the broadcast's own pruning.
    pub async fn unregister(&self, id: SubscriberId) {
        if self.subscribers.lock().await.remove(&id).is_some() {
            debug!(subscriber = id, "Subscriber unregistered");
        }
    }

    /// Number of currently registered subscribers
    pub async fn count(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    /// Push a snapshot to every subscriber registered at the time of the
    /// call. Sends happen outside the lock, so registrations and removals
    /// stay safe while a broadcast is in progress.
    pub async fn broadcast(&self, snapshot: Arc<Snapshot>) {
        let members: Vec<(SubscriberId, mpsc::UnboundedSender<Arc<Snapshot>>)> = self
            .subscribers
            .lock()
            .await
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut dead = Vec::new();
        for (id, tx) in members {
            if tx.send(snapshot.clone()).is_err() {
                dead.push(id);
            }
        }

        if !dead.is_empty() {
            let mut subscribers = self.subscribers.lock().await;
            for id in &dead {
                subscribers.remove(id);
            }
            debug!(removed = dead.len(), "Pruned dead subscribers");
        }
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}
