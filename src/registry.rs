//! Subscriber registry
//!
//! Tracks live broadcast subscribers. Each subscriber is the sending half of
//! a bounded queue drained by its connection task. The membership lock is
//! never held across an await: iteration works on a copy of the live set and
//! failed subscribers are removed afterwards.

use crate::{constants::SUBSCRIBER_QUEUE_CAPACITY, error::SendError, types::Snapshot};
use futures::future::join_all;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Outbound queue handed to a connection
pub type SnapshotReceiver = mpsc::Receiver<Arc<Snapshot>>;
pub type SnapshotSender = mpsc::Sender<Arc<Snapshot>>;

/// Creates the bounded queue for one subscriber
pub fn subscriber_channel() -> (SnapshotSender, SnapshotReceiver) {
    mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

/// A live outbound channel plus its liveness flag
#[derive(Debug)]
pub struct Subscriber {
    id: SubscriberId,
    sender: SnapshotSender,
    alive: AtomicBool,
}

impl Subscriber {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn mark_dead(&self) {
        self.alive.store(false, Ordering::Release);
    }

    /// Queues `snapshot`, waiting at most `timeout` for room
    pub async fn send(&self, snapshot: Arc<Snapshot>, timeout: Duration) -> Result<(), SendError> {
        use mpsc::error::SendTimeoutError;

        match self.sender.send_timeout(snapshot, timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Closed(_)) => Err(SendError::Disconnected),
            Err(SendTimeoutError::Timeout(_)) => Err(SendError::TimedOut),
        }
    }
}

/// Outcome of one pass over the live subscribers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Concurrent set of live subscribers
#[derive(Default)]
pub struct SubscriberRegistry {
    members: Mutex<HashMap<SubscriberId, Arc<Subscriber>>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_members(&self) -> MutexGuard<'_, HashMap<SubscriberId, Arc<Subscriber>>> {
        self.members
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Adds a subscriber fed through `sender`
    pub fn register(&self, sender: SnapshotSender) -> SubscriberId {
        let subscriber = Arc::new(Subscriber {
            id: SubscriberId::new(),
            sender,
            alive: AtomicBool::new(true),
        });
        let id = subscriber.id;

        let count = {
            let mut members = self.lock_members();
            members.insert(id, subscriber);
            members.len()
        };
        tracing::info!(subscriber = %id, subscribers = count, "Subscriber registered");
        id
    }

    /// Removes a subscriber. Returns true only for the call that removed it.
    ///
    /// Dropping the stored sender closes the connection's queue.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let (removed, count) = {
            let mut members = self.lock_members();
            let removed = members.remove(&id);
            (removed, members.len())
        };

        match removed {
            Some(subscriber) => {
                subscriber.mark_dead();
                tracing::info!(subscriber = %id, subscribers = count, "Subscriber removed");
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.lock_members().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_members().is_empty()
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.lock_members().contains_key(&id)
    }

    fn live(&self) -> Vec<Arc<Subscriber>> {
        self.lock_members()
            .values()
            .filter(|s| s.is_alive())
            .cloned()
            .collect()
    }

    /// Runs `deliver` for every live subscriber concurrently
    ///
    /// A subscriber whose delivery fails is marked dead and unregistered; the
    /// others are unaffected.
    pub async fn for_each_live<F, Fut>(&self, deliver: F) -> BroadcastReport
    where
        F: Fn(Arc<Subscriber>) -> Fut,
        Fut: Future<Output = Result<(), SendError>>,
    {
        let deliveries = self.live().into_iter().map(|subscriber| {
            let delivery = deliver(Arc::clone(&subscriber));
            async move { (subscriber, delivery.await) }
        });

        let mut report = BroadcastReport::default();
        for (subscriber, result) in join_all(deliveries).await {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    subscriber.mark_dead();
                    tracing::debug!(subscriber = %subscriber.id, error = %e, "Dropping subscriber");
                    self.unregister(subscriber.id);
                    report.dropped += 1;
                }
            }
        }
        report
    }

    /// Pushes the same snapshot to every live subscriber
    pub async fn broadcast(&self, snapshot: Arc<Snapshot>, timeout: Duration) -> BroadcastReport {
        self.for_each_live(|subscriber| {
            let snapshot = Arc::clone(&snapshot);
            async move { subscriber.send(snapshot, timeout).await }
        })
        .await
    }
}
