//! Shared broadcast loop
//!
//! One loop per process: every tick it reads the cache once and pushes the
//! resulting snapshot to all live subscribers, so upstream traffic does not
//! grow with the number of connections.

use crate::{
    cache::RefreshCache,
    registry::{BroadcastReport, SubscriberRegistry},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub struct Broadcaster {
    cache: RefreshCache,
    registry: Arc<SubscriberRegistry>,
    interval: Duration,
    send_timeout: Duration,
}

impl Broadcaster {
    pub fn new(
        cache: RefreshCache,
        registry: Arc<SubscriberRegistry>,
        interval: Duration,
        send_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            registry,
            interval,
            send_timeout,
        }
    }

    /// One broadcast cycle
    ///
    /// Returns `None` without touching the cache when nobody is subscribed.
    pub async fn tick(&self) -> Option<BroadcastReport> {
        if self.registry.is_empty() {
            return None;
        }

        let read = self.cache.get_snapshot(self.cache.ttl()).await;
        if let Some(e) = read.error() {
            tracing::debug!(error = %e, "Broadcasting previous snapshot after failed refresh");
        }

        let report = self.registry.broadcast(read.snapshot, self.send_timeout).await;
        tracing::trace!(
            delivered = report.delivered,
            dropped = report.dropped,
            "Broadcast tick complete"
        );
        Some(report)
    }

    /// Runs until the process exits
    pub async fn run(self) {
        tracing::info!(
            interval_secs = self.interval.as_secs_f64(),
            ttl_secs = self.cache.ttl().as_secs(),
            "Starting broadcast loop"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
