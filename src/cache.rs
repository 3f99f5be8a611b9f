//! Single-flight refresh cache
//!
//! Holds the last good snapshot for one [`MarketQuery`] and refreshes it from
//! the provider once it is older than the caller's TTL. At most one upstream
//! fetch is in flight at any time; callers that arrive while it runs join it
//! and receive the same outcome.
//!
//! A failed refresh never touches the cached snapshot or its timestamp.
//! Callers get the previous snapshot back (or an empty one on cold start)
//! together with the error.

use crate::{
    error::ProviderError,
    metrics::{MetricsCollector, ProviderMetrics},
    provider::MarketDataProvider,
    types::{ComponentHealth, HealthStatus, MarketQuery, Snapshot},
};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

type RefreshOutcome = Result<Arc<Snapshot>, Arc<ProviderError>>;
type InFlight = Shared<BoxFuture<'static, RefreshOutcome>>;

/// How a [`SnapshotRead`] was produced
#[derive(Debug, Clone)]
pub enum Freshness {
    /// Served from cache within the TTL
    Cached,
    /// Produced by a refresh this call started or joined
    Refreshed,
    /// The refresh failed; the snapshot is the previous one (or empty)
    Stale(Arc<ProviderError>),
}

/// Result of [`RefreshCache::get_snapshot`]
#[derive(Debug, Clone)]
pub struct SnapshotRead {
    pub snapshot: Arc<Snapshot>,
    pub freshness: Freshness,
}

impl SnapshotRead {
    pub fn is_stale(&self) -> bool {
        matches!(self.freshness, Freshness::Stale(_))
    }

    /// The refresh failure, if this read fell back to stale data
    pub fn error(&self) -> Option<&ProviderError> {
        match &self.freshness {
            Freshness::Stale(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

#[derive(Default)]
struct CacheState {
    snapshot: Option<Arc<Snapshot>>,
    refreshed_at: Option<Instant>,
    in_flight: Option<InFlight>,
}

struct CacheInner {
    provider: Arc<dyn MarketDataProvider>,
    query: MarketQuery,
    ttl: Duration,
    state: Mutex<CacheState>,
    metrics: MetricsCollector,
    empty: Arc<Snapshot>,
}

/// Process-wide snapshot cache in front of the upstream provider
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct RefreshCache {
    inner: Arc<CacheInner>,
}

impl CacheInner {
    fn lock_state(&self) -> MutexGuard<'_, CacheState> {
        // The critical sections never panic; recover from poisoning anyway.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fetches once and commits the result. Runs on its own task.
    async fn refresh(self: Arc<Self>) -> RefreshOutcome {
        let start = std::time::Instant::now();
        let result = self.provider.fetch_markets(&self.query).await;
        self.metrics
            .record_request(start.elapsed(), result.is_ok())
            .await;

        let mut state = self.lock_state();
        state.in_flight = None;

        match result {
            Ok(coins) => {
                let snapshot = Arc::new(Snapshot::new(coins));
                state.snapshot = Some(Arc::clone(&snapshot));
                state.refreshed_at = Some(Instant::now());
                tracing::debug!(
                    count = snapshot.len(),
                    provider = self.provider.provider_name(),
                    latency_ms = start.elapsed().as_millis() as u64,
                    "Refreshed market snapshot"
                );
                Ok(snapshot)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    kind = ?e.kind(),
                    has_cached = state.snapshot.is_some(),
                    "Snapshot refresh failed, keeping previous snapshot"
                );
                Err(Arc::new(e))
            }
        }
    }
}

impl RefreshCache {
    /// Creates an empty cache for `query`
    ///
    /// `ttl` is the freshness window used by [`RefreshCache::snapshot`].
    pub fn new(provider: Arc<dyn MarketDataProvider>, query: MarketQuery, ttl: Duration) -> Self {
        let metrics = MetricsCollector::new(provider.provider_name());
        Self {
            inner: Arc::new(CacheInner {
                provider,
                query,
                ttl,
                state: Mutex::new(CacheState::default()),
                metrics,
                empty: Arc::new(Snapshot::empty()),
            }),
        }
    }

    /// Returns the snapshot, refreshing it first if older than `ttl`
    ///
    /// Never fails: on refresh failure the previous snapshot (or the empty
    /// snapshot on cold start) is returned with [`Freshness::Stale`].
    pub async fn get_snapshot(&self, ttl: Duration) -> SnapshotRead {
        let refresh = {
            let mut state = self.inner.lock_state();

            if let (Some(snapshot), Some(at)) = (&state.snapshot, state.refreshed_at) {
                if at.elapsed() <= ttl {
                    return SnapshotRead {
                        snapshot: Arc::clone(snapshot),
                        freshness: Freshness::Cached,
                    };
                }
            }

            match state.in_flight.clone() {
                Some(in_flight) => in_flight,
                None => {
                    let in_flight = self.start_refresh();
                    state.in_flight = Some(in_flight.clone());
                    in_flight
                }
            }
        };

        match refresh.await {
            Ok(snapshot) => SnapshotRead {
                snapshot,
                freshness: Freshness::Refreshed,
            },
            Err(e) => SnapshotRead {
                snapshot: self.current(),
                freshness: Freshness::Stale(e),
            },
        }
    }

    /// Snapshot under the configured TTL, stale-but-valid
    pub async fn snapshot(&self) -> Arc<Snapshot> {
        self.get_snapshot(self.inner.ttl).await.snapshot
    }

    /// Spawns the upstream fetch so that it completes even if every caller
    /// waiting on it is cancelled. A panicking fetch is reported to the
    /// joiners as [`ProviderError::Cancelled`].
    fn start_refresh(&self) -> InFlight {
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(Arc::clone(&inner).refresh());

        async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(join_error) => {
                    inner.lock_state().in_flight = None;
                    tracing::error!(
                        error = %join_error,
                        panicked = join_error.is_panic(),
                        "Snapshot refresh task failed"
                    );
                    Err(Arc::new(ProviderError::Cancelled))
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Last committed snapshot, or the empty snapshot
    pub fn current(&self) -> Arc<Snapshot> {
        self.inner
            .lock_state()
            .snapshot
            .clone()
            .unwrap_or_else(|| Arc::clone(&self.inner.empty))
    }

    /// When the last successful refresh completed
    pub fn last_refreshed_at(&self) -> Option<Instant> {
        self.inner.lock_state().refreshed_at
    }

    /// True while an upstream fetch is running
    pub fn is_refreshing(&self) -> bool {
        self.inner.lock_state().in_flight.is_some()
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    pub fn query(&self) -> &MarketQuery {
        &self.inner.query
    }

    pub fn provider_name(&self) -> &'static str {
        self.inner.provider.provider_name()
    }

    pub async fn get_provider_metrics(&self) -> ProviderMetrics {
        self.inner.metrics.get_metrics().await
    }

    /// Perform a health check on the cache
    ///
    /// Healthy while the snapshot is within TTL, degraded when serving stale
    /// data, unhealthy before the first successful refresh.
    pub async fn health_check(&self) -> ComponentHealth {
        let (coins, age) = {
            let state = self.inner.lock_state();
            (
                state.snapshot.as_ref().map_or(0, |s| s.len()),
                state.refreshed_at.map(|at| at.elapsed()),
            )
        };
        let metrics = self.get_provider_metrics().await;

        let mut details = std::collections::HashMap::new();
        details.insert("cached_coins".to_string(), serde_json::json!(coins));
        details.insert(
            "provider_name".to_string(),
            serde_json::json!(self.provider_name()),
        );
        details.insert(
            "snapshot_age_secs".to_string(),
            serde_json::json!(age.map(|a| a.as_secs())),
        );
        details.insert(
            "ttl_secs".to_string(),
            serde_json::json!(self.inner.ttl.as_secs()),
        );
        details.insert(
            "upstream".to_string(),
            serde_json::to_value(&metrics).unwrap_or_default(),
        );

        let (status, message) = match age {
            None => (
                HealthStatus::Unhealthy,
                "No snapshot has been fetched yet".to_string(),
            ),
            Some(age) if age > self.inner.ttl => (
                HealthStatus::Degraded,
                format!("Serving stale snapshot ({}s old)", age.as_secs()),
            ),
            Some(_) => (
                HealthStatus::Healthy,
                "Snapshot is fresh".to_string(),
            ),
        };

        ComponentHealth {
            name: "refresh_cache".to_string(),
            status,
            message: Some(message),
            details,
            last_checked: chrono::Utc::now(),
        }
    }
}
