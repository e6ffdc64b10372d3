//! Write-behind aggregation of group view counts.
//!
//! Detail reads bump a pending counter in the fast cache. A single background task
//! periodically drains those counters into the persistent store in one transaction, so the
//! store sees one write per group per cycle instead of one per view.
//!
//! Increments that land between a cycle's read and its delete are lost. The stored counter
//! can therefore lag behind the true number of views but never runs ahead of it.

use std::{sync::Arc, time::Duration, time::Instant};

use metrics::{counter, histogram};
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::application::repos::{RepoError, ViewCountsRepo};
use crate::application::tasks::Shutdown;
use crate::cache::{CacheError, KeyValueStore, VIEWS_KEY_PREFIX, parse_views_key, views_key};
use crate::domain::entities::ViewDelta;

const METRIC_VIEWS_RECORDED: &str = "aggregator_views_recorded_total";
const METRIC_VIEWS_RECONCILED: &str = "aggregator_views_reconciled_total";
const METRIC_RECONCILE_FAILED: &str = "aggregator_views_reconcile_failed_total";
const METRIC_RECONCILE_MS: &str = "aggregator_views_reconcile_ms";

const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 600;
const DEFAULT_PENDING_TTL_SECS: u64 = 86_400;

#[derive(Debug, Clone)]
pub struct ViewsConfig {
    pub reconcile_interval: Duration,
    /// Expiry given to a pending counter when its first view creates it.
    pub pending_ttl: Duration,
    /// Run one last reconciliation after shutdown is requested.
    pub flush_on_shutdown: bool,
}

impl Default for ViewsConfig {
    fn default() -> Self {
        Self {
            reconcile_interval: Duration::from_secs(DEFAULT_RECONCILE_INTERVAL_SECS),
            pending_ttl: Duration::from_secs(DEFAULT_PENDING_TTL_SECS),
            flush_on_shutdown: true,
        }
    }
}

impl From<&crate::config::ViewsSettings> for ViewsConfig {
    fn from(settings: &crate::config::ViewsSettings) -> Self {
        Self {
            reconcile_interval: Duration::from_secs(settings.reconcile_interval_secs.get()),
            pending_ttl: Duration::from_secs(settings.pending_ttl_secs.get()),
            flush_on_shutdown: settings.flush_on_shutdown,
        }
    }
}

#[derive(Debug, Error)]
pub enum ViewsError {
    #[error("view counter cache failure: {0}")]
    Cache(#[from] CacheError),
    #[error("view counter store failure: {0}")]
    Store(#[from] RepoError),
}

/// What one reconciliation cycle moved into the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub groups: usize,
    pub views: u64,
}

#[derive(Clone)]
pub struct ViewAggregator {
    cache: Arc<dyn KeyValueStore>,
    store: Arc<dyn ViewCountsRepo>,
    config: ViewsConfig,
}

impl ViewAggregator {
    pub fn new(
        cache: Arc<dyn KeyValueStore>,
        store: Arc<dyn ViewCountsRepo>,
        config: ViewsConfig,
    ) -> Self {
        Self {
            cache,
            store,
            config,
        }
    }

    pub fn config(&self) -> &ViewsConfig {
        &self.config
    }

    /// Count one view of `group_id` in the fast cache.
    pub async fn record_view(&self, group_id: u64) -> Result<(), ViewsError> {
        self.cache
            .incr(&views_key(group_id), self.config.pending_ttl)
            .await?;
        counter!(METRIC_VIEWS_RECORDED).increment(1);
        Ok(())
    }

    /// Record a view without making the caller wait. Failures are only logged.
    pub fn dispatch(&self, group_id: u64) -> tokio::task::JoinHandle<()> {
        let aggregator = self.clone();
        tokio::spawn(async move {
            if let Err(err) = aggregator.record_view(group_id).await {
                warn!(group_id, error = %err, "failed to record view");
            }
        })
    }

    /// Move every pending counter into the store.
    ///
    /// Counters are cleared only after the store transaction commits; on failure they stay in
    /// place and the next cycle applies them.
    pub async fn reconcile(&self) -> Result<ReconcileOutcome, ViewsError> {
        let started_at = Instant::now();
        let result = self.drain().await;
        histogram!(METRIC_RECONCILE_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);

        match &result {
            Ok(outcome) => counter!(METRIC_VIEWS_RECONCILED).increment(outcome.views),
            Err(_) => counter!(METRIC_RECONCILE_FAILED).increment(1),
        }
        result
    }

    async fn drain(&self) -> Result<ReconcileOutcome, ViewsError> {
        let keys = self.cache.scan_prefix(VIEWS_KEY_PREFIX).await?;

        let mut deltas = Vec::with_capacity(keys.len());
        let mut drained = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(group_id) = parse_views_key(&key) else {
                warn!(key = %key, "skipping malformed view counter key");
                continue;
            };
            // The counter may have expired since the scan.
            let Some(raw) = self.cache.get(&key).await? else {
                continue;
            };
            match raw.parse::<u64>() {
                Ok(0) => continue,
                Ok(delta) => {
                    deltas.push(ViewDelta { group_id, delta });
                    drained.push(key);
                }
                Err(_) => warn!(key = %key, value = %raw, "skipping non-numeric view counter"),
            }
        }

        if deltas.is_empty() {
            return Ok(ReconcileOutcome::default());
        }

        let outcome = ReconcileOutcome {
            groups: deltas.len(),
            views: deltas.iter().map(|d| d.delta).sum(),
        };
        let updated = self.store.apply_view_deltas(&deltas).await?;
        if updated < deltas.len() as u64 {
            debug!(
                pending = deltas.len(),
                updated, "some view counters belong to groups missing from the store"
            );
        }

        if let Err(err) = self.cache.delete(&drained).await {
            error!(
                error = %err,
                groups = outcome.groups,
                "view counts committed but pending counters were not cleared; they will be applied again"
            );
        }

        Ok(outcome)
    }

    /// Reconcile on a fixed interval until `shutdown` fires.
    ///
    /// A cycle in progress always completes. With `flush_on_shutdown` one final cycle runs
    /// after the signal.
    pub async fn run(self, mut shutdown: Shutdown) {
        let mut interval = tokio::time::interval(self.config.reconcile_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await; // Skip the first immediate tick

        loop {
            tokio::select! {
                biased;
                _ = shutdown.triggered() => break,
                _ = interval.tick() => {}
            }
            self.run_cycle("interval").await;
        }

        if self.config.flush_on_shutdown {
            self.run_cycle("shutdown").await;
        }
        info!("view reconciler stopped");
    }

    async fn run_cycle(&self, trigger: &'static str) {
        match self.reconcile().await {
            Ok(outcome) if outcome.groups > 0 => info!(
                trigger,
                groups = outcome.groups,
                views = outcome.views,
                "view counts reconciled"
            ),
            Ok(_) => debug!(trigger, "no pending view counts"),
            Err(err) => error!(
                trigger,
                error = %err,
                "view reconciliation failed; pending counts kept for the next cycle"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::cache::MemoryStore;

    #[derive(Default)]
    struct RecordingStore {
        batches: Mutex<Vec<Vec<ViewDelta>>>,
    }

    #[async_trait]
    impl ViewCountsRepo for RecordingStore {
        async fn apply_view_deltas(&self, deltas: &[ViewDelta]) -> Result<u64, RepoError> {
            self.batches
                .lock()
                .expect("batches lock")
                .push(deltas.to_vec());
            Ok(deltas.len() as u64)
        }
    }

    fn aggregator(cache: &MemoryStore, store: Arc<RecordingStore>) -> ViewAggregator {
        ViewAggregator::new(Arc::new(cache.clone()), store, ViewsConfig::default())
    }

    #[tokio::test]
    async fn first_view_sets_pending_expiry() {
        let cache = MemoryStore::new();
        let views = aggregator(&cache, Arc::new(RecordingStore::default()));

        views.record_view(5).await.expect("record view");

        assert_eq!(cache.get("views:5").await.expect("get").as_deref(), Some("1"));
        assert!(cache.ttl("views:5").is_some());
    }

    #[tokio::test]
    async fn reconcile_applies_one_batch_and_clears_counters() {
        let cache = MemoryStore::new();
        let store = Arc::new(RecordingStore::default());
        let views = aggregator(&cache, store.clone());

        for _ in 0..3 {
            views.record_view(1).await.expect("record view");
        }
        views.record_view(2).await.expect("record view");

        let outcome = views.reconcile().await.expect("reconcile");
        assert_eq!(outcome, ReconcileOutcome { groups: 2, views: 4 });

        let batches = store.batches.lock().expect("batches lock").clone();
        assert_eq!(batches.len(), 1);
        let mut batch = batches[0].clone();
        batch.sort_by_key(|d| d.group_id);
        assert_eq!(
            batch,
            vec![
                ViewDelta {
                    group_id: 1,
                    delta: 3
                },
                ViewDelta {
                    group_id: 2,
                    delta: 1
                }
            ]
        );
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn empty_cycle_skips_the_store() {
        let cache = MemoryStore::new();
        let store = Arc::new(RecordingStore::default());
        let views = aggregator(&cache, store.clone());

        let outcome = views.reconcile().await.expect("reconcile");

        assert_eq!(outcome, ReconcileOutcome::default());
        assert!(store.batches.lock().expect("batches lock").is_empty());
    }

    #[tokio::test]
    async fn malformed_counters_are_skipped_and_kept() {
        let cache = MemoryStore::new();
        let store = Arc::new(RecordingStore::default());
        let views = aggregator(&cache, store.clone());
        let ttl = Duration::from_secs(60);
        cache.set("views:abc", "3", ttl).await.expect("seed");
        cache.set("views:9", "lots", ttl).await.expect("seed");
        views.record_view(4).await.expect("record view");

        let outcome = views.reconcile().await.expect("reconcile");

        assert_eq!(outcome, ReconcileOutcome { groups: 1, views: 1 });
        assert_eq!(cache.len(), 2);
    }
}
