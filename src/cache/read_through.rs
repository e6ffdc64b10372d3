//! Read-through caching of group reads.

use std::{future::Future, sync::Arc};

use metrics::counter;
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use super::config::CacheConfig;
use super::keys::CacheKey;
use super::store::{KeyValueStore, MemoryStore};
use super::{METRIC_CACHE_ERROR, METRIC_CACHE_HIT, METRIC_CACHE_MISS};

/// Serves values from the fast cache and populates it from a loader on miss.
///
/// Cache failures are logged and counted but never returned: a broken cache only costs
/// latency. Loader errors pass through unchanged and are never cached.
#[derive(Clone)]
pub struct ReadThroughCache {
    store: Arc<dyn KeyValueStore>,
    config: CacheConfig,
}

impl ReadThroughCache {
    pub fn new(store: Arc<dyn KeyValueStore>, config: CacheConfig) -> Self {
        Self { store, config }
    }

    /// A cache that always misses and never writes.
    pub fn disabled() -> Self {
        Self::new(Arc::new(MemoryStore::new()), CacheConfig::disabled())
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub async fn get_or_load<T, E, F, Fut>(&self, key: CacheKey, load: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.config.enabled {
            return load().await;
        }

        let rendered = key.render(&self.config.key_prefix);
        if let Some(value) = self.lookup::<T>(key, &rendered).await {
            return Ok(value);
        }

        let value = load().await?;
        self.write_back(key, &rendered, &value).await;
        Ok(value)
    }

    async fn lookup<T: DeserializeOwned>(&self, key: CacheKey, rendered: &str) -> Option<T> {
        let kind = key.kind();
        match self.store.get(rendered).await {
            Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => {
                    counter!(METRIC_CACHE_HIT, "kind" => kind).increment(1);
                    debug!(key = rendered, "cache hit");
                    Some(value)
                }
                Err(err) => {
                    counter!(METRIC_CACHE_ERROR, "kind" => kind, "op" => "decode").increment(1);
                    warn!(
                        key = rendered,
                        error = %err,
                        "discarding undecodable cache entry"
                    );
                    None
                }
            },
            Ok(None) => {
                counter!(METRIC_CACHE_MISS, "kind" => kind).increment(1);
                None
            }
            Err(err) => {
                counter!(METRIC_CACHE_ERROR, "kind" => kind, "op" => "get").increment(1);
                warn!(key = rendered, error = %err, "cache lookup failed, reading from store");
                None
            }
        }
    }

    async fn write_back<T: Serialize>(&self, key: CacheKey, rendered: &str, value: &T) {
        let kind = key.kind();
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(err) => {
                counter!(METRIC_CACHE_ERROR, "kind" => kind, "op" => "encode").increment(1);
                warn!(key = rendered, error = %err, "failed to encode value for cache");
                return;
            }
        };

        if let Err(err) = self
            .store
            .set(rendered, &payload, key.ttl(&self.config))
            .await
        {
            counter!(METRIC_CACHE_ERROR, "kind" => kind, "op" => "set").increment(1);
            warn!(key = rendered, error = %err, "cache write-back failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[derive(Debug, PartialEq)]
    struct LoadFailed;

    #[tokio::test(start_paused = true)]
    async fn miss_loads_and_writes_back() {
        let store = MemoryStore::new();
        let cache = ReadThroughCache::new(Arc::new(store.clone()), CacheConfig::default());
        let loads = AtomicUsize::new(0);

        for _ in 0..3 {
            let value: Result<Vec<u64>, LoadFailed> = cache
                .get_or_load(CacheKey::Top { limit: 3 }, || async {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![3, 2, 1])
                })
                .await;
            assert_eq!(value, Ok(vec![3, 2, 1]));
        }

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(
            store.get("clusters:top:3").await.expect("get").as_deref(),
            Some("[3,2,1]")
        );
        assert_eq!(store.ttl("clusters:top:3"), Some(Duration::from_secs(600)));
    }

    #[tokio::test]
    async fn loader_errors_are_not_cached() {
        let store = MemoryStore::new();
        let cache = ReadThroughCache::new(Arc::new(store.clone()), CacheConfig::default());

        let value: Result<u64, LoadFailed> = cache
            .get_or_load(CacheKey::Detail { id: 5 }, || async { Err(LoadFailed) })
            .await;

        assert_eq!(value, Err(LoadFailed));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn undecodable_entry_falls_back_to_loader() {
        let store = MemoryStore::new();
        store
            .set("clusters:5", "not json", Duration::from_secs(60))
            .await
            .expect("seed");
        let cache = ReadThroughCache::new(Arc::new(store.clone()), CacheConfig::default());

        let value: Result<u64, LoadFailed> = cache
            .get_or_load(CacheKey::Detail { id: 5 }, || async { Ok(11) })
            .await;

        assert_eq!(value, Ok(11));
        assert_eq!(
            store.get("clusters:5").await.expect("get").as_deref(),
            Some("11")
        );
    }

    #[tokio::test]
    async fn disabled_cache_always_loads() {
        let cache = ReadThroughCache::disabled();
        let loads = AtomicUsize::new(0);

        for _ in 0..2 {
            let _: Result<u64, LoadFailed> = cache
                .get_or_load(CacheKey::Detail { id: 1 }, || async {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(1)
                })
                .await;
        }

        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }
}
