//! Fast key-value cache boundary and its in-process implementation.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
    #[error("value under `{key}` is not an integer")]
    NotInteger { key: String },
}

impl CacheError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Operations the cache layer and the view aggregator need from the fast cache.
///
/// Absent keys are `Ok(None)`, never an error.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Atomically add one to the integer under `key` and return the new value.
    ///
    /// A missing key counts as zero. When the increment creates the key it expires after
    /// `ttl_on_create`; later increments leave the expiry untouched.
    async fn incr(&self, key: &str, ttl_on_create: Duration) -> Result<i64, CacheError>;

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError>;

    /// Remove `keys`, returning how many existed.
    async fn delete(&self, keys: &[String]) -> Result<u64, CacheError>;
}

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| deadline > now)
    }
}

/// In-process store backed by a concurrent map. Expiry is evaluated lazily on access.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, StoredValue>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|entry| entry.value().is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining lifetime of `key`, `None` when absent or without expiry.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entry = self.entries.get(key)?;
        if !entry.is_live(now) {
            return None;
        }
        entry.expires_at.map(|deadline| deadline - now)
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.is_live(now) {
                return Ok(Some(entry.value.clone()));
            }
        }
        self.entries.remove_if(key, |_, stored| !stored.is_live(now));
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.entries.insert(
            key.to_owned(),
            StoredValue {
                value: value.to_owned(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn incr(&self, key: &str, ttl_on_create: Duration) -> Result<i64, CacheError> {
        let now = Instant::now();
        let mut slot = self
            .entries
            .entry(key.to_owned())
            .or_insert_with(|| StoredValue {
                value: "0".to_string(),
                expires_at: None,
            });
        if !slot.is_live(now) {
            *slot = StoredValue {
                value: "0".to_string(),
                expires_at: None,
            };
        }

        let next = slot
            .value
            .parse::<i64>()
            .ok()
            .and_then(|current| current.checked_add(1))
            .ok_or_else(|| CacheError::NotInteger {
                key: key.to_owned(),
            })?;
        slot.value = next.to_string();
        if next == 1 {
            slot.expires_at = Some(now + ttl_on_create);
        }
        Ok(next)
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        let now = Instant::now();
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix) && entry.value().is_live(now))
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, CacheError> {
        let now = Instant::now();
        let removed = keys
            .iter()
            .filter_map(|key| self.entries.remove(key))
            .filter(|(_, stored)| stored.is_live(now))
            .count();
        Ok(removed as u64)
    }
}
