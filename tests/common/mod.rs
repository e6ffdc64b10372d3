#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use aggregator::application::groups::GroupService;
use aggregator::application::repos::{GroupsRepo, RecentQuery, RepoError, ViewCountsRepo};
use aggregator::application::views::{ViewAggregator, ViewsConfig};
use aggregator::cache::{CacheConfig, CacheError, KeyValueStore, MemoryStore, ReadThroughCache};
use aggregator::domain::entities::{GroupRecord, ListEntry, SourceRecord, ViewDelta};
use async_trait::async_trait;
use time::OffsetDateTime;
use time::macros::datetime;

pub fn list_entry(id: u64, realtime: bool) -> ListEntry {
    ListEntry {
        id,
        time: datetime!(2024-05-01 12:00 UTC) - time::Duration::minutes(id as i64),
        title: format!("Group {id}"),
        description: Some(format!("Summary of group {id}")),
        enclosure: None,
        is_realtime: realtime,
        source_name: "Wire".to_string(),
    }
}

pub fn group_record(id: u64) -> GroupRecord {
    GroupRecord {
        id,
        title: format!("Group {id}"),
        description: None,
        time: datetime!(2024-05-01 12:00 UTC),
        full_text: Some("Rewritten body".to_string()),
        enclosure: None,
        is_realtime: false,
        views_count: 3,
        sources: vec![SourceRecord {
            id: id * 10,
            title: format!("Source for {id}"),
            source_name: "Wire".to_string(),
            time: datetime!(2024-05-01 11:00 UTC),
            link: format!("https://news.test/{id}"),
            description: None,
            full_text: String::new(),
            enclosure: None,
        }],
    }
}

/// In-memory groups store that counts how often each read reaches it.
#[derive(Default)]
pub struct FakeGroupsRepo {
    entries: Vec<ListEntry>,
    groups: HashMap<u64, GroupRecord>,
    calls: Mutex<HashMap<&'static str, usize>>,
    failing: AtomicBool,
    pub last_recent: Mutex<Option<RecentQuery>>,
}

impl FakeGroupsRepo {
    pub fn new(entries: Vec<ListEntry>, groups: Vec<GroupRecord>) -> Self {
        Self {
            entries,
            groups: groups.into_iter().map(|g| (g.id, g)).collect(),
            ..Default::default()
        }
    }

    pub fn seeded() -> Self {
        Self::new(
            (1..=5).map(|id| list_entry(id, id % 2 == 0)).collect(),
            vec![group_record(1), group_record(2)],
        )
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .expect("calls lock")
            .get(operation)
            .copied()
            .unwrap_or_default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn track(&self, operation: &'static str) -> Result<(), RepoError> {
        *self
            .calls
            .lock()
            .expect("calls lock")
            .entry(operation)
            .or_default() += 1;
        if self.failing.load(Ordering::SeqCst) {
            return Err(RepoError::Timeout);
        }
        Ok(())
    }

    fn take(&self, limit: u32) -> Vec<ListEntry> {
        self.entries.iter().take(limit as usize).cloned().collect()
    }
}

#[async_trait]
impl GroupsRepo for FakeGroupsRepo {
    async fn list_recent(&self, query: &RecentQuery) -> Result<Vec<ListEntry>, RepoError> {
        self.track("list_recent")?;
        *self.last_recent.lock().expect("recent lock") = Some(query.clone());
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.time < query.before)
            .take(query.limit as usize)
            .cloned()
            .collect())
    }

    async fn list_top_by_engagement(&self, limit: u32) -> Result<Vec<ListEntry>, RepoError> {
        self.track("top")?;
        Ok(self.take(limit))
    }

    async fn list_by_realtime_flag(
        &self,
        limit: u32,
        realtime: bool,
    ) -> Result<Vec<ListEntry>, RepoError> {
        self.track("realtime")?;
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.is_realtime == realtime)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn list_similar(&self, id: u64, limit: u32) -> Result<Vec<ListEntry>, RepoError> {
        self.track("similar")?;
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.id != id)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn find_detail(&self, id: u64) -> Result<GroupRecord, RepoError> {
        self.track("detail")?;
        self.groups.get(&id).cloned().ok_or(RepoError::NotFound)
    }

    async fn max_id(&self) -> Result<u64, RepoError> {
        self.track("max_id")?;
        Ok(self.entries.iter().map(|entry| entry.id).max().unwrap_or(0))
    }

    async fn health_check(&self) -> Result<(), RepoError> {
        self.track("health")
    }
}

/// Persistent view counters kept in a map; can be told to fail the next batches.
#[derive(Default)]
pub struct FakeViewCounts {
    totals: Mutex<HashMap<u64, u64>>,
    batches: AtomicUsize,
    failing: AtomicBool,
}

impl FakeViewCounts {
    pub fn total(&self, group_id: u64) -> u64 {
        self.totals
            .lock()
            .expect("totals lock")
            .get(&group_id)
            .copied()
            .unwrap_or_default()
    }

    pub fn batches(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl ViewCountsRepo for FakeViewCounts {
    async fn apply_view_deltas(&self, deltas: &[ViewDelta]) -> Result<u64, RepoError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RepoError::Persistence("connection reset".to_string()));
        }
        self.batches.fetch_add(1, Ordering::SeqCst);
        let mut totals = self.totals.lock().expect("totals lock");
        for delta in deltas {
            *totals.entry(delta.group_id).or_default() += delta.delta;
        }
        Ok(deltas.len() as u64)
    }
}

/// A cache backend that is down.
#[derive(Default)]
pub struct FailingStore;

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(CacheError::backend("connection refused"))
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::backend("connection refused"))
    }

    async fn incr(&self, _key: &str, _ttl_on_create: Duration) -> Result<i64, CacheError> {
        Err(CacheError::backend("connection refused"))
    }

    async fn scan_prefix(&self, _prefix: &str) -> Result<Vec<String>, CacheError> {
        Err(CacheError::backend("connection refused"))
    }

    async fn delete(&self, _keys: &[String]) -> Result<u64, CacheError> {
        Err(CacheError::backend("connection refused"))
    }
}

pub struct Harness {
    pub repo: Arc<FakeGroupsRepo>,
    pub counts: Arc<FakeViewCounts>,
    pub cache: MemoryStore,
    pub views: ViewAggregator,
    pub service: GroupService,
}

pub fn harness(repo: FakeGroupsRepo) -> Harness {
    harness_with(repo, CacheConfig::default())
}

pub fn harness_with(repo: FakeGroupsRepo, config: CacheConfig) -> Harness {
    let repo = Arc::new(repo);
    let counts = Arc::new(FakeViewCounts::default());
    let cache = MemoryStore::new();
    let views = ViewAggregator::new(
        Arc::new(cache.clone()),
        counts.clone(),
        ViewsConfig::default(),
    );
    let read_through = ReadThroughCache::new(Arc::new(cache.clone()), config);
    let service = GroupService::new(repo.clone(), read_through, views.clone());
    Harness {
        repo,
        counts,
        cache,
        views,
        service,
    }
}

/// Wait until a spawned view dispatch has landed in the cache.
pub async fn wait_for_pending_views(cache: &MemoryStore, group_id: u64, expected: &str) {
    let key = format!("views:{group_id}");
    for _ in 0..100 {
        if cache.get(&key).await.expect("read pending views").as_deref() == Some(expected) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("pending views for group {group_id} never reached {expected}");
}

pub fn cursor_far_future() -> OffsetDateTime {
    datetime!(2100-01-01 00:00 UTC)
}
