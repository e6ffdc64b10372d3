use std::sync::Arc;

use thiserror::Error;
use tracing::instrument;

use crate::application::repos::{GroupsRepo, RecentQuery, RepoError};
use crate::application::views::ViewAggregator;
use crate::cache::{CacheKey, ReadThroughCache};
use crate::domain::entities::{GroupRecord, ListEntry};

#[derive(Debug, Error)]
pub enum GroupsError {
    #[error("group `{0}` not found")]
    NotFound(u64),
    #[error("group store unavailable: {0}")]
    StoreUnavailable(#[source] RepoError),
}

impl From<RepoError> for GroupsError {
    fn from(err: RepoError) -> Self {
        Self::StoreUnavailable(err)
    }
}

/// Caller-facing read operations over groups.
///
/// Top, realtime, similar and detail reads go through the read-through cache; the cursor
/// listing always hits the store.
#[derive(Clone)]
pub struct GroupService {
    repo: Arc<dyn GroupsRepo>,
    cache: ReadThroughCache,
    views: ViewAggregator,
}

impl GroupService {
    pub fn new(repo: Arc<dyn GroupsRepo>, cache: ReadThroughCache, views: ViewAggregator) -> Self {
        Self { repo, cache, views }
    }

    #[instrument(skip(self, query), fields(limit = query.limit))]
    pub async fn list_recent(&self, query: &RecentQuery) -> Result<Vec<ListEntry>, GroupsError> {
        Ok(self.repo.list_recent(query).await?)
    }

    pub async fn list_top_by_engagement(&self, limit: u32) -> Result<Vec<ListEntry>, GroupsError> {
        let entries = self
            .cache
            .get_or_load(CacheKey::Top { limit }, || {
                self.repo.list_top_by_engagement(limit)
            })
            .await?;
        Ok(entries)
    }

    pub async fn list_by_realtime_flag(
        &self,
        limit: u32,
        realtime: bool,
    ) -> Result<Vec<ListEntry>, GroupsError> {
        let entries = self
            .cache
            .get_or_load(CacheKey::Realtime { limit, realtime }, || {
                self.repo.list_by_realtime_flag(limit, realtime)
            })
            .await?;
        Ok(entries)
    }

    pub async fn list_similar(&self, id: u64, limit: u32) -> Result<Vec<ListEntry>, GroupsError> {
        let entries = self
            .cache
            .get_or_load(CacheKey::Similar { id, limit }, || {
                self.repo.list_similar(id, limit)
            })
            .await?;
        Ok(entries)
    }

    /// Load one group and count the read as a view.
    #[instrument(skip(self))]
    pub async fn get_detail(&self, id: u64) -> Result<GroupRecord, GroupsError> {
        let group = self
            .cache
            .get_or_load(CacheKey::Detail { id }, || self.repo.find_detail(id))
            .await
            .map_err(|err| match err {
                RepoError::NotFound => GroupsError::NotFound(id),
                other => GroupsError::StoreUnavailable(other),
            })?;

        self.views.dispatch(id);
        Ok(group)
    }

    pub async fn max_id(&self) -> Result<u64, GroupsError> {
        Ok(self.repo.max_id().await?)
    }

    pub async fn health(&self) -> Result<(), GroupsError> {
        Ok(self.repo.health_check().await?)
    }
}
