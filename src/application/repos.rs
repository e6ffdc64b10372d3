//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::entities::{GroupRecord, ListEntry, ViewDelta};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity {
            message: message.into(),
        }
    }
}

/// Parameters of the uncached cursor/search listing.
#[derive(Debug, Clone)]
pub struct RecentQuery {
    /// Exclusive upper bound on group time.
    pub before: OffsetDateTime,
    pub limit: u32,
    pub search: Vec<String>,
}

impl RecentQuery {
    pub fn new(before: OffsetDateTime, limit: u32) -> Self {
        Self {
            before,
            limit,
            search: Vec::new(),
        }
    }

    pub fn with_search<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search = terms.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
pub trait GroupsRepo: Send + Sync {
    async fn list_recent(&self, query: &RecentQuery) -> Result<Vec<ListEntry>, RepoError>;

    async fn list_top_by_engagement(&self, limit: u32) -> Result<Vec<ListEntry>, RepoError>;

    async fn list_by_realtime_flag(
        &self,
        limit: u32,
        realtime: bool,
    ) -> Result<Vec<ListEntry>, RepoError>;

    async fn list_similar(&self, id: u64, limit: u32) -> Result<Vec<ListEntry>, RepoError>;

    /// Load one group with all of its sources; `RepoError::NotFound` when absent.
    async fn find_detail(&self, id: u64) -> Result<GroupRecord, RepoError>;

    async fn max_id(&self) -> Result<u64, RepoError>;

    async fn health_check(&self) -> Result<(), RepoError>;
}

#[async_trait]
pub trait ViewCountsRepo: Send + Sync {
    /// Atomically add every delta to its group's persistent counter.
    ///
    /// Either all deltas are committed or none are. Returns the number of groups updated.
    async fn apply_view_deltas(&self, deltas: &[ViewDelta]) -> Result<u64, RepoError>;
}
