use async_trait::async_trait;
use tracing::instrument;

use crate::application::repos::{GroupsRepo, RecentQuery, RepoError};
use crate::domain::entities::{GroupRecord, ListEntry};

use super::PostgresRepositories;
use super::query::{GroupQueries, Statement};
use super::types::{GroupDetailRow, ListEntryRow};
use super::util::{convert_id, map_build_error, map_sqlx_error};

impl PostgresRepositories {
    async fn fetch_entries(&self, statement: Statement) -> Result<Vec<ListEntry>, RepoError> {
        let rows = statement
            .query_as::<ListEntryRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        rows.into_iter().map(ListEntry::try_from).collect()
    }
}

#[async_trait]
impl GroupsRepo for PostgresRepositories {
    #[instrument(skip(self), fields(limit = query.limit, terms = query.search.len()))]
    async fn list_recent(&self, query: &RecentQuery) -> Result<Vec<ListEntry>, RepoError> {
        let statement = GroupQueries::list(query.before, query.limit, &query.search)
            .map_err(map_build_error)?;
        self.fetch_entries(statement).await
    }

    async fn list_top_by_engagement(&self, limit: u32) -> Result<Vec<ListEntry>, RepoError> {
        let statement = GroupQueries::top_by_engagement(limit).map_err(map_build_error)?;
        self.fetch_entries(statement).await
    }

    async fn list_by_realtime_flag(
        &self,
        limit: u32,
        realtime: bool,
    ) -> Result<Vec<ListEntry>, RepoError> {
        let statement = GroupQueries::realtime(limit, realtime).map_err(map_build_error)?;
        self.fetch_entries(statement).await
    }

    async fn list_similar(&self, id: u64, limit: u32) -> Result<Vec<ListEntry>, RepoError> {
        let statement = GroupQueries::similar(id, limit).map_err(map_build_error)?;
        self.fetch_entries(statement).await
    }

    async fn find_detail(&self, id: u64) -> Result<GroupRecord, RepoError> {
        let statement = GroupQueries::detail(id).map_err(map_build_error)?;
        let row = statement
            .query_as::<GroupDetailRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .ok_or(RepoError::NotFound)?;

        GroupRecord::try_from(row)
    }

    async fn max_id(&self) -> Result<u64, RepoError> {
        let statement = GroupQueries::max_id().map_err(map_build_error)?;
        let max: i64 = statement
            .query_scalar::<i64>()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        convert_id(max)
    }

    async fn health_check(&self) -> Result<(), RepoError> {
        self.ping().await.map_err(map_sqlx_error)
    }
}
