use async_trait::async_trait;

use crate::application::repos::{RepoError, ViewCountsRepo};
use crate::domain::entities::ViewDelta;

use super::PostgresRepositories;
use super::query::GroupQueries;
use super::util::{map_build_error, map_sqlx_error};

#[async_trait]
impl ViewCountsRepo for PostgresRepositories {
    async fn apply_view_deltas(&self, deltas: &[ViewDelta]) -> Result<u64, RepoError> {
        if deltas.is_empty() {
            return Ok(0);
        }

        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        let mut updated = 0;
        for delta in deltas {
            let statement =
                GroupQueries::add_views(delta.group_id, delta.delta).map_err(map_build_error)?;
            let result = statement
                .query()
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
            updated += result.rows_affected();
        }
        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(updated)
    }
}
