//! Postgres-backed repository implementations.

mod groups;
pub mod query;
mod types;
mod util;
mod views;

pub use util::{map_build_error, map_sqlx_error};

use std::{sync::Arc, time::Duration};

use sqlx::{
    Postgres, Transaction,
    postgres::{PgConnectOptions, PgPool, PgPoolOptions},
};

use crate::config::DatabaseSettings;

#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn begin(&self) -> Result<Transaction<'_, Postgres>, sqlx::Error> {
        self.pool.begin().await
    }

    /// Open a pool whose connections cancel statements running past the configured timeout.
    pub async fn connect(url: &str, settings: &DatabaseSettings) -> Result<PgPool, sqlx::Error> {
        let options = url
            .parse::<PgConnectOptions>()?
            .options([(
                "statement_timeout",
                settings.statement_timeout_ms.get().to_string(),
            )]);

        PgPoolOptions::new()
            .max_connections(settings.max_connections.get())
            .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs.get()))
            .connect_with(options)
            .await
    }

    pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }
}
