//! Postgres-backed repository implementations.

mod reports;

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::application::reports::RepoError;
use crate::config::DatabaseSettings;

use super::error::InfraError;

#[derive(Clone)]
pub struct PostgresReports {
    pool: PgPool,
}

impl PostgresReports {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(settings: &DatabaseSettings) -> Result<Self, InfraError> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
            .connect(&settings.url)
            .await
            .map_err(|err| InfraError::database(err.to_string()))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

pub(crate) fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::PoolTimedOut => RepoError::Timeout,
        other => RepoError::from_persistence(other),
    }
}
