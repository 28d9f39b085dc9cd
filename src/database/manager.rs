use sqlx::{postgres::PgPoolOptions, Executor, PgPool};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use super::memory::MemoryStore;
use super::postgres::{PgStore, SCHEMA};
use super::store::Store;
use crate::config::DatabaseConfig;

/// Errors from DatabaseManager
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Builds connection pools and the store the server runs on
pub struct DatabaseManager;

impl DatabaseManager {
    /// Connect a pool using the configured URL and limits
    pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, DatabaseError> {
        let url = config.url.as_deref().ok_or(DatabaseError::ConfigMissing("DATABASE_URL"))?;
        let redacted = Self::redacted_url(url)?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout))
            .connect(url)
            .await?;

        info!("Connected database pool: {}", redacted);
        Ok(pool)
    }

    /// Create tables and seed the anonymous user. Safe to run repeatedly.
    pub async fn migrate(pool: &PgPool) -> Result<(), DatabaseError> {
        pool.execute(SCHEMA).await?;
        info!("Database schema is up to date");
        Ok(())
    }

    /// PostgreSQL store when a URL is configured, otherwise a process-local one
    pub async fn open_store(config: &DatabaseConfig) -> Result<Arc<dyn Store>, DatabaseError> {
        if config.url.is_none() {
            warn!("DATABASE_URL is not set; records are kept in memory and lost on exit");
            return Ok(Arc::new(MemoryStore::new()));
        }
        let pool = Self::connect(config).await?;
        Self::migrate(&pool).await?;
        Ok(Arc::new(PgStore::new(pool)))
    }

    /// Connection URL with any password removed, for logs
    fn redacted_url(raw: &str) -> Result<String, DatabaseError> {
        let mut url = url::Url::parse(raw).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        if url.password().is_some() {
            url.set_password(Some("redacted")).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        }
        Ok(url.into())
    }
}
