//! Database layer for ScrapeForge
//!
//! Provides:
//! - SeaORM entity models (scrape jobs, artifacts)
//! - Repository pattern for data access
//! - Connection pool management and schema bootstrap

pub mod models;
mod repository;

pub use repository::Repository;

use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use models::{ArtifactEntity, ScrapeJobEntity};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Database connection pool wrapper
#[derive(Clone)]
pub struct DbPool {
    /// Primary connection (for writes)
    pub primary: Arc<DatabaseConnection>,

    /// Read replica connection (optional)
    pub replica: Option<Arc<DatabaseConnection>>,
}

fn connect_options(url: &str, config: &DatabaseConfig) -> ConnectOptions {
    let mut opts = ConnectOptions::new(url);
    opts.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .sqlx_logging(false);
    opts
}

impl DbPool {
    /// Create a new database pool from configuration
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to primary database...");

        let primary = Database::connect(connect_options(&config.url, config))
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Failed to connect to primary: {}", e),
            })?;

        let replica = match config.read_url {
            Some(ref read_url) => {
                info!("Connecting to read replica...");
                let conn = Database::connect(connect_options(read_url, config))
                    .await
                    .map_err(|e| AppError::DatabaseConnection {
                        message: format!("Failed to connect to replica: {}", e),
                    })?;
                Some(Arc::new(conn))
            }
            None => None,
        };

        info!("Database connections established");

        Ok(Self {
            primary: Arc::new(primary),
            replica,
        })
    }

    /// Wrap an existing connection (tests, embedded use)
    pub fn from_connection(primary: DatabaseConnection) -> Self {
        Self {
            primary: Arc::new(primary),
            replica: None,
        }
    }

    /// Get the connection for reads (replica if available, otherwise primary)
    pub fn read(&self) -> &DatabaseConnection {
        self.replica.as_deref().unwrap_or(self.primary.as_ref())
    }

    /// Get the connection for writes (always primary)
    pub fn write(&self) -> &DatabaseConnection {
        self.primary.as_ref()
    }

    /// Create the job and artifact tables if they are missing
    pub async fn ensure_schema(&self) -> Result<()> {
        let backend = self.primary.get_database_backend();
        let schema = Schema::new(backend);

        let mut jobs = schema.create_table_from_entity(ScrapeJobEntity);
        jobs.if_not_exists();
        self.primary.execute(backend.build(&jobs)).await?;

        let mut artifacts = schema.create_table_from_entity(ArtifactEntity);
        artifacts.if_not_exists();
        self.primary.execute(backend.build(&artifacts)).await?;

        self.primary
            .execute_unprepared(
                "CREATE UNIQUE INDEX IF NOT EXISTS artifacts_job_hash_idx \
                 ON artifacts (job_id, content_hash)",
            )
            .await?;

        info!("Database schema ready");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    #[test]
    fn test_cloned_pool_shares_connection() {
        let pool = DbPool::from_connection(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let copy = pool.clone();

        assert!(Arc::ptr_eq(&pool.primary, &copy.primary));
        assert!(std::ptr::eq(copy.read(), copy.write()));
        assert_eq!(copy.write().get_database_backend(), DatabaseBackend::Postgres);
    }
}
