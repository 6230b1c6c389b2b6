//! Redis cache integration
//!
//! Provides:
//! - Managed (auto-reconnecting) connection
//! - Windowed counters for request budgets shared between workers

use crate::config::RedisConfig;
use crate::errors::{AppError, Result};
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use tracing::debug;

/// Redis cache client
#[derive(Clone)]
pub struct Cache {
    connection: ConnectionManager,
    key_prefix: String,
}

impl Cache {
    /// Create a new cache client
    pub async fn new(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str()).map_err(|e| AppError::CacheError {
            message: format!("Failed to create Redis client: {}", e),
        })?;

        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| AppError::CacheError {
                message: format!("Failed to connect to Redis: {}", e),
            })?;

        Ok(Self {
            connection,
            key_prefix: config.key_prefix.clone(),
        })
    }

    /// Build a prefixed key
    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }

    /// Increment a counter that expires `window_secs` after its first hit.
    ///
    /// Returns the count including this increment.
    pub async fn incr_window(&self, key: &str, window_secs: u64) -> Result<u64> {
        let full_key = self.key(key);
        let mut conn = self.connection.clone();

        let count: u64 = conn.incr(&full_key, 1u64).await?;
        if count == 1 {
            let _: () = conn.expire(&full_key, window_secs as i64).await?;
        }

        debug!(key = %full_key, count, window_secs, "Window counter incremented");
        Ok(count)
    }

    /// Ping Redis to check connectivity
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| AppError::CacheError {
                message: format!("Redis ping failed: {}", e),
            })?;
        Ok(())
    }
}

/// Cache key builder helpers
pub mod keys {
    /// Request budget counter for a source in the current window
    pub fn source_quota(source: &str, window_secs: u64, now_secs: u64) -> String {
        let window = if window_secs == 0 { 0 } else { now_secs / window_secs };
        format!("quota:{}:{}", source, window)
    }
}
