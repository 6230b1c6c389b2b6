//! Rate-limited source wrapper
//!
//! Paces any `SourceClient` with a governor token bucket and optionally
//! enforces a request budget per time window shared between workers.

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use scrapeforge_common::cache::{keys, Cache};
use scrapeforge_common::config::RateLimitConfig;
use scrapeforge_common::errors::AppError;
use scrapeforge_common::metrics;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

use super::SourceClient;
use crate::errors::SourceError;
use crate::models::{Candidate, SourceName};

type DefaultRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Counts requests per source in fixed time windows
#[async_trait]
pub trait QuotaCounter: Send + Sync {
    /// Record one request; returns the count in the current window including it
    async fn hit(&self, source: &str, window_secs: u64) -> Result<u64, AppError>;
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Process-local counter
#[derive(Default)]
pub struct MemoryQuota {
    counts: Mutex<HashMap<String, u64>>,
}

impl MemoryQuota {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuotaCounter for MemoryQuota {
    async fn hit(&self, source: &str, window_secs: u64) -> Result<u64, AppError> {
        let key = keys::source_quota(source, window_secs, now_secs());
        let mut counts = self.counts.lock().map_err(|_| AppError::Internal {
            message: "quota counter lock poisoned".to_string(),
        })?;
        // Drop counters of past windows for this source
        let prefix = format!("quota:{}:", source);
        counts.retain(|k, _| !k.starts_with(&prefix) || *k == key);

        let count = counts.entry(key).or_insert(0);
        *count += 1;
        Ok(*count)
    }
}

/// Counter shared through Redis
pub struct RedisQuota {
    cache: Cache,
}

impl RedisQuota {
    pub fn new(cache: Cache) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl QuotaCounter for RedisQuota {
    async fn hit(&self, source: &str, window_secs: u64) -> Result<u64, AppError> {
        let key = keys::source_quota(source, window_secs, now_secs());
        self.cache.incr_window(&key, window_secs).await
    }
}

struct Budget {
    counter: Arc<dyn QuotaCounter>,
    limit: u64,
    window_secs: u64,
}

/// A source wrapper that waits for pacing permits and enforces a request budget
pub struct RateLimitedSource {
    inner: Arc<dyn SourceClient>,
    limiter: Arc<DefaultRateLimiter>,
    max_wait: Duration,
    budget: Option<Budget>,
}

impl RateLimitedSource {
    pub fn new(
        inner: Arc<dyn SourceClient>,
        requests_per_second: u32,
        burst: u32,
        max_wait: Duration,
    ) -> Self {
        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(burst).unwrap_or(rate);
        Self {
            inner,
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(rate).allow_burst(burst))),
            max_wait,
            budget: None,
        }
    }

    pub fn from_config(inner: Arc<dyn SourceClient>, config: &RateLimitConfig) -> Self {
        Self::new(
            inner,
            config.requests_per_second,
            config.burst,
            Duration::from_millis(config.max_wait_ms),
        )
    }

    /// Attach a windowed budget; `None` leaves the source unbudgeted
    pub fn with_quota(
        mut self,
        counter: Arc<dyn QuotaCounter>,
        limit: Option<u64>,
        window_secs: u64,
    ) -> Self {
        self.budget = limit.map(|limit| Budget {
            counter,
            limit,
            window_secs,
        });
        self
    }

    async fn wait_for_permit(&self) -> Result<(), SourceError> {
        tokio::time::timeout(self.max_wait, self.limiter.until_ready())
            .await
            .map_err(|_| SourceError::RateLimited {
                source_name: self.inner.name().to_string(),
                retry_after: Some(self.max_wait),
            })
    }

    async fn check_budget(&self) -> Result<(), SourceError> {
        let Some(budget) = &self.budget else {
            return Ok(());
        };
        let source = self.inner.name().as_str();
        match budget.counter.hit(source, budget.window_secs).await {
            Ok(count) => {
                let allowed = count <= budget.limit;
                metrics::record_quota(source, allowed);
                if allowed {
                    Ok(())
                } else {
                    debug!(source, count, limit = budget.limit, "Request budget exhausted");
                    Err(SourceError::rate_limited(source))
                }
            }
            Err(e) => {
                // Counter outage does not block searching
                warn!(
                    source,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Request budget check failed"
                );
                Ok(())
            }
        }
    }
}

#[async_trait]
impl SourceClient for RateLimitedSource {
    fn name(&self) -> &SourceName {
        self.inner.name()
    }

    async fn search(&self, keyword: &str, limit: usize) -> Result<Vec<Candidate>, SourceError> {
        self.wait_for_permit().await?;
        self.check_budget().await?;
        self.inner.search(keyword, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockSource;

    fn mock() -> Arc<MockSource> {
        Arc::new(MockSource::new("api").with_results(
            "budget",
            vec!["https://example.org/a.pdf".to_string()],
        ))
    }

    #[tokio::test]
    async fn test_passes_through_within_limits() {
        let inner = mock();
        let source = RateLimitedSource::new(inner.clone(), 10, 5, Duration::from_secs(1));

        let results = source.search("budget", 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(source.name().as_str(), "api");
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn test_pacing_timeout_is_rate_limited() {
        let inner = mock();
        let source = RateLimitedSource::new(inner.clone(), 1, 1, Duration::from_millis(10));

        source.search("budget", 10).await.unwrap();
        let err = source.search("budget", 10).await.unwrap_err();
        assert!(matches!(err, SourceError::RateLimited { .. }));
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_budget_is_rate_limited() {
        let inner = mock();
        let source = RateLimitedSource::new(inner.clone(), 100, 100, Duration::from_secs(1))
            .with_quota(Arc::new(MemoryQuota::new()), Some(2), 3600);

        assert!(source.search("budget", 1).await.is_ok());
        assert!(source.search("budget", 1).await.is_ok());
        let err = source.search("budget", 1).await.unwrap_err();
        assert!(matches!(err, SourceError::RateLimited { .. }));
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test]
    async fn test_memory_quota_counts_per_source() {
        let quota = MemoryQuota::new();
        assert_eq!(quota.hit("arxiv", 60).await.unwrap(), 1);
        assert_eq!(quota.hit("arxiv", 60).await.unwrap(), 2);
        assert_eq!(quota.hit("crossref", 60).await.unwrap(), 1);
    }
}
