//! Shared HTTP client with scoped sessions
//!
//! A single `reqwest::Client` is shared by every source and the document
//! fetcher. `SessionPool` bounds how many batches of requests are in flight;
//! each `HttpSession` holds a permit that is released on drop, including
//! when the future holding it is cancelled.

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use scrapeforge_common::config::ScraperConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

use crate::errors::SourceError;

/// Bounded pool of HTTP sessions over one client
#[derive(Clone)]
pub struct SessionPool {
    client: Client,
    permits: Arc<Semaphore>,
}

impl SessionPool {
    pub fn new(client: Client, max_sessions: usize) -> Self {
        Self {
            client,
            permits: Arc::new(Semaphore::new(max_sessions.max(1))),
        }
    }

    /// Build the shared client from scraper settings
    pub fn from_config(config: &ScraperConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.request_timeout_secs.min(10)))
            .build()?;
        Ok(Self::new(client, config.http_sessions))
    }

    /// Wait for a free session
    pub async fn session(&self) -> Result<HttpSession, AcquireError> {
        let permit = self.permits.clone().acquire_owned().await?;
        Ok(HttpSession {
            client: self.client.clone(),
            _permit: permit,
        })
    }

    /// Sessions not currently handed out
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

/// One checked-out session; dropping it returns the permit
pub struct HttpSession {
    client: Client,
    _permit: OwnedSemaphorePermit,
}

impl HttpSession {
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn get(&self, url: impl reqwest::IntoUrl) -> RequestBuilder {
        self.client.get(url)
    }
}

/// Acquire a session on behalf of a source
pub async fn source_session(pool: &SessionPool, source: &str) -> Result<HttpSession, SourceError> {
    pool.session()
        .await
        .map_err(|e| SourceError::unavailable(source, e))
}

/// Send a source request and map transport or status failures
pub async fn send(source: &str, request: RequestBuilder) -> Result<Response, SourceError> {
    let response = request
        .send()
        .await
        .map_err(|e| SourceError::unavailable(source, e))?;
    check_status(source, response)
}

/// 429 is rate limiting; any other non-success status makes the source unavailable
pub fn check_status(source: &str, response: Response) -> Result<Response, SourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(SourceError::RateLimited {
            source_name: source.to_string(),
            retry_after,
        });
    }
    Err(SourceError::unavailable(source, format!("HTTP {}", status)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_session_permit_released_on_drop() {
        let pool = SessionPool::new(Client::new(), 2);
        assert_eq!(pool.available(), 2);

        let first = pool.session().await.unwrap();
        let _second = pool.session().await.unwrap();
        assert_eq!(pool.available(), 0);

        drop(first);
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_does_not_leak() {
        let pool = SessionPool::new(Client::new(), 1);
        let held = pool.session().await.unwrap();

        let waiter = tokio::time::timeout(Duration::from_millis(20), pool.session()).await;
        assert!(waiter.is_err());

        drop(held);
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_zero_sessions_clamped() {
        let pool = SessionPool::new(Client::new(), 0);
        assert_eq!(pool.available(), 1);
    }
}
