//! Document download

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff, ExponentialBackoffBuilder};
use reqwest::StatusCode;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use crate::errors::DocumentError;
use crate::http::SessionPool;

/// Raw body of a downloaded document
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    /// URL after redirects
    pub final_url: String,
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Download `url`, failing with `TooLarge` once the body exceeds `max_bytes`
    async fn fetch(&self, url: &str, max_bytes: u64) -> Result<FetchedDocument, DocumentError>;
}

/// Fetcher over the shared HTTP session pool with retry on transient errors
pub struct HttpFetcher {
    sessions: SessionPool,
    max_retries: u32,
    initial_interval: Duration,
}

fn download_error(url: &str, message: impl ToString) -> DocumentError {
    DocumentError::Download {
        url: url.to_string(),
        message: message.to_string(),
    }
}

/// Server errors and throttling are worth retrying; the rest are not
fn status_failure(url: &str, status: StatusCode) -> backoff::Error<DocumentError> {
    let err = download_error(url, format!("HTTP {}", status));
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        backoff::Error::transient(err)
    } else {
        backoff::Error::permanent(err)
    }
}

impl HttpFetcher {
    pub fn new(sessions: SessionPool, max_retries: u32) -> Self {
        Self {
            sessions,
            max_retries,
            initial_interval: Duration::from_millis(500),
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_interval)
            .with_max_interval(Duration::from_secs(10))
            .with_max_elapsed_time(Some(Duration::from_secs(60)))
            .build()
    }

    async fn fetch_once(
        &self,
        url: &str,
        max_bytes: u64,
    ) -> Result<FetchedDocument, backoff::Error<DocumentError>> {
        let session = self
            .sessions
            .session()
            .await
            .map_err(|e| backoff::Error::permanent(download_error(url, e)))?;

        let mut response = session.get(url).send().await.map_err(|e| {
            let err = download_error(url, &e);
            if e.is_timeout() || e.is_connect() || e.is_request() {
                backoff::Error::transient(err)
            } else {
                backoff::Error::permanent(err)
            }
        })?;

        if !response.status().is_success() {
            return Err(status_failure(url, response.status()));
        }

        if let Some(len) = response.content_length() {
            if len > max_bytes {
                return Err(backoff::Error::permanent(DocumentError::TooLarge {
                    url: url.to_string(),
                    size: len,
                    limit: max_bytes,
                }));
            }
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let final_url = response.url().to_string();

        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| backoff::Error::transient(download_error(url, e)))?
        {
            let size = (bytes.len() + chunk.len()) as u64;
            if size > max_bytes {
                return Err(backoff::Error::permanent(DocumentError::TooLarge {
                    url: url.to_string(),
                    size,
                    limit: max_bytes,
                }));
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(FetchedDocument {
            bytes,
            content_type,
            final_url,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, max_bytes: u64) -> Result<FetchedDocument, DocumentError> {
        let attempts = AtomicU32::new(0);
        let attempts = &attempts;
        let max_retries = self.max_retries;

        let result = retry(self.backoff(), move || async move {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            match self.fetch_once(url, max_bytes).await {
                Err(backoff::Error::Transient { err, .. }) if attempt > max_retries => {
                    Err(backoff::Error::permanent(err))
                }
                Err(backoff::Error::Transient { err, retry_after }) => {
                    warn!(url, attempt, error = %err, "Download failed, retrying");
                    Err(backoff::Error::Transient { err, retry_after })
                }
                other => other,
            }
        })
        .await;

        if let Ok(doc) = &result {
            debug!(url, bytes = doc.bytes.len(), "Document downloaded");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_failure_classification() {
        let url = "https://example.org/a.pdf";
        assert!(matches!(
            status_failure(url, StatusCode::BAD_GATEWAY),
            backoff::Error::Transient { .. }
        ));
        assert!(matches!(
            status_failure(url, StatusCode::TOO_MANY_REQUESTS),
            backoff::Error::Transient { .. }
        ));
        assert!(matches!(
            status_failure(url, StatusCode::NOT_FOUND),
            backoff::Error::Permanent(DocumentError::Download { .. })
        ));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_download_error() {
        let sessions = SessionPool::new(
            reqwest::Client::builder()
                .timeout(Duration::from_millis(200))
                .build()
                .unwrap(),
            1,
        );
        let mut fetcher = HttpFetcher::new(sessions, 0);
        fetcher.initial_interval = Duration::from_millis(1);

        let err = fetcher
            .fetch("http://127.0.0.1:9/missing.pdf", 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentError::Download { .. }));
    }
}
