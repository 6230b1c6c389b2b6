//! Scraper error types
//!
//! Two tiers: per-source, per-document and analysis errors are recoverable
//! and absorbed at their boundary; sink and job store errors are fatal to a job.

use scrapeforge_common::errors::AppError;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Failure of one source for one keyword
#[derive(Error, Debug, Clone)]
pub enum SourceError {
    #[error("source {source_name} unavailable: {message}")]
    Unavailable { source_name: String, message: String },

    #[error("source {source_name} rate limited")]
    RateLimited {
        source_name: String,
        retry_after: Option<Duration>,
    },
}

impl SourceError {
    pub fn unavailable(source_name: impl Into<String>, message: impl ToString) -> Self {
        SourceError::Unavailable {
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }

    pub fn rate_limited(source_name: impl Into<String>) -> Self {
        SourceError::RateLimited {
            source_name: source_name.into(),
            retry_after: None,
        }
    }

    /// Label used for metrics
    pub fn outcome(&self) -> &'static str {
        match self {
            SourceError::Unavailable { .. } => "unavailable",
            SourceError::RateLimited { .. } => "rate_limited",
        }
    }
}

/// Failure to turn one candidate into a document
#[derive(Error, Debug, Clone)]
pub enum DocumentError {
    #[error("document too large: {url} is {size} bytes, limit {limit}")]
    TooLarge { url: String, size: u64, limit: u64 },

    #[error("unsupported content type {content_type} for {url}")]
    UnsupportedContentType { url: String, content_type: String },

    #[error("extraction failed for {url}: {message}")]
    ExtractionFailed { url: String, message: String },

    #[error("download failed for {url}: {message}")]
    Download { url: String, message: String },
}

impl DocumentError {
    /// Label used for metrics
    pub fn outcome(&self) -> &'static str {
        match self {
            DocumentError::TooLarge { .. } => "too_large",
            DocumentError::UnsupportedContentType { .. } => "unsupported",
            DocumentError::ExtractionFailed { .. } => "extraction_failed",
            DocumentError::Download { .. } => "download_failed",
        }
    }
}

/// Content analysis could not be produced
#[derive(Error, Debug, Clone)]
pub enum AnalysisError {
    #[error("analysis unavailable: {0}")]
    Unavailable(String),
}

/// An artifact could not be written
#[derive(Error, Debug, Clone)]
pub enum SinkError {
    #[error("artifact storage failed: {0}")]
    Storage(String),
}

/// Job state could not be read or written
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("job store failed: {0}")]
    Persistence(String),
}

impl From<AppError> for SinkError {
    fn from(e: AppError) -> Self {
        SinkError::Storage(e.to_string())
    }
}

impl From<std::io::Error> for SinkError {
    fn from(e: std::io::Error) -> Self {
        SinkError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for SinkError {
    fn from(e: serde_json::Error) -> Self {
        SinkError::Storage(format!("serialization: {}", e))
    }
}

impl From<AppError> for StoreError {
    fn from(e: AppError) -> Self {
        StoreError::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Persistence(format!("serialization: {}", e))
    }
}

/// Errors returned by the orchestrator's public operations
#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("job not found: {0}")]
    JobNotFound(Uuid),

    #[error("invalid job request: {0}")]
    InvalidRequest(String),

    #[error("job {id} is {status}, operation not allowed")]
    InvalidState { id: Uuid, status: String },

    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl From<StoreError> for ScrapeError {
    fn from(e: StoreError) -> Self {
        ScrapeError::Persistence(e.to_string())
    }
}

impl From<SinkError> for ScrapeError {
    fn from(e: SinkError) -> Self {
        ScrapeError::Persistence(e.to_string())
    }
}

impl From<validator::ValidationErrors> for ScrapeError {
    fn from(e: validator::ValidationErrors) -> Self {
        ScrapeError::InvalidRequest(e.to_string())
    }
}

pub type ScrapeResult<T> = std::result::Result<T, ScrapeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_labels() {
        assert_eq!(SourceError::rate_limited("arxiv").outcome(), "rate_limited");
        let err = DocumentError::TooLarge {
            url: "https://example.org/a.pdf".into(),
            size: 10,
            limit: 5,
        };
        assert_eq!(err.outcome(), "too_large");
        assert!(err.to_string().contains("limit 5"));
    }

    #[test]
    fn test_app_error_becomes_persistence() {
        let err: SinkError = AppError::Storage {
            message: "disk full".into(),
        }
        .into();
        let err: ScrapeError = err.into();
        assert!(matches!(err, ScrapeError::Persistence(ref m) if m.contains("disk full")));
    }
}
