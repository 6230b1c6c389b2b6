//! Error types for ScrapeForge infrastructure
//!
//! Provides:
//! - Distinct error types for infrastructure failure modes
//! - Retry classification

use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Infrastructure error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Job not found: {id}")]
    JobNotFound { id: String },

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Cache error: {message}")]
    CacheError { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl AppError {
    /// Whether retrying the same operation later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::DatabaseConnection { .. }
                | AppError::CacheError { .. }
                | AppError::Storage { .. }
        )
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage {
            message: err.to_string(),
        }
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::CacheError {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        let err = AppError::DatabaseConnection {
            message: "refused".into(),
        };
        assert!(err.is_retryable());

        let err = AppError::JobNotFound { id: "test".into() };
        assert!(!err.is_retryable());

        let err = AppError::Configuration {
            message: "bad listen address".into(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_io_error_is_storage() {
        let err: AppError = std::io::Error::new(std::io::ErrorKind::Other, "disk full").into();
        assert!(matches!(err, AppError::Storage { .. }));
        assert!(err.is_retryable());
    }
}
