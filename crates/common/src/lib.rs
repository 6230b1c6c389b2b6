//! ScrapeForge Common Library
//!
//! Shared infrastructure for the ScrapeForge workers:
//! - Configuration management
//! - Error types and codes
//! - Database models and repository (jobs, artifacts)
//! - Redis cache and windowed counters
//! - Metrics and logging setup

pub mod cache;
pub mod config;
pub mod db;
pub mod errors;
pub mod metrics;
pub mod telemetry;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{DbPool, Repository};
pub use errors::{AppError, Result};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default user agent for outbound requests
pub const DEFAULT_USER_AGENT: &str = concat!("ScrapeForge/", env!("CARGO_PKG_VERSION"));
