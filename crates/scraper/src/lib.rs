//! ScrapeForge scraper
//!
//! Multi-source search and document collection:
//! - Search sources (websites, JSON APIs, arXiv, CrossRef) behind `SourceClient`
//! - Download, text extraction and classification (`DocumentProcessor`)
//! - Optional content analysis
//! - URL and content-hash deduplication
//! - Content-addressed artifact storage
//! - Job orchestration with progress, cancellation and retry

pub mod analyzer;
pub mod bootstrap;
pub mod dedup;
pub mod errors;
pub mod http;
pub mod models;
pub mod orchestrator;
pub mod postgres;
pub mod processor;
pub mod sink;
pub mod sources;
pub mod store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use errors::{ScrapeError, ScrapeResult};
pub use models::{Job, JobOptions, JobStatus, SourceName};
pub use orchestrator::{JobOrchestrator, OrchestratorSettings};
