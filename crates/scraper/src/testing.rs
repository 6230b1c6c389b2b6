//! Test doubles for the pipeline seams
//!
//! Used by unit tests and the integration suite; none of them touch the
//! network or a database.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use uuid::Uuid;

use crate::analyzer::ContentAnalyzer;
use crate::errors::{AnalysisError, DocumentError, SinkError, SourceError, StoreError};
use crate::models::{AnalysisResult, Candidate, Job, JobContext, ProcessedDocument, SourceName};
use crate::processor::{FetchedDocument, Fetcher};
use crate::sink::{ArtifactSink, MemoryArtifactSink};
use crate::sources::SourceClient;
use crate::store::{JobStore, MemoryJobStore};

// ============================================================================
// Sources
// ============================================================================

/// Source answering from a fixed keyword → URLs table
pub struct MockSource {
    name: SourceName,
    results: HashMap<String, Vec<String>>,
    delay: Duration,
    honour_limit: bool,
    calls: AtomicUsize,
}

impl MockSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: SourceName::new(name),
            results: HashMap::new(),
            delay: Duration::ZERO,
            honour_limit: true,
            calls: AtomicUsize::new(0),
        }
    }

    /// Return every configured result whatever `limit` the caller asks for
    pub fn ignoring_limit(mut self) -> Self {
        self.honour_limit = false;
        self
    }

    pub fn with_results(mut self, keyword: &str, urls: Vec<String>) -> Self {
        self.results.insert(keyword.to_string(), urls);
        self
    }

    /// Sleep before answering each search
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceClient for MockSource {
    fn name(&self) -> &SourceName {
        &self.name
    }

    async fn search(&self, keyword: &str, limit: usize) -> Result<Vec<Candidate>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let urls = self.results.get(keyword).cloned().unwrap_or_default();
        let take = if self.honour_limit { limit } else { urls.len() };
        Ok(urls
            .into_iter()
            .take(take)
            .enumerate()
            .map(|(i, url)| {
                let title = format!("{} {}", keyword, i + 1);
                Candidate::new(&url, &title, self.name.clone(), keyword)
            })
            .collect())
    }
}

/// Source whose every search fails
pub struct FailingSource {
    name: SourceName,
    rate_limited: bool,
    calls: AtomicUsize,
}

impl FailingSource {
    /// Fails with `Unavailable`
    pub fn new(name: &str) -> Self {
        Self {
            name: SourceName::new(name),
            rate_limited: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fails with `RateLimited`
    pub fn rate_limited(name: &str) -> Self {
        Self {
            rate_limited: true,
            ..Self::new(name)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceClient for FailingSource {
    fn name(&self) -> &SourceName {
        &self.name
    }

    async fn search(&self, _keyword: &str, _limit: usize) -> Result<Vec<Candidate>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.rate_limited {
            Err(SourceError::rate_limited(self.name.as_str()))
        } else {
            Err(SourceError::unavailable(self.name.as_str(), "connection refused"))
        }
    }
}

// ============================================================================
// Fetcher
// ============================================================================

/// Fetcher serving canned bodies; unknown URLs fail to download
#[derive(Default)]
pub struct MockFetcher {
    bodies: HashMap<String, (Option<String>, Vec<u8>)>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `text` as `text/plain`
    pub fn with_text(self, url: &str, text: &str) -> Self {
        self.with_body(url, Some("text/plain"), text.as_bytes().to_vec())
    }

    pub fn with_body(mut self, url: &str, content_type: Option<&str>, bytes: Vec<u8>) -> Self {
        self.bodies
            .insert(url.to_string(), (content_type.map(str::to_string), bytes));
        self
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str, _max_bytes: u64) -> Result<FetchedDocument, DocumentError> {
        match self.bodies.get(url) {
            Some((content_type, bytes)) => Ok(FetchedDocument {
                bytes: bytes.clone(),
                content_type: content_type.clone(),
                final_url: url.to_string(),
            }),
            None => Err(DocumentError::Download {
                url: url.to_string(),
                message: "404 Not Found".to_string(),
            }),
        }
    }
}

// ============================================================================
// Analyzers
// ============================================================================

/// Analyzer returning a fixed result
pub struct MockAnalyzer {
    result: AnalysisResult,
    calls: AtomicUsize,
}

impl MockAnalyzer {
    pub fn new(summary: &str, quality_score: f32) -> Self {
        Self {
            result: AnalysisResult {
                keywords: vec!["mock".to_string()],
                summary: summary.to_string(),
                quality_score,
            },
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentAnalyzer for MockAnalyzer {
    async fn analyze(&self, _text: &str) -> Result<AnalysisResult, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.result.clone())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

pub struct FailingAnalyzer;

#[async_trait]
impl ContentAnalyzer for FailingAnalyzer {
    async fn analyze(&self, _text: &str) -> Result<AnalysisResult, AnalysisError> {
        Err(AnalysisError::Unavailable("analyzer offline".to_string()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

// ============================================================================
// Persistence
// ============================================================================

/// Sink that stores `allowed` artifacts, then fails
pub struct FailingSink {
    inner: MemoryArtifactSink,
    remaining: AtomicUsize,
}

impl FailingSink {
    /// Fails on the first store
    pub fn new() -> Self {
        Self::after(0)
    }

    pub fn after(allowed: usize) -> Self {
        Self {
            inner: MemoryArtifactSink::new(),
            remaining: AtomicUsize::new(allowed),
        }
    }

    /// Artifacts stored before the failure
    pub fn stored(&self, job_id: Uuid) -> usize {
        self.inner.list_for_job(job_id).len()
    }
}

impl Default for FailingSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtifactSink for FailingSink {
    async fn store(&self, doc: &ProcessedDocument, job: &JobContext) -> Result<Uuid, SinkError> {
        let allowed = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !allowed {
            return Err(SinkError::Storage("disk full".to_string()));
        }
        self.inner.store(doc, job).await
    }
}

/// Job store whose updates fail after a number of successful ones
pub struct FailingStore {
    inner: MemoryJobStore,
    remaining: AtomicUsize,
}

impl FailingStore {
    pub fn failing_updates_after(allowed: usize) -> Self {
        Self {
            inner: MemoryJobStore::new(),
            remaining: AtomicUsize::new(allowed),
        }
    }
}

#[async_trait]
impl JobStore for FailingStore {
    async fn insert(&self, job: &Job) -> Result<(), StoreError> {
        self.inner.insert(job).await
    }

    async fn update(&self, job: &Job) -> Result<(), StoreError> {
        let allowed = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !allowed {
            return Err(StoreError::Persistence("connection reset".to_string()));
        }
        self.inner.update(job).await
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>, StoreError> {
        self.inner.get(job_id).await
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Job>, StoreError> {
        self.inner.list_for_user(user_id).await
    }
}

/// Job store whose updates take `delay`, like a remote database
pub struct SlowStore {
    inner: MemoryJobStore,
    delay: Duration,
}

impl SlowStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MemoryJobStore::new(),
            delay,
        }
    }
}

#[async_trait]
impl JobStore for SlowStore {
    async fn insert(&self, job: &Job) -> Result<(), StoreError> {
        self.inner.insert(job).await
    }

    async fn update(&self, job: &Job) -> Result<(), StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.update(job).await
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>, StoreError> {
        self.inner.get(job_id).await
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Job>, StoreError> {
        self.inner.list_for_user(user_id).await
    }
}
