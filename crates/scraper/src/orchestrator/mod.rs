//! Job orchestration
//!
//! `JobOrchestrator` owns the job lifecycle:
//! `pending → running → {completed, failed, cancelled}` and `pending → cancelled`.
//! Each submitted job runs as one tokio task on a bounded worker pool. The
//! task is the only writer of its job; readers get snapshots through a
//! watch channel and fall back to the job store for jobs this process is
//! not tracking.

mod run;

use scrapeforge_common::config::ScraperConfig;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::analyzer::ContentAnalyzer;
use crate::errors::{ScrapeError, ScrapeResult};
use crate::models::{Job, JobOptions, JobRequest, SourceName};
use crate::processor::DocumentProcessor;
use crate::sink::ArtifactSink;
use crate::sources::SourceRegistry;
use crate::store::JobStore;

/// Pipeline tuning
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub max_concurrent_jobs: usize,
    /// Sources searched concurrently per batch; 0 means all at once
    pub source_fanout: usize,
    pub document_concurrency: usize,
    pub keyword_delay: Duration,
    pub source_delay: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from(&ScraperConfig::default())
    }
}

impl From<&ScraperConfig> for OrchestratorSettings {
    fn from(config: &ScraperConfig) -> Self {
        Self {
            max_concurrent_jobs: config.max_concurrent_jobs.max(1),
            source_fanout: config.source_fanout,
            document_concurrency: config.document_concurrency.max(1),
            keyword_delay: Duration::from_millis(config.keyword_delay_ms),
            source_delay: Duration::from_millis(config.source_delay_ms),
        }
    }
}

impl OrchestratorSettings {
    /// No pacing delays; used by tests and one-shot runs
    pub fn immediate() -> Self {
        Self {
            keyword_delay: Duration::ZERO,
            source_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// Live view of a job run by this process; dropped once the terminal state is stored
struct JobHandle {
    attempt: u32,
    snapshot: watch::Receiver<Job>,
    cancel: CancellationToken,
}

impl JobHandle {
    fn new(job: &Job) -> (Self, watch::Sender<Job>) {
        let (tx, rx) = watch::channel(job.clone());
        let handle = Self {
            attempt: job.attempt,
            snapshot: rx,
            cancel: CancellationToken::new(),
        };
        (handle, tx)
    }
}

struct Inner {
    sources: SourceRegistry,
    processor: Arc<DocumentProcessor>,
    analyzer: Option<Arc<dyn ContentAnalyzer>>,
    sink: Arc<dyn ArtifactSink>,
    store: Arc<dyn JobStore>,
    settings: OrchestratorSettings,
    workers: Arc<Semaphore>,
    handles: Mutex<HashMap<Uuid, JobHandle>>,
}

impl Inner {
    fn lock_handles(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, JobHandle>> {
        self.handles.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Forget a run; a newer attempt's handle is left alone
    fn release(&self, job_id: Uuid, attempt: u32) {
        let mut handles = self.lock_handles();
        if handles.get(&job_id).is_some_and(|h| h.attempt == attempt) {
            handles.remove(&job_id);
        }
    }
}

pub struct OrchestratorBuilder {
    sources: SourceRegistry,
    processor: Arc<DocumentProcessor>,
    sink: Arc<dyn ArtifactSink>,
    store: Arc<dyn JobStore>,
    analyzer: Option<Arc<dyn ContentAnalyzer>>,
    settings: OrchestratorSettings,
}

impl OrchestratorBuilder {
    pub fn analyzer(mut self, analyzer: Option<Arc<dyn ContentAnalyzer>>) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> JobOrchestrator {
        JobOrchestrator {
            inner: Arc::new(Inner {
                workers: Arc::new(Semaphore::new(self.settings.max_concurrent_jobs.max(1))),
                sources: self.sources,
                processor: self.processor,
                analyzer: self.analyzer,
                sink: self.sink,
                store: self.store,
                settings: self.settings,
                handles: Mutex::new(HashMap::new()),
            }),
        }
    }
}

#[derive(Clone)]
pub struct JobOrchestrator {
    inner: Arc<Inner>,
}

impl JobOrchestrator {
    pub fn builder(
        sources: SourceRegistry,
        processor: Arc<DocumentProcessor>,
        sink: Arc<dyn ArtifactSink>,
        store: Arc<dyn JobStore>,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder {
            sources,
            processor,
            sink,
            store,
            analyzer: None,
            settings: OrchestratorSettings::default(),
        }
    }

    pub fn sources(&self) -> &SourceRegistry {
        &self.inner.sources
    }

    /// Validate, persist and schedule a new job
    #[instrument(skip(self, keywords, sources, options))]
    pub async fn submit_job(
        &self,
        user_id: &str,
        keywords: Vec<String>,
        sources: Vec<SourceName>,
        options: JobOptions,
    ) -> ScrapeResult<Uuid> {
        let keywords: Vec<String> = keywords
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();

        let request = JobRequest {
            user_id: user_id.trim().to_string(),
            keywords,
            sources: sources.into_iter().collect(),
            options,
        };
        request.validate()?;

        if let Some(unknown) = request
            .sources
            .iter()
            .find(|name| !self.inner.sources.contains(name))
        {
            return Err(ScrapeError::InvalidRequest(format!(
                "unknown source: {}",
                unknown
            )));
        }

        let job = Job::new(request);
        let job_id = job.job_id;
        self.inner.store.insert(&job).await?;

        info!(
            job_id = %job_id,
            keywords = job.keywords.len(),
            sources = job.sources.len(),
            "Job submitted"
        );
        self.spawn(job);
        Ok(job_id)
    }

    /// Current state of a job
    pub async fn get_job(&self, job_id: Uuid) -> ScrapeResult<Job> {
        if let Some(job) = self.snapshot(job_id) {
            return Ok(job);
        }
        self.inner
            .store
            .get(job_id)
            .await?
            .ok_or(ScrapeError::JobNotFound(job_id))
    }

    /// A user's jobs, newest first, with live state for tracked jobs
    pub async fn list_jobs(&self, user_id: &str) -> ScrapeResult<Vec<Job>> {
        let jobs = self.inner.store.list_for_user(user_id).await?;
        Ok(jobs
            .into_iter()
            .map(|job| self.snapshot(job.job_id).unwrap_or(job))
            .collect())
    }

    /// Request cancellation; a no-op for finished jobs
    #[instrument(skip(self))]
    pub async fn cancel_job(&self, job_id: Uuid) -> ScrapeResult<()> {
        let job = self.get_job(job_id).await?;
        if job.is_terminal() {
            return Ok(());
        }

        let token = self.handle_token(job_id);
        match token {
            Some(token) => {
                info!(status = %job.status, "Cancellation requested");
                token.cancel();
            }
            None => {
                // Not run by this process (left behind by another worker)
                let mut job = job;
                if job.cancel() {
                    self.inner.store.update(&job).await?;
                    info!("Untracked job cancelled in store");
                }
            }
        }
        Ok(())
    }

    /// Run a failed or cancelled job again from the start
    #[instrument(skip(self))]
    pub async fn retry_job(&self, job_id: Uuid) -> ScrapeResult<()> {
        let mut job = self.get_job(job_id).await?;
        if !job.reset_for_retry() {
            return Err(ScrapeError::InvalidState {
                id: job_id,
                status: job.status.to_string(),
            });
        }

        // Claim the job before the first await so concurrent retries start one run
        let (handle, tx) = JobHandle::new(&job);
        let cancel = handle.cancel.clone();
        {
            let mut handles = self.inner.lock_handles();
            if let Some(active) = handles.get(&job_id) {
                let status = active.snapshot.borrow().status;
                if !status.is_terminal() {
                    return Err(ScrapeError::InvalidState {
                        id: job_id,
                        status: status.to_string(),
                    });
                }
            }
            handles.insert(job_id, handle);
        }

        if let Err(e) = self.inner.store.update(&job).await {
            self.inner.release(job_id, job.attempt);
            return Err(e.into());
        }
        info!(attempt = job.attempt, "Job retried");
        self.start(job, tx, cancel);
        Ok(())
    }

    /// Wait until a job reaches a terminal status
    pub async fn wait_for_terminal(&self, job_id: Uuid) -> ScrapeResult<Job> {
        let receiver = self
            .inner
            .lock_handles()
            .get(&job_id)
            .map(|h| h.snapshot.clone());

        if let Some(mut receiver) = receiver {
            match receiver.wait_for(|job| job.is_terminal()).await {
                Ok(job) => return Ok(job.clone()),
                Err(_) => warn!(job_id = %job_id, "Job task ended without a terminal snapshot"),
            }
        }
        self.get_job(job_id).await
    }

    fn snapshot(&self, job_id: Uuid) -> Option<Job> {
        self.inner
            .lock_handles()
            .get(&job_id)
            .map(|h| h.snapshot.borrow().clone())
    }

    fn handle_token(&self, job_id: Uuid) -> Option<CancellationToken> {
        self.inner.lock_handles().get(&job_id).map(|h| h.cancel.clone())
    }

    fn spawn(&self, job: Job) {
        let (handle, tx) = JobHandle::new(&job);
        let cancel = handle.cancel.clone();
        self.inner.lock_handles().insert(job.job_id, handle);
        self.start(job, tx, cancel);
    }

    fn start(&self, job: Job, snapshot: watch::Sender<Job>, cancel: CancellationToken) {
        let inner = self.inner.clone();
        tokio::spawn(run::JobRun::new(inner, job, snapshot, cancel).execute());
    }
}
