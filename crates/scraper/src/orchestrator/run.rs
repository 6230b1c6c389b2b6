//! The per-job task

use futures::future::join_all;
use futures::stream::{self, StreamExt};
use scrapeforge_common::metrics::{self, SearchTimer};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::Inner;
use crate::analyzer::{analyze_timed, ContentAnalyzer};
use crate::dedup::{dedupe, Deduplicator};
use crate::models::{keyword_progress, Candidate, Job, JobStatus, ProcessedDocument};
use crate::processor::DocumentProcessor;

enum Outcome {
    Completed,
    Failed(String),
    Cancelled,
}

/// Result of processing one candidate
struct Processed {
    document: Option<ProcessedDocument>,
    analysis_failed: bool,
}

pub(super) struct JobRun {
    inner: Arc<Inner>,
    job: Job,
    snapshot: watch::Sender<Job>,
    cancel: CancellationToken,
    dedup: Deduplicator,
}

impl JobRun {
    pub(super) fn new(
        inner: Arc<Inner>,
        job: Job,
        snapshot: watch::Sender<Job>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner,
            job,
            snapshot,
            cancel,
            dedup: Deduplicator::new(),
        }
    }

    #[instrument(skip(self), fields(job_id = %self.job.job_id, attempt = self.job.attempt))]
    pub(super) async fn execute(mut self) {
        let started = Instant::now();

        // Wait for a worker slot unless cancelled while queued
        let workers = self.inner.workers.clone();
        let permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            permit = workers.acquire_owned() => Some(permit),
        };
        let _permit = match permit {
            Some(Ok(permit)) => permit,
            Some(Err(_)) => {
                self.finish(Outcome::Failed("worker pool closed".to_string()), started)
                    .await;
                return;
            }
            None => {
                self.finish(Outcome::Cancelled, started).await;
                return;
            }
        };

        self.job.start();
        metrics::record_job_started();
        if let Err(e) = self.inner.store.update(&self.job).await {
            self.finish(Outcome::Failed(format!("persistence failure: {}", e)), started)
                .await;
            return;
        }
        self.publish();
        info!(keywords = self.job.keywords.len(), "Job started");

        let outcome = self.run_keywords().await;
        self.finish(outcome, started).await;
    }

    async fn run_keywords(&mut self) -> Outcome {
        let keywords = self.job.keywords.clone();
        let total = keywords.len();
        let delay = self.inner.settings.keyword_delay;

        for (index, keyword) in keywords.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Outcome::Cancelled;
            }

            if let Err(message) = self.run_keyword(keyword).await {
                return Outcome::Failed(message);
            }

            self.job.set_progress(keyword_progress(index + 1, total));
            if let Err(e) = self.inner.store.update(&self.job).await {
                return Outcome::Failed(format!("persistence failure: {}", e));
            }
            self.publish();
            debug!(keyword = %keyword, progress = self.job.progress, "Keyword done");

            if index + 1 < total && !delay.is_zero() {
                tokio::select! {
                    _ = self.cancel.cancelled() => return Outcome::Cancelled,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        // A cancel that arrived during the last keyword still wins
        if self.cancel.is_cancelled() {
            return Outcome::Cancelled;
        }
        Outcome::Completed
    }

    /// Search, process and store one keyword; `Err` is a persistence failure
    #[instrument(skip(self), fields(job_id = %self.job.job_id))]
    async fn run_keyword(&mut self, keyword: &str) -> Result<(), String> {
        let limit = self.job.options.max_documents_per_keyword;
        let found = self.search_all(keyword, limit).await;
        let found_count = found.len();
        self.job.stats.candidates_found += found_count as u64;

        let unique = dedupe(found);
        let repeated = found_count - unique.len();
        let (candidates, seen_before) = self.dedup.take_unseen(unique, limit);
        self.job.stats.duplicates_skipped += (repeated + seen_before) as u64;
        info!(keyword, candidates = candidates.len(), "Candidates selected");

        let results = self.process_all(candidates).await;
        let context = self.job.context();

        for result in results {
            if result.analysis_failed {
                self.job.stats.analysis_failures += 1;
            }
            let Some(doc) = result.document else {
                self.job.stats.documents_failed += 1;
                continue;
            };
            self.job.stats.documents_processed += 1;

            if self.dedup.seen_hash(&doc.content_hash) {
                self.job.stats.duplicates_skipped += 1;
                debug!(url = %doc.source_url, "Duplicate content skipped");
                continue;
            }

            match self.inner.sink.store(&doc, &context).await {
                Ok(artifact_id) => {
                    self.job.stats.artifacts_stored += 1;
                    metrics::record_artifact(doc.origin_source.as_str(), doc.artifact_type());
                    debug!(%artifact_id, url = %doc.source_url, "Artifact stored");
                }
                Err(e) => {
                    error!(error = %e, url = %doc.source_url, "Artifact storage failed");
                    return Err(format!("persistence failure: {}", e));
                }
            }
        }
        Ok(())
    }

    /// Candidates from every source of the job, merged in source order
    async fn search_all(&mut self, keyword: &str, limit: usize) -> Vec<Candidate> {
        let sources: Vec<_> = self
            .job
            .sources
            .iter()
            .filter_map(|name| {
                let source = self.inner.sources.get(name);
                if source.is_none() {
                    warn!(source = %name, "Source no longer registered");
                }
                source
            })
            .collect();
        let missing = self.job.sources.len() - sources.len();
        self.job.stats.source_failures += missing as u64;

        let fanout = match self.inner.settings.source_fanout {
            0 => sources.len().max(1),
            n => n,
        };

        let mut merged = Vec::new();
        for (batch_index, batch) in sources.chunks(fanout).enumerate() {
            if batch_index > 0 && !self.inner.settings.source_delay.is_zero() {
                tokio::time::sleep(self.inner.settings.source_delay).await;
            }

            let searches = batch.iter().map(|source| async move {
                let timer = SearchTimer::start(source.name().as_str());
                let result = source.search(keyword, limit).await;
                match &result {
                    Ok(hits) => timer.finish("ok", hits.len()),
                    Err(e) => timer.finish(e.outcome(), 0),
                }
                result
            });

            for result in join_all(searches).await {
                match result {
                    Ok(hits) => merged.extend(hits),
                    Err(e) => {
                        self.job.stats.source_failures += 1;
                        warn!(error = %e, keyword, "Source search failed");
                    }
                }
            }
        }
        merged
    }

    async fn process_all(&self, candidates: Vec<Candidate>) -> Vec<Processed> {
        let process_documents = self.job.options.process_documents;
        let analyzer = if self.job.options.analyze_content {
            self.inner.analyzer.clone()
        } else {
            None
        };
        let processor = self.inner.processor.clone();

        stream::iter(candidates)
            .map(|candidate| {
                let processor = processor.clone();
                let analyzer = analyzer.clone();
                async move {
                    process_one(&processor, analyzer.as_deref(), &candidate, process_documents)
                        .await
                }
            })
            .buffer_unordered(self.inner.settings.document_concurrency.max(1))
            .collect()
            .await
    }

    async fn finish(&mut self, outcome: Outcome, started: Instant) {
        let mut job = self.job.clone();
        let failure = match &outcome {
            Outcome::Failed(message) => Some(message.clone()),
            _ => None,
        };
        match outcome {
            Outcome::Completed => job.complete(),
            Outcome::Failed(message) => job.fail(message),
            Outcome::Cancelled => job.cancel(),
        };

        let mut persisted = true;
        if let Err(e) = self.inner.store.update(&job).await {
            error!(error = %e, status = %job.status, "Persisting terminal state failed");
            persisted = false;
            if self.job.status == JobStatus::Running && job.status != JobStatus::Failed {
                job = self.job.clone();
                job.fail(format!("persistence failure: {}", e));
                match self.inner.store.update(&job).await {
                    Ok(()) => persisted = true,
                    Err(e) => warn!(error = %e, "Persisting failure state failed"),
                }
            }
        }

        self.job = job;
        // Readers fall back to the store once the handle is gone; keep it
        // while the store is behind
        if persisted {
            self.inner.release(self.job.job_id, self.job.attempt);
        }
        self.publish();

        metrics::record_job_finished(self.job.status.as_str(), started.elapsed().as_secs_f64());
        match failure {
            Some(error) => error!(
                error = %error,
                stats = ?self.job.stats,
                "Job failed"
            ),
            None => info!(
                status = %self.job.status,
                progress = self.job.progress,
                stats = ?self.job.stats,
                "Job finished"
            ),
        }
    }

    fn publish(&self) {
        self.snapshot.send_replace(self.job.clone());
    }
}

async fn process_one(
    processor: &DocumentProcessor,
    analyzer: Option<&dyn ContentAnalyzer>,
    candidate: &Candidate,
    process_documents: bool,
) -> Processed {
    let document = if process_documents {
        processor.process(candidate).await
    } else {
        Some(processor.metadata_document(candidate))
    };

    let Some(analyzer) = analyzer else {
        return Processed {
            document,
            analysis_failed: false,
        };
    };
    let Some(mut doc) = document else {
        return Processed {
            document: None,
            analysis_failed: false,
        };
    };

    match analyze_timed(analyzer, &doc.text_content).await {
        Ok(analysis) => {
            doc.analysis = Some(analysis);
            Processed {
                document: Some(doc),
                analysis_failed: false,
            }
        }
        Err(e) => {
            warn!(error = %e, url = %doc.source_url, "Analysis failed");
            Processed {
                document: Some(doc),
                analysis_failed: true,
            }
        }
    }
}
