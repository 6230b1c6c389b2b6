//! Wiring of the orchestrator from configuration

use anyhow::Context;
use scrapeforge_common::cache::Cache;
use scrapeforge_common::config::AppConfig;
use scrapeforge_common::db::{DbPool, Repository};
use std::sync::Arc;
use tracing::{info, warn};

use crate::analyzer::create_analyzer;
use crate::http::SessionPool;
use crate::orchestrator::{JobOrchestrator, OrchestratorSettings};
use crate::postgres::{PgArtifactSink, PgJobStore};
use crate::processor::{Classifier, DocumentProcessor, HttpFetcher};
use crate::sink::{ArtifactSink, FsBlobStore, MemoryArtifactSink};
use crate::sources::{MemoryQuota, QuotaCounter, RedisQuota, SourceRegistry};
use crate::store::{JobStore, MemoryJobStore};

/// Shared request budget counter: Redis when configured, else per process
pub async fn quota_counter(config: &AppConfig) -> Arc<dyn QuotaCounter> {
    if config.redis.url.trim().is_empty() {
        return Arc::new(MemoryQuota::new());
    }
    let cache = match Cache::new(&config.redis).await {
        Ok(cache) => cache.ping().await.map(|_| cache),
        Err(e) => Err(e),
    };
    match cache {
        Ok(cache) => {
            info!("Using Redis for source request budgets");
            Arc::new(RedisQuota::new(cache))
        }
        Err(e) => {
            warn!(error = %e, "Redis unavailable, request budgets are per process");
            Arc::new(MemoryQuota::new())
        }
    }
}

/// Job store and artifact sink for the configured backend
pub async fn persistence(
    config: &AppConfig,
) -> anyhow::Result<(Arc<dyn JobStore>, Arc<dyn ArtifactSink>)> {
    match config.storage.backend.as_str() {
        "postgres" => {
            info!("Connecting to database...");
            let pool = DbPool::new(&config.database)
                .await
                .context("connecting to database")?;
            pool.ensure_schema().await.context("creating schema")?;
            let repository = Repository::new(pool);
            let jobs = PgJobStore::new(repository.clone());
            let recovered = jobs.recover_unfinished().await?;
            if recovered > 0 {
                warn!(recovered, "Closed jobs left unfinished by a previous worker");
            }
            let blobs = Arc::new(FsBlobStore::new(&config.storage.blob_dir));
            Ok((
                Arc::new(jobs),
                Arc::new(PgArtifactSink::new(repository, blobs)),
            ))
        }
        "memory" => Ok((
            Arc::new(MemoryJobStore::new()),
            Arc::new(MemoryArtifactSink::new()),
        )),
        other => anyhow::bail!("unknown storage backend: {}", other),
    }
}

/// Build a fully wired orchestrator
pub async fn build_orchestrator(config: &AppConfig) -> anyhow::Result<JobOrchestrator> {
    let sessions = SessionPool::from_config(&config.scraper).context("building HTTP client")?;

    let quota = if config.rate_limit.enabled && config.rate_limit.quota_per_window.is_some() {
        Some(quota_counter(config).await)
    } else {
        None
    };
    let sources = SourceRegistry::from_config(config, sessions.clone(), quota);
    if sources.is_empty() {
        warn!("No sources configured");
    }

    let fetcher = Arc::new(HttpFetcher::new(sessions, config.scraper.max_retries));
    let processor = Arc::new(DocumentProcessor::new(
        fetcher,
        Classifier::from_config(&config.classifier),
        config.scraper.max_document_bytes,
    ));

    let (store, sink) = persistence(config).await?;
    info!(
        backend = %config.storage.backend,
        analyzer = %config.analyzer.provider,
        "Orchestrator ready"
    );

    Ok(JobOrchestrator::builder(sources, processor, sink, store)
        .analyzer(create_analyzer(&config.analyzer))
        .settings(OrchestratorSettings::from(&config.scraper))
        .build())
}
