//! Postgres-backed job store and artifact sink over the shared repository

use async_trait::async_trait;
use scrapeforge_common::db::models::Artifact as ArtifactRecord;
use scrapeforge_common::db::Repository;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::errors::{SinkError, StoreError};
use crate::models::{Artifact, Job, JobContext, JobStatus, ProcessedDocument};
use crate::sink::{new_artifact, ArtifactSink, BlobStore};
use crate::store::JobStore;

#[derive(Clone)]
pub struct PgJobStore {
    repository: Repository,
}

impl PgJobStore {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Close jobs a previous worker left pending or running.
    ///
    /// Running jobs become failed and pending ones cancelled, so both can
    /// be retried. Returns how many were closed.
    pub async fn recover_unfinished(&self) -> Result<usize, StoreError> {
        let records = self.repository.find_unfinished_jobs().await?;
        let mut recovered = 0;
        for record in records {
            let mut job = Job::from_record(record)?;
            let closed = match job.status {
                JobStatus::Running => job.fail("interrupted by worker restart"),
                _ => job.cancel(),
            };
            if closed {
                self.repository.save_job(&job.to_record()?).await?;
                debug!(job_id = %job.job_id, status = %job.status, "Unfinished job closed");
                recovered += 1;
            }
        }
        Ok(recovered)
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert(&self, job: &Job) -> Result<(), StoreError> {
        self.repository.insert_job(&job.to_record()?).await?;
        Ok(())
    }

    async fn update(&self, job: &Job) -> Result<(), StoreError> {
        self.repository.save_job(&job.to_record()?).await?;
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>, StoreError> {
        self.repository
            .find_job_by_id(job_id)
            .await?
            .map(Job::from_record)
            .transpose()
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Job>, StoreError> {
        self.repository
            .list_jobs_for_user(user_id)
            .await?
            .into_iter()
            .map(Job::from_record)
            .collect()
    }
}

/// Convert to the database row
pub fn artifact_record(artifact: &Artifact) -> Result<ArtifactRecord, SinkError> {
    Ok(ArtifactRecord {
        id: artifact.artifact_id,
        job_id: artifact.job_id,
        user_id: artifact.user_id.clone(),
        source_url: artifact.source_url.clone(),
        title: artifact.title.clone(),
        content_hash: artifact.content_hash.clone(),
        artifact_type: artifact.artifact_type.clone(),
        language: artifact.language.code().to_string(),
        origin_source: artifact.origin_source.to_string(),
        is_public: artifact.is_public,
        byte_size: artifact.byte_size as i64,
        blob_key: artifact.blob_key.clone(),
        analysis: artifact
            .analysis
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?,
        created_at: artifact.created_at.into(),
    })
}

/// Artifact rows in Postgres, bodies in a blob store
pub struct PgArtifactSink {
    repository: Repository,
    blobs: Arc<dyn BlobStore>,
}

impl PgArtifactSink {
    pub fn new(repository: Repository, blobs: Arc<dyn BlobStore>) -> Self {
        Self { repository, blobs }
    }
}

#[async_trait]
impl ArtifactSink for PgArtifactSink {
    #[instrument(skip(self, doc, job), fields(job_id = %job.job_id, hash = %doc.content_hash))]
    async fn store(&self, doc: &ProcessedDocument, job: &JobContext) -> Result<Uuid, SinkError> {
        if let Some(existing) = self
            .repository
            .find_artifact_by_hash(job.job_id, &doc.content_hash)
            .await?
        {
            debug!(artifact_id = %existing.id, "Artifact already stored");
            return Ok(existing.id);
        }

        let artifact = new_artifact(doc, job);
        // Blob first: a row never points at a missing body
        self.blobs
            .put(&artifact.blob_key, doc.text_content.as_bytes())
            .await?;

        let record = self
            .repository
            .insert_artifact(artifact_record(&artifact)?)
            .await?;
        Ok(record.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AnalysisResult, ContentKind, DocumentType, JobOptions, JobRequest, Language, SourceName,
    };
    use crate::sink::MemoryBlobStore;
    use scrapeforge_common::db::DbPool;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn doc() -> ProcessedDocument {
        ProcessedDocument {
            source_url: "https://example.org/a.pdf".to_string(),
            title: "Laporan".to_string(),
            text_content: "isi laporan".to_string(),
            content_hash: "ab12".to_string(),
            language: Language::Indonesian,
            document_type: DocumentType::Report,
            content_kind: ContentKind::Pdf,
            analysis: Some(AnalysisResult {
                keywords: vec!["laporan".to_string()],
                summary: "Ringkasan".to_string(),
                quality_score: 0.5,
            }),
            byte_size: 11,
            origin_source: SourceName::from("portal"),
            origin_keyword: "laporan".to_string(),
        }
    }

    fn context() -> JobContext {
        JobContext {
            job_id: Uuid::new_v4(),
            user_id: "user-1".to_string(),
            is_public: false,
        }
    }

    #[test]
    fn test_artifact_record_mapping() {
        let artifact = new_artifact(&doc(), &context());
        let record = artifact_record(&artifact).unwrap();
        assert_eq!(record.language, "id");
        assert_eq!(record.origin_source, "portal");
        assert_eq!(record.blob_key, "ab/ab12");
        assert_eq!(record.byte_size, 11);
        assert_eq!(record.analysis.unwrap()["summary"], "Ringkasan");
    }

    #[tokio::test]
    async fn test_existing_hash_returns_existing_id() {
        let ctx = context();
        let existing = artifact_record(&new_artifact(&doc(), &ctx)).unwrap();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![existing.clone()]])
            .into_connection();
        let blobs = Arc::new(MemoryBlobStore::new());
        let sink = PgArtifactSink::new(Repository::new(DbPool::from_connection(db)), blobs.clone());

        let id = sink.store(&doc(), &ctx).await.unwrap();
        assert_eq!(id, existing.id);
        assert!(blobs.is_empty());
    }

    #[tokio::test]
    async fn test_job_store_get_maps_record() {
        let job = Job::new(JobRequest {
            user_id: "user-1".to_string(),
            keywords: vec!["a".to_string(), "b".to_string()],
            sources: [SourceName::from("arxiv")].into_iter().collect(),
            options: JobOptions::default(),
        });
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![job.to_record().unwrap()]])
            .into_connection();
        let store = PgJobStore::new(Repository::new(DbPool::from_connection(db)));

        let loaded = store.get(job.job_id).await.unwrap().unwrap();
        assert_eq!(loaded.keywords, vec!["a", "b"]);
        assert_eq!(loaded.job_id, job.job_id);
    }

    #[tokio::test]
    async fn test_recover_with_nothing_unfinished() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<scrapeforge_common::db::models::ScrapeJob>::new()])
            .into_connection();
        let store = PgJobStore::new(Repository::new(DbPool::from_connection(db)));

        assert_eq!(store.recover_unfinished().await.unwrap(), 0);
    }
}
