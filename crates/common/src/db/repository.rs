//! Repository pattern for database operations
//!
//! Data access for scrape jobs and the artifacts they produce.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

fn job_active_model(job: &ScrapeJob) -> ScrapeJobActiveModel {
    ScrapeJobActiveModel {
        id: Set(job.id),
        user_id: Set(job.user_id.clone()),
        keywords: Set(job.keywords.clone()),
        sources: Set(job.sources.clone()),
        options: Set(job.options.clone()),
        status: Set(job.status.clone()),
        progress: Set(job.progress),
        stats: Set(job.stats.clone()),
        error_message: Set(job.error_message.clone()),
        attempt: Set(job.attempt),
        created_at: Set(job.created_at),
        started_at: Set(job.started_at),
        completed_at: Set(job.completed_at),
        updated_at: Set(job.updated_at),
    }
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    // ========================================================================
    // Job Operations
    // ========================================================================

    /// Insert a new scrape job record
    pub async fn insert_job(&self, job: &ScrapeJob) -> Result<ScrapeJob> {
        job_active_model(job)
            .insert(self.write_conn())
            .await
            .map_err(Into::into)
    }

    /// Overwrite every column of an existing job record
    pub async fn save_job(&self, job: &ScrapeJob) -> Result<ScrapeJob> {
        let exists = ScrapeJobEntity::find_by_id(job.id)
            .one(self.write_conn())
            .await?
            .is_some();
        if !exists {
            return Err(AppError::JobNotFound {
                id: job.id.to_string(),
            });
        }

        job_active_model(job)
            .update(self.write_conn())
            .await
            .map_err(Into::into)
    }

    /// Find job by ID
    pub async fn find_job_by_id(&self, id: Uuid) -> Result<Option<ScrapeJob>> {
        ScrapeJobEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// List a user's jobs, newest first
    pub async fn list_jobs_for_user(&self, user_id: &str) -> Result<Vec<ScrapeJob>> {
        ScrapeJobEntity::find()
            .filter(ScrapeJobColumn::UserId.eq(user_id))
            .order_by_desc(ScrapeJobColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Jobs left in a non-terminal status (e.g. by a crashed worker)
    pub async fn find_unfinished_jobs(&self) -> Result<Vec<ScrapeJob>> {
        ScrapeJobEntity::find()
            .filter(
                ScrapeJobColumn::Status
                    .is_in([JobStatus::Pending.as_str(), JobStatus::Running.as_str()]),
            )
            .order_by_asc(ScrapeJobColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Artifact Operations
    // ========================================================================

    /// Insert an artifact record
    pub async fn insert_artifact(&self, artifact: Artifact) -> Result<Artifact> {
        let model = ArtifactActiveModel {
            id: Set(artifact.id),
            job_id: Set(artifact.job_id),
            user_id: Set(artifact.user_id),
            source_url: Set(artifact.source_url),
            title: Set(artifact.title),
            content_hash: Set(artifact.content_hash),
            artifact_type: Set(artifact.artifact_type),
            language: Set(artifact.language),
            origin_source: Set(artifact.origin_source),
            is_public: Set(artifact.is_public),
            byte_size: Set(artifact.byte_size),
            blob_key: Set(artifact.blob_key),
            analysis: Set(artifact.analysis),
            created_at: Set(artifact.created_at),
        };

        model.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// Find the artifact a job already stored for a content hash
    pub async fn find_artifact_by_hash(
        &self,
        job_id: Uuid,
        content_hash: &str,
    ) -> Result<Option<Artifact>> {
        ArtifactEntity::find()
            .filter(ArtifactColumn::JobId.eq(job_id))
            .filter(ArtifactColumn::ContentHash.eq(content_hash))
            .one(self.write_conn())
            .await
            .map_err(Into::into)
    }

}
