//! Job persistence

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::errors::StoreError;
use crate::models::Job;

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: &Job) -> Result<(), StoreError>;
    async fn update(&self, job: &Job) -> Result<(), StoreError>;
    async fn get(&self, job_id: Uuid) -> Result<Option<Job>, StoreError>;
    /// A user's jobs, newest first
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Job>, StoreError>;
}

#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<Uuid, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: &Job) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        if jobs.contains_key(&job.job_id) {
            return Err(StoreError::Persistence(format!(
                "job {} already exists",
                job.job_id
            )));
        }
        jobs.insert(job.job_id, job.clone());
        Ok(())
    }

    async fn update(&self, job: &Job) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        match jobs.get_mut(&job.job_id) {
            Some(existing) => {
                *existing = job.clone();
                Ok(())
            }
            None => Err(StoreError::Persistence(format!(
                "job {} does not exist",
                job.job_id
            ))),
        }
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>, StoreError> {
        Ok(self
            .jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&job_id)
            .cloned())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Job>, StoreError> {
        let mut jobs: Vec<Job> = self
            .jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|j| j.user_id == user_id)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JobOptions, JobRequest, JobStatus, SourceName};

    fn job(user: &str) -> Job {
        Job::new(JobRequest {
            user_id: user.to_string(),
            keywords: vec!["k".to_string()],
            sources: [SourceName::from("api")].into_iter().collect(),
            options: JobOptions::default(),
        })
    }

    #[tokio::test]
    async fn test_insert_update_get() {
        let store = MemoryJobStore::new();
        let mut j = job("u1");
        tokio_test::assert_ok!(store.insert(&j).await);
        tokio_test::assert_err!(store.insert(&j).await);

        j.start();
        store.update(&j).await.unwrap();
        let loaded = store.get(j.job_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Running);

        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
        assert!(store.update(&job("u1")).await.is_err());
    }

    #[tokio::test]
    async fn test_list_for_user() {
        let store = MemoryJobStore::new();
        store.insert(&job("u1")).await.unwrap();
        store.insert(&job("u1")).await.unwrap();
        store.insert(&job("u2")).await.unwrap();

        assert_eq!(store.list_for_user("u1").await.unwrap().len(), 2);
        assert_eq!(store.list_for_user("nobody").await.unwrap().len(), 0);
        assert_eq!(store.len(), 3);
    }
}
