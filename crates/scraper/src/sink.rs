//! Artifact sinks and blob storage
//!
//! A sink persists each processed document once per (job, content hash).
//! Document bodies go to a `BlobStore` under a content-addressed key.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::errors::SinkError;
use crate::models::{Artifact, JobContext, ProcessedDocument};

#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Store a document for a job; storing the same content hash again
    /// returns the existing artifact id
    async fn store(&self, doc: &ProcessedDocument, job: &JobContext) -> Result<Uuid, SinkError>;
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), SinkError>;
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SinkError>;
    /// Returns whether the blob existed
    async fn delete(&self, key: &str) -> Result<bool, SinkError>;
}

/// `ab/abcdef…` layout keyed by content hash
pub fn blob_key(content_hash: &str) -> String {
    let prefix: String = content_hash.chars().take(2).collect();
    format!("{}/{}", prefix, content_hash)
}

/// Build the artifact record for a document
pub fn new_artifact(doc: &ProcessedDocument, job: &JobContext) -> Artifact {
    Artifact {
        artifact_id: Uuid::new_v4(),
        job_id: job.job_id,
        user_id: job.user_id.clone(),
        source_url: doc.source_url.clone(),
        title: doc.title.clone(),
        content_hash: doc.content_hash.clone(),
        artifact_type: doc.artifact_type().to_string(),
        language: doc.language,
        origin_source: doc.origin_source.clone(),
        is_public: job.is_public,
        byte_size: doc.byte_size,
        blob_key: blob_key(&doc.content_hash),
        analysis: doc.analysis.clone(),
        created_at: Utc::now(),
    }
}

// ============================================================================
// Blob stores
// ============================================================================

/// Blobs as files under a root directory
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, key: &str) -> Result<PathBuf, SinkError> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, std::path::Component::Normal(_)));
        if !safe {
            return Err(SinkError::Storage(format!("invalid blob key: {}", key)));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), SinkError> {
        let path = self.path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Write then rename so readers never see a partial blob
        let tmp = path.with_extension(format!("tmp-{}", Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(key, bytes = bytes.len(), "Blob written");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SinkError> {
        match tokio::fs::read(self.path(key)?).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, SinkError> {
        match tokio::fs::remove_file(self.path(key)?).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), SinkError> {
        self.blobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SinkError> {
        Ok(self
            .blobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned())
    }

    async fn delete(&self, key: &str) -> Result<bool, SinkError> {
        Ok(self
            .blobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key)
            .is_some())
    }
}

// ============================================================================
// In-memory sink
// ============================================================================

/// Sink keeping artifacts and bodies in process memory
#[derive(Default)]
pub struct MemoryArtifactSink {
    artifacts: RwLock<Vec<Artifact>>,
    by_hash: RwLock<HashMap<(Uuid, String), Uuid>>,
    blobs: MemoryBlobStore,
}

impl MemoryArtifactSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Artifacts of a job in storage order
    pub fn list_for_job(&self, job_id: Uuid) -> Vec<Artifact> {
        self.artifacts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|a| a.job_id == job_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.artifacts.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored body text of an artifact
    pub async fn text(&self, artifact: &Artifact) -> Option<String> {
        let bytes = self.blobs.get(&artifact.blob_key).await.ok()??;
        String::from_utf8(bytes).ok()
    }
}

#[async_trait]
impl ArtifactSink for MemoryArtifactSink {
    async fn store(&self, doc: &ProcessedDocument, job: &JobContext) -> Result<Uuid, SinkError> {
        let key = (job.job_id, doc.content_hash.clone());
        if let Some(id) = self
            .by_hash
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
        {
            return Ok(*id);
        }

        let artifact = new_artifact(doc, job);
        self.blobs
            .put(&artifact.blob_key, doc.text_content.as_bytes())
            .await?;

        let mut by_hash = self.by_hash.write().unwrap_or_else(|e| e.into_inner());
        // A concurrent store of the same hash may have won meanwhile
        if let Some(id) = by_hash.get(&key) {
            return Ok(*id);
        }
        let id = artifact.artifact_id;
        by_hash.insert(key, id);
        self.artifacts
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(artifact);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentKind, DocumentType, Language, SourceName};
    use crate::processor::content_hash;

    fn doc(text: &str) -> ProcessedDocument {
        ProcessedDocument {
            source_url: "https://example.org/a.pdf".to_string(),
            title: "A".to_string(),
            text_content: text.to_string(),
            content_hash: content_hash(text),
            language: Language::English,
            document_type: DocumentType::Report,
            content_kind: ContentKind::Pdf,
            analysis: None,
            byte_size: 42,
            origin_source: SourceName::from("api"),
            origin_keyword: "k".to_string(),
        }
    }

    fn job() -> JobContext {
        JobContext {
            job_id: Uuid::new_v4(),
            user_id: "user-1".to_string(),
            is_public: true,
        }
    }

    #[test]
    fn test_blob_key_layout() {
        assert_eq!(blob_key("abcdef0123"), "ab/abcdef0123");
    }

    #[tokio::test]
    async fn test_memory_sink_is_idempotent_per_job() {
        let sink = MemoryArtifactSink::new();
        let job = job();
        let d = doc("annual report text");

        let first = sink.store(&d, &job).await.unwrap();
        let second = sink.store(&d, &job).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(sink.len(), 1);

        let other_job = JobContext {
            job_id: Uuid::new_v4(),
            ..job.clone()
        };
        let third = sink.store(&d, &other_job).await.unwrap();
        assert_ne!(first, third);
        assert_eq!(sink.len(), 2);

        let stored = &sink.list_for_job(job.job_id)[0];
        assert_eq!(stored.artifact_type, "report");
        assert!(stored.is_public);
        assert_eq!(sink.text(stored).await.as_deref(), Some("annual report text"));
    }

    #[tokio::test]
    async fn test_fs_blob_store_round_trip() {
        let root = std::env::temp_dir().join(format!("scrapeforge-blobs-{}", Uuid::new_v4()));
        let store = FsBlobStore::new(&root);
        let key = blob_key(&content_hash("body"));

        store.put(&key, b"body").await.unwrap();
        assert_eq!(store.get(&key).await.unwrap().as_deref(), Some(&b"body"[..]));
        assert!(store.delete(&key).await.unwrap());
        assert!(!store.delete(&key).await.unwrap());
        assert!(store.get(&key).await.unwrap().is_none());

        tokio::fs::remove_dir_all(&root).await.ok();
    }

    #[tokio::test]
    async fn test_fs_blob_store_rejects_traversal() {
        let store = FsBlobStore::new(std::env::temp_dir());
        assert!(store.put("../escape", b"x").await.is_err());
        assert!(store.get("/etc/passwd").await.is_err());
    }
}
