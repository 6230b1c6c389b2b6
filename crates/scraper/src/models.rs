//! Core data types of the scraping pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;
use validator::Validate;

use crate::errors::StoreError;
use scrapeforge_common::db::models::ScrapeJob;

pub use scrapeforge_common::db::models::JobStatus;

/// Name a source is registered under ("arxiv", "crossref", "bps-api", ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceName(String);

impl SourceName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SourceName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for SourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An unprocessed search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub source_url: String,
    pub title: String,
    #[serde(default)]
    pub raw_metadata: serde_json::Map<String, serde_json::Value>,
    pub origin_source: SourceName,
    pub origin_keyword: String,
}

impl Candidate {
    pub fn new(
        source_url: impl Into<String>,
        title: impl Into<String>,
        origin_source: SourceName,
        origin_keyword: impl Into<String>,
    ) -> Self {
        Self {
            source_url: source_url.into(),
            title: title.into(),
            raw_metadata: serde_json::Map::new(),
            origin_source,
            origin_keyword: origin_keyword.into(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.raw_metadata.insert(key.to_string(), value.into());
        self
    }

    /// String metadata field, if present and non-empty
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.raw_metadata
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "unknown")]
    Unknown,
    #[serde(rename = "id")]
    Indonesian,
    #[serde(rename = "en")]
    English,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::Unknown => "unknown",
            Language::Indonesian => "id",
            Language::English => "en",
        }
    }

    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_lowercase().as_str() {
            "id" | "ind" | "indonesian" => Language::Indonesian,
            "en" | "eng" | "english" => Language::English,
            _ => Language::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Unknown,
    Regulation,
    Report,
    Decision,
    Letter,
    Agreement,
    Policy,
    Document,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Unknown => "unknown",
            DocumentType::Regulation => "regulation",
            DocumentType::Report => "report",
            DocumentType::Decision => "decision",
            DocumentType::Letter => "letter",
            DocumentType::Agreement => "agreement",
            DocumentType::Policy => "policy",
            DocumentType::Document => "document",
        }
    }

    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "regulation" => DocumentType::Regulation,
            "report" => DocumentType::Report,
            "decision" => DocumentType::Decision,
            "letter" => DocumentType::Letter,
            "agreement" => DocumentType::Agreement,
            "policy" => DocumentType::Policy,
            "document" => DocumentType::Document,
            _ => DocumentType::Unknown,
        }
    }
}

/// How the text of a document was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Pdf,
    Docx,
    Html,
    Text,
    /// Built from search metadata without a download
    Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub keywords: Vec<String>,
    pub summary: String,
    /// 0.0 ..= 1.0
    pub quality_score: f32,
}

/// Extracted, classified and hashed content of one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedDocument {
    pub source_url: String,
    pub title: String,
    pub text_content: String,
    pub content_hash: String,
    pub language: Language,
    pub document_type: DocumentType,
    pub content_kind: ContentKind,
    pub analysis: Option<AnalysisResult>,
    pub byte_size: u64,
    pub origin_source: SourceName,
    pub origin_keyword: String,
}

impl ProcessedDocument {
    /// Artifact type recorded for this document
    pub fn artifact_type(&self) -> &'static str {
        match self.content_kind {
            ContentKind::Metadata => "search_result",
            _ => self.document_type.as_str(),
        }
    }
}

/// A persisted document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub artifact_id: Uuid,
    pub job_id: Uuid,
    pub user_id: String,
    pub source_url: String,
    pub title: String,
    pub content_hash: String,
    pub artifact_type: String,
    pub language: Language,
    pub origin_source: SourceName,
    pub is_public: bool,
    pub byte_size: u64,
    pub blob_key: String,
    pub analysis: Option<AnalysisResult>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct JobOptions {
    #[validate(range(min = 1, max = 500))]
    pub max_documents_per_keyword: usize,
    pub process_documents: bool,
    pub analyze_content: bool,
    #[serde(default)]
    pub public_artifacts: bool,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            max_documents_per_keyword: 10,
            process_documents: true,
            analyze_content: false,
            public_artifacts: false,
        }
    }
}

/// Input of `submit_job`
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct JobRequest {
    #[validate(length(min = 1, max = 128))]
    pub user_id: String,
    #[validate(length(min = 1, max = 100))]
    pub keywords: Vec<String>,
    #[validate(length(min = 1))]
    pub sources: BTreeSet<SourceName>,
    #[validate(nested)]
    pub options: JobOptions,
}

/// Per-run counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    pub candidates_found: u64,
    pub duplicates_skipped: u64,
    pub documents_processed: u64,
    pub documents_failed: u64,
    pub analysis_failures: u64,
    pub source_failures: u64,
    pub artifacts_stored: u64,
}

/// Identity a sink needs to attribute an artifact
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: Uuid,
    pub user_id: String,
    pub is_public: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: Uuid,
    pub user_id: String,
    pub keywords: Vec<String>,
    pub sources: BTreeSet<SourceName>,
    pub options: JobOptions,
    pub status: JobStatus,
    pub progress: u8,
    pub stats: JobStats,
    pub attempt: u32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Progress after `done` of `total` keywords, rounded to the nearest percent
pub fn keyword_progress(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (done.min(total) as f64 / total as f64 * 100.0).round();
    pct as u8
}

impl Job {
    pub fn new(request: JobRequest) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4(),
            user_id: request.user_id,
            keywords: request.keywords,
            sources: request.sources,
            options: request.options,
            status: JobStatus::Pending,
            progress: 0,
            stats: JobStats::default(),
            attempt: 1,
            error: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn context(&self) -> JobContext {
        JobContext {
            job_id: self.job_id,
            user_id: self.user_id.clone(),
            is_public: self.options.public_artifacts,
        }
    }

    fn transition(&mut self, next: JobStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        let now = Utc::now();
        self.status = next;
        self.updated_at = now;
        match next {
            JobStatus::Running => self.started_at = Some(now),
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => {
                self.completed_at = Some(now)
            }
            JobStatus::Pending => {}
        }
        true
    }

    /// `pending → running`
    pub fn start(&mut self) -> bool {
        self.transition(JobStatus::Running)
    }

    /// Raise progress while running; never lowers it
    pub fn set_progress(&mut self, progress: u8) {
        if self.status == JobStatus::Running {
            self.progress = self.progress.max(progress.min(100));
            self.updated_at = Utc::now();
        }
    }

    /// `running → completed`, progress forced to 100
    pub fn complete(&mut self) -> bool {
        if self.status != JobStatus::Running {
            return false;
        }
        self.progress = 100;
        self.transition(JobStatus::Completed)
    }

    /// `running → failed`
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        let failed = self.transition(JobStatus::Failed);
        if failed {
            self.error = Some(error.into());
        }
        failed
    }

    /// `pending/running → cancelled`
    pub fn cancel(&mut self) -> bool {
        self.transition(JobStatus::Cancelled)
    }

    /// Turn a failed or cancelled job into a fresh pending run
    pub fn reset_for_retry(&mut self) -> bool {
        if !matches!(self.status, JobStatus::Failed | JobStatus::Cancelled) {
            return false;
        }
        self.status = JobStatus::Pending;
        self.progress = 0;
        self.stats = JobStats::default();
        self.error = None;
        self.started_at = None;
        self.completed_at = None;
        self.attempt += 1;
        self.updated_at = Utc::now();
        true
    }

    /// Convert to the database record
    pub fn to_record(&self) -> Result<ScrapeJob, StoreError> {
        Ok(ScrapeJob {
            id: self.job_id,
            user_id: self.user_id.clone(),
            keywords: serde_json::to_value(&self.keywords)?,
            sources: serde_json::to_value(&self.sources)?,
            options: serde_json::to_value(&self.options)?,
            status: String::from(self.status),
            progress: i16::from(self.progress),
            stats: serde_json::to_value(&self.stats)?,
            error_message: self.error.clone(),
            attempt: self.attempt as i32,
            created_at: self.created_at.into(),
            started_at: self.started_at.map(Into::into),
            completed_at: self.completed_at.map(Into::into),
            updated_at: self.updated_at.into(),
        })
    }

    /// Rebuild from the database record
    pub fn from_record(record: ScrapeJob) -> Result<Self, StoreError> {
        let status = record.job_status();
        Ok(Self {
            job_id: record.id,
            user_id: record.user_id,
            keywords: serde_json::from_value(record.keywords)?,
            sources: serde_json::from_value(record.sources)?,
            options: serde_json::from_value(record.options)?,
            status,
            progress: record.progress.clamp(0, 100) as u8,
            stats: serde_json::from_value(record.stats).unwrap_or_default(),
            attempt: record.attempt.max(1) as u32,
            error: record.error_message,
            created_at: record.created_at.with_timezone(&Utc),
            started_at: record.started_at.map(|t| t.with_timezone(&Utc)),
            completed_at: record.completed_at.map(|t| t.with_timezone(&Utc)),
            updated_at: record.updated_at.with_timezone(&Utc),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> JobRequest {
        JobRequest {
            user_id: "user-1".to_string(),
            keywords: vec!["budget".to_string(), "anggaran".to_string()],
            sources: [SourceName::from("api")].into_iter().collect(),
            options: JobOptions::default(),
        }
    }

    #[test]
    fn test_keyword_progress_rounding() {
        assert_eq!(keyword_progress(0, 3), 0);
        assert_eq!(keyword_progress(1, 3), 33);
        assert_eq!(keyword_progress(2, 3), 67);
        assert_eq!(keyword_progress(3, 3), 100);
        assert_eq!(keyword_progress(0, 0), 100);
    }

    #[test]
    fn test_lifecycle() {
        let mut job = Job::new(request());
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.start());
        assert!(job.started_at.is_some());

        job.set_progress(50);
        job.set_progress(20);
        assert_eq!(job.progress, 50);

        assert!(job.complete());
        assert_eq!(job.progress, 100);
        assert!(job.completed_at.is_some());

        // Terminal: nothing moves it
        assert!(!job.cancel());
        assert!(!job.fail("late"));
        assert!(!job.start());
        assert_eq!(job.status, JobStatus::Completed);
        assert!(!job.reset_for_retry());
    }

    #[test]
    fn test_progress_ignored_unless_running() {
        let mut job = Job::new(request());
        job.set_progress(40);
        assert_eq!(job.progress, 0);
    }

    #[test]
    fn test_retry_resets_failed_job() {
        let mut job = Job::new(request());
        job.start();
        job.set_progress(50);
        job.stats.documents_failed = 2;
        assert!(job.fail("database down"));
        assert_eq!(job.error.as_deref(), Some("database down"));

        assert!(job.reset_for_retry());
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);
        assert_eq!(job.stats, JobStats::default());
        assert!(job.error.is_none());
        assert!(job.started_at.is_none());
        assert_eq!(job.attempt, 2);
    }

    #[test]
    fn test_record_round_trip_keeps_keyword_order() {
        let mut job = Job::new(request());
        job.start();
        job.stats.artifacts_stored = 4;
        let restored = Job::from_record(job.to_record().unwrap()).unwrap();
        assert_eq!(restored.keywords, vec!["budget", "anggaran"]);
        assert_eq!(restored.status, JobStatus::Running);
        assert_eq!(restored.stats.artifacts_stored, 4);
    }

    #[test]
    fn test_request_validation() {
        let mut req = request();
        assert!(req.validate().is_ok());

        req.options.max_documents_per_keyword = 0;
        assert!(req.validate().is_err());

        let mut req = request();
        req.keywords.clear();
        assert!(req.validate().is_err());

        let mut req = request();
        req.sources.clear();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_language_codes() {
        assert_eq!(Language::from_code("ID"), Language::Indonesian);
        assert_eq!(Language::from_code("en"), Language::English);
        assert_eq!(Language::from_code("fr"), Language::Unknown);
        assert_eq!(
            serde_json::to_string(&Language::Indonesian).unwrap(),
            "\"id\""
        );
    }
}
