//! Document processor
//!
//! Turns a candidate into a `ProcessedDocument`: download, detect the
//! content kind, extract text, hash it and classify it. Failures are
//! confined to the candidate; `process` logs them and yields `None`.

mod classify;
mod extract;
mod fetch;
mod pdf;

pub use classify::Classifier;
pub use extract::{detect_kind, extract_text, html_text, html_title};
pub use fetch::{FetchedDocument, Fetcher, HttpFetcher};

use scrapeforge_common::metrics;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::errors::DocumentError;
use crate::models::{Candidate, ContentKind, ProcessedDocument};

/// Metadata fields used as body text when documents are not downloaded
const METADATA_TEXT_FIELDS: &[&str] = &["abstract", "summary", "snippet", "description"];

/// Collapse whitespace runs and trim; drops byte-order marks
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(|w| w.trim_matches('\u{FEFF}'))
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Hex SHA-256 of the normalized text
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_text(text).as_bytes());
    hex::encode(hasher.finalize())
}

pub struct DocumentProcessor {
    fetcher: Arc<dyn Fetcher>,
    classifier: Classifier,
    max_document_bytes: u64,
}

impl DocumentProcessor {
    pub fn new(fetcher: Arc<dyn Fetcher>, classifier: Classifier, max_document_bytes: u64) -> Self {
        Self {
            fetcher,
            classifier,
            max_document_bytes,
        }
    }

    /// Process a candidate, absorbing any failure
    #[instrument(skip(self, candidate), fields(url = %candidate.source_url, source = %candidate.origin_source))]
    pub async fn process(&self, candidate: &Candidate) -> Option<ProcessedDocument> {
        match self.try_process(candidate).await {
            Ok(doc) => {
                metrics::record_document("processed");
                debug!(
                    kind = ?doc.content_kind,
                    document_type = doc.document_type.as_str(),
                    bytes = doc.byte_size,
                    "Document processed"
                );
                Some(doc)
            }
            Err(e) => {
                metrics::record_document(e.outcome());
                warn!(error = %e, "Document skipped");
                None
            }
        }
    }

    pub async fn try_process(&self, candidate: &Candidate) -> Result<ProcessedDocument, DocumentError> {
        let fetched = self
            .fetcher
            .fetch(&candidate.source_url, self.max_document_bytes)
            .await?;

        let size = fetched.bytes.len() as u64;
        if size > self.max_document_bytes {
            return Err(DocumentError::TooLarge {
                url: candidate.source_url.clone(),
                size,
                limit: self.max_document_bytes,
            });
        }

        let content_type = fetched.content_type.as_deref();
        let kind = detect_kind(content_type, &fetched.final_url, &fetched.bytes)
            .or_else(|| detect_kind(None, &candidate.source_url, &fetched.bytes))
            .ok_or_else(|| DocumentError::UnsupportedContentType {
                url: candidate.source_url.clone(),
                content_type: content_type.unwrap_or("unknown").to_string(),
            })?;

        let text = extract_text(kind, &fetched.bytes).map_err(|message| {
            DocumentError::ExtractionFailed {
                url: candidate.source_url.clone(),
                message,
            }
        })?;

        let title = match candidate.title.trim() {
            "" if kind == ContentKind::Html => html_title(&String::from_utf8_lossy(&fetched.bytes))
                .unwrap_or_else(|| candidate.source_url.clone()),
            "" => candidate.source_url.clone(),
            title => title.to_string(),
        };

        Ok(self.build(candidate, title, &text, kind, size))
    }

    /// Document built from search metadata alone, without a download
    pub fn metadata_document(&self, candidate: &Candidate) -> ProcessedDocument {
        let title = match candidate.title.trim() {
            "" => candidate.source_url.clone(),
            title => title.to_string(),
        };

        let mut parts = vec![title.clone()];
        parts.extend(
            METADATA_TEXT_FIELDS
                .iter()
                .filter_map(|field| candidate.metadata_str(field))
                .map(String::from),
        );
        let text = parts.join("\n\n");
        let size = text.len() as u64;

        self.build(candidate, title, &text, ContentKind::Metadata, size)
    }

    fn build(
        &self,
        candidate: &Candidate,
        title: String,
        text: &str,
        kind: ContentKind,
        byte_size: u64,
    ) -> ProcessedDocument {
        let normalized = normalize_text(text);
        ProcessedDocument {
            source_url: candidate.source_url.clone(),
            language: self.classifier.language(&normalized),
            document_type: self.classifier.document_type(&title, &normalized),
            content_hash: content_hash(&normalized),
            title,
            text_content: text.trim().to_string(),
            content_kind: kind,
            analysis: None,
            byte_size,
            origin_source: candidate.origin_source.clone(),
            origin_keyword: candidate.origin_keyword.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentType, Language, SourceName};
    use crate::testing::MockFetcher;

    fn candidate(url: &str, title: &str) -> Candidate {
        Candidate::new(url, title, SourceName::from("api"), "anggaran")
    }

    fn processor(fetcher: MockFetcher, max_bytes: u64) -> DocumentProcessor {
        DocumentProcessor::new(Arc::new(fetcher), Classifier::default(), max_bytes)
    }

    #[test]
    fn test_content_hash_ignores_whitespace_layout() {
        let a = content_hash("Laporan  anggaran\n\n2023 ");
        let b = content_hash("\u{FEFF}Laporan anggaran 2023");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, content_hash("Laporan anggaran 2024"));
    }

    #[tokio::test]
    async fn test_process_plain_text() {
        let fetcher = MockFetcher::new().with_text(
            "https://example.go.id/laporan.txt",
            "Laporan pelaksanaan anggaran pemerintah daerah tahun 2023",
        );
        let doc = processor(fetcher, 1024)
            .process(&candidate("https://example.go.id/laporan.txt", "Laporan Anggaran"))
            .await
            .unwrap();

        assert_eq!(doc.content_kind, ContentKind::Text);
        assert_eq!(doc.language, Language::Indonesian);
        assert_eq!(doc.document_type, DocumentType::Report);
        assert_eq!(doc.content_hash, content_hash(&doc.text_content));
        assert_eq!(doc.origin_keyword, "anggaran");
    }

    #[tokio::test]
    async fn test_too_large_is_rejected() {
        let fetcher = MockFetcher::new().with_text("https://example.org/big.txt", &"x".repeat(64));
        let err = processor(fetcher, 16)
            .try_process(&candidate("https://example.org/big.txt", "Big"))
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentError::TooLarge { limit: 16, .. }));
    }

    #[tokio::test]
    async fn test_unknown_kind_is_unsupported() {
        let fetcher = MockFetcher::new().with_body(
            "https://example.org/blob",
            Some("application/octet-stream"),
            vec![0u8, 1, 2, 3],
        );
        let err = processor(fetcher, 1024)
            .try_process(&candidate("https://example.org/blob", "Blob"))
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentError::UnsupportedContentType { .. }));
    }

    #[tokio::test]
    async fn test_failures_yield_none() {
        let fetcher = MockFetcher::new().with_body(
            "https://example.org/broken.pdf",
            Some("application/pdf"),
            b"%PDF-1.4 garbage".to_vec(),
        );
        let processor = processor(fetcher, 1024);
        assert!(processor
            .process(&candidate("https://example.org/broken.pdf", "Broken"))
            .await
            .is_none());
        // Unknown URL: the mock answers with a download error
        assert!(processor
            .process(&candidate("https://example.org/missing", "Missing"))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_html_title_used_when_candidate_has_none() {
        let fetcher = MockFetcher::new().with_body(
            "https://example.org/page",
            Some("text/html"),
            b"<html><title>Kebijakan Fiskal</title><body>Kebijakan fiskal daerah</body></html>".to_vec(),
        );
        let doc = processor(fetcher, 4096)
            .try_process(&candidate("https://example.org/page", ""))
            .await
            .unwrap();
        assert_eq!(doc.title, "Kebijakan Fiskal");
        assert_eq!(doc.document_type, DocumentType::Policy);
    }

    #[test]
    fn test_metadata_document() {
        let processor = processor(MockFetcher::new(), 1024);
        let candidate = candidate("https://doi.org/10.1/x", "Fiscal Policy Report")
            .with_metadata("abstract", "We study the budget.")
            .with_metadata("doi", "10.1/x");

        let doc = processor.metadata_document(&candidate);
        assert_eq!(doc.content_kind, ContentKind::Metadata);
        assert_eq!(doc.text_content, "Fiscal Policy Report\n\nWe study the budget.");
        assert_eq!(doc.artifact_type(), "search_result");
        assert_eq!(doc.byte_size, doc.text_content.len() as u64);
    }
}
