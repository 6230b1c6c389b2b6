//! CrossRef works API source

use async_trait::async_trait;
use scrapeforge_common::config::CrossRefSourceConfig;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use super::SourceClient;
use crate::errors::SourceError;
use crate::http::{self, SessionPool};
use crate::models::{Candidate, SourceName};

#[derive(Debug, Deserialize)]
struct WorksResponse {
    message: WorksMessage,
}

#[derive(Debug, Deserialize)]
struct WorksMessage {
    #[serde(default)]
    items: Vec<Work>,
}

#[derive(Debug, Deserialize)]
struct Work {
    #[serde(rename = "DOI")]
    doi: Option<String>,
    #[serde(rename = "URL")]
    url: Option<String>,
    #[serde(default)]
    title: Vec<String>,
    publisher: Option<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    #[serde(rename = "container-title", default)]
    container_title: Vec<String>,
    #[serde(default)]
    link: Vec<WorkLink>,
}

#[derive(Debug, Deserialize)]
struct WorkLink {
    #[serde(rename = "URL")]
    url: String,
    #[serde(rename = "content-type")]
    content_type: Option<String>,
}

pub struct CrossRefSource {
    name: SourceName,
    config: CrossRefSourceConfig,
    sessions: SessionPool,
}

impl CrossRefSource {
    pub fn new(config: CrossRefSourceConfig, sessions: SessionPool) -> Self {
        Self {
            name: SourceName::new("crossref"),
            config,
            sessions,
        }
    }

    fn search_url(&self, keyword: &str, limit: usize) -> Result<Url, SourceError> {
        let mut url = Url::parse(&self.config.base_url)
            .map_err(|e| SourceError::unavailable(self.name.as_str(), e))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("query", keyword)
                .append_pair("rows", &limit.to_string());
            if let Some(mailto) = &self.config.mailto {
                query.append_pair("mailto", mailto);
            }
        }
        Ok(url)
    }

    fn to_candidates(&self, body: &str, keyword: &str, limit: usize) -> Result<Vec<Candidate>, SourceError> {
        let response: WorksResponse = serde_json::from_str(body)
            .map_err(|e| SourceError::unavailable(self.name.as_str(), format!("bad response: {}", e)))?;

        Ok(response
            .message
            .items
            .into_iter()
            .filter_map(|work| {
                let pdf = work
                    .link
                    .iter()
                    .find(|l| l.content_type.as_deref() == Some("application/pdf"))
                    .map(|l| l.url.clone());
                let url = pdf.or_else(|| work.url.clone())?;
                let title = work
                    .title
                    .first()
                    .cloned()
                    .unwrap_or_else(|| url.clone());

                let mut candidate = Candidate::new(url, title, self.name.clone(), keyword);
                if let Some(doi) = work.doi {
                    candidate = candidate.with_metadata("doi", doi);
                }
                if let Some(publisher) = work.publisher {
                    candidate = candidate.with_metadata("publisher", publisher);
                }
                if let Some(abstract_text) = work.abstract_text {
                    candidate = candidate.with_metadata("abstract", abstract_text);
                }
                if let Some(container) = work.container_title.into_iter().next() {
                    candidate = candidate.with_metadata("container_title", container);
                }
                Some(candidate)
            })
            .take(limit)
            .collect())
    }
}

#[async_trait]
impl SourceClient for CrossRefSource {
    fn name(&self) -> &SourceName {
        &self.name
    }

    #[instrument(skip(self), fields(source = %self.name))]
    async fn search(&self, keyword: &str, limit: usize) -> Result<Vec<Candidate>, SourceError> {
        let url = self.search_url(keyword, limit)?;
        let session = http::source_session(&self.sessions, self.name.as_str()).await?;
        let body = http::send(self.name.as_str(), session.get(url))
            .await?
            .text()
            .await
            .map_err(|e| SourceError::unavailable(self.name.as_str(), e))?;

        let candidates = self.to_candidates(&body, keyword, limit)?;
        debug!(count = candidates.len(), "CrossRef search complete");
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(mailto: Option<&str>) -> CrossRefSource {
        CrossRefSource::new(
            CrossRefSourceConfig {
                mailto: mailto.map(String::from),
                ..Default::default()
            },
            SessionPool::new(reqwest::Client::new(), 1),
        )
    }

    #[test]
    fn test_search_url() {
        let url = source(Some("ops@example.org"))
            .search_url("fiscal policy", 5)
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.crossref.org/works?query=fiscal+policy&rows=5&mailto=ops%40example.org"
        );
    }

    #[test]
    fn test_to_candidates_prefers_pdf_link() {
        let body = r#"{
            "status": "ok",
            "message": { "items": [
                {
                    "DOI": "10.1000/xyz",
                    "URL": "https://doi.org/10.1000/xyz",
                    "title": ["Fiscal Policy in Indonesia"],
                    "publisher": "Example Press",
                    "link": [
                        {"URL": "https://example.org/xyz.xml", "content-type": "text/xml"},
                        {"URL": "https://example.org/xyz.pdf", "content-type": "application/pdf"}
                    ]
                },
                { "DOI": "10.1000/abc", "URL": "https://doi.org/10.1000/abc", "title": [] },
                { "title": ["No URL at all"] }
            ]}
        }"#;

        let candidates = source(None).to_candidates(body, "fiscal", 10).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].source_url, "https://example.org/xyz.pdf");
        assert_eq!(candidates[0].metadata_str("doi"), Some("10.1000/xyz"));
        assert_eq!(candidates[1].title, "https://doi.org/10.1000/abc");
    }

    #[test]
    fn test_malformed_body_is_unavailable() {
        let err = source(None).to_candidates("<html>", "k", 1).unwrap_err();
        assert!(matches!(err, SourceError::Unavailable { .. }));
    }
}
