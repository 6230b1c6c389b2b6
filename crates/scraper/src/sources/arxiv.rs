//! arXiv Atom API source

use async_trait::async_trait;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use scrapeforge_common::config::ArxivSourceConfig;
use tracing::{debug, instrument};
use url::Url;

use super::SourceClient;
use crate::errors::SourceError;
use crate::http::{self, SessionPool};
use crate::models::{Candidate, SourceName};

pub struct ArxivSource {
    name: SourceName,
    base_url: String,
    sessions: SessionPool,
}

/// One `<entry>` of the feed
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ArxivEntry {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub published: String,
    pub authors: Vec<String>,
    pub pdf_url: Option<String>,
    pub abstract_url: Option<String>,
}

#[derive(Clone, Copy, PartialEq)]
enum Field {
    None,
    Id,
    Title,
    Summary,
    Published,
    AuthorName,
}

fn apply_link(entry: &mut ArxivEntry, tag: &BytesStart<'_>) {
    let mut href = None;
    let mut title = None;
    let mut rel = None;
    let mut content_type = None;
    for attr in tag.attributes().flatten() {
        let value = attr
            .unescape_value()
            .map(|v| v.into_owned())
            .unwrap_or_default();
        match attr.key.as_ref() {
            b"href" => href = Some(value),
            b"title" => title = Some(value),
            b"rel" => rel = Some(value),
            b"type" => content_type = Some(value),
            _ => {}
        }
    }
    let Some(href) = href else { return };
    if title.as_deref() == Some("pdf") || content_type.as_deref() == Some("application/pdf") {
        entry.pdf_url = Some(href);
    } else if rel.as_deref() == Some("alternate") {
        entry.abstract_url = Some(href);
    }
}

/// Parse an arXiv Atom feed
pub fn parse_feed(xml: &str) -> Result<Vec<ArxivEntry>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<ArxivEntry> = None;
    let mut field = Field::None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"entry" => current = Some(ArxivEntry::default()),
                b"id" => field = Field::Id,
                b"title" => field = Field::Title,
                b"summary" => field = Field::Summary,
                b"published" => field = Field::Published,
                b"name" => field = Field::AuthorName,
                b"link" => {
                    if let Some(entry) = current.as_mut() {
                        apply_link(entry, &e);
                    }
                }
                _ => {}
            },
            Event::Empty(e) => {
                if e.local_name().as_ref() == b"link" {
                    if let Some(entry) = current.as_mut() {
                        apply_link(entry, &e);
                    }
                }
            }
            Event::Text(t) => {
                if let Some(entry) = current.as_mut() {
                    let text = t.unescape()?;
                    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
                    match field {
                        Field::Id => entry.id.push_str(&text),
                        Field::Title => entry.title.push_str(&text),
                        Field::Summary => entry.summary.push_str(&text),
                        Field::Published => entry.published.push_str(&text),
                        Field::AuthorName => entry.authors.push(text),
                        Field::None => {}
                    }
                }
            }
            Event::End(e) => {
                if e.local_name().as_ref() == b"entry" {
                    if let Some(entry) = current.take() {
                        entries.push(entry);
                    }
                }
                field = Field::None;
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(entries)
}

impl ArxivSource {
    pub fn new(config: ArxivSourceConfig, sessions: SessionPool) -> Self {
        Self {
            name: SourceName::new("arxiv"),
            base_url: config.base_url,
            sessions,
        }
    }

    fn to_candidate(&self, entry: ArxivEntry, keyword: &str) -> Option<Candidate> {
        let url = entry
            .pdf_url
            .or(entry.abstract_url)
            .or_else(|| Some(entry.id.clone()).filter(|id| !id.is_empty()))?;
        let title = if entry.title.is_empty() {
            url.clone()
        } else {
            entry.title
        };
        Some(
            Candidate::new(url, title, self.name.clone(), keyword)
                .with_metadata("arxiv_id", entry.id)
                .with_metadata("summary", entry.summary)
                .with_metadata("published", entry.published)
                .with_metadata("authors", entry.authors),
        )
    }
}

#[async_trait]
impl SourceClient for ArxivSource {
    fn name(&self) -> &SourceName {
        &self.name
    }

    #[instrument(skip(self), fields(source = %self.name))]
    async fn search(&self, keyword: &str, limit: usize) -> Result<Vec<Candidate>, SourceError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| SourceError::unavailable(self.name.as_str(), e))?;
        url.query_pairs_mut()
            .append_pair("search_query", &format!("all:{}", keyword))
            .append_pair("start", "0")
            .append_pair("max_results", &limit.to_string());

        let session = http::source_session(&self.sessions, self.name.as_str()).await?;
        let body = http::send(self.name.as_str(), session.get(url))
            .await?
            .text()
            .await
            .map_err(|e| SourceError::unavailable(self.name.as_str(), e))?;

        let entries = parse_feed(&body)
            .map_err(|e| SourceError::unavailable(self.name.as_str(), format!("bad feed: {}", e)))?;
        debug!(entries = entries.len(), "arXiv feed parsed");

        Ok(entries
            .into_iter()
            .filter_map(|entry| self.to_candidate(entry, keyword))
            .take(limit)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:arxiv="http://arxiv.org/schemas/atom">
  <title type="html">ArXiv Query: all:inflation</title>
  <entry>
    <id>http://arxiv.org/abs/2301.00001v1</id>
    <published>2023-01-01T00:00:00Z</published>
    <title>Inflation Targeting
      &amp; Regional Prices</title>
    <summary>We study regional inflation.</summary>
    <author><name>A. Author</name></author>
    <author><name>B. Author</name></author>
    <link href="http://arxiv.org/abs/2301.00001v1" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/2301.00001v1" rel="related" type="application/pdf"/>
    <arxiv:primary_category term="econ.GN"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2301.00002v1</id>
    <title>No PDF</title>
    <link href="http://arxiv.org/abs/2301.00002v1" rel="alternate" type="text/html"/>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_feed() {
        let entries = parse_feed(FEED).unwrap();
        assert_eq!(entries.len(), 2);

        let first = &entries[0];
        assert_eq!(first.title, "Inflation Targeting & Regional Prices");
        assert_eq!(first.authors, vec!["A. Author", "B. Author"]);
        assert_eq!(
            first.pdf_url.as_deref(),
            Some("http://arxiv.org/pdf/2301.00001v1")
        );
        assert_eq!(first.published, "2023-01-01T00:00:00Z");
        assert!(entries[1].pdf_url.is_none());
    }

    #[test]
    fn test_candidate_prefers_pdf_link() {
        let source = ArxivSource::new(
            ArxivSourceConfig::default(),
            SessionPool::new(reqwest::Client::new(), 1),
        );
        let entries = parse_feed(FEED).unwrap();
        let candidates: Vec<_> = entries
            .into_iter()
            .filter_map(|e| source.to_candidate(e, "inflation"))
            .collect();

        assert_eq!(candidates[0].source_url, "http://arxiv.org/pdf/2301.00001v1");
        assert_eq!(candidates[1].source_url, "http://arxiv.org/abs/2301.00002v1");
        assert_eq!(
            candidates[0].metadata_str("summary"),
            Some("We study regional inflation.")
        );
    }
}
