//! Crawler for listing pages of a website (government portals and the like)

use async_trait::async_trait;
use scraper::{Html, Selector};
use scrapeforge_common::config::WebsiteSourceConfig;
use std::collections::HashSet;
use tracing::{debug, instrument, warn};
use url::Url;

use super::{matches_keyword, SourceClient};
use crate::errors::SourceError;
use crate::http::{self, SessionPool};
use crate::models::{Candidate, SourceName};

const DOCUMENT_EXTENSIONS: &[&str] = &[".pdf", ".doc", ".docx"];

/// An anchor found on a page, resolved against the page URL
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub url: Url,
    pub text: String,
}

impl Link {
    pub fn is_document(&self) -> bool {
        let path = self.url.path().to_ascii_lowercase();
        DOCUMENT_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
    }
}

/// Collect http(s) anchors from `html`, resolved against `base`
pub fn extract_links(html: &str, base: &Url) -> Vec<Link> {
    let document = Html::parse_document(html);
    let Ok(anchors) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    document
        .select(&anchors)
        .filter_map(|element| {
            let href = element.value().attr("href")?.trim();
            if href.is_empty()
                || href.starts_with('#')
                || href.starts_with("javascript:")
                || href.starts_with("mailto:")
                || href.starts_with("tel:")
            {
                return None;
            }
            let mut url = base.join(href).ok()?;
            if !matches!(url.scheme(), "http" | "https") {
                return None;
            }
            url.set_fragment(None);
            let text = element
                .text()
                .flat_map(str::split_whitespace)
                .collect::<Vec<_>>()
                .join(" ");
            Some(Link { url, text })
        })
        .collect()
}

/// Scans configured seed pages for links mentioning the keyword
pub struct WebsiteCrawler {
    name: SourceName,
    seed_urls: Vec<String>,
    same_host_only: bool,
    sessions: SessionPool,
}

impl WebsiteCrawler {
    pub fn new(config: WebsiteSourceConfig, sessions: SessionPool) -> Self {
        Self {
            name: SourceName::new(config.name),
            seed_urls: config.seed_urls,
            same_host_only: config.same_host_only,
            sessions,
        }
    }

    fn select(&self, seed: &Url, links: Vec<Link>, keyword: &str) -> Vec<Link> {
        links
            .into_iter()
            .filter(|link| {
                !self.same_host_only || link.url.host_str() == seed.host_str()
            })
            .filter(|link| {
                matches_keyword(&link.text, keyword) || matches_keyword(link.url.as_str(), keyword)
            })
            .collect()
    }
}

#[async_trait]
impl SourceClient for WebsiteCrawler {
    fn name(&self) -> &SourceName {
        &self.name
    }

    #[instrument(skip(self), fields(source = %self.name))]
    async fn search(&self, keyword: &str, limit: usize) -> Result<Vec<Candidate>, SourceError> {
        let session = http::source_session(&self.sessions, self.name.as_str()).await?;

        let mut matched: Vec<(Url, Link)> = Vec::new();
        let mut failures = 0usize;
        let mut last_error = None;

        for seed in &self.seed_urls {
            let seed_url = match Url::parse(seed) {
                Ok(url) => url,
                Err(e) => {
                    warn!(seed = %seed, error = %e, "Invalid seed URL, skipping");
                    failures += 1;
                    continue;
                }
            };

            let page = match http::send(self.name.as_str(), session.get(seed_url.clone())).await {
                Ok(response) => response.text().await.map_err(|e| {
                    SourceError::unavailable(self.name.as_str(), e)
                }),
                Err(e) => Err(e),
            };

            match page {
                Ok(html) => {
                    let links = extract_links(&html, &seed_url);
                    debug!(seed = %seed_url, links = links.len(), "Seed page scanned");
                    for link in self.select(&seed_url, links, keyword) {
                        matched.push((seed_url.clone(), link));
                    }
                }
                Err(e @ SourceError::RateLimited { .. }) => return Err(e),
                Err(e) => {
                    warn!(seed = %seed_url, error = %e, "Seed page unavailable");
                    failures += 1;
                    last_error = Some(e);
                }
            }
        }

        if failures == self.seed_urls.len() {
            return Err(last_error.unwrap_or_else(|| {
                SourceError::unavailable(self.name.as_str(), "no usable seed pages")
            }));
        }

        // Document links first, page order kept within each group
        matched.sort_by_key(|(_, link)| !link.is_document());

        let mut seen = HashSet::new();
        let candidates = matched
            .into_iter()
            .filter(|(_, link)| seen.insert(link.url.to_string()))
            .take(limit)
            .map(|(seed, link)| {
                let title = if link.text.is_empty() {
                    link.url.to_string()
                } else {
                    link.text.clone()
                };
                Candidate::new(link.url.as_str(), title, self.name.clone(), keyword)
                    .with_metadata("page", seed.as_str())
                    .with_metadata("document_link", link.is_document())
            })
            .collect();

        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"
        <html><body>
          <a href="/docs/laporan-anggaran-2023.pdf">Laporan <b>Anggaran</b> 2023</a>
          <a href="https://other.example.com/anggaran.pdf">Mirror anggaran</a>
          <a href="/berita/anggaran-daerah">Berita anggaran daerah</a>
          <a href='#top'>Top</a>
          <a href="mailto:info@example.go.id">Contact</a>
          <a href="/about">About</a>
        </body></html>
    "##;

    fn crawler(same_host_only: bool) -> WebsiteCrawler {
        WebsiteCrawler::new(
            WebsiteSourceConfig {
                name: "portal".to_string(),
                seed_urls: vec![],
                same_host_only,
            },
            SessionPool::new(reqwest::Client::new(), 1),
        )
    }

    #[test]
    fn test_extract_links_resolves_and_strips_tags() {
        let base = Url::parse("https://example.go.id/publikasi/").unwrap();
        let links = extract_links(PAGE, &base);

        assert_eq!(links.len(), 4);
        assert_eq!(
            links[0].url.as_str(),
            "https://example.go.id/docs/laporan-anggaran-2023.pdf"
        );
        assert_eq!(links[0].text, "Laporan Anggaran 2023");
        assert!(links[0].is_document());
        assert!(!links[2].is_document());
    }

    #[test]
    fn test_extract_links_decodes_attributes() {
        let html = r#"<a href="/unduh?id=7&amp;type=pdf">Unduh anggaran</a>
            <a href=/docs/anggaran.pdf>APBD &amp; perubahan</a>"#;
        let base = Url::parse("https://portal.example.go.id/").unwrap();
        let links = extract_links(html, &base);

        let urls: Vec<_> = links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://portal.example.go.id/unduh?id=7&type=pdf",
                "https://portal.example.go.id/docs/anggaran.pdf",
            ]
        );
        assert_eq!(links[1].text, "APBD & perubahan");
        assert!(links[1].is_document());
    }

    #[test]
    fn test_select_filters_host_and_keyword() {
        let base = Url::parse("https://example.go.id/publikasi/").unwrap();
        let links = extract_links(PAGE, &base);

        let selected = crawler(true).select(&base, links.clone(), "ANGGARAN");
        assert_eq!(selected.len(), 2);
        assert!(selected
            .iter()
            .all(|l| l.url.host_str() == Some("example.go.id")));

        let selected = crawler(false).select(&base, links, "anggaran");
        assert_eq!(selected.len(), 3);
    }

    #[tokio::test]
    async fn test_no_seeds_is_unavailable() {
        let err = crawler(true).search("anggaran", 5).await.unwrap_err();
        assert!(matches!(err, SourceError::Unavailable { .. }));
    }
}
