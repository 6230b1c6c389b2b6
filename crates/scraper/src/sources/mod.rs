//! Search sources
//!
//! Every backend is a `SourceClient`: given a keyword and a limit it returns
//! candidates or a `SourceError`. Sources never touch job state. The
//! orchestrator looks them up by name in a `SourceRegistry` and does not
//! care which concrete backend answers.

mod api;
mod arxiv;
mod crossref;
mod rate_limited;
mod website;

pub use api::ApiSource;
pub use arxiv::ArxivSource;
pub use crossref::CrossRefSource;
pub use rate_limited::{MemoryQuota, QuotaCounter, RateLimitedSource, RedisQuota};
pub use website::{extract_links, Link, WebsiteCrawler};

use async_trait::async_trait;
use scrapeforge_common::config::AppConfig;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::errors::SourceError;
use crate::http::SessionPool;
use crate::models::{Candidate, SourceName};

#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Registered name of this source
    fn name(&self) -> &SourceName;

    /// Search for up to `limit` candidates matching `keyword`
    async fn search(&self, keyword: &str, limit: usize) -> Result<Vec<Candidate>, SourceError>;
}

/// Name to client lookup
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: BTreeMap<SourceName, Arc<dyn SourceClient>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source under its own name, replacing any previous one
    pub fn register(&mut self, source: Arc<dyn SourceClient>) {
        self.sources.insert(source.name().clone(), source);
    }

    pub fn with(mut self, source: Arc<dyn SourceClient>) -> Self {
        self.register(source);
        self
    }

    pub fn get(&self, name: &SourceName) -> Option<Arc<dyn SourceClient>> {
        self.sources.get(name).cloned()
    }

    pub fn contains(&self, name: &SourceName) -> bool {
        self.sources.contains_key(name)
    }

    pub fn names(&self) -> Vec<SourceName> {
        self.sources.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Build every source named in `[sources]`, wrapped in pacing when enabled
    pub fn from_config(
        config: &AppConfig,
        sessions: SessionPool,
        quota: Option<Arc<dyn QuotaCounter>>,
    ) -> Self {
        let mut raw: Vec<Arc<dyn SourceClient>> = Vec::new();

        for site in &config.sources.website {
            raw.push(Arc::new(WebsiteCrawler::new(site.clone(), sessions.clone())));
        }
        for api in &config.sources.api {
            raw.push(Arc::new(ApiSource::new(api.clone(), sessions.clone())));
        }
        if let Some(arxiv) = &config.sources.arxiv {
            raw.push(Arc::new(ArxivSource::new(arxiv.clone(), sessions.clone())));
        }
        if let Some(crossref) = &config.sources.crossref {
            raw.push(Arc::new(CrossRefSource::new(
                crossref.clone(),
                sessions.clone(),
            )));
        }

        let mut registry = Self::new();
        for source in raw {
            if config.rate_limit.enabled {
                let limited = RateLimitedSource::from_config(source, &config.rate_limit);
                let limited = match &quota {
                    Some(counter) => limited.with_quota(
                        counter.clone(),
                        config.rate_limit.quota_per_window,
                        config.rate_limit.quota_window_secs,
                    ),
                    None => limited,
                };
                registry.register(Arc::new(limited));
            } else {
                registry.register(source);
            }
        }

        info!(sources = ?registry.names(), "Sources registered");
        registry
    }
}

/// Lower-case containment check used by sources that filter locally
pub(crate) fn matches_keyword(haystack: &str, keyword: &str) -> bool {
    let needle = keyword.trim().to_lowercase();
    !needle.is_empty() && haystack.to_lowercase().contains(&needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockSource;
    use scrapeforge_common::config::{ApiSourceConfig, ArxivSourceConfig};

    #[test]
    fn test_registry_lookup() {
        let registry = SourceRegistry::new()
            .with(Arc::new(MockSource::new("b")))
            .with(Arc::new(MockSource::new("a")));

        assert_eq!(registry.len(), 2);
        assert!(registry.contains(&SourceName::from("a")));
        assert!(registry.get(&SourceName::from("missing")).is_none());
        assert_eq!(
            registry.names(),
            vec![SourceName::from("a"), SourceName::from("b")]
        );
    }

    #[test]
    fn test_from_config_registers_configured_sources() {
        let mut config = AppConfig::default();
        config.sources.api.push(ApiSourceConfig {
            name: "bps-api".to_string(),
            base_url: "https://api.example.org/search".to_string(),
            ..Default::default()
        });
        config.sources.arxiv = Some(ArxivSourceConfig::default());

        let sessions = SessionPool::new(reqwest::Client::new(), 2);
        let registry = SourceRegistry::from_config(&config, sessions, None);

        assert!(registry.contains(&SourceName::from("bps-api")));
        assert!(registry.contains(&SourceName::from("arxiv")));
        assert!(!registry.contains(&SourceName::from("crossref")));
    }

    #[test]
    fn test_matches_keyword() {
        assert!(matches_keyword("Laporan Keuangan 2023", "keuangan"));
        assert!(!matches_keyword("Laporan", "  "));
    }
}
