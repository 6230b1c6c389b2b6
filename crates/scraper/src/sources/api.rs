//! Generic JSON search API source

use async_trait::async_trait;
use scrapeforge_common::config::ApiSourceConfig;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use super::SourceClient;
use crate::errors::SourceError;
use crate::http::{self, SessionPool};
use crate::models::{Candidate, SourceName};

/// `GET {base_url}?{query_param}=kw&{limit_param}=n` returning a JSON result list
pub struct ApiSource {
    name: SourceName,
    config: ApiSourceConfig,
    sessions: SessionPool,
}

impl ApiSource {
    pub fn new(config: ApiSourceConfig, sessions: SessionPool) -> Self {
        Self {
            name: SourceName::new(config.name.clone()),
            config,
            sessions,
        }
    }

    fn search_url(&self, keyword: &str, limit: usize) -> Result<Url, SourceError> {
        let mut url = Url::parse(&self.config.base_url)
            .map_err(|e| SourceError::unavailable(self.name.as_str(), e))?;
        url.query_pairs_mut()
            .append_pair(&self.config.query_param, keyword)
            .append_pair(&self.config.limit_param, &limit.to_string());
        Ok(url)
    }

    /// Map a response body to candidates; items without a URL are skipped
    pub fn parse_results(
        &self,
        body: &Value,
        keyword: &str,
        limit: usize,
    ) -> Result<Vec<Candidate>, SourceError> {
        let results = lookup(body, &self.config.results_field)
            .and_then(Value::as_array)
            .ok_or_else(|| {
                SourceError::unavailable(
                    self.name.as_str(),
                    format!("response has no array at '{}'", self.config.results_field),
                )
            })?;

        let candidates = results
            .iter()
            .filter_map(|item| {
                let object = item.as_object()?;
                let url = object
                    .get(&self.config.url_field)
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|u| !u.is_empty())?;
                let title = object
                    .get(&self.config.title_field)
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .unwrap_or(url);

                let mut candidate = Candidate::new(url, title, self.name.clone(), keyword);
                for (key, value) in object {
                    if key != &self.config.url_field && key != &self.config.title_field {
                        candidate.raw_metadata.insert(key.clone(), value.clone());
                    }
                }
                Some(candidate)
            })
            .take(limit)
            .collect();

        Ok(candidates)
    }
}

/// Follow a dotted path ("data.items"); empty path is the value itself
fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.')
        .try_fold(value, |current, segment| current.get(segment))
}

#[async_trait]
impl SourceClient for ApiSource {
    fn name(&self) -> &SourceName {
        &self.name
    }

    #[instrument(skip(self), fields(source = %self.name))]
    async fn search(&self, keyword: &str, limit: usize) -> Result<Vec<Candidate>, SourceError> {
        let url = self.search_url(keyword, limit)?;
        let session = http::source_session(&self.sessions, self.name.as_str()).await?;

        let mut request = session.get(url).header("Accept", "application/json");
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let body: Value = http::send(self.name.as_str(), request)
            .await?
            .json()
            .await
            .map_err(|e| SourceError::unavailable(self.name.as_str(), e))?;

        let candidates = self.parse_results(&body, keyword, limit)?;
        debug!(count = candidates.len(), "API search complete");
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn source(results_field: &str) -> ApiSource {
        ApiSource::new(
            ApiSourceConfig {
                name: "bps-api".to_string(),
                base_url: "https://api.example.go.id/v1/search?lang=id".to_string(),
                results_field: results_field.to_string(),
                ..Default::default()
            },
            SessionPool::new(reqwest::Client::new(), 1),
        )
    }

    #[test]
    fn test_search_url_keeps_existing_query() {
        let url = source("results").search_url("inflasi daerah", 20).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.go.id/v1/search?lang=id&q=inflasi+daerah&limit=20"
        );
    }

    #[test]
    fn test_parse_results_maps_fields() {
        let body = json!({
            "data": { "items": [
                { "url": "https://a.example/1.pdf", "title": "Inflasi 2023", "year": 2023 },
                { "title": "no url" },
                { "url": "https://a.example/2.pdf" },
                { "url": "https://a.example/3.pdf", "title": "Third" }
            ]}
        });

        let candidates = source("data.items").parse_results(&body, "inflasi", 2).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].title, "Inflasi 2023");
        assert_eq!(candidates[0].raw_metadata.get("year"), Some(&json!(2023)));
        assert!(!candidates[0].raw_metadata.contains_key("url"));
        assert_eq!(candidates[1].title, "https://a.example/2.pdf");
        assert_eq!(candidates[1].origin_keyword, "inflasi");
    }

    #[test]
    fn test_parse_results_bare_array() {
        let body = json!([{ "url": "https://a.example/1", "title": "One" }]);
        let candidates = source("").parse_results(&body, "k", 10).unwrap();
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn test_missing_results_is_unavailable() {
        let err = source("results")
            .parse_results(&json!({"error": "bad"}), "k", 10)
            .unwrap_err();
        assert!(matches!(err, SourceError::Unavailable { .. }));
    }
}
