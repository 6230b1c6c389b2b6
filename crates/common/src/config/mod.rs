//! Configuration management for ScrapeForge workers
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{APP_ENV}.toml, config/local.toml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Redis configuration
    #[serde(default)]
    pub redis: RedisConfig,

    /// Scraping pipeline configuration
    #[serde(default)]
    pub scraper: ScraperConfig,

    /// Configured search sources
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Document classifier vocabularies
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Content analyzer configuration
    #[serde(default)]
    pub analyzer: AnalyzerConfig,

    /// Artifact and job storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Per-source rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL (for writes)
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedisConfig {
    /// Redis URL. Empty disables shared request budgets.
    #[serde(default)]
    pub url: String,

    /// Key prefix for namespacing
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    /// Default cap on documents processed per keyword
    #[serde(default = "default_max_documents")]
    pub max_documents_per_keyword: usize,

    /// Parallel document downloads within one keyword batch
    #[serde(default = "default_document_concurrency")]
    pub document_concurrency: usize,

    /// Sources queried concurrently per keyword (0 = all configured)
    #[serde(default)]
    pub source_fanout: usize,

    /// Maximum downloaded payload size in bytes
    #[serde(default = "default_max_document_bytes")]
    pub max_document_bytes: u64,

    /// Pause between keyword batches in milliseconds
    #[serde(default = "default_keyword_delay")]
    pub keyword_delay_ms: u64,

    /// Pause between source batches in milliseconds
    #[serde(default = "default_source_delay")]
    pub source_delay_ms: u64,

    /// Outbound HTTP request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Retries for transient download failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Jobs allowed to run at the same time
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// HTTP sessions that may be checked out at once
    #[serde(default = "default_http_sessions")]
    pub http_sessions: usize,
}

/// Search sources, keyed by the name jobs refer to them with
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub website: Vec<WebsiteSourceConfig>,

    #[serde(default)]
    pub api: Vec<ApiSourceConfig>,

    pub arxiv: Option<ArxivSourceConfig>,

    pub crossref: Option<CrossRefSourceConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebsiteSourceConfig {
    /// Source name used in job requests
    pub name: String,

    /// Listing pages scanned for keyword links
    pub seed_urls: Vec<String>,

    /// Only keep links on the seed host
    #[serde(default = "default_enabled")]
    pub same_host_only: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiSourceConfig {
    /// Source name used in job requests
    pub name: String,

    /// Search endpoint
    pub base_url: String,

    /// Bearer token, if the API needs one
    pub api_key: Option<String>,

    #[serde(default = "default_query_param")]
    pub query_param: String,

    #[serde(default = "default_limit_param")]
    pub limit_param: String,

    /// Field holding the result array ("" = response is the array)
    #[serde(default = "default_results_field")]
    pub results_field: String,

    #[serde(default = "default_url_field")]
    pub url_field: String,

    #[serde(default = "default_title_field")]
    pub title_field: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArxivSourceConfig {
    #[serde(default = "default_arxiv_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CrossRefSourceConfig {
    #[serde(default = "default_crossref_url")]
    pub base_url: String,

    /// Contact address for the polite pool
    pub mailto: Option<String>,
}

/// Vocabularies for language and document-type classification.
///
/// Rule order is significant: the first matching rule wins.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClassifierConfig {
    /// Language code and terms of the primary vocabulary
    #[serde(default = "default_primary_language")]
    pub primary_language: String,

    #[serde(default = "default_primary_terms")]
    pub primary_terms: Vec<String>,

    /// Language code and terms of the secondary vocabulary
    #[serde(default = "default_secondary_language")]
    pub secondary_language: String,

    #[serde(default = "default_secondary_terms")]
    pub secondary_terms: Vec<String>,

    /// Language reported when both vocabularies score the same
    #[serde(default = "default_primary_language")]
    pub fallback_language: String,

    /// Ordered (document type, keywords) rules
    #[serde(default = "default_type_rules")]
    pub type_rules: Vec<TypeRuleConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TypeRuleConfig {
    pub document_type: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalyzerConfig {
    /// Analyzer provider: none, keyword, openai
    #[serde(default = "default_analyzer_provider")]
    pub provider: String,

    /// API key for the LLM endpoint
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_analyzer_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_analyzer_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Text beyond this many characters is not sent
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Job/artifact backend: memory, postgres
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Root directory of the content-addressed blob store
    #[serde(default = "default_blob_dir")]
    pub blob_dir: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name attached to logs
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second (per source)
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Longest wait for a permit before reporting the source as rate limited
    #[serde(default = "default_max_wait")]
    pub max_wait_ms: u64,

    /// Requests allowed per source per window (unset = unlimited)
    pub quota_per_window: Option<u64>,

    /// Quota window length in seconds
    #[serde(default = "default_quota_window")]
    pub quota_window_secs: u64,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_database_url() -> String { "postgres://localhost/scrapeforge".to_string() }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_key_prefix() -> String { "scrapeforge".to_string() }
fn default_max_documents() -> usize { 10 }
fn default_document_concurrency() -> usize { 3 }
fn default_max_document_bytes() -> u64 { 25 * 1024 * 1024 }
fn default_keyword_delay() -> u64 { 1000 }
fn default_source_delay() -> u64 { 500 }
fn default_request_timeout() -> u64 { 30 }
fn default_max_retries() -> u32 { 3 }
fn default_user_agent() -> String { crate::DEFAULT_USER_AGENT.to_string() }
fn default_max_concurrent_jobs() -> usize { 4 }
fn default_http_sessions() -> usize { 16 }
fn default_query_param() -> String { "q".to_string() }
fn default_limit_param() -> String { "limit".to_string() }
fn default_results_field() -> String { "results".to_string() }
fn default_url_field() -> String { "url".to_string() }
fn default_title_field() -> String { "title".to_string() }
fn default_arxiv_url() -> String { "https://export.arxiv.org/api/query".to_string() }
fn default_crossref_url() -> String { "https://api.crossref.org/works".to_string() }
fn default_analyzer_provider() -> String { "none".to_string() }
fn default_analyzer_model() -> String { "gpt-4o-mini".to_string() }
fn default_analyzer_timeout() -> u64 { 60 }
fn default_max_input_chars() -> usize { 12_000 }
fn default_storage_backend() -> String { "memory".to_string() }
fn default_blob_dir() -> String { "data/blobs".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "scrapeforge".to_string() }
fn default_rate_limit() -> u32 { 2 }
fn default_burst() -> u32 { 5 }
fn default_max_wait() -> u64 { 10_000 }
fn default_quota_window() -> u64 { 86_400 }
fn default_enabled() -> bool { true }

fn default_primary_language() -> String { "id".to_string() }
fn default_secondary_language() -> String { "en".to_string() }

fn terms(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

fn default_primary_terms() -> Vec<String> {
    terms(&[
        "dan", "yang", "dengan", "untuk", "dalam", "pada", "dari", "ini", "itu", "atau",
        "tidak", "adalah", "akan", "oleh", "sebagai", "tentang", "tahun", "nomor",
        "pemerintah", "daerah", "kementerian", "peraturan", "keputusan", "anggaran",
        "pembangunan", "masyarakat", "pelaksanaan", "kegiatan", "menteri", "republik",
    ])
}

fn default_secondary_terms() -> Vec<String> {
    terms(&[
        "the", "and", "with", "for", "this", "that", "from", "are", "was", "were",
        "have", "has", "which", "will", "would", "their", "there", "about", "between",
        "government", "ministry", "regulation", "budget", "development", "report",
        "policy", "public", "results", "analysis", "study",
    ])
}

fn default_type_rules() -> Vec<TypeRuleConfig> {
    let rule = |document_type: &str, keywords: &[&str]| TypeRuleConfig {
        document_type: document_type.to_string(),
        keywords: terms(keywords),
    };
    vec![
        rule("regulation", &["peraturan", "undang-undang", "perpres", "permen", "regulation", "statute"]),
        rule("report", &["laporan", "report"]),
        rule("decision", &["keputusan", "decision", "decree"]),
        rule("letter", &["surat", "letter", "memorandum"]),
        rule("agreement", &["perjanjian", "kesepakatan", "nota kesepahaman", "agreement"]),
        rule("policy", &["kebijakan", "policy", "strategi"]),
    ]
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            read_url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            max_documents_per_keyword: default_max_documents(),
            document_concurrency: default_document_concurrency(),
            source_fanout: 0,
            max_document_bytes: default_max_document_bytes(),
            keyword_delay_ms: default_keyword_delay(),
            source_delay_ms: default_source_delay(),
            request_timeout_secs: default_request_timeout(),
            max_retries: default_max_retries(),
            user_agent: default_user_agent(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            http_sessions: default_http_sessions(),
        }
    }
}

impl Default for ApiSourceConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            base_url: String::new(),
            api_key: None,
            query_param: default_query_param(),
            limit_param: default_limit_param(),
            results_field: default_results_field(),
            url_field: default_url_field(),
            title_field: default_title_field(),
        }
    }
}

impl Default for ArxivSourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_arxiv_url(),
        }
    }
}

impl Default for CrossRefSourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_crossref_url(),
            mailto: None,
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            primary_language: default_primary_language(),
            primary_terms: default_primary_terms(),
            secondary_language: default_secondary_language(),
            secondary_terms: default_secondary_terms(),
            fallback_language: default_primary_language(),
            type_rules: default_type_rules(),
        }
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            provider: default_analyzer_provider(),
            api_key: None,
            api_base: None,
            model: default_analyzer_model(),
            timeout_secs: default_analyzer_timeout(),
            max_retries: default_max_retries(),
            max_input_chars: default_max_input_chars(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            blob_dir: default_blob_dir(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            max_wait_ms: default_max_wait(),
            quota_per_window: None,
            quota_window_secs: default_quota_window(),
            enabled: default_enabled(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__SCRAPER__DOCUMENT_CONCURRENCY=5
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.scraper.document_concurrency, 3);
        assert_eq!(config.storage.backend, "memory");
        assert!(config.redis.url.is_empty());
    }

    #[test]
    fn test_default_type_rule_order() {
        let config = ClassifierConfig::default();
        let order: Vec<&str> = config
            .type_rules
            .iter()
            .map(|r| r.document_type.as_str())
            .collect();
        assert_eq!(
            order,
            vec!["regulation", "report", "decision", "letter", "agreement", "policy"]
        );
        assert_eq!(config.fallback_language, "id");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: AppConfig = Config::builder()
            .add_source(config::File::from_str(
                "[scraper]\ndocument_concurrency = 5\n[[sources.website]]\nname = \"gov\"\nseed_urls = [\"https://example.go.id/docs\"]\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(config.scraper.document_concurrency, 5);
        assert_eq!(config.scraper.max_documents_per_keyword, 10);
        assert!(config.sources.website[0].same_host_only);
    }
}
