//! Content analysis
//!
//! Best-effort enrichment of a processed document with keywords, a summary
//! and a quality score. Callers store the document without analysis when
//! the analyzer is unavailable.

use async_trait::async_trait;
use scrapeforge_common::config::AnalyzerConfig;
use scrapeforge_common::metrics;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::errors::AnalysisError;
use crate::models::AnalysisResult;

#[async_trait]
pub trait ContentAnalyzer: Send + Sync {
    async fn analyze(&self, text: &str) -> Result<AnalysisResult, AnalysisError>;

    /// Label used in logs and metrics
    fn name(&self) -> &str;
}

/// Run an analyzer and record its outcome
pub async fn analyze_timed(
    analyzer: &dyn ContentAnalyzer,
    text: &str,
) -> Result<AnalysisResult, AnalysisError> {
    let start = Instant::now();
    let result = analyzer.analyze(text).await;
    metrics::record_analysis(start.elapsed().as_secs_f64(), analyzer.name(), result.is_ok());
    result
}

// ============================================================================
// LLM analyzer (OpenAI-compatible chat completions)
// ============================================================================

const SYSTEM_PROMPT: &str = "You analyze documents. Reply with a JSON object only: \
{\"keywords\": [up to 8 short keywords], \"summary\": \"two or three sentences\", \
\"quality_score\": number between 0 and 1 rating how informative the document is}.";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[derive(Deserialize)]
struct AnalysisReply {
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    quality_score: f32,
}

/// Parse the model's JSON reply, tolerating a fenced code block
fn parse_reply(content: &str) -> Result<AnalysisResult, AnalysisError> {
    let trimmed = content.trim();
    let json = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    let reply: AnalysisReply = serde_json::from_str(json)
        .map_err(|e| AnalysisError::Unavailable(format!("unparsable reply: {}", e)))?;

    Ok(AnalysisResult {
        keywords: reply
            .keywords
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect(),
        summary: reply.summary.trim().to_string(),
        quality_score: reply.quality_score.clamp(0.0, 1.0),
    })
}

/// Cut text to at most `max_chars` characters on a char boundary
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub struct LlmAnalyzer {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    model: String,
    max_retries: u32,
    max_input_chars: usize,
}

impl LlmAnalyzer {
    pub fn new(
        api_key: String,
        api_base: Option<String>,
        model: String,
        timeout: Duration,
        max_retries: u32,
        max_input_chars: usize,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            api_key,
            api_base: api_base.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model,
            max_retries,
            max_input_chars,
        }
    }

    async fn complete(&self, text: &str) -> Result<String, AnalysisError> {
        let url = format!("{}/chat/completions", self.api_base.trim_end_matches('/'));
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
            temperature: 0.0,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = retry_delay(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "Retrying analysis request");
                tokio::time::sleep(delay).await;
            }

            match self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&request)
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => {
                    let body: ChatResponse = response.json().await.map_err(|e| {
                        AnalysisError::Unavailable(format!("bad completion body: {}", e))
                    })?;
                    return body
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|c| c.message.content)
                        .ok_or_else(|| AnalysisError::Unavailable("empty completion".to_string()));
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    warn!(status = %status, attempt, "Analysis API error");
                    last_error = Some(format!("API error {}: {}", status, body));

                    // Client errors (except rate limiting) will not improve on retry
                    if status.is_client_error() && status.as_u16() != 429 {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, attempt, "Analysis request failed");
                    last_error = Some(e.to_string());
                }
            }
        }

        Err(AnalysisError::Unavailable(
            last_error.unwrap_or_else(|| "unknown error".to_string()),
        ))
    }
}

const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Exponential delay before retry `attempt` (1-based), starting at 500ms
fn retry_delay(attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_millis(500u64.saturating_mul(factor)).min(MAX_RETRY_DELAY)
}

#[async_trait]
impl ContentAnalyzer for LlmAnalyzer {
    async fn analyze(&self, text: &str) -> Result<AnalysisResult, AnalysisError> {
        let input = truncate_chars(text, self.max_input_chars);
        let content = self.complete(input).await?;
        parse_reply(&content)
    }

    fn name(&self) -> &str {
        "llm"
    }
}

// ============================================================================
// Keyword analyzer (offline)
// ============================================================================

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "are", "was", "were", "have", "has",
    "dan", "yang", "dengan", "untuk", "dalam", "pada", "dari", "ini", "itu", "atau", "adalah",
    "akan", "oleh", "sebagai", "tidak", "juga", "telah", "tersebut",
];

/// Term-frequency keywords, leading sentences as summary, length-based quality
#[derive(Debug, Clone)]
pub struct KeywordAnalyzer {
    max_keywords: usize,
    summary_sentences: usize,
}

impl Default for KeywordAnalyzer {
    fn default() -> Self {
        Self {
            max_keywords: 8,
            summary_sentences: 2,
        }
    }
}

impl KeywordAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    fn keywords(&self, text: &str) -> Vec<String> {
        let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
        for (position, word) in text
            .split(|c: char| !c.is_alphanumeric())
            .map(str::to_lowercase)
            .filter(|w| w.chars().count() > 3 && !STOPWORDS.contains(&w.as_str()))
            .filter(|w| !w.chars().all(|c| c.is_ascii_digit()))
            .enumerate()
        {
            counts.entry(word).or_insert((0, position)).0 += 1;
        }

        let mut ranked: Vec<_> = counts.into_iter().collect();
        // Most frequent first, earliest occurrence breaks ties
        ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
        ranked
            .into_iter()
            .take(self.max_keywords)
            .map(|(word, _)| word)
            .collect()
    }

    fn summary(&self, text: &str) -> String {
        let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let mut summary = String::new();
        let mut sentences = 0;
        for piece in normalized.split_inclusive(['.', '!', '?']) {
            summary.push_str(piece);
            sentences += 1;
            if sentences >= self.summary_sentences {
                break;
            }
        }
        truncate_chars(summary.trim(), 500).to_string()
    }

    fn quality(text: &str) -> f32 {
        let words = text.split_whitespace().count() as f32;
        // Saturates around a few pages of text
        (words / 1_500.0).clamp(0.0, 1.0)
    }
}

#[async_trait]
impl ContentAnalyzer for KeywordAnalyzer {
    async fn analyze(&self, text: &str) -> Result<AnalysisResult, AnalysisError> {
        if text.trim().is_empty() {
            return Err(AnalysisError::Unavailable("empty text".to_string()));
        }
        Ok(AnalysisResult {
            keywords: self.keywords(text),
            summary: self.summary(text),
            quality_score: Self::quality(text),
        })
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

/// Build the analyzer named by `config.provider`; `None` when analysis is disabled
pub fn create_analyzer(config: &AnalyzerConfig) -> Option<Arc<dyn ContentAnalyzer>> {
    match config.provider.as_str() {
        "openai" | "llm" => match &config.api_key {
            Some(key) if !key.is_empty() => {
                info!(model = %config.model, "Using LLM analyzer");
                Some(Arc::new(LlmAnalyzer::new(
                    key.clone(),
                    config.api_base.clone(),
                    config.model.clone(),
                    Duration::from_secs(config.timeout_secs),
                    config.max_retries,
                    config.max_input_chars,
                )))
            }
            _ => {
                warn!("LLM analyzer configured without API key, falling back to keyword analyzer");
                Some(Arc::new(KeywordAnalyzer::new()))
            }
        },
        "keyword" => {
            info!("Using keyword analyzer");
            Some(Arc::new(KeywordAnalyzer::new()))
        }
        "none" | "" => None,
        other => {
            warn!(provider = other, "Unknown analyzer provider, using keyword analyzer");
            Some(Arc::new(KeywordAnalyzer::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_is_capped() {
        assert_eq!(retry_delay(1), Duration::from_millis(500));
        assert_eq!(retry_delay(3), Duration::from_secs(2));
        assert_eq!(retry_delay(64), MAX_RETRY_DELAY);
        assert_eq!(retry_delay(u32::MAX), MAX_RETRY_DELAY);
    }

    #[tokio::test]
    async fn test_keyword_analyzer() {
        let text = "Anggaran daerah naik. Anggaran pendidikan tetap. \
                    Belanja pegawai turun dan anggaran modal naik.";
        let result = KeywordAnalyzer::new().analyze(text).await.unwrap();

        assert_eq!(result.keywords[0], "anggaran");
        assert!(!result.keywords.contains(&"dan".to_string()));
        assert_eq!(result.summary, "Anggaran daerah naik. Anggaran pendidikan tetap.");
        assert!(result.quality_score > 0.0 && result.quality_score < 0.1);
    }

    #[tokio::test]
    async fn test_keyword_analyzer_rejects_empty() {
        assert!(KeywordAnalyzer::new().analyze("  ").await.is_err());
    }

    #[test]
    fn test_parse_reply() {
        let result = parse_reply(
            "```json\n{\"keywords\": [\"budget\", \" \"], \"summary\": \"A summary.\", \"quality_score\": 1.7}\n```",
        )
        .unwrap();
        assert_eq!(result.keywords, vec!["budget"]);
        assert_eq!(result.summary, "A summary.");
        assert_eq!(result.quality_score, 1.0);

        assert!(matches!(
            parse_reply("not json"),
            Err(AnalysisError::Unavailable(_))
        ));
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn test_create_analyzer() {
        let mut config = AnalyzerConfig::default();
        assert!(create_analyzer(&config).is_none());

        config.provider = "keyword".to_string();
        assert_eq!(create_analyzer(&config).unwrap().name(), "keyword");

        config.provider = "openai".to_string();
        assert_eq!(create_analyzer(&config).unwrap().name(), "keyword");

        config.api_key = Some("sk-test".to_string());
        assert_eq!(create_analyzer(&config).unwrap().name(), "llm");
    }

    #[tokio::test]
    async fn test_llm_unreachable_is_unavailable() {
        let analyzer = LlmAnalyzer::new(
            "sk-test".to_string(),
            Some("http://127.0.0.1:9/v1".to_string()),
            "test-model".to_string(),
            Duration::from_millis(200),
            0,
            100,
        );
        let err = analyzer.analyze("some text").await.unwrap_err();
        assert!(matches!(err, AnalysisError::Unavailable(_)));
    }
}
