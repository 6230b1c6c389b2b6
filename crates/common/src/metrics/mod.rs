//! Metrics and observability utilities
//!
//! Prometheus metrics for the scraping pipeline with standardized naming.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all ScrapeForge metrics
pub const METRICS_PREFIX: &str = "scrapeforge";

/// Buckets for outbound search latency (in seconds)
pub const SEARCH_BUCKETS: &[f64] = &[
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
];

/// Buckets for whole-job duration (in seconds)
pub const JOB_BUCKETS: &[f64] = &[
    1.0,
    5.0,
    15.0,
    30.0,
    60.0,
    300.0,
    900.0,
    1800.0,
    3600.0,
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_source_searches_total", METRICS_PREFIX),
        Unit::Count,
        "Source searches by source and outcome"
    );

    describe_histogram!(
        format!("{}_source_search_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Source search latency in seconds"
    );

    describe_counter!(
        format!("{}_candidates_found_total", METRICS_PREFIX),
        Unit::Count,
        "Candidates returned by sources"
    );

    describe_counter!(
        format!("{}_documents_total", METRICS_PREFIX),
        Unit::Count,
        "Documents by processing outcome"
    );

    describe_counter!(
        format!("{}_artifacts_stored_total", METRICS_PREFIX),
        Unit::Count,
        "Artifacts persisted"
    );

    describe_counter!(
        format!("{}_analysis_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Content analysis requests by outcome"
    );

    describe_histogram!(
        format!("{}_analysis_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Content analysis latency in seconds"
    );

    describe_counter!(
        format!("{}_jobs_finished_total", METRICS_PREFIX),
        Unit::Count,
        "Jobs reaching a terminal status"
    );

    describe_histogram!(
        format!("{}_job_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Wall-clock job duration in seconds"
    );

    describe_gauge!(
        format!("{}_jobs_running", METRICS_PREFIX),
        Unit::Count,
        "Jobs currently running"
    );

    describe_counter!(
        format!("{}_quota_checks_total", METRICS_PREFIX),
        Unit::Count,
        "Request budget checks by outcome"
    );

    tracing::info!("Metrics registered");
}

/// Tracks one source search from start to finish
pub struct SearchTimer {
    start: Instant,
    source: String,
}

impl SearchTimer {
    pub fn start(source: &str) -> Self {
        Self {
            start: Instant::now(),
            source: source.to_string(),
        }
    }

    /// Record the search outcome ("ok", "unavailable", "rate_limited")
    pub fn finish(self, outcome: &str, hits: usize) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_source_searches_total", METRICS_PREFIX),
            "source" => self.source.clone(),
            "outcome" => outcome.to_string()
        )
        .increment(1);

        counter!(
            format!("{}_candidates_found_total", METRICS_PREFIX),
            "source" => self.source.clone()
        )
        .increment(hits as u64);

        histogram!(
            format!("{}_source_search_duration_seconds", METRICS_PREFIX),
            "source" => self.source
        )
        .record(duration);
    }
}

/// Helper to record a document outcome ("processed", "too_large", "unsupported", ...)
pub fn record_document(outcome: &str) {
    counter!(
        format!("{}_documents_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Helper to record a stored artifact
pub fn record_artifact(source: &str, artifact_type: &str) {
    counter!(
        format!("{}_artifacts_stored_total", METRICS_PREFIX),
        "source" => source.to_string(),
        "type" => artifact_type.to_string()
    )
    .increment(1);
}

/// Helper to record content analysis metrics
pub fn record_analysis(duration_secs: f64, analyzer: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_analysis_requests_total", METRICS_PREFIX),
        "analyzer" => analyzer.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_analysis_duration_seconds", METRICS_PREFIX),
            "analyzer" => analyzer.to_string()
        )
        .record(duration_secs);
    }
}

/// Helper to track the running-jobs gauge
pub fn record_job_started() {
    gauge!(format!("{}_jobs_running", METRICS_PREFIX)).increment(1.0);
}

/// Helper to record a job reaching a terminal status
pub fn record_job_finished(status: &str, duration_secs: f64) {
    gauge!(format!("{}_jobs_running", METRICS_PREFIX)).decrement(1.0);

    counter!(
        format!("{}_jobs_finished_total", METRICS_PREFIX),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(format!("{}_job_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

/// Helper to record a request budget check
pub fn record_quota(source: &str, allowed: bool) {
    counter!(
        format!("{}_quota_checks_total", METRICS_PREFIX),
        "source" => source.to_string(),
        "outcome" => if allowed { "allowed" } else { "exhausted" }.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_sorted() {
        for buckets in [SEARCH_BUCKETS, JOB_BUCKETS] {
            let mut prev = 0.0;
            for &bucket in buckets {
                assert!(bucket > prev);
                prev = bucket;
            }
        }
    }

    #[test]
    fn test_helpers_without_recorder() {
        // No recorder installed: calls must be no-ops
        SearchTimer::start("arxiv").finish("ok", 3);
        record_document("processed");
        record_analysis(0.2, "keyword", true);
        record_quota("crossref", false);
    }
}
