//! Candidate de-duplication
//!
//! Candidates are keyed by a normalized form of their URL so that
//! `http://Example.org/a/` and `https://example.org/a#top` collapse.

use std::collections::HashSet;
use url::Url;

use crate::models::Candidate;

/// Normalize a URL for identity comparison.
///
/// Drops the scheme and fragment, lower-cases the host, drops default ports
/// and the trailing slash of a non-root path. Unparsable input is trimmed,
/// lower-cased and cut at `#`.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(url) = Url::parse(trimmed) else {
        return fallback_key(trimmed);
    };
    let Some(host) = url.host_str() else {
        return fallback_key(trimmed);
    };

    let mut key = host.to_ascii_lowercase();
    // `Url::port` is already None for the scheme's default port
    if let Some(port) = url.port() {
        key.push(':');
        key.push_str(&port.to_string());
    }

    let path = url.path();
    if path.len() > 1 {
        key.push_str(path.trim_end_matches('/'));
    } else {
        key.push('/');
    }

    if let Some(query) = url.query() {
        key.push('?');
        key.push_str(query);
    }
    key
}

fn fallback_key(raw: &str) -> String {
    let without_fragment = raw.split('#').next().unwrap_or_default();
    without_fragment.to_lowercase()
}

/// Remove candidates whose normalized URL was already seen; first one wins
pub fn dedupe(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(normalize_url(&c.source_url)))
        .collect()
}

/// Job-wide memory of URLs and content hashes
#[derive(Debug, Default)]
pub struct Deduplicator {
    urls: HashSet<String>,
    hashes: HashSet<String>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take up to `limit` candidates not seen earlier in this job.
    ///
    /// Only the taken candidates are remembered. Also returns how many were
    /// skipped as already seen.
    pub fn take_unseen(&mut self, candidates: Vec<Candidate>, limit: usize) -> (Vec<Candidate>, usize) {
        let mut taken = Vec::new();
        let mut skipped = 0;
        for candidate in candidates {
            if taken.len() >= limit {
                break;
            }
            if self.urls.insert(normalize_url(&candidate.source_url)) {
                taken.push(candidate);
            } else {
                skipped += 1;
            }
        }
        (taken, skipped)
    }

    /// Record a content hash; false if it was already stored in this job
    pub fn seen_hash(&mut self, content_hash: &str) -> bool {
        !self.hashes.insert(content_hash.to_string())
    }

    pub fn url_count(&self) -> usize {
        self.urls.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceName;

    fn candidate(url: &str) -> Candidate {
        Candidate::new(url, url, SourceName::from("test"), "k")
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("https://Example.ORG/a/b/"), "example.org/a/b");
        assert_eq!(normalize_url("http://example.org/a/b#frag"), "example.org/a/b");
        assert_eq!(normalize_url("https://example.org:443/a"), "example.org/a");
        assert_eq!(normalize_url("http://example.org:8080/a"), "example.org:8080/a");
        assert_eq!(normalize_url("https://example.org"), "example.org/");
        assert_eq!(normalize_url("https://example.org/"), "example.org/");
        assert_eq!(normalize_url("https://example.org/s?q=1"), "example.org/s?q=1");
        assert_eq!(normalize_url("  Not A URL#x "), "not a url");
    }

    #[test]
    fn test_dedupe_is_stable_first_seen() {
        let input = vec![
            candidate("https://example.org/a"),
            candidate("https://example.org/b"),
            candidate("http://EXAMPLE.org/a/"),
            candidate("https://example.org/c"),
        ];
        let urls: Vec<_> = dedupe(input)
            .into_iter()
            .map(|c| c.source_url)
            .collect();
        assert_eq!(
            urls,
            vec![
                "https://example.org/a",
                "https://example.org/b",
                "https://example.org/c"
            ]
        );
    }

    #[test]
    fn test_dedupe_idempotent() {
        let input = vec![
            candidate("https://example.org/a"),
            candidate("https://example.org/a#x"),
            candidate("https://example.org/b"),
        ];
        let once = dedupe(input);
        let twice = dedupe(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_deduplicator_across_batches() {
        let mut dedup = Deduplicator::new();
        let (first, skipped) = dedup.take_unseen(vec![candidate("https://example.org/a")], 10);
        assert_eq!(first.len(), 1);
        assert_eq!(skipped, 0);

        let (second, skipped) = dedup.take_unseen(
            vec![
                candidate("https://example.org/a/"),
                candidate("https://example.org/b"),
                candidate("https://example.org/c"),
            ],
            1,
        );
        assert_eq!(second.len(), 1);
        assert_eq!(skipped, 1);
        assert_eq!(second[0].source_url, "https://example.org/b");
        // c was beyond the limit and stays available for later keywords
        assert_eq!(dedup.url_count(), 2);

        assert!(!dedup.seen_hash("abc"));
        assert!(dedup.seen_hash("abc"));
    }
}
