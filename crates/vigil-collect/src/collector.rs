//! The feed collector: concurrent fetch, isolated failure, one merged set.

use crate::parse::{parse_plain, SourceBatch};
use chrono::Utc;
use futures_util::future::join_all;
use reqwest::header::USER_AGENT;
use std::time::Duration;
use tracing::{debug, info, warn};
use vigil_core::{Indicator, IndicatorSet, Result, SourceFormat, ThreatSource, VigilError};

/// One source's failure within a collection pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    /// Source name
    pub name: String,
    /// Why the source contributed nothing
    pub reason: String,
}

/// Statistics for one collection pass
#[derive(Debug, Clone, Default)]
pub struct CollectStats {
    /// Enabled sources that were queried
    pub sources_queried: usize,
    /// Total feed lines scanned across all sources
    pub lines_scanned: usize,
    /// Distinct indicators in the resulting set
    pub indicators_found: usize,
    /// Sources whose fetch or parse failed (isolated, zero contribution)
    pub failed_sources: Vec<SourceFailure>,
}

/// Fetches and parses every enabled source concurrently.
///
/// Owns the source configuration explicitly; the list is replaced
/// wholesale via [`set_sources`](Self::set_sources), which returns the
/// previous list for auditability. No global state.
pub struct Collector {
    sources: Vec<ThreatSource>,
    http: reqwest::Client,
}

impl Collector {
    /// Create a collector over the given source configuration
    pub fn new(sources: Vec<ThreatSource>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .gzip(true)
            .build()
            .map_err(|e| VigilError::Config(format!("http client: {e}")))?;
        Ok(Self { sources, http })
    }

    /// The current source configuration
    #[must_use]
    pub fn sources(&self) -> &[ThreatSource] {
        &self.sources
    }

    /// Replace the source configuration wholesale, returning the previous
    /// list
    pub fn set_sources(&mut self, sources: Vec<ThreatSource>) -> Vec<ThreatSource> {
        std::mem::replace(&mut self.sources, sources)
    }

    /// Run one collection pass over all enabled sources.
    ///
    /// Fetches start concurrently and the pass waits for all of them to
    /// settle; results are folded in source-list order. Individual
    /// failures are recorded in the stats and never abort the pass.
    pub async fn collect(&self) -> (IndicatorSet, CollectStats) {
        let now = Utc::now();
        let enabled: Vec<&ThreatSource> =
            self.sources.iter().filter(|s| s.enabled).collect();

        let mut stats = CollectStats {
            sources_queried: enabled.len(),
            ..CollectStats::default()
        };

        let fetches = enabled.iter().map(|source| self.collect_source(source));
        let outcomes = join_all(fetches).await;

        let mut set = IndicatorSet::new();
        for (source, outcome) in enabled.iter().zip(outcomes) {
            match outcome {
                Ok(batch) => {
                    stats.lines_scanned += batch.lines;
                    fold_batch(&mut set, source, batch, now);
                }
                Err(VigilError::UnsupportedFormat { name, format }) => {
                    // Declared gap, not a failure: csv/json sources are
                    // accepted in configuration but yield nothing.
                    warn!(source = name, format, "unsupported source format, skipping");
                }
                Err(e) => {
                    warn!(source = %source.name, error = %e, "source failed, continuing");
                    stats.failed_sources.push(SourceFailure {
                        name: source.name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        stats.indicators_found = set.len();
        info!(
            sources = stats.sources_queried,
            failed = stats.failed_sources.len(),
            indicators = stats.indicators_found,
            "collection pass finished"
        );
        (set, stats)
    }

    async fn collect_source(&self, source: &ThreatSource) -> Result<SourceBatch> {
        match source.format {
            SourceFormat::Plain => {}
            other => {
                return Err(VigilError::UnsupportedFormat {
                    name: source.name.clone(),
                    format: other.to_string(),
                })
            }
        }

        debug!(source = %source.name, url = %source.url, "fetching feed");
        let mut request = self
            .http
            .get(&source.url)
            .timeout(Duration::from_secs(source.timeout_secs));
        if let Some(agent) = &source.user_agent {
            request = request.header(USER_AGENT, agent);
        }

        let response = request.send().await.map_err(|e| {
            let reason = if e.is_timeout() {
                format!("timed out after {}s", source.timeout_secs)
            } else {
                e.to_string()
            };
            VigilError::SourceFetch {
                name: source.name.clone(),
                reason,
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(VigilError::SourceFetch {
                name: source.name.clone(),
                reason: format!("HTTP {status}"),
            });
        }

        let body = response.text().await.map_err(|e| VigilError::SourceFetch {
            name: source.name.clone(),
            reason: format!("body read: {e}"),
        })?;

        let batch = parse_plain(&body, source);
        debug!(
            source = %source.name,
            lines = batch.lines,
            values = batch.values.len(),
            "feed parsed"
        );
        Ok(batch)
    }
}

/// Fold one source's batch into the pass set. Values already present
/// accumulate sources and score and get their window refreshed.
fn fold_batch(
    set: &mut IndicatorSet,
    source: &ThreatSource,
    batch: SourceBatch,
    now: chrono::DateTime<Utc>,
) {
    for (value, kind) in batch.values {
        if let Some(existing) = set.get_mut(&value) {
            existing.record_sighting(&source.name, source.weight, now);
        } else {
            set.insert(Indicator::new(value, kind, source.weight, &source.name, now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source(name: &str, url: String) -> ThreatSource {
        ThreatSource {
            name: name.to_string(),
            url,
            format: SourceFormat::Plain,
            weight: 10.0,
            timeout_secs: 5,
            user_agent: None,
            enabled: true,
            extract_ips: true,
            extract_domains: true,
        }
    }

    #[tokio::test]
    async fn test_collect_merges_sources_and_accumulates_scores() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("8.8.8.8\nbad.example.com\n"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("8.8.8.8\n1.1.1.1\n"))
            .mount(&server)
            .await;

        let mut src_b = source("feed-b", format!("{}/b.txt", server.uri()));
        src_b.weight = 20.0;
        let collector = Collector::new(vec![
            source("feed-a", format!("{}/a.txt", server.uri())),
            src_b,
        ])
        .unwrap();

        let (set, stats) = collector.collect().await;
        assert!(stats.failed_sources.is_empty());
        assert_eq!(stats.sources_queried, 2);
        assert_eq!(set.len(), 3);

        let shared = set.get("8.8.8.8").unwrap();
        assert_eq!(shared.sources, vec!["feed-a", "feed-b"]);
        assert!((shared.score - 30.0).abs() < f64::EPSILON);

        let solo = set.get("bad.example.com").unwrap();
        assert_eq!(solo.sources, vec!["feed-a"]);
        assert!((solo.score - 10.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_failed_source_is_isolated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/good.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("8.8.8.8\n"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/bad.txt"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let collector = Collector::new(vec![
            source("good", format!("{}/good.txt", server.uri())),
            source("bad", format!("{}/bad.txt", server.uri())),
        ])
        .unwrap();

        let (set, stats) = collector.collect().await;
        assert_eq!(set.len(), 1);
        assert!(set.contains("8.8.8.8"));
        assert_eq!(stats.failed_sources.len(), 1);
        assert_eq!(stats.failed_sources[0].name, "bad");
        assert!(stats.failed_sources[0].reason.contains("500"));
    }

    #[tokio::test]
    async fn test_unsupported_format_contributes_nothing_without_failing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/plain.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("8.8.8.8\n"))
            .mount(&server)
            .await;

        let mut csv_src = source("csv-feed", format!("{}/ignored.csv", server.uri()));
        csv_src.format = SourceFormat::Csv;
        let collector = Collector::new(vec![
            csv_src,
            source("plain", format!("{}/plain.txt", server.uri())),
        ])
        .unwrap();

        let (set, stats) = collector.collect().await;
        assert_eq!(set.len(), 1);
        // A declared-but-unimplemented format is a notice, not a failure.
        assert!(stats.failed_sources.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_sources_are_skipped() {
        let mut src = source("off", "http://127.0.0.1:1/unreachable".to_string());
        src.enabled = false;
        let collector = Collector::new(vec![src]).unwrap();

        let (set, stats) = collector.collect().await;
        assert!(set.is_empty());
        assert_eq!(stats.sources_queried, 0);
    }

    #[tokio::test]
    async fn test_set_sources_returns_previous() {
        let mut collector = Collector::new(vec![source("a", "http://x/1".to_string())]).unwrap();
        let previous =
            collector.set_sources(vec![source("b", "http://x/2".to_string())]);
        assert_eq!(previous.len(), 1);
        assert_eq!(previous[0].name, "a");
        assert_eq!(collector.sources()[0].name, "b");
    }
}
