//! Plain-text feed parsing.

use std::collections::HashSet;
use vigil_core::validation::extract_from_line;
use vigil_core::{IndicatorType, ThreatSource};

/// What one source contributed to a collection pass
#[derive(Debug, Clone, Default)]
pub struct SourceBatch {
    /// Unique extracted values, in first-seen order
    pub values: Vec<(String, IndicatorType)>,
    /// Lines scanned, comments included
    pub lines: usize,
}

/// Parse a line-oriented plain-text feed body.
///
/// Values repeated within the same feed count once; the same source
/// contributing a value twice is not two sightings.
#[must_use]
pub fn parse_plain(body: &str, source: &ThreatSource) -> SourceBatch {
    let mut seen = HashSet::new();
    let mut batch = SourceBatch::default();

    for line in body.lines() {
        batch.lines += 1;
        for (value, kind) in
            extract_from_line(line, source.extract_ips, source.extract_domains)
        {
            if seen.insert(value.clone()) {
                batch.values.push((value, kind));
            }
        }
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::SourceFormat;

    fn source() -> ThreatSource {
        ThreatSource {
            name: "test".to_string(),
            url: "https://feeds.example.com/list.txt".to_string(),
            format: SourceFormat::Plain,
            weight: 10.0,
            timeout_secs: 5,
            user_agent: None,
            enabled: true,
            extract_ips: true,
            extract_domains: true,
        }
    }

    #[test]
    fn test_parse_mixed_feed() {
        let body = "\
# malware C2 list
8.8.8.8
bad.example.com
10.0.0.1
https://www.evil.example.net/payload.bin

8.8.8.8
";
        let batch = parse_plain(body, &source());
        assert_eq!(batch.lines, 7);

        let values: Vec<&str> = batch.values.iter().map(|(v, _)| v.as_str()).collect();
        assert_eq!(values, vec!["8.8.8.8", "bad.example.com", "evil.example.net"]);
    }

    #[test]
    fn test_parse_respects_extraction_flags() {
        let mut src = source();
        src.extract_domains = false;
        let batch = parse_plain("8.8.8.8\nbad.example.com\n", &src);
        assert_eq!(batch.values.len(), 1);
        assert_eq!(batch.values[0].0, "8.8.8.8");
    }

    #[test]
    fn test_parse_empty_body() {
        let batch = parse_plain("", &source());
        assert_eq!(batch.lines, 0);
        assert!(batch.values.is_empty());
    }
}
