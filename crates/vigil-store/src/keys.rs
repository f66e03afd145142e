//! Well-known store keys.
//!
//! Scalar run state lives under dedicated small keys and is never chunked;
//! only the bulk indicator blob participates in the chunking scheme.

/// Single-entry key for the serialized indicator set
pub const INDICATORS: &str = "indicators";

/// Key of the chunk index record; present only while the set is chunked
pub const CHUNK_INDEX: &str = "indicators:chunks:index";

/// Prefix for individual chunk keys
pub const CHUNK_PREFIX: &str = "indicators:chunk:";

/// Feed metadata
pub const FEED_METADATA: &str = "meta:feed";

/// Timestamp of the last successful cycle
pub const LAST_UPDATE: &str = "meta:last-update";

/// Result of the most recent cycle (overwritten each cycle)
pub const LAST_RUN: &str = "meta:last-run";

/// Persisted source configuration
pub const SOURCE_CONFIG: &str = "config:sources";

/// Ids of downstream lists created by the last multi-list publish
pub const PUBLISHED_LISTS: &str = "published:lists";

/// Prefix for ad hoc per-indicator point entries
pub const INDICATOR_PREFIX: &str = "indicator:";

/// Key of chunk `index` within a chunked blob
#[must_use]
pub fn chunk_key(index: usize) -> String {
    format!("{CHUNK_PREFIX}{index:04}")
}

/// Point-entry key for one indicator value
#[must_use]
pub fn indicator_key(value: &str) -> String {
    format!("{INDICATOR_PREFIX}{value}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_keys_sort_with_index() {
        assert_eq!(chunk_key(0), "indicators:chunk:0000");
        assert_eq!(chunk_key(42), "indicators:chunk:0042");
        assert!(chunk_key(9) < chunk_key(10));
    }

    #[test]
    fn test_indicator_key() {
        assert_eq!(indicator_key("8.8.8.8"), "indicator:8.8.8.8");
    }
}
