use super::Indicator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity and bookkeeping for the downstream feed.
///
/// Created once at initialize, mutated at the end of every cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedMetadata {
    /// Id of the primary downstream list
    pub feed_list_id: String,

    /// Human-readable feed name
    pub name: String,

    /// Feed description shown downstream
    pub description: String,

    /// Indicator count as of the last successful cycle
    #[serde(default)]
    pub indicator_count: usize,

    /// When the feed last completed a successful cycle
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,

    /// Target cadence between cycles, in hours
    pub update_interval_hours: i64,
}

/// Outcome of one cleanup→collect→merge→persist→publish cycle.
///
/// Overwritten per cycle under a fixed store key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Whether the cycle completed without a fatal error
    pub success: bool,

    /// Indicators newly added by this cycle's merge
    pub indicators_added: usize,

    /// Indicators removed by expiry sweep
    pub indicators_removed: usize,

    /// Wall-clock duration of the cycle
    pub duration_ms: u64,

    /// Isolated failures accumulated during the cycle (per-source,
    /// per-list), plus the fatal error when `success` is false
    pub errors: Vec<String>,

    /// When the cycle finished
    pub finished_at: DateTime<Utc>,
}

/// Identity of one downstream list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRef {
    /// Downstream-assigned list id
    pub id: String,
    /// List name
    pub name: String,
    /// List description
    #[serde(default)]
    pub description: String,
}

/// One downstream list entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListItem {
    /// The indicator value
    pub value: String,
    /// Human-readable metadata; best-effort, not round-trippable
    pub annotation: String,
}

impl ListItem {
    /// Encode an indicator for downstream publication
    #[must_use]
    pub fn from_indicator(ind: &Indicator) -> Self {
        Self {
            value: ind.value.clone(),
            annotation: format!(
                "{} score={:.0} sources={} last_seen={}",
                ind.indicator_type,
                ind.score,
                ind.sources.join(","),
                ind.last_seen.to_rfc3339(),
            ),
        }
    }
}

/// Outcome of one publish step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadResult {
    /// False if any list failed to be created or populated
    pub success: bool,

    /// Items successfully appended across all lists
    pub items_uploaded: usize,

    /// Lists created by the multi-list path (empty on the single-list path)
    pub lists: Vec<ListRef>,

    /// Names of lists that failed creation or population
    pub failed_lists: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IndicatorType;

    #[test]
    fn test_list_item_annotation() {
        let now = Utc::now();
        let mut ind = Indicator::new("bad.example.com", IndicatorType::Domain, 42.0, "feed-a", now);
        ind.record_sighting("feed-b", 8.0, now);

        let item = ListItem::from_indicator(&ind);
        assert_eq!(item.value, "bad.example.com");
        assert!(item.annotation.starts_with("domain score=50 sources=feed-a,feed-b"));
        assert!(item.annotation.contains("last_seen="));
    }

    #[test]
    fn test_run_result_serializes() {
        let run = RunResult {
            success: false,
            indicators_added: 3,
            indicators_removed: 1,
            duration_ms: 1200,
            errors: vec!["source 'x' fetch failed: HTTP 500".to_string()],
            finished_at: Utc::now(),
        };
        let json = serde_json::to_string(&run).unwrap();
        let parsed: RunResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, run);
    }
}
