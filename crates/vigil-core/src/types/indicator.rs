use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Upper bound for an indicator score
pub const MAX_SCORE: f64 = 100.0;

/// Sliding validity window for a sighting, in hours
pub const SIGHTING_TTL_HOURS: i64 = 24;

/// Kind of threat indicator, derived from the value and immutable once set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorType {
    /// Public IPv4 address
    Ip,
    /// Fully qualified domain name
    Domain,
}

impl std::fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ip => write!(f, "ip"),
            Self::Domain => write!(f, "domain"),
        }
    }
}

/// One IP or domain with aggregated threat metadata.
///
/// The canonical `value` uniquely identifies an indicator; the score is
/// clamped to `[0, 100]` and the validity window slides forward on every
/// re-sighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indicator {
    /// Canonical (normalized) value, the unique key
    pub value: String,

    /// Derived type of the value
    #[serde(rename = "type")]
    pub indicator_type: IndicatorType,

    /// Aggregate threat score in `[0, 100]`
    pub score: f64,

    /// Names of the sources that reported this value, deduplicated
    pub sources: Vec<String>,

    /// When the value was first sighted
    pub first_seen: DateTime<Utc>,

    /// When the value was most recently sighted
    pub last_seen: DateTime<Utc>,

    /// When the indicator expires unless re-sighted
    pub expires_at: DateTime<Utc>,
}

impl Indicator {
    /// Create an indicator from its first sighting
    #[must_use]
    pub fn new(
        value: impl Into<String>,
        indicator_type: IndicatorType,
        weight: f64,
        source: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            value: value.into(),
            indicator_type,
            score: weight.clamp(0.0, MAX_SCORE),
            sources: vec![source.to_string()],
            first_seen: now,
            last_seen: now,
            expires_at: now + Duration::hours(SIGHTING_TTL_HOURS),
        }
    }

    /// Record a re-sighting from a source within the same collection pass.
    ///
    /// The source set accumulates (deduplicated), the score accumulates by
    /// the source weight (capped at 100), and the validity window is
    /// refreshed to `now + 24h`.
    pub fn record_sighting(&mut self, source: &str, weight: f64, now: DateTime<Utc>) {
        if !self.sources.iter().any(|s| s == source) {
            self.sources.push(source.to_string());
        }
        self.score = (self.score + weight).clamp(0.0, MAX_SCORE);
        self.last_seen = now;
        self.expires_at = now + Duration::hours(SIGHTING_TTL_HOURS);
    }

    /// Returns true if the validity window has closed
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// The primary unit exchanged between pipeline components: a mapping from
/// canonical value to [`Indicator`].
///
/// Iteration order is never load-bearing. Conversion to and from an ordered
/// sequence of entries happens only at the storage and publishing
/// boundaries, via [`IndicatorSet::to_entries`] / [`IndicatorSet::from_entries`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorSet(HashMap<String, Indicator>);

impl IndicatorSet {
    /// Create an empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of indicators in the set
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the set holds no indicators
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Look up an indicator by canonical value
    #[must_use]
    pub fn get(&self, value: &str) -> Option<&Indicator> {
        self.0.get(value)
    }

    /// Mutable lookup by canonical value
    pub fn get_mut(&mut self, value: &str) -> Option<&mut Indicator> {
        self.0.get_mut(value)
    }

    /// Returns true if the value is present
    #[must_use]
    pub fn contains(&self, value: &str) -> bool {
        self.0.contains_key(value)
    }

    /// Insert an indicator, keyed by its value. Replaces any previous
    /// indicator with the same value.
    pub fn insert(&mut self, indicator: Indicator) -> Option<Indicator> {
        self.0.insert(indicator.value.clone(), indicator)
    }

    /// Remove an indicator by value
    pub fn remove(&mut self, value: &str) -> Option<Indicator> {
        self.0.remove(value)
    }

    /// Iterate over indicators in arbitrary order
    pub fn values(&self) -> impl Iterator<Item = &Indicator> {
        self.0.values()
    }

    /// Drain the set into (value, indicator) pairs in arbitrary order
    pub fn into_pairs(self) -> impl Iterator<Item = (String, Indicator)> {
        self.0.into_iter()
    }

    /// Convert to a key-sorted sequence of entries for serialization.
    ///
    /// Sorting makes persisted blobs and partition slices deterministic;
    /// the order is never read back as meaningful.
    #[must_use]
    pub fn to_entries(&self) -> Vec<(String, Indicator)> {
        let mut entries: Vec<_> = self
            .0
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Rebuild a set from a serialized sequence of entries
    #[must_use]
    pub fn from_entries(entries: Vec<(String, Indicator)>) -> Self {
        Self(entries.into_iter().collect())
    }

    /// Split the set by expiry: `(live, expired)` relative to `now`
    #[must_use]
    pub fn split_expired(self, now: DateTime<Utc>) -> (Self, Self) {
        let (expired, live): (HashMap<_, _>, HashMap<_, _>) =
            self.0.into_iter().partition(|(_, ind)| ind.is_expired(now));
        (Self(live), Self(expired))
    }
}

impl FromIterator<Indicator> for IndicatorSet {
    fn from_iter<I: IntoIterator<Item = Indicator>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|ind| (ind.value.clone(), ind))
                .collect(),
        )
    }
}
