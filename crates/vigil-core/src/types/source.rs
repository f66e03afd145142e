use serde::{Deserialize, Serialize};

/// Feed payload format.
///
/// Only `plain` line-oriented text is parsed today; `csv` and `json` are
/// accepted in configuration but contribute no indicators (the collector
/// logs a warning for them).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// Line-oriented plain text
    #[default]
    Plain,
    /// CSV (accepted, unimplemented)
    Csv,
    /// JSON (accepted, unimplemented)
    Json,
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain => write!(f, "plain"),
            Self::Csv => write!(f, "csv"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// One external feed contributing raw indicator values.
///
/// Immutable during a cycle; the whole source list is replaced wholesale
/// through an explicit configuration update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatSource {
    /// Unique source name, recorded on every indicator it contributes
    pub name: String,

    /// Feed URL (HTTP GET returning text)
    pub url: String,

    /// Payload format
    #[serde(default)]
    pub format: SourceFormat,

    /// Score contribution per sighting
    #[serde(default = "default_weight")]
    pub weight: f64,

    /// Per-source fetch timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Optional User-Agent override for this source
    #[serde(default)]
    pub user_agent: Option<String>,

    /// Disabled sources are skipped entirely
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Extract IPv4 addresses from this feed
    #[serde(default = "default_true")]
    pub extract_ips: bool,

    /// Extract domains from this feed
    #[serde(default = "default_true")]
    pub extract_domains: bool,
}

const fn default_weight() -> f64 {
    10.0
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_true() -> bool {
    true
}
