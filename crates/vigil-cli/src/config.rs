//! CLI configuration: a TOML file plus an environment fallback for the
//! API token.
//!
//! Configuration is validated wholesale at the boundary; nothing reaches
//! the engine until every problem has been reported.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use vigil_core::ThreatSource;

/// Environment variable consulted when `api.token` is absent
pub const TOKEN_ENV: &str = "VIGIL_API_TOKEN";

/// Top-level configuration file shape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VigilConfig {
    /// Directory for the disk-backed store
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Downstream list API settings
    pub api: ApiConfig,

    /// Feed identity and cadence
    pub feed: FeedConfig,

    /// Source feeds to collect from
    #[serde(default)]
    pub sources: Vec<ThreatSource>,
}

/// Downstream list API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the list API
    pub base_url: String,

    /// API token; falls back to the `VIGIL_API_TOKEN` environment variable
    #[serde(default)]
    pub token: Option<String>,
}

/// Feed identity and cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Id of the primary downstream list
    pub list_id: String,

    /// Feed display name
    #[serde(default = "default_feed_name")]
    pub name: String,

    /// Feed description
    #[serde(default = "default_feed_description")]
    pub description: String,

    /// Hours between cycles
    #[serde(default = "default_interval_hours")]
    pub update_interval_hours: i64,
}

impl VigilConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("read {}: {e}", path.display()))?;
        toml::from_str(&content).map_err(|e| anyhow::anyhow!("parse {}: {e}", path.display()))
    }

    /// The API token from the file or the environment
    #[must_use]
    pub fn resolve_token(&self) -> Option<String> {
        self.api
            .token
            .clone()
            .or_else(|| std::env::var(TOKEN_ENV).ok())
    }

    /// Validate everything up front, returning all problems at once
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if url::Url::parse(&self.api.base_url).is_err() {
            problems.push(format!("api.base_url is not a valid URL: {}", self.api.base_url));
        }
        if self.resolve_token().is_none() {
            problems.push(format!("no API token: set api.token or {TOKEN_ENV}"));
        }
        if self.feed.list_id.is_empty() {
            problems.push("feed.list_id must not be empty".to_string());
        }
        if self.feed.update_interval_hours < 1 {
            problems.push("feed.update_interval_hours must be at least 1".to_string());
        }

        for (i, source) in self.sources.iter().enumerate() {
            if source.name.is_empty() {
                problems.push(format!("sources[{i}].name must not be empty"));
            }
            if url::Url::parse(&source.url).is_err() {
                problems.push(format!(
                    "sources[{i}] ('{}') has an invalid url: {}",
                    source.name, source.url
                ));
            }
            if source.weight <= 0.0 || source.weight > 100.0 {
                problems.push(format!(
                    "sources[{i}] ('{}') weight must be in (0, 100], got {}",
                    source.name, source.weight
                ));
            }
            if source.timeout_secs == 0 {
                problems.push(format!(
                    "sources[{i}] ('{}') timeout_secs must be at least 1",
                    source.name
                ));
            }
        }

        problems
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./vigil-data")
}

fn default_feed_name() -> String {
    String::from("vigil threat feed")
}

fn default_feed_description() -> String {
    String::from("Aggregated threat indicators collected by vigil")
}

const fn default_interval_hours() -> i64 {
    24
}
