//! The sync engine: sequences one cycle and owns the update-needed decision.

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use vigil_collect::Collector;
use vigil_core::merge::merge;
use vigil_core::{validation, FeedMetadata, Indicator, Result, RunResult, VigilError};
use vigil_publish::Publisher;
use vigil_store::{IndicatorStore, KvStore};

/// Engine configuration, immutable for the engine's lifetime
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Id of the primary downstream list (single-list path target)
    pub feed_list_id: String,
    /// Feed display name
    pub feed_name: String,
    /// Feed description
    pub feed_description: String,
    /// Target cadence between cycles, in hours
    pub update_interval_hours: i64,
}

/// Snapshot of pipeline state for status reporting
#[derive(Debug, Clone)]
pub struct SyncStatus {
    /// Feed metadata, if initialized
    pub metadata: Option<FeedMetadata>,
    /// Most recent cycle result
    pub last_run: Option<RunResult>,
    /// Timestamp of the last successful cycle
    pub last_update: Option<DateTime<Utc>>,
    /// Whether a cycle is due now
    pub update_needed: bool,
}

struct CycleCounts {
    added: usize,
    removed: usize,
}

/// Drives the cleanup → collect → merge → persist → publish sequence.
pub struct SyncEngine<K> {
    collector: Collector,
    store: IndicatorStore<K>,
    publisher: Publisher,
    config: SyncConfig,
}

impl<K: KvStore> SyncEngine<K> {
    /// Assemble an engine from its components
    pub fn new(
        collector: Collector,
        store: IndicatorStore<K>,
        publisher: Publisher,
        config: SyncConfig,
    ) -> Self {
        Self {
            collector,
            store,
            publisher,
            config,
        }
    }

    /// The underlying store, for adapter-layer passthrough
    pub fn store(&self) -> &IndicatorStore<K> {
        &self.store
    }

    /// The collector's current source configuration
    #[must_use]
    pub fn sources(&self) -> &[vigil_core::ThreatSource] {
        self.collector.sources()
    }

    /// Validate credentials and write initial feed metadata.
    ///
    /// Fatal before any cycle work if the downstream rejects the token.
    pub async fn initialize(&self) -> Result<FeedMetadata> {
        self.publisher.verify_access().await.map_err(|e| {
            if matches!(e.status_code(), Some(401 | 403)) {
                VigilError::Config("downstream credentials rejected".to_string())
            } else {
                e
            }
        })?;

        let meta = match self.store.feed_metadata().await? {
            Some(existing) => existing,
            None => FeedMetadata {
                feed_list_id: self.config.feed_list_id.clone(),
                name: self.config.feed_name.clone(),
                description: self.config.feed_description.clone(),
                indicator_count: 0,
                last_updated: None,
                update_interval_hours: self.config.update_interval_hours,
            },
        };
        self.store.set_feed_metadata(&meta).await?;
        self.store.set_sources(self.collector.sources()).await?;
        info!(feed = %meta.feed_list_id, "pipeline initialized");
        Ok(meta)
    }

    /// True if no successful cycle is recorded, or the configured interval
    /// has fully elapsed since the last one
    pub async fn is_update_needed(&self, now: DateTime<Utc>) -> Result<bool> {
        Ok(match self.store.last_update().await? {
            None => true,
            Some(last) => now - last >= Duration::hours(self.config.update_interval_hours),
        })
    }

    /// Run one full cycle.
    ///
    /// Isolated per-source and per-list failures are collected into the
    /// run result's error list. A fatal step aborts the remaining steps,
    /// persists a failed run result, and re-raises.
    pub async fn run_cycle(&self) -> Result<RunResult> {
        let started = std::time::Instant::now();
        let mut errors = Vec::new();
        info!("cycle starting");

        match self.run_steps(&mut errors).await {
            Ok(counts) => {
                let run = RunResult {
                    success: true,
                    indicators_added: counts.added,
                    indicators_removed: counts.removed,
                    duration_ms: started.elapsed().as_millis() as u64,
                    errors,
                    finished_at: Utc::now(),
                };
                self.store.set_last_run(&run).await?;
                info!(
                    added = run.indicators_added,
                    removed = run.indicators_removed,
                    duration_ms = run.duration_ms,
                    isolated_failures = run.errors.len(),
                    "cycle finished"
                );
                Ok(run)
            }
            Err(e) => {
                errors.push(e.to_string());
                let run = RunResult {
                    success: false,
                    indicators_added: 0,
                    indicators_removed: 0,
                    duration_ms: started.elapsed().as_millis() as u64,
                    errors,
                    finished_at: Utc::now(),
                };
                // Best effort: the failed run record should not mask the
                // original failure.
                if let Err(persist_err) = self.store.set_last_run(&run).await {
                    warn!(error = %persist_err, "could not persist failed run result");
                }
                Err(e)
            }
        }
    }

    async fn run_steps(&self, errors: &mut Vec<String>) -> Result<CycleCounts> {
        let now = Utc::now();

        let removed = self.store.cleanup_expired(now).await?;

        let (fresh, stats) = self.collector.collect().await;
        for failure in &stats.failed_sources {
            errors.push(format!(
                "source '{}' failed: {}",
                failure.name, failure.reason
            ));
        }

        let existing = self.store.load().await?;
        let before = existing.len();
        let merged = merge(existing, fresh);
        let added = merged.len().saturating_sub(before);

        self.store.persist(&merged).await?;

        let upload = self
            .publisher
            .publish(&self.config.feed_list_id, &merged)
            .await?;
        for name in &upload.failed_lists {
            errors.push(format!("list '{name}' failed to publish"));
        }
        let ids: Vec<String> = upload.lists.iter().map(|l| l.id.clone()).collect();
        self.store.set_published_lists(&ids).await?;

        let mut meta = match self.store.feed_metadata().await? {
            Some(meta) => meta,
            None => FeedMetadata {
                feed_list_id: self.config.feed_list_id.clone(),
                name: self.config.feed_name.clone(),
                description: self.config.feed_description.clone(),
                indicator_count: 0,
                last_updated: None,
                update_interval_hours: self.config.update_interval_hours,
            },
        };
        meta.indicator_count = merged.len();
        meta.last_updated = Some(now);
        self.store.set_feed_metadata(&meta).await?;
        self.store.set_last_update(now).await?;

        Ok(CycleCounts { added, removed })
    }

    /// Current pipeline status for the adapter layer
    pub async fn status(&self, now: DateTime<Utc>) -> Result<SyncStatus> {
        Ok(SyncStatus {
            metadata: self.store.feed_metadata().await?,
            last_run: self.store.last_run().await?,
            last_update: self.store.last_update().await?,
            update_needed: self.is_update_needed(now).await?,
        })
    }

    /// Ad hoc indicator lookup: point entry first, bulk set as fallback
    pub async fn lookup(&self, raw: &str) -> Result<Option<Indicator>> {
        let Some(canonical) = validation::normalize(raw) else {
            return Ok(None);
        };
        if let Some(ind) = self.store.get_indicator(&canonical).await? {
            return Ok(Some(ind));
        }
        Ok(self.store.load().await?.get(&canonical).cloned())
    }

    /// Destructive reset: drop every stored key
    pub async fn reset(&self) -> Result<()> {
        self.store.clear_all().await
    }
}
