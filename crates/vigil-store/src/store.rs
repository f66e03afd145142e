//! Chunked indicator persistence over a size-limited key/value medium.

use crate::keys;
use crate::kv::KvStore;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use vigil_core::{
    FeedMetadata, Indicator, IndicatorSet, Result, RunResult, ThreatSource, VigilError,
};

/// Largest blob written as a single entry; a safety margin under the
/// backing medium's ~25 MiB ceiling
pub const SINGLE_VALUE_THRESHOLD: usize = 20 * 1024 * 1024;

/// Fixed byte size of each chunk when a blob is split
pub const CHUNK_SIZE: usize = 10 * 1024 * 1024;

/// Practical ceiling on concurrently outstanding store operations
pub const DELETE_BATCH: usize = 100;

/// Describes how a serialized indicator set was split across chunk entries.
///
/// Exists only while the set exceeds the single-entry threshold; derived
/// from the blob, never independently owned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkIndex {
    /// Number of chunk entries the blob was split into
    pub total_chunks: usize,
    /// Total serialized size in bytes
    pub total_size: usize,
    /// When this representation was written
    pub created_at: DateTime<Utc>,
}

/// Durable storage for the indicator set and scalar run state.
///
/// After every successful [`persist`](Self::persist) exactly one
/// representation is valid: either the single entry, or the chunk index
/// plus its chunks. The medium has no cross-key transactions, so a crash
/// between chunk writes and the index write is an accepted inconsistency
/// window repaired by the next persist.
pub struct IndicatorStore<K> {
    kv: K,
    single_threshold: usize,
    chunk_size: usize,
}

impl<K: KvStore> IndicatorStore<K> {
    /// Wrap a backing store with the default size limits
    pub fn new(kv: K) -> Self {
        Self {
            kv,
            single_threshold: SINGLE_VALUE_THRESHOLD,
            chunk_size: CHUNK_SIZE,
        }
    }

    /// Override the chunking limits (smaller limits for tests)
    #[must_use]
    pub fn with_limits(mut self, single_threshold: usize, chunk_size: usize) -> Self {
        self.single_threshold = single_threshold;
        self.chunk_size = chunk_size;
        self
    }

    /// Persist the full indicator set.
    ///
    /// Small sets are written as one entry and any chunk representation is
    /// torn down; large sets are chunked, indexed, and the single entry
    /// removed.
    pub async fn persist(&self, set: &IndicatorSet) -> Result<()> {
        let blob = serde_json::to_vec(&set.to_entries())?;

        if blob.len() <= self.single_threshold {
            self.kv.put(keys::INDICATORS, blob).await?;
            self.kv.delete(keys::CHUNK_INDEX).await?;
            let stale = self.kv.list(keys::CHUNK_PREFIX).await?;
            self.delete_batched(&stale).await?;
            debug!(indicators = set.len(), "persisted single-entry set");
        } else {
            let chunk_keys: Vec<String> = (0..blob.len().div_ceil(self.chunk_size))
                .map(keys::chunk_key)
                .collect();
            let total = chunk_keys.len();

            let writes = chunk_keys
                .iter()
                .zip(blob.chunks(self.chunk_size))
                .map(|(key, chunk)| self.kv.put(key, chunk.to_vec()));
            for outcome in join_all(writes).await {
                outcome?;
            }

            let index = ChunkIndex {
                total_chunks: total,
                total_size: blob.len(),
                created_at: Utc::now(),
            };
            self.kv
                .put(keys::CHUNK_INDEX, serde_json::to_vec(&index)?)
                .await?;
            self.kv.delete(keys::INDICATORS).await?;

            // Chunks left over from a previously larger set.
            let stale: Vec<String> = self
                .kv
                .list(keys::CHUNK_PREFIX)
                .await?
                .into_iter()
                .filter(|k| chunk_number(k).is_some_and(|n| n >= total))
                .collect();
            self.delete_batched(&stale).await?;
            debug!(
                indicators = set.len(),
                chunks = total,
                bytes = blob.len(),
                "persisted chunked set"
            );
        }
        Ok(())
    }

    /// Load the full indicator set.
    ///
    /// A declared-but-missing chunk is a hard failure; partial data is
    /// never returned. Absence of any representation yields an empty set.
    pub async fn load(&self) -> Result<IndicatorSet> {
        if let Some(raw) = self.kv.get(keys::CHUNK_INDEX).await? {
            let index: ChunkIndex = match serde_json::from_slice(&raw) {
                Ok(index) => index,
                Err(e) => {
                    warn!(error = %e, "corrupt chunk index, treating set as empty");
                    return Ok(IndicatorSet::new());
                }
            };

            let chunk_keys: Vec<String> =
                (0..index.total_chunks).map(keys::chunk_key).collect();
            let reads = chunk_keys.iter().map(|key| self.kv.get(key));

            let mut blob = Vec::with_capacity(index.total_size);
            for (i, outcome) in join_all(reads).await.into_iter().enumerate() {
                match outcome? {
                    Some(bytes) => blob.extend_from_slice(&bytes),
                    None => {
                        return Err(VigilError::MissingChunk {
                            index: i,
                            total: index.total_chunks,
                        })
                    }
                }
            }
            Ok(parse_entries(&blob))
        } else if let Some(blob) = self.kv.get(keys::INDICATORS).await? {
            Ok(parse_entries(&blob))
        } else {
            Ok(IndicatorSet::new())
        }
    }

    /// Sweep expired indicators, persist the survivors, and return the
    /// number removed. Runs at the start of every cycle.
    pub async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let set = self.load().await?;
        let (live, expired) = set.split_expired(now);
        let removed = expired.len();
        if removed == 0 {
            return Ok(0);
        }

        self.persist(&live).await?;

        // Any ad hoc point entries for the removed values go too.
        let point_keys: Vec<String> = expired
            .values()
            .map(|ind| keys::indicator_key(&ind.value))
            .collect();
        self.delete_batched(&point_keys).await?;

        debug!(removed, remaining = live.len(), "expired indicators swept");
        Ok(removed)
    }

    /// Ad hoc lookup of one indicator's point entry. Bypasses the bulk blob.
    pub async fn get_indicator(&self, value: &str) -> Result<Option<Indicator>> {
        self.get_json(&keys::indicator_key(value)).await
    }

    /// Returns true if a point entry exists for the value
    pub async fn has_indicator(&self, value: &str) -> Result<bool> {
        Ok(self.kv.get(&keys::indicator_key(value)).await?.is_some())
    }

    /// Write one indicator's point entry
    pub async fn put_indicator(&self, indicator: &Indicator) -> Result<()> {
        self.put_json(&keys::indicator_key(&indicator.value), indicator)
            .await
    }

    /// Delete one indicator's point entry
    pub async fn delete_indicator(&self, value: &str) -> Result<()> {
        self.kv.delete(&keys::indicator_key(value)).await
    }

    /// Feed metadata, if initialized
    pub async fn feed_metadata(&self) -> Result<Option<FeedMetadata>> {
        self.get_json(keys::FEED_METADATA).await
    }

    /// Replace the feed metadata
    pub async fn set_feed_metadata(&self, meta: &FeedMetadata) -> Result<()> {
        self.put_json(keys::FEED_METADATA, meta).await
    }

    /// Timestamp of the last successful cycle
    pub async fn last_update(&self) -> Result<Option<DateTime<Utc>>> {
        self.get_json(keys::LAST_UPDATE).await
    }

    /// Record a successful cycle's timestamp
    pub async fn set_last_update(&self, when: DateTime<Utc>) -> Result<()> {
        self.put_json(keys::LAST_UPDATE, &when).await
    }

    /// Most recent cycle result
    pub async fn last_run(&self) -> Result<Option<RunResult>> {
        self.get_json(keys::LAST_RUN).await
    }

    /// Overwrite the cycle result record
    pub async fn set_last_run(&self, run: &RunResult) -> Result<()> {
        self.put_json(keys::LAST_RUN, run).await
    }

    /// Persisted source configuration, if any
    pub async fn sources(&self) -> Result<Option<Vec<ThreatSource>>> {
        self.get_json(keys::SOURCE_CONFIG).await
    }

    /// Replace the persisted source configuration
    pub async fn set_sources(&self, sources: &[ThreatSource]) -> Result<()> {
        self.put_json(keys::SOURCE_CONFIG, &sources).await
    }

    /// Ids of downstream lists created by the last multi-list publish
    pub async fn published_lists(&self) -> Result<Vec<String>> {
        Ok(self.get_json(keys::PUBLISHED_LISTS).await?.unwrap_or_default())
    }

    /// Record the ids of the currently published downstream lists
    pub async fn set_published_lists(&self, ids: &[String]) -> Result<()> {
        self.put_json(keys::PUBLISHED_LISTS, &ids).await
    }

    /// Delete every key, chunks included. Destructive; explicit reset only.
    pub async fn clear_all(&self) -> Result<()> {
        let all = self.kv.list("").await?;
        let count = all.len();
        self.delete_batched(&all).await?;
        warn!(keys = count, "store cleared");
        Ok(())
    }

    async fn delete_batched(&self, targets: &[String]) -> Result<()> {
        for batch in targets.chunks(DELETE_BATCH) {
            let deletes = batch.iter().map(|key| self.kv.delete(key));
            for outcome in join_all(deletes).await {
                outcome?;
            }
        }
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.kv.get(key).await? {
            None => Ok(None),
            Some(raw) => match serde_json::from_slice(&raw) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    warn!(key, error = %e, "corrupt store entry ignored");
                    Ok(None)
                }
            },
        }
    }

    async fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.kv.put(key, serde_json::to_vec(value)?).await
    }
}

/// Parse a serialized entry sequence, falling back to an empty set on
/// corrupt data (missing chunks are handled before this point)
fn parse_entries(blob: &[u8]) -> IndicatorSet {
    match serde_json::from_slice::<Vec<(String, Indicator)>>(blob) {
        Ok(entries) => IndicatorSet::from_entries(entries),
        Err(e) => {
            warn!(error = %e, "corrupt indicator blob, treating set as empty");
            IndicatorSet::new()
        }
    }
}

fn chunk_number(key: &str) -> Option<usize> {
    key.strip_prefix(keys::CHUNK_PREFIX)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;
    use chrono::Duration;
    use vigil_core::IndicatorType;

    fn sample_set(count: usize) -> IndicatorSet {
        let now = Utc::now();
        (0..count)
            .map(|i| {
                Indicator::new(
                    format!("198.51.{}.{}", i / 250, i % 250 + 1),
                    IndicatorType::Ip,
                    10.0,
                    "feed-a",
                    now,
                )
            })
            .collect()
    }

    fn small_store() -> IndicatorStore<MemoryKv> {
        // Limits tiny enough that a handful of indicators trips chunking.
        IndicatorStore::new(MemoryKv::new()).with_limits(512, 200)
    }

    #[tokio::test]
    async fn test_empty_store_loads_empty_set() {
        let store = IndicatorStore::new(MemoryKv::new());
        let set = store.load().await.unwrap();
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn test_small_set_single_entry_no_chunks() {
        let store = small_store();
        let set = sample_set(1);
        store.persist(&set).await.unwrap();

        assert!(store.kv.get(keys::INDICATORS).await.unwrap().is_some());
        assert!(store.kv.get(keys::CHUNK_INDEX).await.unwrap().is_none());
        assert!(store.kv.list(keys::CHUNK_PREFIX).await.unwrap().is_empty());

        assert_eq!(store.load().await.unwrap(), set);
    }

    #[tokio::test]
    async fn test_large_set_chunked_round_trip() {
        let store = small_store();
        let set = sample_set(50);
        store.persist(&set).await.unwrap();

        assert!(store.kv.get(keys::INDICATORS).await.unwrap().is_none());
        let raw = store.kv.get(keys::CHUNK_INDEX).await.unwrap().unwrap();
        let index: ChunkIndex = serde_json::from_slice(&raw).unwrap();
        assert!(index.total_chunks > 1);
        assert_eq!(
            store.kv.list(keys::CHUNK_PREFIX).await.unwrap().len(),
            index.total_chunks
        );

        assert_eq!(store.load().await.unwrap(), set);
    }

    #[tokio::test]
    async fn test_shrinking_set_tears_down_chunks() {
        let store = small_store();
        store.persist(&sample_set(50)).await.unwrap();
        assert!(store.kv.get(keys::CHUNK_INDEX).await.unwrap().is_some());

        let small = sample_set(1);
        store.persist(&small).await.unwrap();
        assert!(store.kv.get(keys::CHUNK_INDEX).await.unwrap().is_none());
        assert!(store.kv.list(keys::CHUNK_PREFIX).await.unwrap().is_empty());
        assert_eq!(store.load().await.unwrap(), small);
    }

    #[tokio::test]
    async fn test_regrowing_set_deletes_stale_chunks() {
        let store = small_store();
        store.persist(&sample_set(100)).await.unwrap();
        let before = store.kv.list(keys::CHUNK_PREFIX).await.unwrap().len();

        let smaller = sample_set(50);
        store.persist(&smaller).await.unwrap();
        let after = store.kv.list(keys::CHUNK_PREFIX).await.unwrap().len();
        assert!(after < before);
        assert_eq!(store.load().await.unwrap(), smaller);
    }

    #[tokio::test]
    async fn test_missing_chunk_is_a_hard_failure() {
        let store = small_store();
        store.persist(&sample_set(50)).await.unwrap();

        store.kv.delete(&keys::chunk_key(1)).await.unwrap();
        let err = store.load().await.unwrap_err();
        assert!(matches!(err, VigilError::MissingChunk { index: 1, .. }));
    }

    #[tokio::test]
    async fn test_corrupt_single_blob_loads_empty() {
        let store = IndicatorStore::new(MemoryKv::new());
        store
            .kv
            .put(keys::INDICATORS, b"not json".to_vec())
            .await
            .unwrap();
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_expired_removes_exactly_expired() {
        let store = IndicatorStore::new(MemoryKv::new());
        let now = Utc::now();

        let mut set = IndicatorSet::new();
        let mut stale = Indicator::new("1.2.3.4", IndicatorType::Ip, 10.0, "a", now);
        stale.expires_at = now - Duration::minutes(1);
        let mut boundary = Indicator::new("5.6.7.8", IndicatorType::Ip, 10.0, "a", now);
        boundary.expires_at = now;
        let live = Indicator::new("9.9.9.9", IndicatorType::Ip, 10.0, "a", now);
        set.insert(stale);
        set.insert(boundary);
        set.insert(live.clone());
        store.persist(&set).await.unwrap();

        let removed = store.cleanup_expired(now).await.unwrap();
        assert_eq!(removed, 2);

        let remaining = store.load().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining.get("9.9.9.9"), Some(&live));
    }

    #[tokio::test]
    async fn test_cleanup_with_nothing_expired_is_noop() {
        let store = IndicatorStore::new(MemoryKv::new());
        let set = sample_set(3);
        store.persist(&set).await.unwrap();

        let removed = store.cleanup_expired(Utc::now()).await.unwrap();
        assert_eq!(removed, 0);
        assert_eq!(store.load().await.unwrap(), set);
    }

    #[tokio::test]
    async fn test_point_ops_bypass_bulk_blob() {
        let store = IndicatorStore::new(MemoryKv::new());
        let ind = Indicator::new("8.8.8.8", IndicatorType::Ip, 30.0, "manual", Utc::now());

        store.put_indicator(&ind).await.unwrap();
        assert!(store.has_indicator("8.8.8.8").await.unwrap());
        assert_eq!(store.get_indicator("8.8.8.8").await.unwrap(), Some(ind));
        // The bulk set is untouched.
        assert!(store.load().await.unwrap().is_empty());

        store.delete_indicator("8.8.8.8").await.unwrap();
        assert!(!store.has_indicator("8.8.8.8").await.unwrap());
    }

    #[tokio::test]
    async fn test_scalar_accessors_round_trip() {
        let store = IndicatorStore::new(MemoryKv::new());

        let meta = FeedMetadata {
            feed_list_id: "list-1".to_string(),
            name: "vigil feed".to_string(),
            description: "aggregated indicators".to_string(),
            indicator_count: 12,
            last_updated: Some(Utc::now()),
            update_interval_hours: 24,
        };
        store.set_feed_metadata(&meta).await.unwrap();
        assert_eq!(store.feed_metadata().await.unwrap(), Some(meta));

        let when = Utc::now();
        store.set_last_update(when).await.unwrap();
        assert_eq!(store.last_update().await.unwrap(), Some(when));

        store
            .set_published_lists(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(store.published_lists().await.unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_clear_all_removes_everything() {
        let store = small_store();
        store.persist(&sample_set(50)).await.unwrap();
        store.set_last_update(Utc::now()).await.unwrap();

        store.clear_all().await.unwrap();
        assert_eq!(store.kv.key_count().await, 0);
        assert!(store.load().await.unwrap().is_empty());
    }
}
