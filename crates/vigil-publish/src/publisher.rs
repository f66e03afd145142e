//! Capacity-aware, idempotent publishing.

use crate::client::ListClient;
use crate::retry::{with_retry, RetryPolicy};
use chrono::Utc;
use std::time::Duration;
use tracing::{debug, info, warn};
use vigil_core::{IndicatorSet, ListItem, Result, UploadResult};

/// Maximum items the downstream system accepts in one list
pub const LIST_CAP: usize = 4_500;

/// Maximum items per append request
pub const BATCH_MAX: usize = 1_000;

/// Reserved name prefix identifying lists this system created
pub const MANAGED_PREFIX: &str = "Vigil-";

/// List type sent on creation
const LIST_KIND: &str = "INDICATOR";

/// Pause between append batches within one list
const BATCH_DELAY: Duration = Duration::from_millis(250);

/// Pause between list creations on the multi-list path
const LIST_DELAY: Duration = Duration::from_secs(1);

/// Publishes the merged indicator set downstream by full replacement.
///
/// Work is deliberately sequential across batches and lists: the pauses
/// protect a rate limit shared with everything else on the account, so
/// parallelizing would defeat them.
pub struct Publisher {
    client: ListClient,
    retry: RetryPolicy,
    list_cap: usize,
    batch_max: usize,
    batch_delay: Duration,
    list_delay: Duration,
}

impl Publisher {
    /// Create a publisher with production limits and pacing
    #[must_use]
    pub fn new(client: ListClient) -> Self {
        Self {
            client,
            retry: RetryPolicy::default(),
            list_cap: LIST_CAP,
            batch_max: BATCH_MAX,
            batch_delay: BATCH_DELAY,
            list_delay: LIST_DELAY,
        }
    }

    /// Override the retry policy
    #[must_use]
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Override the per-list cap and per-request batch cap (tests)
    #[must_use]
    pub fn limits(mut self, list_cap: usize, batch_max: usize) -> Self {
        self.list_cap = list_cap;
        self.batch_max = batch_max;
        self
    }

    /// Override the cooperative pacing delays (tests)
    #[must_use]
    pub fn pacing(mut self, batch_delay: Duration, list_delay: Duration) -> Self {
        self.batch_delay = batch_delay;
        self.list_delay = list_delay;
        self
    }

    /// Cheap credential check used at initialize
    pub async fn verify_access(&self) -> Result<()> {
        with_retry(&self.retry, || self.client.list_all()).await?;
        Ok(())
    }

    /// Make the downstream state match `set`.
    ///
    /// At or under the per-list cap, the target list is cleared and
    /// re-appended in batches. Over the cap, previously managed lists are
    /// deleted and the set is republished across date-stamped partitions.
    /// Either way the operation is a full replacement: re-running with the
    /// same set converges to the same downstream state.
    pub async fn publish(&self, feed_list_id: &str, set: &IndicatorSet) -> Result<UploadResult> {
        let items: Vec<ListItem> = set
            .to_entries()
            .iter()
            .map(|(_, ind)| ListItem::from_indicator(ind))
            .collect();

        if items.len() <= self.list_cap {
            self.publish_single(feed_list_id, &items).await
        } else {
            self.publish_partitioned(&items).await
        }
    }

    async fn publish_single(&self, list_id: &str, items: &[ListItem]) -> Result<UploadResult> {
        info!(list_id, items = items.len(), "publishing to single list");

        with_retry(&self.retry, || self.client.replace_items(list_id, &[])).await?;
        self.append_batched(list_id, items).await?;

        Ok(UploadResult {
            success: true,
            items_uploaded: items.len(),
            lists: Vec::new(),
            failed_lists: Vec::new(),
        })
    }

    async fn publish_partitioned(&self, items: &[ListItem]) -> Result<UploadResult> {
        self.delete_managed_lists().await?;

        let slices = partition(items, self.list_cap);
        let total = slices.len();
        let date = Utc::now().format("%Y%m%d");
        info!(items = items.len(), partitions = total, "publishing partitioned");

        let mut result = UploadResult::default();
        for (idx, slice) in slices.into_iter().enumerate() {
            if idx > 0 {
                tokio::time::sleep(self.list_delay).await;
            }

            let name = format!("{MANAGED_PREFIX}{date}-Part{:03}of{total:03}", idx + 1);
            let list = match with_retry(&self.retry, || {
                self.client
                    .create_list(&name, "vigil aggregated threat indicators", LIST_KIND)
            })
            .await
            {
                Ok(list) => list,
                Err(e) => {
                    warn!(list = %name, error = %e, "list creation failed, continuing");
                    result.failed_lists.push(name);
                    continue;
                }
            };

            match self.append_batched(&list.id, slice).await {
                Ok(()) => {
                    result.items_uploaded += slice.len();
                    result.lists.push(list);
                }
                Err(e) => {
                    // The list exists downstream even though population
                    // failed; keep its id so the next cycle can clean up.
                    warn!(list = %list.name, error = %e, "list population failed, continuing");
                    result.failed_lists.push(list.name.clone());
                    result.lists.push(list);
                }
            }
        }

        result.success = result.failed_lists.is_empty();
        Ok(result)
    }

    /// Delete every list carrying the managed prefix, bounding list
    /// accumulation across cycles
    async fn delete_managed_lists(&self) -> Result<()> {
        let existing = with_retry(&self.retry, || self.client.list_all()).await?;
        for list in existing
            .iter()
            .filter(|l| l.name.starts_with(MANAGED_PREFIX))
        {
            debug!(id = %list.id, name = %list.name, "deleting managed list");
            if let Err(e) =
                with_retry(&self.retry, || self.client.delete_list(&list.id)).await
            {
                warn!(id = %list.id, error = %e, "stale list delete failed, continuing");
            }
        }
        Ok(())
    }

    async fn append_batched(&self, list_id: &str, items: &[ListItem]) -> Result<()> {
        for (i, batch) in items.chunks(self.batch_max).enumerate() {
            if i > 0 {
                tokio::time::sleep(self.batch_delay).await;
            }
            with_retry(&self.retry, || self.client.append_items(list_id, batch)).await?;
            debug!(list_id, batch = i + 1, size = batch.len(), "batch appended");
        }
        Ok(())
    }
}

/// Split items into ordered slices of at most `cap` each
fn partition(items: &[ListItem], cap: usize) -> Vec<&[ListItem]> {
    items.chunks(cap).collect()
}
