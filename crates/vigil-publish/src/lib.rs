//! Publishing the merged indicator set to the downstream list system.
//!
//! The downstream system imposes a per-list item cap, a per-request batch
//! cap, and a shared rate limit (HTTP 429). [`Publisher`] makes the
//! downstream state match the indicator set by full replacement: the
//! single-list path clears and re-appends, the multi-list path deletes the
//! previously managed lists and recreates date-stamped partitions.
//!
//! Every request goes through one retry primitive ([`with_retry`]) that
//! backs off exponentially on 429 and surfaces anything else immediately.

mod client;
mod publisher;
mod retry;

pub use client::{ListClient, ListClientBuilder};
pub use publisher::{Publisher, BATCH_MAX, LIST_CAP, MANAGED_PREFIX};
pub use retry::{with_retry, RetryPolicy};
