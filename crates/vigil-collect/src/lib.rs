//! Concurrent collection of threat indicators from configured feeds.
//!
//! All enabled sources are fetched in one fan-out, each bounded by its own
//! timeout. A source that fails to fetch or parse contributes nothing and
//! is recorded in the pass statistics; it never fails the batch.

mod collector;
mod parse;

pub use collector::{CollectStats, Collector, SourceFailure};
pub use parse::{parse_plain, SourceBatch};
