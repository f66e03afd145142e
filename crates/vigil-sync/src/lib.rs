//! Orchestration of the vigil synchronization cycle.
//!
//! One cycle runs cleanup → collect → merge → persist → publish and then
//! records feed metadata and a run result. Per-source and per-list
//! failures are aggregated without aborting the cycle; a fatal step writes
//! a failed run result and re-raises to the caller.

mod engine;

pub use engine::{SyncConfig, SyncEngine, SyncStatus};
