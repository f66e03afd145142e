//! Durable persistence for the vigil indicator set.
//!
//! The backing medium is a plain key/value store with no multi-key
//! transactions and a hard per-value size ceiling. [`IndicatorStore`] works
//! around the ceiling by splitting oversized blobs into fixed-size chunks
//! tracked by an index record, and reassembling them on load.
//!
//! Two backends ship here: [`MemoryKv`] for tests and [`DiskKv`] for a
//! file-per-key store under a local data directory.

pub mod keys;
mod kv;
mod store;

pub use kv::{DiskKv, KvStore, MemoryKv, VALUE_CEILING};
pub use store::{ChunkIndex, IndicatorStore, CHUNK_SIZE, DELETE_BATCH, SINGLE_VALUE_THRESHOLD};
