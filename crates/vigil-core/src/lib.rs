//! Core types and logic for the vigil threat-feed pipeline.
//!
//! This crate provides the foundation shared by every other vigil crate:
//!
//! - **Types**: indicators, sources, feed metadata, run results
//! - **Validation**: IP/domain extraction and normalization rules
//! - **Merge**: the score-dampening merge of fresh and persisted sets
//! - **Errors**: the pipeline-wide error taxonomy with [`VigilError`]

mod error;
pub mod merge;
pub mod types;
pub mod validation;

pub use error::{Result, VigilError};
pub use types::*;
