//! # mosaic-core
//!
//! Core infrastructure for the mosaic postcode join.
//!
//! Provides shared abstractions for:
//! - Shard storage (reference files in, processed files out)
//! - Shard keys, coordinates and enriched output records
//! - The common error type
//!
//! The join engine itself lives in `mosaic-join`.

pub mod error;
pub mod storage;
pub mod types;

pub use error::{MosaicError, Result};
pub use storage::{LocalStorage, ShardStore};
pub use types::{Coordinates, EnrichedRecord, ShardKey, OUTPUT_HEADER, UNMATCHED_COORDINATE};
