//! # mosaic-join
//!
//! Enrich a demographic classification extract with grid references by
//! joining each record's postcode against region-sharded reference files.
//!
//! ## Features
//!
//! - **Single pass**: the primary extract is streamed once, record by record
//! - **Per-shard hash index**: one region's reference file is loaded in full
//!   when the region becomes active and dropped when it closes
//! - **Exact dedup** of postcodes within each region
//! - **Omission report** of regions with no reference file
//! - **Processed lookups**: find a postcode's subgroup and grid reference,
//!   and summarize output by subgroup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mosaic_join::{join_file, JoinConfig};
//!
//! let config = JoinConfig::new("data/os-open", "data/processed/postcodes");
//! let stats = join_file("data/mosaic/PC_Extract.csv", &config).unwrap();
//!
//! println!("{} rows written, {} defaulted", stats.written(), stats.defaulted);
//! println!("Omitted regions: {:?}", stats.omitted_shards);
//! ```
//!
//! ## Modules
//!
//! - [`postcode`]: canonical postcodes and shard routing
//! - [`index`]: per-shard postcode to grid reference index
//! - [`sink`]: per-shard output writer
//! - [`shard`]: active-shard lifecycle and omissions
//! - [`engine`]: the streaming join
//! - [`lookup`]: queries over processed output

pub mod config;
pub mod engine;
pub mod index;
pub mod io;
pub mod lookup;
pub mod postcode;
pub mod shard;
pub mod sink;

pub use config::JoinConfig;
pub use engine::{join_file, Disposition, JoinEngine, JoinStats};
pub use index::{IndexStats, ShardIndex};
pub use io::{
    JoinError, PrimaryReader, PrimaryRecord, PrimaryRow, ProcessedReader, ProcessedRow,
    ReferenceEntry, ReferenceReader, ReferenceRow, Result,
};
pub use lookup::{distance, find_processed, summarize, ProcessedSummary, SubgroupTally};
pub use postcode::{normalize, RoutedPostcode};
pub use shard::{ShardCounters, ShardManager, ShardState, ShardSummary};
pub use sink::OutputSink;

pub use mosaic_core::{Coordinates, EnrichedRecord, LocalStorage, ShardKey, ShardStore};
