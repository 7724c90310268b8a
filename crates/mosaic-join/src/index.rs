//! Per-shard postcode index.
//!
//! A shard's reference file is consumed once, in full, into a hash map before
//! any lookup is answered. Lookups are therefore independent of the order in
//! which primary records arrive relative to the reference file's physical
//! order, at the cost of holding one shard's reference data in memory.
//!
//! Reference files may repeat a postcode; the last entry read wins.

use crate::io::{ReferenceReader, ReferenceRow, Result};
use mosaic_core::{Coordinates, ShardKey, ShardStore};
use std::collections::HashMap;
use std::io::Read;
use tracing::debug;

/// Counters from building one shard index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Reference rows read.
    pub rows: usize,
    /// Rows skipped for missing fields.
    pub skipped: usize,
    /// Rows that replaced an earlier entry for the same postcode.
    pub replaced: usize,
}

/// In-memory map from canonical postcode to grid reference for one shard.
#[derive(Debug, Default)]
pub struct ShardIndex {
    entries: HashMap<String, Coordinates>,
    stats: IndexStats,
}

impl ShardIndex {
    /// Build the index for `key` from the store.
    ///
    /// Returns `Ok(None)` if the shard has no reference file.
    pub fn build<S: ShardStore>(store: &S, key: &ShardKey) -> Result<Option<Self>> {
        let Some(reader) = store.open_reference(key)? else {
            return Ok(None);
        };
        let index = Self::from_reader(reader)?;
        debug!(
            "Indexed shard '{}': {} entries from {} rows ({} skipped, {} replaced)",
            key,
            index.len(),
            index.stats.rows,
            index.stats.skipped,
            index.stats.replaced
        );
        Ok(Some(index))
    }

    /// Build an index by consuming a reference file to the end.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut index = Self::default();
        for row in ReferenceReader::new(reader) {
            index.stats.rows += 1;
            match row? {
                ReferenceRow::Entry(entry) => {
                    if index
                        .entries
                        .insert(entry.postcode, entry.coordinates)
                        .is_some()
                    {
                        index.stats.replaced += 1;
                    }
                }
                ReferenceRow::Skipped { .. } => index.stats.skipped += 1,
            }
        }
        Ok(index)
    }

    /// Coordinates for a canonical postcode.
    #[must_use]
    pub fn lookup(&self, postcode: &str) -> Option<&Coordinates> {
        self.entries.get(postcode)
    }

    /// Number of distinct postcodes indexed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no postcodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Counters from the build.
    #[must_use]
    pub fn stats(&self) -> IndexStats {
        self.stats
    }
}
