//! Read-side queries over processed shard files.
//!
//! Downstream consumers look a single postcode up in the processed output
//! rather than the reference files, and compare postcodes by straight-line
//! grid distance.

use crate::io::{ProcessedReader, ProcessedRow, Result};
use crate::postcode::{canonical, normalize};
use mosaic_core::{Coordinates, EnrichedRecord, ShardStore};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Find a postcode's processed record.
///
/// Returns `None` if the postcode cannot be routed, its shard has no
/// processed file, or the file has no row for it.
pub fn find_processed<S: ShardStore>(store: &S, raw_postcode: &str) -> Result<Option<EnrichedRecord>> {
    let routed = normalize(raw_postcode);
    let Some(shard) = routed.shard else {
        return Ok(None);
    };
    let Some(reader) = store.open_output(&shard)? else {
        debug!("No processed file for shard '{}'", shard);
        return Ok(None);
    };

    for row in ProcessedReader::new(reader) {
        if let ProcessedRow::Record(record) = row? {
            if canonical(&record.postcode) == routed.postcode {
                return Ok(Some(record));
            }
        }
    }
    Ok(None)
}

/// Straight-line distance in metres between two grid references.
///
/// `None` if either side is the unmatched default or not numeric.
#[must_use]
pub fn distance(a: &Coordinates, b: &Coordinates) -> Option<f64> {
    let (ea, na) = a.as_metres()?;
    let (eb, nb) = b.as_metres()?;
    Some((eb - ea).hypot(nb - na))
}

/// Located and unlocated row counts for one subgroup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SubgroupTally {
    pub located: usize,
    pub unlocated: usize,
}

/// Per-subgroup totals over every processed shard file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessedSummary {
    /// Processed shard files read.
    pub shards: usize,
    /// Data rows read (headers excluded).
    pub rows: usize,
    /// Rows without exactly four fields.
    pub malformed: usize,
    /// Tallies keyed by subgroup code.
    pub subgroups: BTreeMap<String, SubgroupTally>,
}

impl ProcessedSummary {
    /// Rows with a usable grid reference.
    #[must_use]
    pub fn located(&self) -> usize {
        self.subgroups.values().map(|t| t.located).sum()
    }

    /// Rows carrying the default or a non-numeric grid reference.
    #[must_use]
    pub fn unlocated(&self) -> usize {
        self.subgroups.values().map(|t| t.unlocated).sum()
    }
}

/// Tally every processed shard file in the store by subgroup.
pub fn summarize<S: ShardStore>(store: &S) -> Result<ProcessedSummary> {
    let mut summary = ProcessedSummary::default();

    for shard in store.list_outputs()? {
        let Some(reader) = store.open_output(&shard)? else {
            continue;
        };
        summary.shards += 1;

        for row in ProcessedReader::new(reader) {
            match row? {
                ProcessedRow::Header => {}
                ProcessedRow::Malformed { line } => {
                    debug!("Malformed row in shard '{}' at line {}", shard, line);
                    summary.rows += 1;
                    summary.malformed += 1;
                }
                ProcessedRow::Record(record) => {
                    summary.rows += 1;
                    let tally = summary.subgroups.entry(record.subgroup.clone()).or_default();
                    if record.is_located() {
                        tally.located += 1;
                    } else {
                        debug!("No location data for postcode '{}'", record.postcode);
                        tally.unlocated += 1;
                    }
                }
            }
        }
    }

    Ok(summary)
}
