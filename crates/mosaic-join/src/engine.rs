//! Streaming join of a demographic extract against region-sharded reference
//! files.
//!
//! The primary extract is read once, one record at a time. Each eligible
//! record is routed to a shard by its postcode, deduplicated within that
//! shard, looked up in the shard's index and written to the shard's output,
//! with `0,0` coordinates when the postcode has no reference entry.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mosaic_join::config::JoinConfig;
//! use mosaic_join::engine::join_file;
//!
//! let config = JoinConfig::new("data/os-open", "data/processed/postcodes");
//! let stats = join_file("PC_Extract.csv", &config).unwrap();
//! println!("Wrote {} rows, omitted shards: {:?}", stats.written(), stats.omitted_shards);
//! ```
//!
//! ## Lower-level use
//!
//! ```rust,no_run
//! use mosaic_core::LocalStorage;
//! use mosaic_join::engine::JoinEngine;
//!
//! let store = LocalStorage::new("refs", "out").unwrap();
//! let mut engine = JoinEngine::new(store, "F");
//! engine.process_file("extract.csv").unwrap();
//! let stats = engine.finish().unwrap();
//! ```

use crate::config::JoinConfig;
use crate::io::{PrimaryReader, PrimaryRecord, PrimaryRow, Result};
use crate::postcode::normalize;
use crate::shard::ShardManager;
use mosaic_core::{Coordinates, EnrichedRecord, LocalStorage, ShardKey, ShardStore};
use serde::Serialize;
use std::io::Read;
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// What happened to one primary row. Every row gets exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Fewer fields than a primary record needs; skipped.
    Malformed,
    /// Eligibility flag did not match; skipped.
    Ineligible,
    /// Postcode yields no shard key; skipped.
    Unroutable,
    /// Shard has no reference file; dropped.
    OmittedShard,
    /// Postcode already written to this shard; dropped.
    Duplicate,
    /// Written with reference coordinates.
    Matched,
    /// Written with `0,0` coordinates.
    Defaulted,
}

impl Disposition {
    /// Whether the row produced an output record.
    #[must_use]
    pub fn is_written(self) -> bool {
        matches!(self, Self::Matched | Self::Defaulted)
    }
}

/// Statistics from a join run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JoinStats {
    /// Primary rows read.
    pub rows: usize,
    pub malformed: usize,
    pub ineligible: usize,
    pub unroutable: usize,
    /// Eligible rows dropped because their shard has no reference file.
    pub omitted_rows: usize,
    pub duplicates: usize,
    /// Rows written with reference coordinates.
    pub matched: usize,
    /// Rows written with default coordinates.
    pub defaulted: usize,
    pub shards_opened: usize,
    pub shards_reopened: usize,
    /// Largest shard index held in memory.
    pub peak_index_entries: usize,
    /// Shards without a reference file, each once, in first-seen order.
    pub omitted_shards: Vec<ShardKey>,
    /// Processing time in seconds.
    pub elapsed_secs: f64,
}

impl JoinStats {
    /// Rows that passed the field-count and eligibility checks.
    #[must_use]
    pub fn eligible(&self) -> usize {
        self.rows - self.malformed - self.ineligible
    }

    /// Rows written to output.
    #[must_use]
    pub fn written(&self) -> usize {
        self.matched + self.defaulted
    }

    /// Throughput in primary rows per second.
    #[must_use]
    pub fn throughput(&self) -> f64 {
        if self.elapsed_secs > 0.0 {
            self.rows as f64 / self.elapsed_secs
        } else {
            0.0
        }
    }

    fn record(&mut self, disposition: Disposition) {
        self.rows += 1;
        match disposition {
            Disposition::Malformed => self.malformed += 1,
            Disposition::Ineligible => self.ineligible += 1,
            Disposition::Unroutable => self.unroutable += 1,
            Disposition::OmittedShard => self.omitted_rows += 1,
            Disposition::Duplicate => self.duplicates += 1,
            Disposition::Matched => self.matched += 1,
            Disposition::Defaulted => self.defaulted += 1,
        }
    }
}

/// Single-pass join engine.
///
/// If processing stops early on an error, dropping the engine still flushes
/// the active shard's output.
pub struct JoinEngine<S: ShardStore> {
    manager: ShardManager<S>,
    eligible_group: String,
    report_interval: usize,
    stats: JoinStats,
    started: Instant,
}

impl<S: ShardStore> JoinEngine<S> {
    /// Create an engine that joins records whose eligibility flag equals
    /// `eligible_group`.
    pub fn new(store: S, eligible_group: impl Into<String>) -> Self {
        Self {
            manager: ShardManager::new(store),
            eligible_group: eligible_group.into(),
            report_interval: usize::MAX,
            stats: JoinStats::default(),
            started: Instant::now(),
        }
    }

    /// Log progress every `rows` primary rows.
    #[must_use]
    pub fn with_report_interval(mut self, rows: usize) -> Self {
        self.report_interval = rows.max(1);
        self
    }

    /// Process one parsed primary row.
    pub fn process_row(&mut self, row: &PrimaryRow) -> Result<Disposition> {
        let disposition = match row {
            PrimaryRow::Short { .. } => Disposition::Malformed,
            PrimaryRow::Record(record) => self.join(record)?,
        };
        self.tally(disposition);
        Ok(disposition)
    }

    /// Process one well-formed primary record.
    pub fn process_record(&mut self, record: &PrimaryRecord) -> Result<Disposition> {
        let disposition = self.join(record)?;
        self.tally(disposition);
        Ok(disposition)
    }

    /// Process every row of a primary extract.
    pub fn process_stream<R: Read>(&mut self, input: R) -> Result<()> {
        for row in PrimaryReader::new(input) {
            self.process_row(&row?)?;
        }
        Ok(())
    }

    /// Process a primary extract file.
    pub fn process_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        for row in PrimaryReader::from_path(path)? {
            self.process_row(&row?)?;
        }
        Ok(())
    }

    fn join(&mut self, record: &PrimaryRecord) -> Result<Disposition> {
        if record.group != self.eligible_group {
            return Ok(Disposition::Ineligible);
        }

        let routed = normalize(&record.postcode);
        let Some(shard) = routed.shard else {
            return Ok(Disposition::Unroutable);
        };

        let Some(state) = self.manager.activate(&shard)? else {
            return Ok(Disposition::OmittedShard);
        };

        if !state.admit(&routed.postcode) {
            return Ok(Disposition::Duplicate);
        }

        let (coordinates, disposition) = match state.index().lookup(&routed.postcode) {
            Some(found) => (found.clone(), Disposition::Matched),
            None => (Coordinates::unmatched(), Disposition::Defaulted),
        };
        state.write(&EnrichedRecord::new(
            routed.postcode,
            record.subgroup.clone(),
            coordinates,
        ))?;
        Ok(disposition)
    }

    fn tally(&mut self, disposition: Disposition) {
        self.stats.record(disposition);
        if self.stats.rows % self.report_interval == 0 {
            let elapsed = self.started.elapsed().as_secs_f64();
            info!(
                "Processed {} rows ({} written, {} omitted shards) - {:.0} rows/sec",
                self.stats.rows,
                self.stats.written(),
                self.manager.omitted().len(),
                self.stats.rows as f64 / elapsed.max(f64::EPSILON)
            );
        }
    }

    /// Statistics so far. Shard counters and omissions are filled in by
    /// [`finish`](Self::finish).
    #[must_use]
    pub fn stats(&self) -> &JoinStats {
        &self.stats
    }

    /// Shards omitted so far.
    #[must_use]
    pub fn omitted_shards(&self) -> &[ShardKey] {
        self.manager.omitted()
    }

    /// Close the active shard and return the run's statistics.
    pub fn finish(self) -> Result<JoinStats> {
        let Self {
            manager,
            mut stats,
            started,
            ..
        } = self;

        let counters = manager.counters();
        stats.omitted_shards = manager.finish()?;
        stats.shards_opened = counters.opened;
        stats.shards_reopened = counters.reopened;
        stats.peak_index_entries = counters.peak_index_entries;
        stats.elapsed_secs = started.elapsed().as_secs_f64();

        let omitted: Vec<&str> = stats.omitted_shards.iter().map(ShardKey::as_str).collect();
        info!(
            "Join finished: {} rows written across {} shards; omitted shards: {:?}",
            stats.written(),
            stats.shards_opened,
            omitted
        );
        Ok(stats)
    }
}

/// Join a primary extract file using local reference and output directories.
pub fn join_file<P: AsRef<Path>>(input: P, config: &JoinConfig) -> Result<JoinStats> {
    config.validate()?;
    let store = LocalStorage::new(&config.reference_dir, &config.output_dir)?;
    let mut engine = JoinEngine::new(store, config.eligible_group.clone())
        .with_report_interval(config.report_interval);
    engine.process_file(input)?;
    engine.finish()
}
