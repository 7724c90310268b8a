//! Shard lifecycle: at most one shard is active at a time.
//!
//! When the join presents a shard key different from the active one, the
//! manager closes the active shard (flushing its output and dropping its
//! index and dedup set) and then tries to open the new one. A shard without a
//! reference file is recorded as omitted and never retried; its records are
//! dropped without touching whichever shard is active.
//!
//! A shard that was active earlier in the run and comes back later is
//! reopened in append mode, with its dedup set seeded from the rows already
//! written, so output from the earlier activation is never truncated or
//! duplicated.

use crate::index::ShardIndex;
use crate::io::{ProcessedReader, ProcessedRow, Result};
use crate::sink::OutputSink;
use mosaic_core::{EnrichedRecord, ShardKey, ShardStore};
use std::collections::HashSet;
use std::io::Write;
use tracing::{debug, info, warn};

/// Summary of one shard activation, produced when it closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardSummary {
    pub key: ShardKey,
    pub rows_written: u64,
    pub index_entries: usize,
}

/// Resources owned by the active shard.
pub struct ShardState<W: Write> {
    index: ShardIndex,
    sink: OutputSink<W>,
    emitted: HashSet<String>,
}

impl<W: Write> ShardState<W> {
    /// Assemble a state from an index and a sink, with an empty dedup set.
    pub fn new(index: ShardIndex, sink: OutputSink<W>) -> Self {
        Self {
            index,
            sink,
            emitted: HashSet::new(),
        }
    }

    /// First activation of a shard: build its index and create its output.
    ///
    /// Returns `Ok(None)` if the shard has no reference file; no output is
    /// created in that case.
    pub fn open<S>(store: &S, key: &ShardKey) -> Result<Option<Self>>
    where
        S: ShardStore<Writer = W>,
    {
        let Some(index) = ShardIndex::build(store, key)? else {
            return Ok(None);
        };
        let sink = OutputSink::open(store, key.clone())?;
        Ok(Some(Self::new(index, sink)))
    }

    /// Re-activation of a shard closed earlier in the run.
    ///
    /// Rebuilds the index and re-reads the shard's whole output to seed the
    /// dedup set, so an input that keeps alternating between shards costs
    /// time quadratic in the output written so far.
    pub fn reopen<S>(store: &S, key: &ShardKey) -> Result<Option<Self>>
    where
        S: ShardStore<Writer = W>,
    {
        let Some(index) = ShardIndex::build(store, key)? else {
            return Ok(None);
        };

        let mut emitted = HashSet::new();
        if let Some(existing) = store.open_output(key)? {
            for row in ProcessedReader::new(existing) {
                if let ProcessedRow::Record(record) = row? {
                    emitted.insert(record.postcode);
                }
            }
        }

        let sink = OutputSink::reopen(store, key.clone())?;
        Ok(Some(Self {
            index,
            sink,
            emitted,
        }))
    }

    /// The shard's key.
    #[must_use]
    pub fn key(&self) -> &ShardKey {
        self.sink.shard()
    }

    /// The shard's reference index.
    #[must_use]
    pub fn index(&self) -> &ShardIndex {
        &self.index
    }

    /// Record `postcode` as emitted. Returns `false` if it already was.
    pub fn admit(&mut self, postcode: &str) -> bool {
        if self.emitted.contains(postcode) {
            return false;
        }
        self.emitted.insert(postcode.to_string())
    }

    /// Append a record to the shard's output.
    pub fn write(&mut self, record: &EnrichedRecord) -> Result<()> {
        self.sink.write(record)
    }

    /// Postcodes emitted to this shard so far, including earlier activations.
    #[must_use]
    pub fn emitted(&self) -> usize {
        self.emitted.len()
    }

    /// Flush and close the output, releasing the index and dedup set.
    pub fn close(mut self) -> Result<ShardSummary> {
        self.sink.close()?;
        Ok(ShardSummary {
            key: self.sink.shard().clone(),
            rows_written: self.sink.rows_written(),
            index_entries: self.index.len(),
        })
    }
}

/// Shard activation counters for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShardCounters {
    /// First activations.
    pub opened: usize,
    /// Re-activations of shards closed earlier in the run.
    pub reopened: usize,
    /// Largest index held at once.
    pub peak_index_entries: usize,
}

/// Owns the active shard and the set of omitted shards.
pub struct ShardManager<S: ShardStore> {
    store: S,
    active: Option<ShardState<S::Writer>>,
    omitted: Vec<ShardKey>,
    omitted_set: HashSet<ShardKey>,
    completed: HashSet<ShardKey>,
    counters: ShardCounters,
}

impl<S: ShardStore> ShardManager<S> {
    /// Create a manager with no active shard.
    pub fn new(store: S) -> Self {
        Self {
            store,
            active: None,
            omitted: Vec::new(),
            omitted_set: HashSet::new(),
            completed: HashSet::new(),
            counters: ShardCounters::default(),
        }
    }

    /// Make `key` the current shard.
    ///
    /// Returns the active state, or `None` if the shard is omitted. Presenting
    /// the active key again is a no-op.
    pub fn activate(&mut self, key: &ShardKey) -> Result<Option<&mut ShardState<S::Writer>>> {
        if self.omitted_set.contains(key) {
            return Ok(None);
        }

        let is_active = self.active.as_ref().is_some_and(|state| state.key() == key);
        if !is_active {
            self.close_active()?;
            self.open(key)?;
        }

        Ok(self.active.as_mut())
    }

    fn open(&mut self, key: &ShardKey) -> Result<()> {
        let reopening = self.completed.contains(key);
        let state = if reopening {
            ShardState::reopen(&self.store, key)?
        } else {
            ShardState::open(&self.store, key)?
        };

        let Some(state) = state else {
            warn!(
                "No reference file for shard '{}'; its records will be omitted",
                key
            );
            self.omitted.push(key.clone());
            self.omitted_set.insert(key.clone());
            return Ok(());
        };

        if reopening {
            self.counters.reopened += 1;
            info!(
                "Reopened shard '{}' ({} entries, {} postcodes already written)",
                key,
                state.index().len(),
                state.emitted()
            );
        } else {
            self.counters.opened += 1;
            info!("Opened shard '{}' ({} entries)", key, state.index().len());
        }
        self.counters.peak_index_entries = self.counters.peak_index_entries.max(state.index().len());
        self.active = Some(state);
        Ok(())
    }

    fn close_active(&mut self) -> Result<()> {
        if let Some(state) = self.active.take() {
            let summary = state.close()?;
            info!(
                "Finished writing shard '{}' to {} ({} rows)",
                summary.key,
                self.store.describe_output(&summary.key),
                summary.rows_written
            );
            self.completed.insert(summary.key);
        }
        Ok(())
    }

    /// The active shard, if any.
    #[must_use]
    pub fn active(&self) -> Option<&ShardState<S::Writer>> {
        self.active.as_ref()
    }

    /// Whether `key` has been omitted for lack of a reference file.
    #[must_use]
    pub fn is_omitted(&self, key: &ShardKey) -> bool {
        self.omitted_set.contains(key)
    }

    /// Omitted shards, in the order they were first seen.
    #[must_use]
    pub fn omitted(&self) -> &[ShardKey] {
        &self.omitted
    }

    /// Activation counters so far.
    #[must_use]
    pub fn counters(&self) -> ShardCounters {
        self.counters
    }

    /// Close the active shard and return the omitted shards.
    pub fn finish(mut self) -> Result<Vec<ShardKey>> {
        self.close_active()?;
        debug!("Shard manager finished: {:?}", self.counters);
        Ok(std::mem::take(&mut self.omitted))
    }
}
