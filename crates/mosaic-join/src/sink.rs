//! Per-shard output file.

use crate::io::{JoinError, Result};
use mosaic_core::{EnrichedRecord, ShardKey, ShardStore, OUTPUT_HEADER};
use std::io::Write;
use tracing::warn;

/// CSV writer for one shard's enriched records.
///
/// Closing is idempotent, and a sink still open when dropped is flushed, so
/// an early return never leaves a shard's buffered rows unwritten.
pub struct OutputSink<W: Write> {
    shard: ShardKey,
    writer: Option<csv::Writer<W>>,
    rows: u64,
}

impl<W: Write> OutputSink<W> {
    /// Start a fresh output, writing the header row.
    pub fn create(shard: ShardKey, inner: W) -> Result<Self> {
        let mut writer = csv::Writer::from_writer(inner);
        writer.write_record(OUTPUT_HEADER)?;
        Ok(Self {
            shard,
            writer: Some(writer),
            rows: 0,
        })
    }

    /// Continue an output that already has its header.
    pub fn resume(shard: ShardKey, inner: W) -> Self {
        Self {
            shard,
            writer: Some(csv::Writer::from_writer(inner)),
            rows: 0,
        }
    }

    /// Create or truncate the shard's output in `store` and write the header.
    pub fn open<S>(store: &S, shard: ShardKey) -> Result<Self>
    where
        S: ShardStore<Writer = W>,
    {
        let inner = store.create_output(&shard)?;
        Self::create(shard, inner)
    }

    /// Reopen the shard's output in `store` for appending.
    pub fn reopen<S>(store: &S, shard: ShardKey) -> Result<Self>
    where
        S: ShardStore<Writer = W>,
    {
        let inner = store.append_output(&shard)?;
        Ok(Self::resume(shard, inner))
    }

    /// Append one record.
    pub fn write(&mut self, record: &EnrichedRecord) -> Result<()> {
        let writer = self.writer.as_mut().ok_or_else(|| JoinError::SinkClosed {
            shard: self.shard.clone(),
        })?;
        writer.write_record(record.as_row())?;
        self.rows += 1;
        Ok(())
    }

    /// Flush and release the output. Safe to call more than once.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }

    /// Records written through this sink (the header is not counted).
    #[must_use]
    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    /// The shard this sink writes.
    #[must_use]
    pub fn shard(&self) -> &ShardKey {
        &self.shard
    }
}

impl<W: Write> Drop for OutputSink<W> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to flush output for shard '{}': {}", self.shard, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_core::Coordinates;

    fn key() -> ShardKey {
        ShardKey::new("ab").unwrap()
    }

    #[test]
    fn test_header_then_rows() {
        let mut buf = Vec::new();
        {
            let mut sink = OutputSink::create(key(), &mut buf).unwrap();
            sink.write(&EnrichedRecord::new(
                "AB12CD",
                "22",
                Coordinates::new("100", "200"),
            ))
            .unwrap();
            sink.write(&EnrichedRecord::new("AB12CE", "23", Coordinates::unmatched()))
                .unwrap();
            assert_eq!(sink.rows_written(), 2);
            sink.close().unwrap();
        }

        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text,
            "Postcode,Type,Northings,Eastings\nAB12CD,22,200,100\nAB12CE,23,0,0\n"
        );
    }

    #[test]
    fn test_resume_skips_header() {
        let mut buf = Vec::new();
        {
            let mut sink = OutputSink::resume(key(), &mut buf);
            sink.write(&EnrichedRecord::new("AB12CD", "22", Coordinates::unmatched()))
                .unwrap();
        }
        assert_eq!(String::from_utf8(buf).unwrap(), "AB12CD,22,0,0\n");
    }

    #[test]
    fn test_close_is_idempotent_and_rejects_writes() {
        let mut buf = Vec::new();
        {
            let mut sink = OutputSink::create(key(), &mut buf).unwrap();
            sink.close().unwrap();
            sink.close().unwrap();

            let err = sink
                .write(&EnrichedRecord::new("AB12CD", "22", Coordinates::unmatched()))
                .unwrap_err();
            assert!(matches!(err, JoinError::SinkClosed { .. }));
            assert_eq!(sink.shard(), &key());
        }
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "Postcode,Type,Northings,Eastings\n"
        );
    }

    #[test]
    fn test_drop_flushes() {
        let mut buf = Vec::new();
        {
            let mut sink = OutputSink::create(key(), &mut buf).unwrap();
            sink.write(&EnrichedRecord::new("AB12CD", "22", Coordinates::unmatched()))
                .unwrap();
        }
        assert!(String::from_utf8(buf).unwrap().ends_with("AB12CD,22,0,0\n"));
    }

    #[test]
    fn test_fields_needing_quotes_round_trip() {
        let record = EnrichedRecord::new("AB12CD", "2,2", Coordinates::new("1", "2"));
        let mut buf = Vec::new();
        {
            let mut sink = OutputSink::create(key(), &mut buf).unwrap();
            sink.write(&record).unwrap();
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(buf.as_slice());
        let row = reader.records().next().unwrap().unwrap();
        assert_eq!(row.len(), 4);
        assert_eq!(EnrichedRecord::from_row(row.iter()), Some(record));
    }
}
