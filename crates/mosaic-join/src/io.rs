//! CSV record I/O for the primary extract, reference files and processed
//! output.
//!
//! All three are headerless-by-default CSV with fixed field positions. Rows
//! are read as raw bytes and decoded lossily, so a stray non-UTF-8 byte in an
//! extract never aborts a run.

use crate::postcode::canonical_reference;
use csv::{ByteRecord, ReaderBuilder};
use mosaic_core::{Coordinates, EnrichedRecord, MosaicError, ShardKey};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

/// Primary extract: raw postcode column.
pub const PRIMARY_POSTCODE: usize = 0;
/// Primary extract: eligibility flag column.
pub const PRIMARY_GROUP: usize = 3;
/// Primary extract: subgroup code column.
pub const PRIMARY_SUBGROUP: usize = 4;
/// Rows with fewer fields than this are malformed.
pub const PRIMARY_MIN_FIELDS: usize = 4;

/// Reference file: postcode column.
pub const REFERENCE_POSTCODE: usize = 0;
/// Reference file: easting column.
pub const REFERENCE_EASTING: usize = 2;
/// Reference file: northing column.
pub const REFERENCE_NORTHING: usize = 3;

/// Errors that can occur during a join.
#[derive(Error, Debug)]
pub enum JoinError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] MosaicError),

    #[error("Output for shard '{shard}' is already closed")]
    SinkClosed { shard: ShardKey },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for join operations.
pub type Result<T> = std::result::Result<T, JoinError>;

fn field(record: &ByteRecord, index: usize) -> String {
    record
        .get(index)
        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
        .unwrap_or_default()
}

fn line_of(record: &ByteRecord) -> u64 {
    record.position().map_or(0, csv::Position::line)
}

fn headerless<R: Read>(reader: R) -> csv::Reader<R> {
    ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader)
}

/// One demographic classification record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryRecord {
    /// Postcode as it appears in the extract
    pub postcode: String,
    /// Eligibility flag (the classification group)
    pub group: String,
    /// Subgroup code, empty if the row stops before it
    pub subgroup: String,
}

impl PrimaryRecord {
    /// Create a primary record.
    #[must_use]
    pub fn new(
        postcode: impl Into<String>,
        group: impl Into<String>,
        subgroup: impl Into<String>,
    ) -> Self {
        Self {
            postcode: postcode.into(),
            group: group.into(),
            subgroup: subgroup.into(),
        }
    }
}

/// A parsed line of the primary extract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimaryRow {
    /// Too few fields to carry an eligibility flag.
    Short { line: u64, fields: usize },
    /// A well-formed record.
    Record(PrimaryRecord),
}

impl PrimaryRow {
    /// Interpret a raw CSV record.
    #[must_use]
    pub fn from_byte_record(record: &ByteRecord) -> Self {
        if record.len() < PRIMARY_MIN_FIELDS {
            return Self::Short {
                line: line_of(record),
                fields: record.len(),
            };
        }
        Self::Record(PrimaryRecord {
            postcode: field(record, PRIMARY_POSTCODE),
            group: field(record, PRIMARY_GROUP),
            subgroup: field(record, PRIMARY_SUBGROUP),
        })
    }
}

/// Streaming reader over the primary extract.
pub struct PrimaryReader<R: Read> {
    inner: csv::Reader<R>,
    record: ByteRecord,
}

impl PrimaryReader<File> {
    /// Open a primary extract file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(File::open(path)?))
    }
}

impl<R: Read> PrimaryReader<R> {
    /// Wrap any reader.
    pub fn new(reader: R) -> Self {
        Self {
            inner: headerless(reader),
            record: ByteRecord::new(),
        }
    }
}

impl<R: Read> Iterator for PrimaryReader<R> {
    type Item = Result<PrimaryRow>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.inner.read_byte_record(&mut self.record) {
            Ok(true) => Some(Ok(PrimaryRow::from_byte_record(&self.record))),
            Ok(false) => None,
            Err(e) => Some(Err(e.into())),
        }
    }
}

/// One postcode and its grid reference from a shard's reference file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceEntry {
    /// Postcode with whitespace and quotes removed
    pub postcode: String,
    /// Grid reference
    pub coordinates: Coordinates,
}

/// A parsed line of a reference file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceRow {
    Entry(ReferenceEntry),
    /// Too few fields, or an empty postcode or coordinate.
    Skipped { line: u64 },
}

impl ReferenceRow {
    /// Interpret a raw CSV record.
    #[must_use]
    pub fn from_byte_record(record: &ByteRecord) -> Self {
        if record.len() <= REFERENCE_NORTHING {
            return Self::Skipped {
                line: line_of(record),
            };
        }

        let postcode = canonical_reference(&field(record, REFERENCE_POSTCODE));
        let easting = field(record, REFERENCE_EASTING).trim().to_string();
        let northing = field(record, REFERENCE_NORTHING).trim().to_string();
        if postcode.is_empty() || easting.is_empty() || northing.is_empty() {
            return Self::Skipped {
                line: line_of(record),
            };
        }

        Self::Entry(ReferenceEntry {
            postcode,
            coordinates: Coordinates::new(easting, northing),
        })
    }
}

/// Streaming reader over one reference file.
pub struct ReferenceReader<R: Read> {
    inner: csv::Reader<R>,
    record: ByteRecord,
}

impl<R: Read> ReferenceReader<R> {
    /// Wrap any reader.
    pub fn new(reader: R) -> Self {
        Self {
            inner: headerless(reader),
            record: ByteRecord::new(),
        }
    }
}

impl<R: Read> Iterator for ReferenceReader<R> {
    type Item = Result<ReferenceRow>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.inner.read_byte_record(&mut self.record) {
            Ok(true) => Some(Ok(ReferenceRow::from_byte_record(&self.record))),
            Ok(false) => None,
            Err(e) => Some(Err(e.into())),
        }
    }
}

/// A parsed line of a processed shard file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessedRow {
    Header,
    Record(EnrichedRecord),
    /// Wrong number of fields.
    Malformed { line: u64 },
}

/// Streaming reader over one processed shard file.
pub struct ProcessedReader<R: Read> {
    inner: csv::Reader<R>,
    record: ByteRecord,
}

impl<R: Read> ProcessedReader<R> {
    /// Wrap any reader.
    pub fn new(reader: R) -> Self {
        Self {
            inner: headerless(reader),
            record: ByteRecord::new(),
        }
    }
}

impl<R: Read> Iterator for ProcessedReader<R> {
    type Item = Result<ProcessedRow>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.inner.read_byte_record(&mut self.record) {
            Ok(true) => {
                let fields: Vec<String> = (0..self.record.len())
                    .map(|i| field(&self.record, i))
                    .collect();
                let row = if EnrichedRecord::is_header(fields.iter().map(String::as_str)) {
                    ProcessedRow::Header
                } else if let Some(record) =
                    EnrichedRecord::from_row(fields.iter().map(String::as_str))
                {
                    ProcessedRow::Record(record)
                } else {
                    ProcessedRow::Malformed {
                        line: line_of(&self.record),
                    }
                };
                Some(Ok(row))
            }
            Ok(false) => None,
            Err(e) => Some(Err(e.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_primary_rows() {
        let input = "AB1 2CD,x,x,F,22\nshort,row\nCD3 4EF,x,x,E,23\nEF5 6GH,x,x,F\n";
        let rows: Vec<_> = PrimaryReader::new(Cursor::new(input))
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(rows.len(), 4);
        assert_eq!(
            rows[0],
            PrimaryRow::Record(PrimaryRecord::new("AB1 2CD", "F", "22"))
        );
        assert!(matches!(rows[1], PrimaryRow::Short { line: 2, fields: 2 }));
        assert_eq!(
            rows[2],
            PrimaryRow::Record(PrimaryRecord::new("CD3 4EF", "E", "23"))
        );
        assert_eq!(
            rows[3],
            PrimaryRow::Record(PrimaryRecord::new("EF5 6GH", "F", ""))
        );
    }

    #[test]
    fn test_primary_invalid_utf8_is_lossy() {
        let mut input = b"AB1 2CD,x,x,F,2".to_vec();
        input.push(0xff);
        input.push(b'\n');

        let rows: Vec<_> = PrimaryReader::new(Cursor::new(input))
            .collect::<Result<_>>()
            .unwrap();
        match &rows[0] {
            PrimaryRow::Record(record) => assert!(record.subgroup.starts_with('2')),
            other => panic!("unexpected row {other:?}"),
        }
    }

    #[test]
    fn test_reference_rows() {
        let input = "\"AB1 2CD\",type,100,200\nAB12CE,type,,300\nshort,1\n";
        let rows: Vec<_> = ReferenceReader::new(Cursor::new(input))
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(
            rows[0],
            ReferenceRow::Entry(ReferenceEntry {
                postcode: "AB12CD".to_string(),
                coordinates: Coordinates::new("100", "200"),
            })
        );
        assert!(matches!(rows[1], ReferenceRow::Skipped { .. }));
        assert!(matches!(rows[2], ReferenceRow::Skipped { .. }));
    }

    #[test]
    fn test_processed_rows() {
        let input = "Postcode,Type,Northings,Eastings\nAB12CD,22,200,100\nbroken,row\n";
        let rows: Vec<_> = ProcessedReader::new(Cursor::new(input))
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(rows[0], ProcessedRow::Header);
        assert_eq!(
            rows[1],
            ProcessedRow::Record(EnrichedRecord::from_row(["AB12CD", "22", "200", "100"]).unwrap())
        );
        assert!(matches!(rows[2], ProcessedRow::Malformed { .. }));
    }
}
