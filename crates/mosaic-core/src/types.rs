//! Common types for mosaic.

use crate::error::MosaicError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Header row of every processed shard file.
///
/// The names are historical: `Type` holds the subgroup code.
pub const OUTPUT_HEADER: [&str; 4] = ["Postcode", "Type", "Northings", "Eastings"];

/// Coordinate value recorded for a postcode with no reference match.
pub const UNMATCHED_COORDINATE: &str = "0";

/// Region shard identifier: one or two lowercase ASCII letters.
///
/// Addresses both the reference file and the processed output file of a
/// region, so it is restricted to characters that are safe in file names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ShardKey(String);

impl ShardKey {
    /// Create a shard key, returning `None` unless `key` is one or two
    /// lowercase ASCII letters.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into();
        let valid = (1..=2).contains(&key.len()) && key.bytes().all(|b| b.is_ascii_lowercase());
        valid.then_some(Self(key))
    }

    /// The key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name used for this shard in both reference and output stores.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.csv", self.0)
    }
}

impl fmt::Display for ShardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ShardKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for ShardKey {
    type Err = MosaicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s).ok_or_else(|| MosaicError::InvalidShardKey(s.to_string()))
    }
}

/// British National Grid reference for a postcode, kept as the text found in
/// the reference file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Metres east of the grid origin
    pub easting: String,
    /// Metres north of the grid origin
    pub northing: String,
}

impl Coordinates {
    /// Create coordinates from easting and northing text.
    #[must_use]
    pub fn new(easting: impl Into<String>, northing: impl Into<String>) -> Self {
        Self {
            easting: easting.into(),
            northing: northing.into(),
        }
    }

    /// The `0,0` default recorded when a postcode has no match.
    #[must_use]
    pub fn unmatched() -> Self {
        Self::new(UNMATCHED_COORDINATE, UNMATCHED_COORDINATE)
    }

    /// Whether these are the unmatched default.
    #[must_use]
    pub fn is_unmatched(&self) -> bool {
        self.easting == UNMATCHED_COORDINATE && self.northing == UNMATCHED_COORDINATE
    }

    /// Parse as `(easting, northing)` metres.
    ///
    /// Returns `None` for the unmatched default or for non-numeric text.
    #[must_use]
    pub fn as_metres(&self) -> Option<(f64, f64)> {
        if self.is_unmatched() {
            return None;
        }
        let easting = self.easting.trim().parse::<f64>().ok()?;
        let northing = self.northing.trim().parse::<f64>().ok()?;
        Some((easting, northing))
    }
}

/// One row of a processed shard file.
///
/// Field order matches [`OUTPUT_HEADER`]: northing is written before easting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    /// Canonical postcode (whitespace removed)
    pub postcode: String,
    /// Demographic subgroup code
    pub subgroup: String,
    /// Northing, or `0` when unmatched
    pub northing: String,
    /// Easting, or `0` when unmatched
    pub easting: String,
}

impl EnrichedRecord {
    /// Build a record from a postcode, its subgroup and looked-up coordinates.
    #[must_use]
    pub fn new(
        postcode: impl Into<String>,
        subgroup: impl Into<String>,
        coordinates: Coordinates,
    ) -> Self {
        Self {
            postcode: postcode.into(),
            subgroup: subgroup.into(),
            northing: coordinates.northing,
            easting: coordinates.easting,
        }
    }

    /// The record's coordinates.
    #[must_use]
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.easting.clone(), self.northing.clone())
    }

    /// Whether the record carries a usable grid reference.
    #[must_use]
    pub fn is_located(&self) -> bool {
        self.coordinates().as_metres().is_some()
    }

    /// Fields in output column order.
    #[must_use]
    pub fn as_row(&self) -> [&str; 4] {
        [
            self.postcode.as_str(),
            self.subgroup.as_str(),
            self.northing.as_str(),
            self.easting.as_str(),
        ]
    }

    /// Rebuild a record from output columns. Requires exactly four fields.
    #[must_use]
    pub fn from_row<'a, I>(fields: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut fields = fields.into_iter();
        let record = Self {
            postcode: fields.next()?.to_string(),
            subgroup: fields.next()?.to_string(),
            northing: fields.next()?.to_string(),
            easting: fields.next()?.to_string(),
        };
        fields.next().is_none().then_some(record)
    }

    /// Whether `fields` is the output header row.
    #[must_use]
    pub fn is_header<'a, I>(fields: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        fields.into_iter().eq(OUTPUT_HEADER)
    }
}
