//! Join configuration.

use crate::io::{JoinError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default directory of per-shard reference files.
pub const DEFAULT_REFERENCE_DIR: &str = "data/os-open";
/// Default directory for processed per-shard output.
pub const DEFAULT_OUTPUT_DIR: &str = "data/processed/postcodes";
/// Eligibility marker a primary record must carry to be joined.
pub const DEFAULT_ELIGIBLE_GROUP: &str = "F";

/// Configuration for a join run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinConfig {
    /// Directory holding `<shard>.csv` reference files.
    pub reference_dir: PathBuf,
    /// Directory receiving `<shard>.csv` processed files.
    pub output_dir: PathBuf,
    /// Value of the eligibility column that selects a record.
    pub eligible_group: String,
    /// Log progress every this many primary rows.
    pub report_interval: usize,
}

impl JoinConfig {
    /// Create a config for the given directories with default settings.
    #[must_use]
    pub fn new(reference_dir: impl AsRef<Path>, output_dir: impl AsRef<Path>) -> Self {
        Self {
            reference_dir: reference_dir.as_ref().to_path_buf(),
            output_dir: output_dir.as_ref().to_path_buf(),
            eligible_group: DEFAULT_ELIGIBLE_GROUP.to_string(),
            report_interval: 1_000_000,
        }
    }

    /// Set the eligibility marker.
    #[must_use]
    pub fn with_eligible_group(mut self, group: impl Into<String>) -> Self {
        self.eligible_group = group.into();
        self
    }

    /// Set the progress reporting interval.
    #[must_use]
    pub fn with_report_interval(mut self, rows: usize) -> Self {
        self.report_interval = rows;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// Supported variables:
    /// - `MOSAIC_REFERENCE_DIR`: reference file directory
    /// - `MOSAIC_OUTPUT_DIR`: processed output directory
    /// - `MOSAIC_ELIGIBLE_GROUP`: eligibility marker
    #[must_use]
    pub fn from_env() -> Self {
        let reference_dir = std::env::var("MOSAIC_REFERENCE_DIR")
            .unwrap_or_else(|_| DEFAULT_REFERENCE_DIR.to_string());
        let output_dir =
            std::env::var("MOSAIC_OUTPUT_DIR").unwrap_or_else(|_| DEFAULT_OUTPUT_DIR.to_string());
        let group = std::env::var("MOSAIC_ELIGIBLE_GROUP")
            .unwrap_or_else(|_| DEFAULT_ELIGIBLE_GROUP.to_string());

        Self::new(reference_dir, output_dir).with_eligible_group(group)
    }

    /// Reject settings the join cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.eligible_group.is_empty() {
            return Err(JoinError::InvalidConfig(
                "eligible group must not be empty".to_string(),
            ));
        }
        if self.report_interval == 0 {
            return Err(JoinError::InvalidConfig(
                "report interval must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = JoinConfig::new("refs", "out")
            .with_eligible_group("E")
            .with_report_interval(10);

        assert_eq!(config.reference_dir, PathBuf::from("refs"));
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.eligible_group, "E");
        assert_eq!(config.report_interval, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults() {
        let config = JoinConfig::new("refs", "out");
        assert_eq!(config.eligible_group, "F");
        assert_eq!(config.report_interval, 1_000_000);
    }

    #[test]
    fn test_validate_rejects_empty_group() {
        let config = JoinConfig::new("refs", "out").with_eligible_group("");
        assert!(matches!(
            config.validate(),
            Err(JoinError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = JoinConfig::new("refs", "out").with_report_interval(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serde_roundtrip() {
        let config = JoinConfig::new("refs", "out");
        let json = serde_json::to_string(&config).unwrap();
        let back: JoinConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
