//! Error types for mosaic.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for mosaic core operations.
pub type Result<T> = std::result::Result<T, MosaicError>;

/// Errors that can occur in mosaic core operations.
#[derive(Error, Debug)]
pub enum MosaicError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Storage root could not be prepared
    #[error("Storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Text that is not a valid shard key
    #[error("Invalid shard key: {0:?}")]
    InvalidShardKey(String),
}
