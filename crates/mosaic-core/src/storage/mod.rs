//! Shard storage abstraction.
//!
//! Reference files and processed output files are both addressed by
//! [`ShardKey`]. Only the local filesystem backend exists today.

mod local;

pub use local::LocalStorage;

use crate::error::Result;
use crate::types::ShardKey;
use std::io::{Read, Write};

/// Trait for shard storage backends.
///
/// Reads are blocking; the join is a single sequential pass.
pub trait ShardStore {
    /// Reader over a reference or output file.
    type Reader: Read;
    /// Writer over an output file.
    type Writer: Write;

    /// Open the reference file for `key`.
    ///
    /// Returns `Ok(None)` when the file does not exist. Any other failure,
    /// such as a permission error, is returned as an error.
    fn open_reference(&self, key: &ShardKey) -> Result<Option<Self::Reader>>;

    /// Create or truncate the output file for `key`.
    fn create_output(&self, key: &ShardKey) -> Result<Self::Writer>;

    /// Open the output file for `key` for appending.
    fn append_output(&self, key: &ShardKey) -> Result<Self::Writer>;

    /// Open the output file for `key` for reading, `Ok(None)` if absent.
    fn open_output(&self, key: &ShardKey) -> Result<Option<Self::Reader>>;

    /// Keys of every output file present, sorted.
    fn list_outputs(&self) -> Result<Vec<ShardKey>>;

    /// Human-readable location of the output for `key`, for logs.
    fn describe_output(&self, key: &ShardKey) -> String;
}

impl<S: ShardStore + ?Sized> ShardStore for &S {
    type Reader = S::Reader;
    type Writer = S::Writer;

    fn open_reference(&self, key: &ShardKey) -> Result<Option<Self::Reader>> {
        (**self).open_reference(key)
    }

    fn create_output(&self, key: &ShardKey) -> Result<Self::Writer> {
        (**self).create_output(key)
    }

    fn append_output(&self, key: &ShardKey) -> Result<Self::Writer> {
        (**self).append_output(key)
    }

    fn open_output(&self, key: &ShardKey) -> Result<Option<Self::Reader>> {
        (**self).open_output(key)
    }

    fn list_outputs(&self) -> Result<Vec<ShardKey>> {
        (**self).list_outputs()
    }

    fn describe_output(&self, key: &ShardKey) -> String {
        (**self).describe_output(key)
    }
}
