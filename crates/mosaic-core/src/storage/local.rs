//! Local filesystem storage backend.

use super::ShardStore;
use crate::error::{MosaicError, Result};
use crate::types::ShardKey;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Local filesystem storage backend.
///
/// Reference files live at `<reference_root>/<key>.csv`, processed output at
/// `<output_root>/<key>.csv`.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    reference_root: PathBuf,
    output_root: PathBuf,
}

impl LocalStorage {
    /// Create a new local storage backend, creating the output root.
    pub fn new(reference_root: impl AsRef<Path>, output_root: impl AsRef<Path>) -> Result<Self> {
        let output_root = output_root.as_ref().to_path_buf();
        std::fs::create_dir_all(&output_root).map_err(|e| MosaicError::Storage {
            path: output_root.clone(),
            source: e,
        })?;
        Ok(Self {
            reference_root: reference_root.as_ref().to_path_buf(),
            output_root,
        })
    }

    /// Open the output root only, for reading processed files back.
    ///
    /// Reference lookups against this store always report a missing file.
    pub fn for_output(output_root: impl AsRef<Path>) -> Self {
        let output_root = output_root.as_ref().to_path_buf();
        Self {
            reference_root: output_root.join(".no-reference"),
            output_root,
        }
    }

    /// Path of the reference file for `key`.
    #[must_use]
    pub fn reference_path(&self, key: &ShardKey) -> PathBuf {
        self.reference_root.join(key.file_name())
    }

    /// Path of the output file for `key`.
    #[must_use]
    pub fn output_path(&self, key: &ShardKey) -> PathBuf {
        self.output_root.join(key.file_name())
    }

    /// Directory holding processed output.
    #[must_use]
    pub fn output_root(&self) -> &Path {
        &self.output_root
    }
}

fn open_if_exists(path: &Path) -> Result<Option<File>> {
    match File::open(path) {
        Ok(file) => Ok(Some(file)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(MosaicError::Io(e)),
    }
}

impl ShardStore for LocalStorage {
    type Reader = File;
    type Writer = File;

    fn open_reference(&self, key: &ShardKey) -> Result<Option<File>> {
        let path = self.reference_path(key);
        debug!("Opening reference file {}", path.display());
        open_if_exists(&path)
    }

    fn create_output(&self, key: &ShardKey) -> Result<File> {
        Ok(File::create(self.output_path(key))?)
    }

    fn append_output(&self, key: &ShardKey) -> Result<File> {
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(self.output_path(key))?;
        Ok(file)
    }

    fn open_output(&self, key: &ShardKey) -> Result<Option<File>> {
        open_if_exists(&self.output_path(key))
    }

    fn list_outputs(&self) -> Result<Vec<ShardKey>> {
        if !self.output_root.exists() {
            return Ok(vec![]);
        }

        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&self.output_root)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            if let Some(key) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(ShardKey::new)
            {
                keys.push(key);
            }
        }

        keys.sort();
        Ok(keys)
    }

    fn describe_output(&self, key: &ShardKey) -> String {
        self.output_path(key).display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use tempfile::TempDir;

    fn key(s: &str) -> ShardKey {
        ShardKey::new(s).unwrap()
    }

    #[test]
    fn test_missing_reference_is_none() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path().join("ref"), tmp.path().join("out")).unwrap();

        assert!(storage.open_reference(&key("zz")).unwrap().is_none());
    }

    #[test]
    fn test_unreadable_reference_is_error() {
        let tmp = TempDir::new().unwrap();
        // A file where the reference directory should be: not NotFound.
        let ref_root = tmp.path().join("ref");
        std::fs::write(&ref_root, "not a directory").unwrap();

        let storage = LocalStorage::new(&ref_root, tmp.path().join("out")).unwrap();
        assert!(matches!(
            storage.open_reference(&key("ab")),
            Err(MosaicError::Io(_))
        ));
    }

    #[test]
    fn test_reference_present() {
        let tmp = TempDir::new().unwrap();
        let ref_dir = tmp.path().join("ref");
        std::fs::create_dir_all(&ref_dir).unwrap();
        std::fs::write(ref_dir.join("ab.csv"), "AB12CD,x,100,200\n").unwrap();

        let storage = LocalStorage::new(&ref_dir, tmp.path().join("out")).unwrap();
        let mut content = String::new();
        storage
            .open_reference(&key("ab"))
            .unwrap()
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "AB12CD,x,100,200\n");
    }

    #[test]
    fn test_output_create_and_append() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path().join("ref"), tmp.path().join("out")).unwrap();
        let k = key("ab");

        storage.create_output(&k).unwrap().write_all(b"one\n").unwrap();
        storage.append_output(&k).unwrap().write_all(b"two\n").unwrap();

        let content = std::fs::read_to_string(storage.output_path(&k)).unwrap();
        assert_eq!(content, "one\ntwo\n");

        storage.create_output(&k).unwrap().write_all(b"three\n").unwrap();
        let content = std::fs::read_to_string(storage.output_path(&k)).unwrap();
        assert_eq!(content, "three\n");
    }

    #[test]
    fn test_list_outputs() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path().join("ref"), tmp.path().join("out")).unwrap();

        storage.create_output(&key("cd")).unwrap();
        storage.create_output(&key("a")).unwrap();
        std::fs::write(tmp.path().join("out").join("notes.txt"), "x").unwrap();
        std::fs::write(tmp.path().join("out").join("toolong.csv"), "x").unwrap();

        let keys = storage.list_outputs().unwrap();
        assert_eq!(keys, vec![key("a"), key("cd")]);
    }

    #[test]
    fn test_for_output_has_no_references() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::for_output(tmp.path());

        assert!(storage.open_reference(&key("ab")).unwrap().is_none());
        assert!(storage.open_output(&key("ab")).unwrap().is_none());
    }
}
