//! In-memory file access for testing.

use crate::access::FileAccess;
use crate::compression;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// An in-memory file system.
///
/// Suitable for:
/// - Unit tests
/// - Integration tests that need to corrupt or inspect raw bytes
/// - Ephemeral engines that don't need persistence
///
/// # Example
///
/// ```rust
/// use segdb_storage::{FileAccess, InMemoryFileAccess};
/// use std::path::Path;
///
/// let access = InMemoryFileAccess::new();
/// access.write_all_bytes(Path::new("a.bin"), b"test data").unwrap();
/// assert!(access.exists(Path::new("a.bin")));
/// ```
#[derive(Debug, Default)]
pub struct InMemoryFileAccess {
    files: RwLock<BTreeMap<PathBuf, Vec<u8>>>,
    dirs: RwLock<BTreeSet<PathBuf>>,
    compress: bool,
}

impl InMemoryFileAccess {
    /// Creates an empty in-memory file system.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables gzip compression of file contents.
    #[must_use]
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compress = enabled;
        self
    }

    /// Returns all file paths currently stored.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.read().keys().cloned().collect()
    }

    /// Flips the bits of one on-disk byte.
    ///
    /// Useful for testing corruption detection. Returns false if the file
    /// or offset does not exist.
    pub fn corrupt_byte(&self, path: &Path, offset: usize) -> bool {
        let mut files = self.files.write();
        match files.get_mut(path).and_then(|data| data.get_mut(offset)) {
            Some(byte) => {
                *byte ^= 0xFF;
                true
            }
            None => false,
        }
    }
}

impl FileAccess for InMemoryFileAccess {
    fn read_all_bytes(&self, path: &Path) -> StorageResult<Vec<u8>> {
        let raw = self.read_raw(path)?;
        if self.compress {
            compression::gunzip(&raw)
        } else {
            Ok(raw)
        }
    }

    fn write_all_bytes(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
        if self.compress {
            self.write_raw(path, &compression::gzip(data)?)
        } else {
            self.write_raw(path, data)
        }
    }

    fn read_raw(&self, path: &Path) -> StorageResult<Vec<u8>> {
        self.files
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(path.to_path_buf()))
    }

    fn write_raw(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
        self.files.write().insert(path.to_path_buf(), data.to_vec());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.read().contains_key(path)
    }

    fn delete(&self, path: &Path) -> StorageResult<()> {
        self.files.write().remove(path);
        Ok(())
    }

    fn ensure_directory(&self, path: &Path) -> StorageResult<()> {
        self.dirs.write().insert(path.to_path_buf());
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> StorageResult<()> {
        let mut files = self.files.write();
        let data = files
            .remove(from)
            .ok_or_else(|| StorageError::NotFound(from.to_path_buf()))?;
        files.insert(to.to_path_buf(), data);
        Ok(())
    }

    fn copy(&self, from: &Path, to: &Path) -> StorageResult<()> {
        let mut files = self.files.write();
        let data = files
            .get(from)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(from.to_path_buf()))?;
        files.insert(to.to_path_buf(), data);
        Ok(())
    }

    fn list(&self, dir: &Path) -> StorageResult<Vec<PathBuf>> {
        Ok(self
            .files
            .read()
            .keys()
            .filter(|p| p.parent() == Some(dir))
            .cloned()
            .collect())
    }

    fn is_compressed(&self) -> bool {
        self.compress
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_read_delete() {
        let access = InMemoryFileAccess::new();
        let path = Path::new("root/a.bin");

        access.write_all_bytes(path, b"hello").unwrap();
        assert_eq!(access.read_all_bytes(path).unwrap(), b"hello");

        access.delete(path).unwrap();
        assert!(!access.exists(path));
        assert!(matches!(
            access.read_all_bytes(path),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn durable_write_promotes_staging_file() {
        let access = InMemoryFileAccess::new();
        let path = Path::new("root/doc");

        access.write_durable(path, b"v1").unwrap();
        access.write_durable_with_backup(path, b"v2").unwrap();

        assert_eq!(
            access.paths(),
            vec![PathBuf::from("root/doc"), PathBuf::from("root/doc.bak")]
        );
        assert_eq!(access.read_all_bytes(path).unwrap(), b"v2");
    }

    #[test]
    fn list_only_direct_children() {
        let access = InMemoryFileAccess::new();
        access.write_raw(Path::new("root/a"), b"a").unwrap();
        access.write_raw(Path::new("root/sub/b"), b"b").unwrap();

        assert_eq!(
            access.list(Path::new("root")).unwrap(),
            vec![PathBuf::from("root/a")]
        );
    }

    #[test]
    fn corrupt_byte_flips_raw_bytes() {
        let access = InMemoryFileAccess::new();
        let path = Path::new("a");
        access.write_raw(path, &[0x00, 0x0F]).unwrap();

        assert!(access.corrupt_byte(path, 1));
        assert_eq!(access.read_raw(path).unwrap(), vec![0x00, 0xF0]);
        assert!(!access.corrupt_byte(path, 9));
    }

    #[test]
    fn compression_is_transparent() {
        let access = InMemoryFileAccess::new().with_compression(true);
        let path = Path::new("a");
        access.write_all_bytes(path, b"zzzzzzzzzzzzzzzzzzzzzzzz").unwrap();

        assert!(compression::is_gzip(&access.read_raw(path).unwrap()));
        assert_eq!(
            access.read_all_bytes(path).unwrap(),
            b"zzzzzzzzzzzzzzzzzzzzzzzz"
        );
    }
}
