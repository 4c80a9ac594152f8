//! File-based access for persistent storage.

use crate::access::FileAccess;
use crate::compression;
use crate::error::{StorageError, StorageResult};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Plain OS-file access.
///
/// Files are written with `File::sync_all()` so that a completed write is on
/// disk before a durable write renames it into place. Renames fsync the
/// parent directory on Unix.
///
/// # Example
///
/// ```no_run
/// use segdb_storage::{FileAccess, PlainFileAccess};
/// use std::path::Path;
///
/// let access = PlainFileAccess::new().with_compression(true);
/// access.ensure_directory(Path::new("data/users")).unwrap();
/// access.write_durable(Path::new("data/users/users.metadata"), b"{}").unwrap();
/// ```
#[derive(Debug, Clone, Default)]
pub struct PlainFileAccess {
    compress: bool,
}

impl PlainFileAccess {
    /// Creates an access without compression.
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

    #[cfg(unix)]
    fn sync_parent(path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            let dir = File::open(parent).map_err(|e| StorageError::io(parent, e))?;
            dir.sync_all().map_err(|e| StorageError::io(parent, e))?;
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_parent(_path: &Path) -> StorageResult<()> {
        // NTFS journals directory metadata
        Ok(())
    }
}

impl FileAccess for PlainFileAccess {
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
        fs::read(path).map_err(|e| StorageError::io(path, e))
    }

    fn write_raw(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
        let mut file = File::create(path).map_err(|e| StorageError::io(path, e))?;
        file.write_all(data).map_err(|e| StorageError::io(path, e))?;
        file.sync_all().map_err(|e| StorageError::io(path, e))?;
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn delete(&self, path: &Path) -> StorageResult<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(path, e)),
        }
    }

    fn ensure_directory(&self, path: &Path) -> StorageResult<()> {
        fs::create_dir_all(path).map_err(|e| StorageError::io(path, e))
    }

    fn rename(&self, from: &Path, to: &Path) -> StorageResult<()> {
        fs::rename(from, to).map_err(|e| StorageError::io(from, e))?;
        Self::sync_parent(to)
    }

    fn copy(&self, from: &Path, to: &Path) -> StorageResult<()> {
        fs::copy(from, to).map_err(|e| StorageError::io(from, e))?;
        Ok(())
    }

    fn list(&self, dir: &Path) -> StorageResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir).map_err(|e| StorageError::io(dir, e))? {
            let entry = entry.map_err(|e| StorageError::io(dir, e))?;
            let path = entry.path();
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn is_compressed(&self) -> bool {
        self.compress
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::backup_path;
    use tempfile::tempdir;

    #[test]
    fn write_and_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bin");
        let access = PlainFileAccess::new();

        access.write_all_bytes(&path, b"hello world").unwrap();
        assert!(access.exists(&path));
        assert_eq!(access.read_all_bytes(&path).unwrap(), b"hello world");
        assert_eq!(access.read_raw(&path).unwrap(), b"hello world");
    }

    #[test]
    fn read_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let access = PlainFileAccess::new();

        let result = access.read_all_bytes(&dir.path().join("missing.bin"));
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[test]
    fn compressed_files_are_gzip_on_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.bin");
        let access = PlainFileAccess::new().with_compression(true);
        let data = b"abcabcabc".repeat(100);

        access.write_all_bytes(&path, &data).unwrap();
        let raw = access.read_raw(&path).unwrap();

        assert!(compression::is_gzip(&raw));
        assert!(raw.len() < data.len());
        assert_eq!(access.read_all_bytes(&path).unwrap(), data);
    }

    #[test]
    fn durable_write_replaces_and_leaves_no_staging_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");
        let access = PlainFileAccess::new();

        access.write_durable(&path, b"v1").unwrap();
        access.write_durable(&path, b"v2").unwrap();

        assert_eq!(access.read_all_bytes(&path).unwrap(), b"v2");
        assert_eq!(access.list(dir.path()).unwrap(), vec![path]);
    }

    #[test]
    fn durable_write_with_backup_keeps_previous_version() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");
        let access = PlainFileAccess::new();

        access.write_durable_with_backup(&path, b"v1").unwrap();
        assert!(!access.exists(&backup_path(&path)));

        access.write_durable_with_backup(&path, b"v2").unwrap();
        assert_eq!(access.read_all_bytes(&path).unwrap(), b"v2");
        assert_eq!(access.read_all_bytes(&backup_path(&path)).unwrap(), b"v1");
    }

    #[test]
    fn failed_durable_write_keeps_committed_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");
        let access = PlainFileAccess::new();
        access.write_durable(&path, b"committed").unwrap();

        // A directory squatting on the staging path makes the write fail
        fs::create_dir(crate::access::staging_path(&path)).unwrap();
        assert!(access.write_durable(&path, b"lost").is_err());

        assert_eq!(access.read_all_bytes(&path).unwrap(), b"committed");
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gone.bin");
        let access = PlainFileAccess::new();

        access.write_all_bytes(&path, b"x").unwrap();
        access.delete(&path).unwrap();
        access.delete(&path).unwrap();
        assert!(!access.exists(&path));
    }

    #[test]
    fn ensure_directory_creates_nested_dirs() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b").join("c");
        let access = PlainFileAccess::new();

        access.ensure_directory(&nested).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn list_returns_sorted_files_only() {
        let dir = tempdir().unwrap();
        let access = PlainFileAccess::new();
        access.write_all_bytes(&dir.path().join("b.seg"), b"b").unwrap();
        access.write_all_bytes(&dir.path().join("a.seg"), b"a").unwrap();
        access.ensure_directory(&dir.path().join("sub")).unwrap();

        let files = access.list(dir.path()).unwrap();
        assert_eq!(
            files,
            vec![dir.path().join("a.seg"), dir.path().join("b.seg")]
        );
    }
}
