//! File access capability trait.

use crate::error::StorageResult;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Suffix of the staging file used by durable writes.
const STAGING_SUFFIX: &str = ".tmp";
/// Suffix of the retained previous version.
const BACKUP_SUFFIX: &str = ".bak";

/// Byte-level access to whole files.
///
/// Implementations are **opaque byte movers**: they read and write complete
/// files and may transform the bytes on the way (compression, encryption),
/// but they never interpret them. segdb_core owns every file format.
///
/// Two layers of bytes exist:
///
/// - *logical* bytes ([`read_all_bytes`](Self::read_all_bytes),
///   [`write_all_bytes`](Self::write_all_bytes)) are what callers see
/// - *raw* bytes ([`read_raw`](Self::read_raw), [`write_raw`](Self::write_raw))
///   are exactly what sits on disk, used for checksums and by wrappers
///
/// # Invariants
///
/// - `read_all_bytes(p)` after `write_all_bytes(p, b)` returns `b`
/// - `delete` of a missing file succeeds
/// - Implementations must be `Send + Sync`
pub trait FileAccess: Send + Sync {
    /// Reads a whole file and undoes any transformation applied on write.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`](crate::StorageError::NotFound) if the
    /// file does not exist, or an integrity/encryption/compression error if
    /// the stored bytes cannot be turned back into plaintext.
    fn read_all_bytes(&self, path: &Path) -> StorageResult<Vec<u8>>;

    /// Transforms `data` (if configured) and writes it as the whole file.
    ///
    /// # Errors
    ///
    /// Returns an error if the transformation or the write fails.
    fn write_all_bytes(&self, path: &Path, data: &[u8]) -> StorageResult<()>;

    /// Reads the exact on-disk bytes of a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or unreadable.
    fn read_raw(&self, path: &Path) -> StorageResult<Vec<u8>>;

    /// Writes bytes to disk exactly as given.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn write_raw(&self, path: &Path, data: &[u8]) -> StorageResult<()>;

    /// Returns true if the file exists.
    fn exists(&self, path: &Path) -> bool;

    /// Deletes a file. Deleting a missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    fn delete(&self, path: &Path) -> StorageResult<()>;

    /// Creates a directory and all missing parents.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    fn ensure_directory(&self, path: &Path) -> StorageResult<()>;

    /// Atomically replaces `to` with `from`.
    ///
    /// # Errors
    ///
    /// Returns an error if the rename fails.
    fn rename(&self, from: &Path, to: &Path) -> StorageResult<()>;

    /// Copies the raw bytes of `from` to `to`.
    ///
    /// # Errors
    ///
    /// Returns an error if either side cannot be accessed.
    fn copy(&self, from: &Path, to: &Path) -> StorageResult<()>;

    /// Lists the files directly inside `dir`, sorted by path.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    fn list(&self, dir: &Path) -> StorageResult<Vec<PathBuf>>;

    /// Returns true if bytes are encrypted at rest.
    fn is_encrypted(&self) -> bool {
        false
    }

    /// Returns true if bytes are compressed at rest.
    fn is_compressed(&self) -> bool {
        false
    }

    /// Writes a file so that a failure never corrupts the committed version.
    ///
    /// The bytes go to `<path>.tmp` first and the staging file is renamed
    /// over `path` only after the write succeeded. On failure the staging
    /// file is removed and `path` is left untouched.
    ///
    /// # Errors
    ///
    /// Returns the error of the failed write or rename.
    fn write_durable(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
        let staging = staging_path(path);
        if let Err(err) = self.write_all_bytes(&staging, data) {
            let _ = self.delete(&staging);
            return Err(err);
        }
        if let Err(err) = self.rename(&staging, path) {
            let _ = self.delete(&staging);
            return Err(err);
        }
        Ok(())
    }

    /// Like [`write_durable`](Self::write_durable), but first copies the
    /// current version of `path` (if any) to `<path>.bak`.
    ///
    /// # Errors
    ///
    /// Returns the error of the failed backup, write, or rename.
    fn write_durable_with_backup(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
        if self.exists(path) {
            self.copy(path, &backup_path(path))?;
        }
        self.write_durable(path, data)
    }
}

impl<T: FileAccess + ?Sized> FileAccess for Arc<T> {
    fn read_all_bytes(&self, path: &Path) -> StorageResult<Vec<u8>> {
        (**self).read_all_bytes(path)
    }

    fn write_all_bytes(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
        (**self).write_all_bytes(path, data)
    }

    fn read_raw(&self, path: &Path) -> StorageResult<Vec<u8>> {
        (**self).read_raw(path)
    }

    fn write_raw(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
        (**self).write_raw(path, data)
    }

    fn exists(&self, path: &Path) -> bool {
        (**self).exists(path)
    }

    fn delete(&self, path: &Path) -> StorageResult<()> {
        (**self).delete(path)
    }

    fn ensure_directory(&self, path: &Path) -> StorageResult<()> {
        (**self).ensure_directory(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> StorageResult<()> {
        (**self).rename(from, to)
    }

    fn copy(&self, from: &Path, to: &Path) -> StorageResult<()> {
        (**self).copy(from, to)
    }

    fn list(&self, dir: &Path) -> StorageResult<Vec<PathBuf>> {
        (**self).list(dir)
    }

    fn is_encrypted(&self) -> bool {
        (**self).is_encrypted()
    }

    fn is_compressed(&self) -> bool {
        (**self).is_compressed()
    }
}

/// Returns the staging path used by durable writes (`<path>.tmp`).
#[must_use]
pub fn staging_path(path: &Path) -> PathBuf {
    with_suffix(path, STAGING_SUFFIX)
}

/// Returns the backup path of a file (`<path>.bak`).
#[must_use]
pub fn backup_path(path: &Path) -> PathBuf {
    with_suffix(path, BACKUP_SUFFIX)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_and_backup_paths() {
        let path = Path::new("root/users/users.metadata");
        assert_eq!(
            staging_path(path),
            PathBuf::from("root/users/users.metadata.tmp")
        );
        assert_eq!(
            backup_path(path),
            PathBuf::from("root/users/users.metadata.bak")
        );
    }
}
