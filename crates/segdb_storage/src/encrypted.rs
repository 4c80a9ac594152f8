//! Encrypted file access wrapper.
//!
//! Wraps any other [`FileAccess`] and runs every logical read and write
//! through a [`CipherService`]. Raw operations (`read_raw`, `rename`,
//! `copy`, ...) pass straight through to the inner access, so checksums of
//! on-disk bytes cover the ciphertext.
//!
//! Compression, if enabled, is done by the cipher service on plaintext;
//! the inner access must not compress ciphertext.

use crate::access::FileAccess;
use crate::crypto::CipherService;
use crate::error::StorageResult;
use std::path::{Path, PathBuf};
use tracing::warn;

/// File access that encrypts at rest.
///
/// # Example
///
/// ```rust
/// use segdb_storage::{
///     CipherService, EncryptedFileAccess, EncryptionAlgorithm, FileAccess, InMemoryFileAccess,
/// };
/// use std::path::Path;
///
/// let cipher = CipherService::from_passphrase(
///     b"passphrase",
///     b"salt-salt-salt-salt",
///     1_000,
///     EncryptionAlgorithm::Aes256Cbc,
/// )
/// .unwrap();
/// let access = EncryptedFileAccess::new(Box::new(InMemoryFileAccess::new()), cipher);
///
/// access.write_all_bytes(Path::new("a.seg"), b"secret").unwrap();
/// assert_ne!(access.read_raw(Path::new("a.seg")).unwrap(), b"secret");
/// assert_eq!(access.read_all_bytes(Path::new("a.seg")).unwrap(), b"secret");
/// ```
pub struct EncryptedFileAccess {
    inner: Box<dyn FileAccess>,
    cipher: CipherService,
}

impl EncryptedFileAccess {
    /// Creates an encrypted access wrapping `inner`.
    pub fn new(inner: Box<dyn FileAccess>, cipher: CipherService) -> Self {
        if inner.is_compressed() {
            warn!("inner file access compresses ciphertext; enable compression on the cipher instead");
        }
        Self { inner, cipher }
    }

    /// Returns the cipher service.
    #[must_use]
    pub fn cipher(&self) -> &CipherService {
        &self.cipher
    }
}

impl FileAccess for EncryptedFileAccess {
    fn read_all_bytes(&self, path: &Path) -> StorageResult<Vec<u8>> {
        let sealed = self.inner.read_raw(path)?;
        self.cipher.decrypt(&sealed)
    }

    fn write_all_bytes(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
        let sealed = self.cipher.encrypt(data)?;
        self.inner.write_raw(path, &sealed)
    }

    fn read_raw(&self, path: &Path) -> StorageResult<Vec<u8>> {
        self.inner.read_raw(path)
    }

    fn write_raw(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
        self.inner.write_raw(path, data)
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }

    fn delete(&self, path: &Path) -> StorageResult<()> {
        self.inner.delete(path)
    }

    fn ensure_directory(&self, path: &Path) -> StorageResult<()> {
        self.inner.ensure_directory(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> StorageResult<()> {
        self.inner.rename(from, to)
    }

    fn copy(&self, from: &Path, to: &Path) -> StorageResult<()> {
        self.inner.copy(from, to)
    }

    fn list(&self, dir: &Path) -> StorageResult<Vec<PathBuf>> {
        self.inner.list(dir)
    }

    fn is_encrypted(&self) -> bool {
        true
    }

    fn is_compressed(&self) -> bool {
        self.cipher.compresses()
    }
}

impl std::fmt::Debug for EncryptedFileAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedFileAccess")
            .field("cipher", &self.cipher)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{EncryptionAlgorithm, IV_SIZE, MIN_ITERATIONS};
    use crate::error::StorageError;
    use crate::memory::InMemoryFileAccess;
    use std::sync::Arc;

    fn cipher(passphrase: &[u8]) -> CipherService {
        CipherService::from_passphrase(
            passphrase,
            b"0123456789abcdef0123456789abcdef",
            MIN_ITERATIONS,
            EncryptionAlgorithm::Aes256Cbc,
        )
        .unwrap()
    }

    #[test]
    fn roundtrip_through_wrapper() {
        let access = EncryptedFileAccess::new(Box::new(InMemoryFileAccess::new()), cipher(b"pw"));
        let path = Path::new("users/users_segment_000001.seg");

        access.write_durable(path, b"record bytes").unwrap();

        assert!(access.is_encrypted());
        assert_eq!(access.read_all_bytes(path).unwrap(), b"record bytes");
        assert!(access.read_raw(path).unwrap().len() > IV_SIZE);
    }

    #[test]
    fn corrupted_file_raises_integrity_error() {
        let inner = Arc::new(InMemoryFileAccess::new());
        let access = EncryptedFileAccess::new(Box::new(Arc::clone(&inner)), cipher(b"pw"));
        let path = Path::new("a.seg");

        access.write_all_bytes(path, b"important").unwrap();
        assert!(inner.corrupt_byte(path, IV_SIZE + 3));

        let result = access.read_all_bytes(path);
        assert!(matches!(result, Err(StorageError::Integrity(_))));
    }

    #[test]
    fn wrong_key_cannot_read() {
        let inner = Arc::new(InMemoryFileAccess::new());
        let writer = EncryptedFileAccess::new(Box::new(Arc::clone(&inner)), cipher(b"pw"));
        let reader = EncryptedFileAccess::new(Box::new(Arc::clone(&inner)), cipher(b"nope"));
        let path = Path::new("a.seg");

        writer.write_all_bytes(path, b"important").unwrap();
        assert!(reader.read_all_bytes(path).is_err());
    }

    #[test]
    fn compression_reported_from_cipher() {
        let access = EncryptedFileAccess::new(
            Box::new(InMemoryFileAccess::new()),
            cipher(b"pw").with_compression(true),
        );
        assert!(access.is_compressed());

        let path = Path::new("a.seg");
        let data = b"aaaaaaaaaaaaaaaa".repeat(64);
        access.write_all_bytes(path, &data).unwrap();
        assert!(access.read_raw(path).unwrap().len() < data.len());
        assert_eq!(access.read_all_bytes(path).unwrap(), data);
    }
}
