//! Error types for storage operations.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred while touching a path.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        /// The path being accessed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The requested file does not exist.
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Stored bytes failed an integrity check (HMAC tag mismatch).
    #[error("integrity check failed: {0}")]
    Integrity(String),

    /// Encryption or decryption failed.
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Compression or decompression failed.
    #[error("compression error: {0}")]
    Compression(String),

    /// Invalid key derivation or cipher settings.
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl StorageError {
    /// Wraps an I/O error with the path it occurred on.
    ///
    /// `NotFound` I/O errors become [`StorageError::NotFound`].
    pub fn io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            return Self::NotFound(path.to_path_buf());
        }
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Returns true if this error means the file is absent.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
