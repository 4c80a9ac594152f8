//! Error types for segdb core.

use segdb_storage::StorageError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in segdb core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Invalid size, iteration, or key-length settings.
    #[error("invalid configuration: {message}")]
    Configuration {
        /// Description of the invalid setting.
        message: String,
    },

    /// Disk or file failure during read, write, or delete.
    #[error("storage I/O error: {source}")]
    StorageIo {
        /// The underlying storage error.
        #[source]
        source: StorageError,
    },

    /// Checksum or HMAC mismatch on read.
    #[error("integrity check failed: {message}")]
    Integrity {
        /// Description of the mismatch.
        message: String,
    },

    /// Bad key material, corrupt ciphertext, or unsupported algorithm.
    #[error("encryption error: {message}")]
    Encryption {
        /// Description of the failure.
        message: String,
    },

    /// Requested segment, entity, or file is absent.
    #[error("not found: {what}")]
    NotFound {
        /// What was looked for.
        what: String,
    },

    /// A record or document could not be encoded or decoded.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the failure.
        message: String,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Why the operation is invalid.
        message: String,
    },

    /// A cooperative cancellation was observed.
    #[error("operation cancelled")]
    Cancelled,

    /// Another process owns the data directory.
    #[error("data directory locked: another process has exclusive access")]
    DataDirLocked,

    /// The engine has been shut down.
    #[error("storage engine is closed")]
    EngineClosed,
}

impl CoreError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates an integrity error.
    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity {
            message: message.into(),
        }
    }

    /// Creates an encryption error.
    pub fn encryption(message: impl Into<String>) -> Self {
        Self::Encryption {
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Creates a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true for [`CoreError::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true for [`CoreError::Integrity`].
    #[must_use]
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::Integrity { .. })
    }
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(path) => Self::not_found(path.display().to_string()),
            StorageError::Integrity(message) => Self::Integrity { message },
            StorageError::Encryption(message) => Self::Encryption { message },
            StorageError::Compression(message) => {
                Self::integrity(format!("stored bytes do not decompress: {message}"))
            }
            StorageError::Configuration(message) => Self::Configuration { message },
            io @ StorageError::Io { .. } => Self::StorageIo { source: io },
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::path::{Path, PathBuf};

    #[test]
    fn storage_errors_map_onto_taxonomy() {
        let err: CoreError = StorageError::Integrity("tag".into()).into();
        assert!(err.is_integrity());

        let err: CoreError = StorageError::NotFound(PathBuf::from("a.seg")).into();
        assert!(err.is_not_found());

        let err: CoreError = StorageError::Encryption("pad".into()).into();
        assert!(matches!(err, CoreError::Encryption { .. }));

        let err: CoreError = StorageError::Configuration("iterations".into()).into();
        assert!(matches!(err, CoreError::Configuration { .. }));

        let err: CoreError = StorageError::io(
            Path::new("a.seg"),
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        )
        .into();
        assert!(matches!(err, CoreError::StorageIo { .. }));
    }

    #[test]
    fn display_messages() {
        assert_eq!(
            CoreError::configuration("bad size").to_string(),
            "invalid configuration: bad size"
        );
        assert_eq!(CoreError::Cancelled.to_string(), "operation cancelled");
    }
}
