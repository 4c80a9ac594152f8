//! Engine configuration.

use crate::error::{CoreError, CoreResult};
use segdb_storage::{EncryptionAlgorithm, DEFAULT_ITERATIONS, MIN_ITERATIONS};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use zeroize::{Zeroize, ZeroizeOnDrop};

const MB: u64 = 1024 * 1024;

/// Settings for opening a storage engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root directory for all entities.
    pub data_root: PathBuf,

    /// Encryption settings; `None` stores plaintext.
    pub encryption: Option<EncryptionConfig>,

    /// Whether to gzip file contents at rest.
    pub compression: bool,

    /// Size in bytes at which the active segment is sealed.
    pub max_segment_size: u64,

    /// Record count at which the active segment is sealed.
    pub max_records_per_segment: u64,

    /// Whether the query cache is used.
    pub cache_enabled: bool,

    /// Maximum number of cached query results per entity.
    pub cache_size: usize,

    /// How long a cached query result stays valid.
    pub cache_ttl: Duration,

    /// How often dirty indexes are persisted (zero disables the worker).
    pub auto_flush_interval: Duration,

    /// How long shutdown waits for an in-flight flush.
    pub shutdown_grace: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("segdb-data"),
            encryption: None,
            compression: false,
            max_segment_size: 10 * MB,
            max_records_per_segment: 10_000,
            cache_enabled: true,
            cache_size: 1_024,
            cache_ttl: Duration::from_secs(5 * 60),
            auto_flush_interval: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    /// Creates a configuration rooted at `data_root` with default values.
    #[must_use]
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            ..Self::default()
        }
    }

    /// Enables encryption.
    #[must_use]
    pub fn encryption(mut self, encryption: EncryptionConfig) -> Self {
        self.encryption = Some(encryption);
        self
    }

    /// Sets whether file contents are compressed.
    #[must_use]
    pub const fn compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    /// Sets the maximum segment size in bytes.
    #[must_use]
    pub const fn max_segment_size(mut self, bytes: u64) -> Self {
        self.max_segment_size = bytes;
        self
    }

    /// Sets the maximum segment size in megabytes.
    #[must_use]
    pub const fn max_segment_size_mb(mut self, mb: u64) -> Self {
        self.max_segment_size = mb * MB;
        self
    }

    /// Sets the maximum records per segment.
    #[must_use]
    pub const fn max_records_per_segment(mut self, records: u64) -> Self {
        self.max_records_per_segment = records;
        self
    }

    /// Sets whether the query cache is used.
    #[must_use]
    pub const fn cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    /// Sets the query cache capacity.
    #[must_use]
    pub const fn cache_size(mut self, entries: usize) -> Self {
        self.cache_size = entries;
        self
    }

    /// Sets the query cache time-to-live.
    #[must_use]
    pub const fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Sets the auto-flush interval.
    #[must_use]
    pub const fn auto_flush_interval(mut self, interval: Duration) -> Self {
        self.auto_flush_interval = interval;
        self
    }

    /// Sets the shutdown grace period.
    #[must_use]
    pub const fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Checks the configuration for invalid values.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Configuration`] describing the first problem found.
    pub fn validate(&self) -> CoreResult<()> {
        if self.data_root.as_os_str().is_empty() {
            return Err(CoreError::configuration("data root must not be empty"));
        }
        if self.max_segment_size == 0 {
            return Err(CoreError::configuration("max segment size must be positive"));
        }
        if self.max_records_per_segment == 0 {
            return Err(CoreError::configuration(
                "max records per segment must be positive",
            ));
        }
        if self.cache_enabled && self.cache_size == 0 {
            return Err(CoreError::configuration(
                "cache size must be positive when the cache is enabled",
            ));
        }
        if let Some(encryption) = &self.encryption {
            encryption.validate()?;
        }
        Ok(())
    }
}

/// Encryption settings.
///
/// The passphrase and salt are wiped from memory when the value is dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionConfig {
    /// AES-CBC variant.
    #[zeroize(skip)]
    pub algorithm: EncryptionAlgorithm,

    /// Passphrase keys are derived from.
    pub passphrase: String,

    /// PBKDF2 iteration count.
    pub iterations: u32,

    /// Explicit salt; when `None` a salt is generated once and persisted in
    /// the data root.
    pub salt: Option<Vec<u8>>,

    /// Whether an HMAC tag is written and verified.
    pub integrity_check: bool,
}

impl EncryptionConfig {
    /// Creates AES-256-CBC settings with default iterations and integrity tags.
    #[must_use]
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self {
            algorithm: EncryptionAlgorithm::default(),
            passphrase: passphrase.into(),
            iterations: DEFAULT_ITERATIONS,
            salt: None,
            integrity_check: true,
        }
    }

    /// Sets the algorithm.
    #[must_use]
    pub fn algorithm(mut self, algorithm: EncryptionAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Sets the PBKDF2 iteration count.
    #[must_use]
    pub fn iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    /// Sets an explicit salt.
    #[must_use]
    pub fn salt(mut self, salt: impl Into<Vec<u8>>) -> Self {
        self.salt = Some(salt.into());
        self
    }

    /// Sets whether HMAC tags are used.
    #[must_use]
    pub fn integrity_check(mut self, enabled: bool) -> Self {
        self.integrity_check = enabled;
        self
    }

    /// Checks the encryption settings.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Configuration`] for an empty passphrase or salt,
    /// or too few iterations.
    pub fn validate(&self) -> CoreResult<()> {
        if self.passphrase.is_empty() {
            return Err(CoreError::configuration("passphrase must not be empty"));
        }
        if self.iterations < MIN_ITERATIONS {
            return Err(CoreError::configuration(format!(
                "PBKDF2 iterations must be at least {MIN_ITERATIONS}, got {}",
                self.iterations
            )));
        }
        if matches!(&self.salt, Some(salt) if salt.is_empty()) {
            return Err(CoreError::configuration("salt must not be empty"));
        }
        Ok(())
    }
}

impl fmt::Debug for EncryptionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionConfig")
            .field("algorithm", &self.algorithm)
            .field("passphrase", &"[REDACTED]")
            .field("iterations", &self.iterations)
            .field("salt", &self.salt.as_ref().map(|_| "[REDACTED]"))
            .field("integrity_check", &self.integrity_check)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.max_segment_size, 10 * MB);
        assert_eq!(config.max_records_per_segment, 10_000);
        assert_eq!(config.cache_size, 1_024);
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
        assert_eq!(config.auto_flush_interval, Duration::from_secs(30));
        assert!(config.cache_enabled);
        assert!(!config.compression);
        assert!(config.encryption.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_pattern() {
        let config = EngineConfig::new("/tmp/db")
            .compression(true)
            .max_segment_size_mb(1)
            .max_records_per_segment(50)
            .cache_size(8);

        assert!(config.compression);
        assert_eq!(config.max_segment_size, MB);
        assert_eq!(config.max_records_per_segment, 50);
        assert_eq!(config.cache_size, 8);
    }

    #[test]
    fn rejects_zero_sizes() {
        assert!(EngineConfig::new("/tmp/db").max_segment_size(0).validate().is_err());
        assert!(EngineConfig::new("/tmp/db")
            .max_records_per_segment(0)
            .validate()
            .is_err());
        assert!(EngineConfig::new("/tmp/db").cache_size(0).validate().is_err());
        assert!(EngineConfig::new("/tmp/db")
            .cache_enabled(false)
            .cache_size(0)
            .validate()
            .is_ok());
    }

    #[test]
    fn rejects_weak_encryption_settings() {
        let low = EngineConfig::new("/tmp/db").encryption(EncryptionConfig::new("pw").iterations(10));
        assert!(matches!(low.validate(), Err(CoreError::Configuration { .. })));

        let empty = EngineConfig::new("/tmp/db").encryption(EncryptionConfig::new(""));
        assert!(empty.validate().is_err());

        let empty_salt =
            EngineConfig::new("/tmp/db").encryption(EncryptionConfig::new("pw").salt(Vec::new()));
        assert!(empty_salt.validate().is_err());
    }

    #[test]
    fn debug_redacts_passphrase() {
        let config = EncryptionConfig::new("hunter2").salt(b"pepper".to_vec());
        let printed = format!("{config:?}");
        assert!(!printed.contains("hunter2"));
        assert!(!printed.contains("pepper"));
    }
}
