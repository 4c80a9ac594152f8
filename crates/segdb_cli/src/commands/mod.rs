//! CLI command implementations.

pub mod cleanup;
pub mod compact;
pub mod drop_entity;
pub mod inspect;
pub mod verify;

use segdb_core::{EncryptionAlgorithm, EncryptionConfig, EngineConfig, StorageEngine};
use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Settings shared by every command that opens a data root.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Data root.
    pub root: PathBuf,
    /// Passphrase of an encrypted root.
    pub passphrase: Option<String>,
    /// AES key size in bits.
    pub key_bits: u32,
    /// PBKDF2 iteration override.
    pub iterations: Option<u32>,
    /// Whether written files are gzipped.
    pub compress: bool,
    /// Maximum segment size in megabytes.
    pub max_segment_mb: u64,
}

impl OpenOptions {
    /// Builds the engine configuration. The auto-flush worker stays off.
    pub fn config(&self) -> Result<EngineConfig, Box<dyn Error>> {
        let mut config = EngineConfig::new(&self.root)
            .compression(self.compress)
            .max_segment_size_mb(self.max_segment_mb)
            .auto_flush_interval(Duration::ZERO);
        if let Some(passphrase) = &self.passphrase {
            let mut encryption = EncryptionConfig::new(passphrase.as_str())
                .algorithm(EncryptionAlgorithm::from_key_bits(self.key_bits)?);
            if let Some(iterations) = self.iterations {
                encryption = encryption.iterations(iterations);
            }
            config = config.encryption(encryption);
        }
        Ok(config)
    }

    /// Opens the engine over an existing data root.
    pub fn open(&self) -> Result<StorageEngine, Box<dyn Error>> {
        if !self.root.is_dir() {
            return Err(format!("no data root at {}", self.root.display()).into());
        }
        debug!(
            root = %self.root.display(),
            encrypted = self.passphrase.is_some(),
            compressed = self.compress,
            "opening data root"
        );
        Ok(StorageEngine::open(self.config()?)?)
    }
}

/// Fails unless `entity` is registered in the data root.
pub fn require_entity(engine: &StorageEngine, entity: &str) -> Result<(), Box<dyn Error>> {
    if engine.entity_names().iter().any(|name| name == entity) {
        Ok(())
    } else {
        Err(format!("unknown entity {entity:?}").into())
    }
}

/// Formats a byte count for humans.
pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    let value = bytes as f64;
    if value < KB {
        format!("{bytes} B")
    } else if value < KB * KB {
        format!("{:.1} KB", value / KB)
    } else if value < KB * KB * KB {
        format!("{:.1} MB", value / (KB * KB))
    } else {
        format!("{:.1} GB", value / (KB * KB * KB))
    }
}
