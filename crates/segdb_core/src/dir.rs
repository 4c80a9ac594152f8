//! Data directory management.
//!
//! This module handles the file system layout for segdb:
//!
//! ```text
//! <data_root>/
//! ├─ LOCK                            # Advisory lock for single-process access
//! ├─ KEYSALT                         # Persisted PBKDF2 salt (encrypted stores)
//! ├─ global.index                    # Cross-entity registry and rollup
//! └─ <entity>/
//!    ├─ <entity>.metadata            # Segment list and schema (JSON)
//!    ├─ <entity>.metadata.bak        # Previous metadata version
//!    ├─ <entity>.index               # Persisted secondary indexes (JSON)
//!    └─ <entity>_segment_000001.seg  # Segment files
//! ```

use crate::error::{CoreError, CoreResult};
use crate::types::SegmentId;
use fs2::FileExt;
use segdb_storage::{generate_salt, FileAccess, PlainFileAccess, StorageError};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const SALT_FILE: &str = "KEYSALT";
const GLOBAL_INDEX_FILE: &str = "global.index";

/// Longest accepted entity name.
pub const MAX_ENTITY_NAME_LEN: usize = 128;

/// Path arithmetic for the data directory.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    /// Creates a layout rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the data root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the directory holding one entity's files.
    #[must_use]
    pub fn entity_dir(&self, entity: &str) -> PathBuf {
        self.root.join(entity)
    }

    /// Returns the file name of a segment, e.g. `person_segment_000003.seg`.
    #[must_use]
    pub fn segment_file_name(entity: &str, id: SegmentId) -> String {
        format!("{entity}_segment_{:06}.seg", id.as_u64())
    }

    /// Returns the full path of a segment file.
    #[must_use]
    pub fn segment_path(&self, entity: &str, id: SegmentId) -> PathBuf {
        self.entity_dir(entity)
            .join(Self::segment_file_name(entity, id))
    }

    /// Returns the path of an entity's metadata file.
    #[must_use]
    pub fn metadata_path(&self, entity: &str) -> PathBuf {
        self.entity_dir(entity).join(format!("{entity}.metadata"))
    }

    /// Returns the path of an entity's persisted index.
    #[must_use]
    pub fn index_path(&self, entity: &str) -> PathBuf {
        self.entity_dir(entity).join(format!("{entity}.index"))
    }

    /// Returns the path of the global index.
    #[must_use]
    pub fn global_index_path(&self) -> PathBuf {
        self.root.join(GLOBAL_INDEX_FILE)
    }

    /// Returns the path of the persisted key salt.
    #[must_use]
    pub fn salt_path(&self) -> PathBuf {
        self.root.join(SALT_FILE)
    }

    /// Returns the path of the lock file.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }
}

/// Checks that an entity name is usable as a directory and file prefix.
///
/// # Errors
///
/// Returns [`CoreError::InvalidOperation`] for empty, overlong, or
/// non `[A-Za-z0-9_-]` names.
pub fn validate_entity_name(name: &str) -> CoreResult<()> {
    if name.is_empty() {
        return Err(CoreError::invalid_operation("entity name must not be empty"));
    }
    if name.len() > MAX_ENTITY_NAME_LEN {
        return Err(CoreError::invalid_operation(format!(
            "entity name longer than {MAX_ENTITY_NAME_LEN} bytes"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(CoreError::invalid_operation(format!(
            "entity name {name:?} may only contain ASCII letters, digits, '_' and '-'"
        )));
    }
    Ok(())
}

/// An opened data directory holding the exclusive process lock.
///
/// Only one `DataDir` can exist per directory at a time; the lock is
/// released when the value is dropped.
#[derive(Debug)]
pub struct DataDir {
    layout: StorageLayout,
    _lock_file: File,
}

impl DataDir {
    /// Opens or creates a data directory and takes its lock.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - Another process holds the lock (returns `DataDirLocked`)
    /// - I/O errors occur
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path).map_err(|e| StorageError::io(path, e))?;
            } else {
                return Err(CoreError::not_found(format!(
                    "data directory {}",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(CoreError::configuration(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let layout = StorageLayout::new(path);
        let lock_path = layout.lock_path();
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| StorageError::io(&lock_path, e))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::DataDirLocked);
        }

        Ok(Self {
            layout,
            _lock_file: lock_file,
        })
    }

    /// Returns the path layout of this directory.
    #[must_use]
    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Returns the persisted key salt, generating and storing one on first use.
    ///
    /// The salt is stored in plaintext because it is needed before any key
    /// exists. It is not secret.
    pub fn load_or_create_salt(&self) -> CoreResult<Vec<u8>> {
        let path = self.layout.salt_path();
        let access = PlainFileAccess::new();

        if access.exists(&path) {
            let salt = access.read_all_bytes(&path)?;
            if salt.is_empty() {
                return Err(CoreError::integrity(format!(
                    "key salt file {} is empty",
                    path.display()
                )));
            }
            return Ok(salt);
        }

        let salt = generate_salt();
        access.write_durable(&path, &salt)?;
        tracing::info!(path = %path.display(), "generated key salt");
        Ok(salt)
    }
}
