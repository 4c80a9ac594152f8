//! # segdb Storage
//!
//! File access layer and encryption service for segdb.
//!
//! This crate is the leaf of the segdb stack. It moves whole files of
//! bytes between memory and a path, optionally through gzip compression and
//! AES-CBC encryption. It knows nothing about segments, metadata, or
//! indexes; segdb_core owns every file format.
//!
//! ## Design Principles
//!
//! - One capability trait ([`FileAccess`]) with interchangeable implementations
//! - Storage code is agnostic to whether encryption is active
//! - Durable writes stage to a temporary file and atomically promote it
//! - Must be `Send + Sync` for concurrent access
//!
//! ## Available Implementations
//!
//! - [`PlainFileAccess`] - OS files, optional gzip
//! - [`EncryptedFileAccess`] - Wraps another access with [`CipherService`]
//! - [`InMemoryFileAccess`] - For testing and tooling
//!
//! ## Example
//!
//! ```rust
//! use segdb_storage::{FileAccess, InMemoryFileAccess};
//! use std::path::Path;
//!
//! let access = InMemoryFileAccess::new();
//! access.write_durable(Path::new("data/a.seg"), b"hello world").unwrap();
//! let data = access.read_all_bytes(Path::new("data/a.seg")).unwrap();
//! assert_eq!(&data, b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod access;
pub mod compression;
pub mod crypto;
mod encrypted;
mod error;
mod file;
mod memory;

pub use access::{backup_path, staging_path, FileAccess};
pub use crypto::{
    derive_key_material, generate_salt, sha256_hex, CipherService, EncryptionAlgorithm,
    KeyMaterial, DEFAULT_ITERATIONS, HMAC_KEY_SIZE, IV_SIZE, MIN_ITERATIONS, SALT_SIZE, TAG_SIZE,
};
pub use encrypted::EncryptedFileAccess;
pub use error::{StorageError, StorageResult};
pub use file::PlainFileAccess;
pub use memory::InMemoryFileAccess;
