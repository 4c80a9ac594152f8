//! # segdb Core
//!
//! Segment-based storage engine for typed records.
//!
//! This crate provides:
//! - Segment files with rotation, compaction, and age-based cleanup
//! - Per-entity metadata persisted with a backup copy
//! - Secondary property indexes with a query cache
//! - A global registry of entities and their dependencies
//! - A typed store over any `serde` record type
//!
//! File bytes, compression, and encryption are handled by
//! [`segdb_storage`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use segdb_core::{EngineConfig, IndexValue, Record, StorageEngine, Timestamp};
//!
//! let engine = StorageEngine::open(EngineConfig::new("data"))?;
//! let people = engine.store::<Person>()?;
//! people.save(&[alice])?;
//! let thirty = people.find_by_value("age", &IndexValue::from(30))?;
//! engine.shutdown()?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod dir;
mod engine;
mod error;
mod global;
pub mod index;
pub mod metadata;
mod record;
pub mod segment;
mod stats;
mod types;

pub use config::{EncryptionConfig, EngineConfig};
pub use dir::{validate_entity_name, DataDir, StorageLayout, MAX_ENTITY_NAME_LEN};
pub use engine::{EntityStore, IntegrityReport, StorageEngine};
pub use error::{CoreError, CoreResult};
pub use global::{GlobalIndex, GlobalStats};
pub use index::{IndexEntry, IndexValue, PropertyStats, ValueKind};
pub use metadata::{EntityMetadata, PropertySchema, SegmentInfo};
pub use record::{Record, RecordStore};
pub use segment::{CleanupReport, CompactionReport, SegmentHeader};
pub use stats::{EngineStats, StatsSnapshot};
pub use types::{Cancellation, SegmentId, Timestamp};

pub use segdb_storage::EncryptionAlgorithm;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
