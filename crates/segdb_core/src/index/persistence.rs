//! Index persistence.
//!
//! Each entity's index is stored as one JSON document next to its
//! segments.
//!
//! ## Invariants
//!
//! - Index state **MUST** be derivable from the segments
//! - Persisted indexes are an optimization, not source of truth
//! - Corruption in an index file triggers rebuild, not error

use super::cache::QueryCache;
use super::entity::EntityIndex;
use super::entry::IndexEntry;
use super::property::PropertyIndex;
use crate::error::{CoreError, CoreResult};
use crate::types::SegmentId;
use segdb_storage::FileAccess;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Current index document format version.
const INDEX_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct IndexDocument {
    format_version: u32,
    entity: String,
    #[serde(default)]
    synced_sequence: u64,
    primary: BTreeMap<String, SegmentId>,
    properties: BTreeMap<String, Vec<IndexEntry>>,
}

/// Serializes an index.
pub fn encode_index(index: &EntityIndex) -> CoreResult<Vec<u8>> {
    let document = IndexDocument {
        format_version: INDEX_FORMAT_VERSION,
        entity: index.entity.clone(),
        synced_sequence: index.synced_sequence,
        primary: index
            .primary
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect(),
        properties: index
            .properties
            .iter()
            .map(|(name, property)| {
                let mut entries: Vec<IndexEntry> = property.entries().cloned().collect();
                entries.sort_by(|a, b| a.record_key.cmp(&b.record_key));
                (name.clone(), entries)
            })
            .collect(),
    };
    Ok(serde_json::to_vec(&document)?)
}

/// Deserializes an index, attaching a fresh query cache.
pub fn decode_index(bytes: &[u8], cache: QueryCache) -> CoreResult<EntityIndex> {
    let document: IndexDocument = serde_json::from_slice(bytes)?;
    if document.format_version != INDEX_FORMAT_VERSION {
        return Err(CoreError::serialization(format!(
            "unsupported index format version {}",
            document.format_version
        )));
    }

    let mut index = EntityIndex::new(document.entity, cache);
    index.synced_sequence = document.synced_sequence;
    index.primary = document.primary.into_iter().collect();
    for (name, entries) in document.properties {
        let mut property = PropertyIndex::new(name.clone());
        for entry in entries {
            property.restore_entry(entry);
        }
        index.properties.insert(name, property);
    }
    Ok(index)
}

/// Writes an index durably.
pub fn save_index(access: &dyn FileAccess, path: &Path, index: &EntityIndex) -> CoreResult<()> {
    let bytes = encode_index(index)?;
    if let Some(parent) = path.parent() {
        access.ensure_directory(parent)?;
    }
    access.write_durable(path, &bytes)?;
    Ok(())
}

/// Loads an index.
///
/// Returns `None` when the file is missing, unreadable, or belongs to a
/// different entity; the caller then rebuilds from the segments.
pub fn load_index(
    access: &dyn FileAccess,
    path: &Path,
    entity: &str,
    cache: QueryCache,
) -> Option<EntityIndex> {
    if !access.exists(path) {
        return None;
    }
    let loaded = access
        .read_all_bytes(path)
        .map_err(CoreError::from)
        .and_then(|bytes| decode_index(&bytes, cache));
    match loaded {
        Ok(index) if index.entity() == entity => Some(index),
        Ok(index) => {
            tracing::warn!(entity, found = index.entity(), path = %path.display(), "index belongs to another entity, rebuilding");
            None
        }
        Err(e) => {
            tracing::warn!(entity, path = %path.display(), error = %e, "index unreadable, rebuilding");
            None
        }
    }
}
