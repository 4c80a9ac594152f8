//! Per-entity metadata.
//!
//! Metadata is the authoritative list of an entity's segments. Its order is
//! the logical age order of the segments: when the same record key appears
//! in more than one segment, the copy in the later segment wins.

mod manager;

pub use manager::EntityMetadataManager;

use crate::index::ValueKind;
use crate::types::{SegmentId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Description of one segment file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentInfo {
    /// Segment ID.
    pub id: SegmentId,
    /// File name within the entity directory.
    pub file_name: String,
    /// Records physically stored in the file.
    pub record_count: u64,
    /// Size of the file on disk.
    pub size_bytes: u64,
    /// SHA-256 hex of the on-disk bytes; empty until first written.
    pub checksum: String,
    /// Whether the file was written compressed.
    pub compressed: bool,
    /// Whether the file was written encrypted.
    pub encrypted: bool,
    /// Whether this is the entity's active segment.
    pub active: bool,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last write time.
    pub modified_at: Timestamp,
    /// Keys soft-deleted in this segment.
    #[serde(default)]
    pub deleted_ids: BTreeSet<String>,
}

impl SegmentInfo {
    /// Creates an empty, never-written segment description.
    #[must_use]
    pub fn new(id: SegmentId, file_name: String, now: Timestamp) -> Self {
        Self {
            id,
            file_name,
            record_count: 0,
            size_bytes: 0,
            checksum: String::new(),
            compressed: false,
            encrypted: false,
            active: false,
            created_at: now,
            modified_at: now,
            deleted_ids: BTreeSet::new(),
        }
    }

    /// Returns true if the file has never been written.
    #[must_use]
    pub fn is_unwritten(&self) -> bool {
        self.checksum.is_empty()
    }

    /// Returns true if `key` is soft-deleted in this segment.
    #[must_use]
    pub fn is_deleted(&self, key: &str) -> bool {
        self.deleted_ids.contains(key)
    }
}

/// Declared property of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySchema {
    /// Property name.
    pub name: String,
    /// Value kind.
    pub kind: ValueKind,
    /// Whether the property is kept in a secondary index.
    pub indexed: bool,
    /// Whether every record must carry the property.
    pub required: bool,
}

impl PropertySchema {
    /// Creates an indexed, optional property.
    #[must_use]
    pub fn indexed(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            indexed: true,
            required: false,
        }
    }

    /// Marks the property as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Metadata of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMetadata {
    /// Entity name.
    pub entity: String,
    /// Segments in logical age order, oldest first.
    pub segments: Vec<SegmentInfo>,
    /// Declared properties.
    #[serde(default)]
    pub schema: Vec<PropertySchema>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last change time.
    pub modified_at: Timestamp,
    /// Next segment ID to hand out.
    pub next_segment_id: u64,
    /// Incremented on every metadata change.
    pub write_sequence: u64,
}

impl EntityMetadata {
    /// Creates metadata for an entity with no segments.
    #[must_use]
    pub fn new(entity: impl Into<String>) -> Self {
        let now = Timestamp::now();
        Self {
            entity: entity.into(),
            segments: Vec::new(),
            schema: Vec::new(),
            created_at: now,
            modified_at: now,
            next_segment_id: 1,
            write_sequence: 0,
        }
    }

    /// Reserves a fresh segment ID.
    pub fn allocate_segment_id(&mut self) -> SegmentId {
        let id = SegmentId::new(self.next_segment_id);
        self.next_segment_id += 1;
        id
    }

    /// Returns the active segment, if any.
    #[must_use]
    pub fn active_segment(&self) -> Option<&SegmentInfo> {
        self.segments.iter().find(|s| s.active)
    }

    /// Looks up a segment by ID.
    #[must_use]
    pub fn segment(&self, id: SegmentId) -> Option<&SegmentInfo> {
        self.segments.iter().find(|s| s.id == id)
    }

    /// Looks up a segment by ID for modification.
    pub fn segment_mut(&mut self, id: SegmentId) -> Option<&mut SegmentInfo> {
        self.segments.iter_mut().find(|s| s.id == id)
    }

    /// Returns the list position of a segment.
    #[must_use]
    pub fn position(&self, id: SegmentId) -> Option<usize> {
        self.segments.iter().position(|s| s.id == id)
    }

    /// Returns the segment before `id` in list order.
    #[must_use]
    pub fn previous_of(&self, id: SegmentId) -> Option<SegmentId> {
        let pos = self.position(id)?;
        pos.checked_sub(1).map(|p| self.segments[p].id)
    }

    /// Returns the segment after `id` in list order.
    #[must_use]
    pub fn next_of(&self, id: SegmentId) -> Option<SegmentId> {
        let pos = self.position(id)?;
        self.segments.get(pos + 1).map(|s| s.id)
    }

    /// Removes a segment by file name.
    pub fn remove_segment(&mut self, file_name: &str) -> Option<SegmentInfo> {
        let pos = self.segments.iter().position(|s| s.file_name == file_name)?;
        Some(self.segments.remove(pos))
    }

    /// Total records physically stored across segments.
    #[must_use]
    pub fn total_records(&self) -> u64 {
        self.segments.iter().map(|s| s.record_count).sum()
    }

    /// Total soft-deleted keys across segments.
    #[must_use]
    pub fn total_deleted(&self) -> u64 {
        self.segments.iter().map(|s| s.deleted_ids.len() as u64).sum()
    }

    /// Total on-disk size across segments.
    #[must_use]
    pub fn total_size_bytes(&self) -> u64 {
        self.segments.iter().map(|s| s.size_bytes).sum()
    }

    /// Total on-disk size in megabytes.
    #[must_use]
    pub fn total_size_mb(&self) -> f64 {
        self.total_size_bytes() as f64 / (1024.0 * 1024.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata_with(n: u64) -> EntityMetadata {
        let mut meta = EntityMetadata::new("person");
        for _ in 0..n {
            let id = meta.allocate_segment_id();
            let mut info = SegmentInfo::new(id, format!("s{}", id.as_u64()), Timestamp(1));
            info.record_count = 10;
            info.size_bytes = 1_000;
            meta.segments.push(info);
        }
        meta
    }

    #[test]
    fn segment_ids_are_sequential() {
        let mut meta = EntityMetadata::new("person");
        assert_eq!(meta.allocate_segment_id(), SegmentId::new(1));
        assert_eq!(meta.allocate_segment_id(), SegmentId::new(2));
    }

    #[test]
    fn totals_are_computed() {
        let mut meta = metadata_with(3);
        assert_eq!(meta.total_records(), 30);
        assert_eq!(meta.total_size_bytes(), 3_000);

        meta.remove_segment("s2");
        assert_eq!(meta.total_records(), 20);
        assert_eq!(meta.total_size_bytes(), 2_000);
    }

    #[test]
    fn neighbours() {
        let meta = metadata_with(3);
        assert_eq!(meta.previous_of(SegmentId::new(1)), None);
        assert_eq!(meta.previous_of(SegmentId::new(2)), Some(SegmentId::new(1)));
        assert_eq!(meta.next_of(SegmentId::new(2)), Some(SegmentId::new(3)));
        assert_eq!(meta.next_of(SegmentId::new(3)), None);
    }

    #[test]
    fn json_roundtrip_keeps_deleted_ids() {
        let mut meta = metadata_with(1);
        meta.segments[0].deleted_ids.insert("k1".into());
        let json = serde_json::to_string(&meta).unwrap();
        let back: EntityMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, meta);
        assert!(back.segments[0].is_deleted("k1"));
    }
}
