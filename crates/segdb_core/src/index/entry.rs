//! Index entries.

use super::value::IndexValue;
use crate::segment::RecordLocation;
use crate::types::{SegmentId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Points one (entity, record key) pair at its physical location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Entity name.
    pub entity: String,
    /// Record primary key.
    pub record_key: String,
    /// Indexed property value.
    pub value: IndexValue,
    /// Segment holding the record.
    pub segment_id: SegmentId,
    /// Offset of the record frame within the segment body.
    pub offset: u64,
    /// Length of the record frame.
    pub length: u32,
    /// SHA-256 hex of the record payload.
    pub content_hash: String,
    /// Starts at 1 and grows by one on every update or soft delete.
    pub version: u64,
    /// Whether the segment was written compressed.
    pub compressed: bool,
    /// Whether the segment was written encrypted.
    pub encrypted: bool,
    /// Size before compression, when compressed.
    pub original_size: Option<u64>,
    /// Soft-delete flag.
    pub deleted: bool,
    /// When the entry was soft-deleted.
    pub deleted_at: Option<Timestamp>,
    /// Free-form tags.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl IndexEntry {
    /// Creates a version-1 entry for a record at `location` in `segment_id`.
    #[must_use]
    pub fn new(
        entity: impl Into<String>,
        value: IndexValue,
        segment_id: SegmentId,
        location: &RecordLocation,
    ) -> Self {
        Self {
            entity: entity.into(),
            record_key: location.key.clone(),
            value,
            segment_id,
            offset: location.offset,
            length: location.length,
            content_hash: location.content_hash.clone(),
            version: 1,
            compressed: false,
            encrypted: false,
            original_size: None,
            deleted: false,
            deleted_at: None,
            tags: BTreeSet::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Sets the storage flags.
    #[must_use]
    pub fn with_storage(mut self, compressed: bool, encrypted: bool, original_size: Option<u64>) -> Self {
        self.compressed = compressed;
        self.encrypted = encrypted;
        self.original_size = original_size;
        self
    }

    /// Records a modification.
    pub fn touch(&mut self) {
        self.version += 1;
    }

    /// Marks the entry deleted.
    pub fn soft_delete(&mut self, at: Timestamp) {
        self.deleted = true;
        self.deleted_at = Some(at);
        self.touch();
    }

    /// Points the entry at a new physical location.
    ///
    /// Relocation does not change the record, so the version is kept.
    pub fn relocate(&mut self, segment_id: SegmentId, location: &RecordLocation) {
        self.segment_id = segment_id;
        self.offset = location.offset;
        self.length = location.length;
        self.content_hash = location.content_hash.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(key: &str, offset: u64) -> RecordLocation {
        RecordLocation {
            key: key.to_string(),
            offset,
            length: 20,
            content_hash: "abc".into(),
        }
    }

    #[test]
    fn new_entry_starts_at_version_one() {
        let entry = IndexEntry::new("person", IndexValue::from(30), SegmentId::new(1), &location("p1", 0));
        assert_eq!(entry.version, 1);
        assert_eq!(entry.record_key, "p1");
        assert!(!entry.deleted);
    }

    #[test]
    fn soft_delete_bumps_version_once() {
        let mut entry =
            IndexEntry::new("person", IndexValue::from(30), SegmentId::new(1), &location("p1", 0));
        entry.soft_delete(Timestamp(5));
        assert!(entry.deleted);
        assert_eq!(entry.deleted_at, Some(Timestamp(5)));
        assert_eq!(entry.version, 2);
    }

    #[test]
    fn relocate_keeps_version() {
        let mut entry =
            IndexEntry::new("person", IndexValue::from(30), SegmentId::new(1), &location("p1", 0));
        entry.relocate(SegmentId::new(9), &location("p1", 128));
        assert_eq!(entry.segment_id, SegmentId::new(9));
        assert_eq!(entry.offset, 128);
        assert_eq!(entry.version, 1);
    }
}
