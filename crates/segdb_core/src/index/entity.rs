//! Per-entity index: property indexes, primary-key map, and query cache.

use super::cache::{CacheLookup, QueryCache, QueryShape};
use super::entry::IndexEntry;
use super::property::{PropertyIndex, PropertyStats};
use super::value::IndexValue;
use crate::segment::RecordLocation;
use crate::types::SegmentId;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Storage flags copied into every entry created for a write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageFlags {
    /// Segment written compressed.
    pub compressed: bool,
    /// Segment written encrypted.
    pub encrypted: bool,
}

/// All secondary indexes of one entity.
///
/// The index is a derived accelerator. It can always be rebuilt from the
/// segments with [`EntityIndex::clear`] followed by re-indexing every
/// record.
#[derive(Debug, Clone)]
pub struct EntityIndex {
    pub(super) entity: String,
    pub(super) properties: BTreeMap<String, PropertyIndex>,
    pub(super) primary: HashMap<String, SegmentId>,
    pub(super) cache: QueryCache,
    pub(super) synced_sequence: u64,
    layout_epoch: u64,
}

impl EntityIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new(entity: impl Into<String>, cache: QueryCache) -> Self {
        Self {
            entity: entity.into(),
            properties: BTreeMap::new(),
            primary: HashMap::new(),
            cache,
            synced_sequence: 0,
            layout_epoch: 0,
        }
    }

    /// Returns the entity name.
    #[must_use]
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Returns the metadata write sequence this index was last saved at.
    #[must_use]
    pub fn synced_sequence(&self) -> u64 {
        self.synced_sequence
    }

    /// Records the metadata write sequence the index reflects.
    pub fn set_synced_sequence(&mut self, sequence: u64) {
        self.synced_sequence = sequence;
    }

    /// Returns a counter that advances whenever records move between
    /// segments or lose their segment, so readers can tell whether a
    /// location they resolved earlier is still current.
    #[must_use]
    pub fn layout_epoch(&self) -> u64 {
        self.layout_epoch
    }

    /// Replaces the contents of this index with `fresh`, advancing the
    /// layout epoch.
    pub fn replace_with(&mut self, fresh: EntityIndex) {
        let epoch = self.layout_epoch + 1;
        *self = fresh;
        self.layout_epoch = epoch;
    }

    /// Adds or replaces the entry of a record in one property index.
    pub fn add_entry(&mut self, property: &str, entry: IndexEntry) {
        self.primary
            .insert(entry.record_key.clone(), entry.segment_id);
        self.properties
            .entry(property.to_string())
            .or_insert_with(|| PropertyIndex::new(property))
            .add_entry(entry);
        self.cache.invalidate_property(property);
    }

    /// Indexes a freshly written record.
    ///
    /// Property indexes that held a value for this key but are absent from
    /// `values` get the stale entry soft-deleted.
    pub fn index_record(
        &mut self,
        segment_id: SegmentId,
        location: &RecordLocation,
        values: &[(String, IndexValue)],
        flags: StorageFlags,
        original_size: Option<u64>,
    ) {
        self.primary.insert(location.key.clone(), segment_id);

        let present: BTreeSet<&str> = values.iter().map(|(p, _)| p.as_str()).collect();
        let stale: Vec<String> = self
            .properties
            .iter()
            .filter(|(name, index)| {
                !present.contains(name.as_str())
                    && index.get(&location.key).is_some_and(|e| !e.deleted)
            })
            .map(|(name, _)| name.clone())
            .collect();
        for property in stale {
            self.remove_entries_by_record_id(&property, &location.key);
        }

        for (property, value) in values {
            let entry = IndexEntry::new(self.entity.clone(), value.clone(), segment_id, location)
                .with_storage(flags.compressed, flags.encrypted, original_size);
            self.add_entry(property, entry);
        }
    }

    /// Soft-deletes the entry of a record in one property index.
    pub fn remove_entries_by_record_id(&mut self, property: &str, record_key: &str) -> usize {
        let removed = match self.properties.get_mut(property) {
            Some(index) => index.remove_entries_by_record_id(record_key),
            None => 0,
        };
        if removed > 0 {
            self.cache.invalidate_property(property);
        }
        removed
    }

    /// Removes a record from the primary map and soft-deletes its entries.
    ///
    /// Returns the number of property entries soft-deleted.
    pub fn remove_record(&mut self, record_key: &str) -> usize {
        self.primary.remove(record_key);
        let mut removed = 0;
        for (name, index) in &mut self.properties {
            let count = index.remove_entries_by_record_id(record_key);
            if count > 0 {
                self.cache.invalidate_property(name);
                removed += count;
            }
        }
        removed
    }

    /// Returns live entries of `property` equal to `value`.
    #[must_use]
    pub fn find_by_value(&self, property: &str, value: &IndexValue) -> Vec<IndexEntry> {
        self.properties
            .get(property)
            .map(|index| index.find_by_value(value))
            .unwrap_or_default()
    }

    /// Returns live entries of `property` within `[min, max]`.
    #[must_use]
    pub fn find_by_range(
        &self,
        property: &str,
        min: &IndexValue,
        max: &IndexValue,
    ) -> Vec<IndexEntry> {
        self.properties
            .get(property)
            .map(|index| index.find_by_range(min, max))
            .unwrap_or_default()
    }

    /// Returns the distinct live values of `property`.
    #[must_use]
    pub fn unique_values(&self, property: &str) -> Vec<IndexValue> {
        self.properties
            .get(property)
            .map(PropertyIndex::unique_values)
            .unwrap_or_default()
    }

    /// Returns the segment holding the latest copy of a record.
    #[must_use]
    pub fn segment_of(&self, record_key: &str) -> Option<SegmentId> {
        self.primary.get(record_key).copied()
    }

    /// Returns the number of live records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.primary.len()
    }

    /// Returns true if no records are indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.primary.is_empty()
    }

    /// Returns the segments that may hold results of `shape`, sorted.
    ///
    /// The second value is true when the answer came from the cache.
    pub fn candidate_segments(&mut self, shape: &QueryShape) -> (Vec<SegmentId>, bool) {
        if let CacheLookup::Hit(segments) = self.cache.get(shape) {
            return (segments, true);
        }

        let entries = match shape {
            QueryShape::Equals { property, value } => self.find_by_value(property, value),
            QueryShape::Range { property, min, max } => self.find_by_range(property, min, max),
        };
        let segments: BTreeSet<SegmentId> = entries.iter().map(|e| e.segment_id).collect();
        let segments: Vec<SegmentId> = segments.into_iter().collect();
        self.cache.insert(shape, segments.clone());
        (segments, false)
    }

    /// Re-points records moved by compaction.
    ///
    /// Only records whose current location is one of `sources` move.
    pub fn relocate(
        &mut self,
        sources: &[SegmentId],
        created: SegmentId,
        locations: &[RecordLocation],
    ) -> usize {
        let from: HashSet<SegmentId> = sources.iter().copied().collect();
        let mut moved = 0;
        for location in locations {
            if let Some(segment) = self.primary.get_mut(&location.key) {
                if from.contains(segment) {
                    *segment = created;
                    moved += 1;
                }
            }
            for index in self.properties.values_mut() {
                index.relocate(&from, created, location);
            }
        }
        for index in self.properties.values_mut() {
            index.purge_deleted_in(&from);
        }
        self.cache.invalidate_segments(sources);
        self.layout_epoch += 1;
        moved
    }

    /// Drops everything that points into `segments`.
    pub fn forget_segments(&mut self, segments: &[SegmentId]) -> usize {
        let gone: HashSet<SegmentId> = segments.iter().copied().collect();
        let before = self.primary.len();
        self.primary.retain(|_, segment| !gone.contains(segment));
        for index in self.properties.values_mut() {
            index.forget_segments(&gone);
        }
        self.cache.invalidate_segments(segments);
        self.layout_epoch += 1;
        before - self.primary.len()
    }

    /// Empties the index, keeping the cache settings.
    pub fn clear(&mut self) {
        self.properties.clear();
        self.primary.clear();
        self.cache.clear();
    }

    /// Returns one property index.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertyIndex> {
        self.properties.get(name)
    }

    /// Returns statistics of every property index.
    #[must_use]
    pub fn stats(&self) -> BTreeMap<String, PropertyStats> {
        self.properties
            .iter()
            .map(|(name, index)| (name.clone(), index.stats()))
            .collect()
    }
}
