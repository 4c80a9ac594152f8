//! Per-property secondary index.

use super::entry::IndexEntry;
use super::value::IndexValue;
use crate::segment::RecordLocation;
use crate::types::{SegmentId, Timestamp};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::ops::Bound;

/// Statistics of one property index.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PropertyStats {
    /// Distinct live values.
    pub unique_values: usize,
    /// Live entries.
    pub live_entries: usize,
    /// Soft-deleted entries still held.
    pub deleted_entries: usize,
    /// Smallest live value.
    pub min: Option<IndexValue>,
    /// Largest live value.
    pub max: Option<IndexValue>,
    /// Time of the last change.
    pub last_modified: Option<Timestamp>,
}

/// Index of one property of one entity.
///
/// Holds one entry per record key. Live entries are bucketed by value in a
/// sorted map for range queries and a hash map for equality queries;
/// soft-deleted entries stay in the entry table until purged but are in no
/// bucket.
#[derive(Debug, Clone, Default)]
pub struct PropertyIndex {
    name: String,
    entries: HashMap<String, IndexEntry>,
    sorted: BTreeMap<IndexValue, BTreeSet<String>>,
    hashed: HashMap<IndexValue, BTreeSet<String>>,
    deleted_count: usize,
    last_modified: Option<Timestamp>,
}

impl PropertyIndex {
    /// Creates an empty index for `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Returns the property name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn link(&mut self, value: &IndexValue, key: &str) {
        self.sorted
            .entry(value.clone())
            .or_default()
            .insert(key.to_string());
        self.hashed
            .entry(value.clone())
            .or_default()
            .insert(key.to_string());
    }

    fn unlink(&mut self, value: &IndexValue, key: &str) {
        if let Some(keys) = self.sorted.get_mut(value) {
            keys.remove(key);
            if keys.is_empty() {
                self.sorted.remove(value);
            }
        }
        if let Some(keys) = self.hashed.get_mut(value) {
            keys.remove(key);
            if keys.is_empty() {
                self.hashed.remove(value);
            }
        }
    }

    fn detach(&mut self, key: &str) -> Option<IndexEntry> {
        let previous = self.entries.remove(key)?;
        if previous.deleted {
            self.deleted_count -= 1;
        } else {
            self.unlink(&previous.value, key);
        }
        Some(previous)
    }

    fn attach(&mut self, entry: IndexEntry) {
        if entry.deleted {
            self.deleted_count += 1;
        } else {
            self.link(&entry.value, &entry.record_key);
        }
        self.entries.insert(entry.record_key.clone(), entry);
    }

    /// Adds or replaces the entry for a record.
    ///
    /// Replacing an existing entry continues its version sequence.
    pub fn add_entry(&mut self, mut entry: IndexEntry) {
        if let Some(previous) = self.detach(&entry.record_key) {
            entry.version = previous.version;
            entry.touch();
        }
        self.attach(entry);
        self.last_modified = Some(Timestamp::now());
    }

    /// Inserts an entry exactly as given, keeping its version.
    pub fn restore_entry(&mut self, entry: IndexEntry) {
        self.detach(&entry.record_key);
        self.attach(entry);
    }

    /// Soft-deletes the entry of a record.
    ///
    /// Returns the number of entries removed from query results (0 or 1).
    pub fn remove_entries_by_record_id(&mut self, record_key: &str) -> usize {
        let value = match self.entries.get_mut(record_key) {
            Some(entry) if !entry.deleted => {
                entry.soft_delete(Timestamp::now());
                entry.value.clone()
            }
            _ => return 0,
        };
        self.unlink(&value, record_key);
        self.deleted_count += 1;
        self.last_modified = Some(Timestamp::now());
        1
    }

    fn collect<'a>(&self, keys: impl Iterator<Item = &'a String>) -> Vec<IndexEntry> {
        keys.filter_map(|key| self.entries.get(key)).cloned().collect()
    }

    /// Returns live entries whose value equals `value`.
    #[must_use]
    pub fn find_by_value(&self, value: &IndexValue) -> Vec<IndexEntry> {
        match self.hashed.get(value) {
            Some(keys) => self.collect(keys.iter()),
            None => Vec::new(),
        }
    }

    /// Returns live entries with `min <= value <= max`, in value order.
    ///
    /// Both bounds must be of the same orderable kind; otherwise, or when
    /// `min > max`, the result is empty.
    #[must_use]
    pub fn find_by_range(&self, min: &IndexValue, max: &IndexValue) -> Vec<IndexEntry> {
        if !min.is_orderable() || min.kind() != max.kind() || min > max {
            return Vec::new();
        }
        let range = (Bound::Included(min.clone()), Bound::Included(max.clone()));
        self.sorted
            .range(range)
            .flat_map(|(_, keys)| keys.iter())
            .filter_map(|key| self.entries.get(key))
            .cloned()
            .collect()
    }

    /// Returns the distinct live values in order.
    #[must_use]
    pub fn unique_values(&self) -> Vec<IndexValue> {
        self.sorted.keys().cloned().collect()
    }

    /// Returns the entry of a record, including soft-deleted ones.
    #[must_use]
    pub fn get(&self, record_key: &str) -> Option<&IndexEntry> {
        self.entries.get(record_key)
    }

    /// Iterates over all entries, including soft-deleted ones.
    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }

    /// Re-points a record's entry if it currently lives in one of `from`.
    pub fn relocate(
        &mut self,
        from: &HashSet<SegmentId>,
        segment_id: SegmentId,
        location: &RecordLocation,
    ) -> bool {
        match self.entries.get_mut(&location.key) {
            Some(entry) if from.contains(&entry.segment_id) => {
                entry.relocate(segment_id, location);
                true
            }
            _ => false,
        }
    }

    /// Drops soft-deleted entries that point into `segments`.
    pub fn purge_deleted_in(&mut self, segments: &HashSet<SegmentId>) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, e| !(e.deleted && segments.contains(&e.segment_id)));
        let purged = before - self.entries.len();
        self.deleted_count -= purged;
        purged
    }

    /// Drops every entry that points into `segments`.
    pub fn forget_segments(&mut self, segments: &HashSet<SegmentId>) -> usize {
        let doomed: Vec<String> = self
            .entries
            .values()
            .filter(|e| segments.contains(&e.segment_id))
            .map(|e| e.record_key.clone())
            .collect();
        for key in &doomed {
            self.detach(key);
        }
        if !doomed.is_empty() {
            self.last_modified = Some(Timestamp::now());
        }
        doomed.len()
    }

    /// Returns the number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len() - self.deleted_count
    }

    /// Returns true if there are no live entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns index statistics.
    #[must_use]
    pub fn stats(&self) -> PropertyStats {
        PropertyStats {
            unique_values: self.hashed.len(),
            live_entries: self.len(),
            deleted_entries: self.deleted_count,
            min: self.sorted.keys().next().cloned(),
            max: self.sorted.keys().next_back().cloned(),
            last_modified: self.last_modified,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, value: impl Into<IndexValue>, segment: u64) -> IndexEntry {
        let location = RecordLocation {
            key: key.to_string(),
            offset: 0,
            length: 10,
            content_hash: String::new(),
        };
        IndexEntry::new("person", value.into(), SegmentId::new(segment), &location)
    }

    fn ages() -> PropertyIndex {
        let mut index = PropertyIndex::new("age");
        for (key, age) in [("a", 18), ("b", 25), ("c", 40), ("d", 65)] {
            index.add_entry(entry(key, age, 1));
        }
        index
    }

    fn keys(entries: &[IndexEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.record_key.as_str()).collect()
    }

    #[test]
    fn range_is_inclusive_and_ordered() {
        let index = ages();
        let found = index.find_by_range(&IndexValue::from(20), &IndexValue::from(50));
        assert_eq!(keys(&found), vec!["b", "c"]);

        let edges = index.find_by_range(&IndexValue::from(18), &IndexValue::from(25));
        assert_eq!(keys(&edges), vec!["a", "b"]);
    }

    #[test]
    fn range_on_unorderable_or_mixed_bounds_is_empty() {
        let mut index = PropertyIndex::new("active");
        index.add_entry(entry("a", true, 1));
        assert!(index
            .find_by_range(&IndexValue::from(false), &IndexValue::from(true))
            .is_empty());

        let ages = ages();
        assert!(ages
            .find_by_range(&IndexValue::from(20), &IndexValue::from("z"))
            .is_empty());
        assert!(ages
            .find_by_range(&IndexValue::from(50), &IndexValue::from(20))
            .is_empty());
    }

    #[test]
    fn equality_lookup() {
        let mut index = ages();
        index.add_entry(entry("e", 25, 2));
        let equal = index.find_by_value(&IndexValue::from(25));
        let mut found = keys(&equal);
        found.sort_unstable();
        assert_eq!(found, vec!["b", "e"]);
        assert!(index.find_by_value(&IndexValue::from(99)).is_empty());
    }

    #[test]
    fn update_moves_value_and_bumps_version() {
        let mut index = ages();
        index.add_entry(entry("b", 30, 2));

        assert!(index.find_by_value(&IndexValue::from(25)).is_empty());
        let found = index.find_by_value(&IndexValue::from(30));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].version, 2);
        assert_eq!(found[0].segment_id, SegmentId::new(2));
        assert_eq!(index.len(), 4);
    }

    #[test]
    fn soft_delete_hides_entry() {
        let mut index = ages();
        assert_eq!(index.remove_entries_by_record_id("b"), 1);
        assert_eq!(index.remove_entries_by_record_id("b"), 0);
        assert_eq!(index.remove_entries_by_record_id("zz"), 0);

        assert!(index.find_by_value(&IndexValue::from(25)).is_empty());
        let held = index.get("b").unwrap();
        assert!(held.deleted);
        assert_eq!(held.version, 2);

        let stats = index.stats();
        assert_eq!(stats.live_entries, 3);
        assert_eq!(stats.deleted_entries, 1);
        assert_eq!(stats.unique_values, 3);
    }

    #[test]
    fn resave_after_delete_revives() {
        let mut index = ages();
        index.remove_entries_by_record_id("b");
        index.add_entry(entry("b", 25, 3));

        let found = index.find_by_value(&IndexValue::from(25));
        assert_eq!(found.len(), 1);
        assert!(!found[0].deleted);
        assert_eq!(found[0].version, 3);
        assert_eq!(index.stats().deleted_entries, 0);
    }

    #[test]
    fn stats_track_min_max_and_uniques() {
        let mut index = ages();
        index.add_entry(entry("e", 18, 1));
        let stats = index.stats();
        assert_eq!(stats.unique_values, 4);
        assert_eq!(stats.min, Some(IndexValue::from(18)));
        assert_eq!(stats.max, Some(IndexValue::from(65)));
        assert_eq!(
            index.unique_values(),
            vec![
                IndexValue::from(18),
                IndexValue::from(25),
                IndexValue::from(40),
                IndexValue::from(65)
            ]
        );
    }

    #[test]
    fn relocate_only_from_given_segments() {
        let mut index = ages();
        let from: HashSet<_> = [SegmentId::new(1)].into_iter().collect();
        let location = RecordLocation {
            key: "c".into(),
            offset: 64,
            length: 10,
            content_hash: String::new(),
        };
        assert!(index.relocate(&from, SegmentId::new(7), &location));
        assert_eq!(index.get("c").unwrap().segment_id, SegmentId::new(7));

        let other: HashSet<_> = [SegmentId::new(3)].into_iter().collect();
        assert!(!index.relocate(&other, SegmentId::new(8), &location));
    }

    #[test]
    fn purge_and_forget() {
        let mut index = ages();
        index.add_entry(entry("x", 1, 2));
        index.remove_entries_by_record_id("a");

        let seg1: HashSet<_> = [SegmentId::new(1)].into_iter().collect();
        assert_eq!(index.purge_deleted_in(&seg1), 1);
        assert!(index.get("a").is_none());
        assert_eq!(index.stats().deleted_entries, 0);

        assert_eq!(index.forget_segments(&seg1), 3);
        assert_eq!(index.len(), 1);
        assert_eq!(index.unique_values(), vec![IndexValue::from(1)]);
    }
}
