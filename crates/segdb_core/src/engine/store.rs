//! Typed per-entity store.

use super::{EngineInner, EntityState};
use crate::error::{CoreError, CoreResult};
use crate::index::{EntityIndex, IndexEntry, IndexValue, PropertyStats, QueryShape, StorageFlags};
use crate::metadata::EntityMetadata;
use crate::record::{Record, RecordStore};
use crate::segment::{StoredRecord, WriteOutcome};
use crate::types::SegmentId;
use std::collections::{BTreeMap, HashMap};
use std::marker::PhantomData;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info};

/// How often a read restarts when maintenance swaps segments under it.
const READ_ATTEMPTS: usize = 3;

/// A record prepared for writing: encoded form plus index values.
type Prepared = (StoredRecord, Vec<(String, IndexValue)>);

/// Read and write access to the records of type `R`.
///
/// Handles are cheap to clone and share the engine. They stop working once
/// the engine is shut down or the entity is dropped.
pub struct EntityStore<R: Record> {
    engine: Arc<EngineInner>,
    state: Arc<EntityState>,
    _marker: PhantomData<fn() -> R>,
}

impl<R: Record> Clone for EntityStore<R> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            state: Arc::clone(&self.state),
            _marker: PhantomData,
        }
    }
}

impl<R: Record> std::fmt::Debug for EntityStore<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore")
            .field("entity", &R::ENTITY)
            .finish_non_exhaustive()
    }
}

impl<R: Record> EntityStore<R> {
    pub(crate) fn open(engine: Arc<EngineInner>) -> CoreResult<Self> {
        engine.ensure_open()?;
        let state = engine.entity_state(R::ENTITY)?;

        let schema = R::schema();
        if !schema.is_empty() {
            let _writer = state.writer.lock();
            if engine.metadata.set_schema(R::ENTITY, schema)? {
                state.mark_dirty();
            }
        }

        let store = Self {
            engine,
            state,
            _marker: PhantomData,
        };
        if store.state.needs_rebuild.load(Ordering::Acquire) {
            store.rebuild_index()?;
        }
        Ok(store)
    }

    fn ensure_usable(&self) -> CoreResult<()> {
        self.engine.ensure_open()?;
        if self.state.is_dropped() {
            return Err(CoreError::invalid_operation(format!(
                "entity {} has been dropped",
                R::ENTITY
            )));
        }
        Ok(())
    }

    fn encode(record: &R) -> CoreResult<StoredRecord> {
        let key = record.key();
        let mut payload = Vec::new();
        ciborium::ser::into_writer(record, &mut payload).map_err(|e| {
            CoreError::serialization(format!("cannot encode {} record {key:?}: {e}", R::ENTITY))
        })?;
        Ok(StoredRecord::new(key, record.last_modified(), payload))
    }

    fn decode(stored: &StoredRecord) -> CoreResult<R> {
        ciborium::de::from_reader(stored.payload.as_slice()).map_err(|e| {
            CoreError::serialization(format!(
                "cannot decode {} record {:?}: {e}",
                R::ENTITY,
                stored.key
            ))
        })
    }

    fn prepare(record: &R) -> CoreResult<Prepared> {
        let values = record.index_values();
        for property in R::schema().iter().filter(|p| p.required) {
            let present = values
                .iter()
                .any(|(name, value)| name == &property.name && *value != IndexValue::Null);
            if !present {
                return Err(CoreError::invalid_operation(format!(
                    "{} record {:?} lacks required property {}",
                    R::ENTITY,
                    record.key(),
                    property.name
                )));
            }
        }
        Ok((Self::encode(record)?, values))
    }

    /// Persists records, appending to the active segment.
    ///
    /// Records are split across segments so that each segment stays within
    /// its record and byte limits; a single record larger than the byte
    /// limit gets a segment of its own. Saving a key again supersedes the
    /// earlier copy.
    pub fn save(&self, records: &[R]) -> CoreResult<()> {
        self.ensure_usable()?;
        if records.is_empty() {
            return Ok(());
        }
        let prepared = records
            .iter()
            .map(Self::prepare)
            .collect::<CoreResult<Vec<_>>>()?;

        let _writer = self.state.writer.lock();
        let mut pending = prepared.as_slice();
        while let Some((first, _)) = pending.first() {
            let segment_id = self
                .engine
                .segments
                .active_segment_for(R::ENTITY, first.encoded_size() as u64)?;
            let meta = self.engine.metadata.get_metadata(R::ENTITY)?;
            let info = meta.segment(segment_id).ok_or_else(|| {
                CoreError::not_found(format!("segment {segment_id} of entity {}", R::ENTITY))
            })?;
            let (records_left, bytes_left) = self.engine.segments.remaining_capacity(info);

            let take = chunk_len(pending, records_left, bytes_left);
            let (chunk, rest) = pending.split_at(take);
            let stored: Vec<StoredRecord> = chunk.iter().map(|(record, _)| record.clone()).collect();
            let outcome = self.engine.segments.append(R::ENTITY, segment_id, &stored)?;
            self.index_written(&outcome, chunk);
            pending = rest;
        }

        self.state.mark_dirty();
        self.engine.mark_global_dirty();
        debug!(entity = R::ENTITY, records = records.len(), "records saved");
        Ok(())
    }

    fn index_written(&self, outcome: &WriteOutcome, chunk: &[Prepared]) {
        let flags = StorageFlags {
            compressed: self.engine.access.is_compressed(),
            encrypted: self.engine.access.is_encrypted(),
        };
        let mut index = self.state.index.write();
        for ((_, values), location) in chunk.iter().zip(outcome.new_locations()) {
            let original_size = flags.compressed.then(|| u64::from(location.length));
            index.index_record(outcome.segment_id, location, values, flags, original_size);
        }
    }

    /// Runs `attempt` until it sees a stable segment layout.
    ///
    /// `attempt` returns `None` when compaction or cleanup swapped segments
    /// under it. After [`READ_ATTEMPTS`] tries the read runs once more with
    /// the entity's writer lock held, which keeps maintenance from
    /// switching segments.
    fn stable_read<T>(&self, mut attempt: impl FnMut() -> CoreResult<Option<T>>) -> CoreResult<T> {
        for _ in 0..READ_ATTEMPTS {
            if let Some(value) = attempt()? {
                return Ok(value);
            }
            debug!(entity = R::ENTITY, "segments changed during read, retrying");
        }
        let _writer = self.state.writer.lock();
        attempt()?.ok_or_else(|| {
            CoreError::integrity(format!(
                "a segment of {} listed in metadata is missing on disk",
                R::ENTITY
            ))
        })
    }

    /// Reads every segment listed in the current metadata.
    fn read_all(&self) -> CoreResult<(EntityMetadata, Vec<(SegmentId, Vec<StoredRecord>)>)> {
        self.stable_read(|| {
            let meta = self.engine.metadata.get_metadata(R::ENTITY)?;
            let mut segments = Vec::with_capacity(meta.segments.len());
            for info in &meta.segments {
                match self.engine.segments.read_segment(R::ENTITY, info.id)? {
                    Some(decoded) => segments.push((info.id, decoded.records)),
                    None if info.is_unwritten() => {}
                    None => return Ok(None),
                }
            }
            Ok(Some((meta, segments)))
        })
    }

    /// Returns every live record.
    ///
    /// The latest copy of each key wins; a key whose latest copy is marked
    /// deleted in its segment is absent. Records come back in the order
    /// their latest copies were written.
    pub fn load(&self) -> CoreResult<Vec<R>> {
        self.ensure_usable()?;
        let (meta, segments) = self.read_all()?;

        let mut latest: HashMap<String, (usize, bool, StoredRecord)> = HashMap::new();
        let mut order = 0usize;
        for (id, records) in segments {
            let info = meta.segment(id);
            for record in records {
                let deleted = info.is_some_and(|s| s.is_deleted(&record.key));
                latest.insert(record.key.clone(), (order, deleted, record));
                order += 1;
            }
        }

        let mut live: Vec<(usize, StoredRecord)> = latest
            .into_values()
            .filter(|(_, deleted, _)| !deleted)
            .map(|(order, _, record)| (order, record))
            .collect();
        live.sort_by_key(|(order, _)| *order);
        live.iter().map(|(_, record)| Self::decode(record)).collect()
    }

    /// Returns the record stored under `key`, if live.
    pub fn get(&self, key: &str) -> CoreResult<Option<R>> {
        self.ensure_usable()?;
        self.engine.stats.record_index_lookup();

        let stored = self.stable_read(|| {
            let Some(segment) = self.state.index.read().segment_of(key) else {
                return Ok(Some(None));
            };
            let meta = self.engine.metadata.get_metadata(R::ENTITY)?;
            let Some(info) = meta.segment(segment) else {
                return Ok(None);
            };
            if info.is_deleted(key) {
                return Ok(Some(None));
            }
            let Some(decoded) = self.engine.segments.read_segment(R::ENTITY, segment)? else {
                return Ok(None);
            };
            Ok(Some(
                decoded.records.into_iter().rev().find(|record| record.key == key),
            ))
        })?;
        stored.as_ref().map(Self::decode).transpose()
    }

    /// Reads candidate segments and keeps the records the index places
    /// there, excluding deleted ones.
    ///
    /// Returns `None` if a candidate vanished or the index moved records
    /// between segments while they were read.
    fn read_candidates(
        &self,
        segments: &[SegmentId],
        epoch: u64,
    ) -> CoreResult<Option<Vec<StoredRecord>>> {
        let meta = self.engine.metadata.get_metadata(R::ENTITY)?;
        let mut found: Vec<(SegmentId, StoredRecord)> = Vec::new();
        for &id in segments {
            let Some(info) = meta.segment(id) else {
                return Ok(None);
            };
            let Some(decoded) = self.engine.segments.read_segment(R::ENTITY, id)? else {
                if info.is_unwritten() {
                    continue;
                }
                return Ok(None);
            };
            let mut last: BTreeMap<String, StoredRecord> = BTreeMap::new();
            for record in decoded.records {
                last.insert(record.key.clone(), record);
            }
            found.extend(
                last.into_values()
                    .filter(|record| !info.is_deleted(&record.key))
                    .map(|record| (id, record)),
            );
        }

        let index = self.state.index.read();
        if index.layout_epoch() != epoch {
            return Ok(None);
        }
        Ok(Some(
            found
                .into_iter()
                .filter(|(id, record)| index.segment_of(&record.key) == Some(*id))
                .map(|(_, record)| record)
                .collect(),
        ))
    }

    fn lookup(&self, shape: &QueryShape) -> CoreResult<Vec<R>> {
        self.ensure_usable()?;
        self.engine.stats.record_index_lookup();
        let mut first = true;
        let records = self.stable_read(|| {
            let (segments, cached, epoch) = {
                let mut index = self.state.index.write();
                let (segments, cached) = index.candidate_segments(shape);
                (segments, cached, index.layout_epoch())
            };
            if first {
                if cached {
                    self.engine.stats.record_cache_hit();
                } else {
                    self.engine.stats.record_cache_miss();
                }
                first = false;
            }
            self.read_candidates(&segments, epoch)
        })?;
        records.iter().map(Self::decode).collect()
    }

    /// Returns live records whose `property` equals `value`.
    pub fn find_by_value(&self, property: &str, value: &IndexValue) -> CoreResult<Vec<R>> {
        let shape = QueryShape::Equals {
            property: property.to_string(),
            value: value.clone(),
        };
        let records = self.lookup(&shape)?;
        Ok(records
            .into_iter()
            .filter(|record| {
                record
                    .index_values()
                    .iter()
                    .any(|(name, v)| name == property && v == value)
            })
            .collect())
    }

    /// Returns live records whose `property` lies within `[min, max]`.
    ///
    /// Both bounds must be of the same orderable kind with `min <= max`;
    /// otherwise nothing matches.
    pub fn find_by_range(
        &self,
        property: &str,
        min: &IndexValue,
        max: &IndexValue,
    ) -> CoreResult<Vec<R>> {
        if !min.is_orderable() || min.kind() != max.kind() || min > max {
            return Ok(Vec::new());
        }
        let shape = QueryShape::Range {
            property: property.to_string(),
            min: min.clone(),
            max: max.clone(),
        };
        let records = self.lookup(&shape)?;
        Ok(records
            .into_iter()
            .filter(|record| {
                record.index_values().iter().any(|(name, v)| {
                    name == property && v.kind() == min.kind() && min <= v && v <= max
                })
            })
            .collect())
    }

    /// Returns the distinct live values of an indexed property.
    pub fn unique_values(&self, property: &str) -> CoreResult<Vec<IndexValue>> {
        self.ensure_usable()?;
        Ok(self.state.index.read().unique_values(property))
    }

    /// Returns live index entries of `property` equal to `value`.
    pub fn index_entries(&self, property: &str, value: &IndexValue) -> CoreResult<Vec<IndexEntry>> {
        self.ensure_usable()?;
        Ok(self.state.index.read().find_by_value(property, value))
    }

    /// Returns the index entry of one record in one property, deleted or not.
    pub fn index_entry(&self, property: &str, key: &str) -> CoreResult<Option<IndexEntry>> {
        self.ensure_usable()?;
        Ok(self
            .state
            .index
            .read()
            .property(property)
            .and_then(|index| index.get(key))
            .cloned())
    }

    /// Returns per-property index statistics.
    pub fn index_stats(&self) -> CoreResult<BTreeMap<String, PropertyStats>> {
        self.ensure_usable()?;
        Ok(self.state.index.read().stats())
    }

    /// Returns live records matching `predicate`.
    pub fn query(&self, predicate: impl Fn(&R) -> bool) -> CoreResult<Vec<R>> {
        Ok(self.load()?.into_iter().filter(|r| predicate(r)).collect())
    }

    /// Soft-deletes records by key.
    ///
    /// The latest copy of each key is marked deleted in its segment and
    /// its index entries are soft-deleted. The bytes stay on disk until
    /// compaction. Unknown keys are ignored. Returns how many keys were
    /// newly deleted.
    pub fn delete(&self, keys: &[String]) -> CoreResult<usize> {
        self.ensure_usable()?;
        let _writer = self.state.writer.lock();

        let mut by_segment: BTreeMap<SegmentId, Vec<String>> = BTreeMap::new();
        {
            let index = self.state.index.read();
            for key in keys {
                if let Some(segment) = index.segment_of(key) {
                    by_segment.entry(segment).or_default().push(key.clone());
                }
            }
        }

        let mut deleted = 0;
        for (segment, keys) in by_segment {
            deleted += self
                .engine
                .metadata
                .mark_deleted(R::ENTITY, segment, &keys)?;
            let mut index = self.state.index.write();
            for key in &keys {
                index.remove_record(key);
            }
        }

        if deleted > 0 {
            self.engine.stats.record_deletes(deleted as u64);
            self.state.mark_dirty();
            self.engine.mark_global_dirty();
            debug!(entity = R::ENTITY, deleted, "records soft-deleted");
        }
        Ok(deleted)
    }

    /// Soft-deletes one record. Returns true if it was live.
    pub fn delete_one(&self, key: &str) -> CoreResult<bool> {
        Ok(self.delete(&[key.to_string()])? > 0)
    }

    /// Returns the number of live records.
    pub fn count(&self) -> CoreResult<usize> {
        self.ensure_usable()?;
        Ok(self.state.index.read().len())
    }

    /// Returns true if a live record with `key` exists.
    pub fn exists(&self, key: &str) -> CoreResult<bool> {
        self.ensure_usable()?;
        Ok(self.state.index.read().segment_of(key).is_some())
    }

    /// Rebuilds the index of this entity from its segments.
    ///
    /// Returns the number of live records indexed.
    pub fn rebuild_index(&self) -> CoreResult<usize> {
        self.ensure_usable()?;
        let _writer = self.state.writer.lock();
        let meta = self.engine.metadata.get_metadata(R::ENTITY)?;

        let mut fresh = EntityIndex::new(R::ENTITY, self.engine.new_cache());
        for info in &meta.segments {
            let Some(decoded) = self.engine.segments.read_segment(R::ENTITY, info.id)? else {
                continue;
            };
            let flags = StorageFlags {
                compressed: info.compressed,
                encrypted: info.encrypted,
            };
            for (stored, location) in decoded.records.iter().zip(&decoded.locations) {
                if info.is_deleted(&stored.key) {
                    fresh.remove_record(&stored.key);
                    continue;
                }
                let record = Self::decode(stored)?;
                let original_size = flags.compressed.then(|| u64::from(location.length));
                fresh.index_record(info.id, location, &record.index_values(), flags, original_size);
            }
        }

        let count = fresh.len();
        self.state.index.write().replace_with(fresh);
        self.state.needs_rebuild.store(false, Ordering::Release);
        self.state.mark_dirty();
        info!(entity = R::ENTITY, records = count, "index rebuilt");
        Ok(count)
    }
}

impl<R: Record> RecordStore<R> for EntityStore<R> {
    fn load(&self) -> CoreResult<Vec<R>> {
        EntityStore::load(self)
    }

    fn save(&self, records: &[R]) -> CoreResult<()> {
        EntityStore::save(self, records)
    }

    fn query(&self, predicate: &dyn Fn(&R) -> bool) -> CoreResult<Vec<R>> {
        EntityStore::query(self, predicate)
    }

    fn count(&self) -> CoreResult<usize> {
        EntityStore::count(self)
    }

    fn exists(&self, key: &str) -> CoreResult<bool> {
        EntityStore::exists(self, key)
    }

    fn delete(&self, keys: &[String]) -> CoreResult<usize> {
        EntityStore::delete(self, keys)
    }
}

/// Returns how many pending records go into a segment with the given
/// remaining capacity. Always at least one.
fn chunk_len(pending: &[Prepared], records_left: u64, bytes_left: u64) -> usize {
    let max = usize::try_from(records_left)
        .unwrap_or(usize::MAX)
        .clamp(1, pending.len());
    let mut bytes = 0u64;
    let mut take = 0;
    for (record, _) in &pending[..max] {
        bytes += record.encoded_size() as u64;
        if take > 0 && bytes > bytes_left {
            break;
        }
        take += 1;
    }
    take
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::StorageEngine;
    use crate::index::ValueKind;
    use crate::metadata::PropertySchema;
    use crate::types::Timestamp;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item {
        id: String,
        color: Option<String>,
        weight: i64,
    }

    impl Record for Item {
        const ENTITY: &'static str = "item";

        fn key(&self) -> String {
            self.id.clone()
        }

        fn last_modified(&self) -> Timestamp {
            Timestamp(7)
        }

        fn index_values(&self) -> Vec<(String, IndexValue)> {
            let mut values = vec![("weight".to_string(), IndexValue::from(self.weight))];
            if let Some(color) = &self.color {
                values.push(("color".to_string(), IndexValue::from(color.as_str())));
            }
            values
        }

        fn schema() -> Vec<PropertySchema> {
            vec![
                PropertySchema::indexed("weight", ValueKind::Integer).required(),
                PropertySchema::indexed("color", ValueKind::Text),
            ]
        }
    }

    fn item(id: &str, color: Option<&str>, weight: i64) -> Item {
        Item {
            id: id.into(),
            color: color.map(Into::into),
            weight,
        }
    }

    fn engine(config: EngineConfig) -> StorageEngine {
        StorageEngine::open_in_memory(config.auto_flush_interval(Duration::ZERO)).unwrap()
    }

    fn default_engine() -> StorageEngine {
        engine(EngineConfig::new("/mem"))
    }

    #[test]
    fn save_then_load() {
        let engine = default_engine();
        let items = engine.store::<Item>().unwrap();
        items
            .save(&[item("a", Some("red"), 1), item("b", None, 2)])
            .unwrap();

        let loaded = items.load().unwrap();
        assert_eq!(loaded, vec![item("a", Some("red"), 1), item("b", None, 2)]);
        assert_eq!(items.count().unwrap(), 2);
        assert!(items.exists("a").unwrap());
        assert!(!items.exists("z").unwrap());
    }

    #[test]
    fn later_save_supersedes() {
        let engine = default_engine();
        let items = engine.store::<Item>().unwrap();
        items.save(&[item("a", Some("red"), 1)]).unwrap();
        items.save(&[item("a", Some("blue"), 5)]).unwrap();

        assert_eq!(items.load().unwrap(), vec![item("a", Some("blue"), 5)]);
        assert_eq!(items.get("a").unwrap(), Some(item("a", Some("blue"), 5)));
        assert!(items
            .find_by_value("color", &IndexValue::from("red"))
            .unwrap()
            .is_empty());
        assert_eq!(
            items.find_by_value("color", &IndexValue::from("blue")).unwrap().len(),
            1
        );
    }

    #[test]
    fn supersede_across_segments() {
        let engine = engine(EngineConfig::new("/mem").max_records_per_segment(2));
        let items = engine.store::<Item>().unwrap();
        items
            .save(&[item("a", None, 1), item("b", None, 2), item("c", None, 3)])
            .unwrap();
        items.save(&[item("a", None, 10)]).unwrap();

        let meta = engine.metadata("item").unwrap();
        assert_eq!(meta.segments.len(), 2);
        let loaded = items.load().unwrap();
        assert_eq!(loaded.len(), 3);
        assert!(loaded.contains(&item("a", None, 10)));
        assert_eq!(items.get("a").unwrap(), Some(item("a", None, 10)));
    }

    #[test]
    fn dropping_a_property_removes_its_entry() {
        let engine = default_engine();
        let items = engine.store::<Item>().unwrap();
        items.save(&[item("a", Some("red"), 1)]).unwrap();
        items.save(&[item("a", None, 1)]).unwrap();

        assert!(items.unique_values("color").unwrap().is_empty());
        let entry = items.index_entry("color", "a").unwrap().unwrap();
        assert!(entry.deleted);
    }

    #[test]
    fn delete_hides_record() {
        let engine = default_engine();
        let items = engine.store::<Item>().unwrap();
        items
            .save(&[item("a", Some("red"), 1), item("b", Some("red"), 2)])
            .unwrap();

        assert_eq!(items.delete(&["a".to_string(), "zz".to_string()]).unwrap(), 1);
        assert!(!items.delete_one("a").unwrap());
        assert_eq!(items.load().unwrap(), vec![item("b", Some("red"), 2)]);
        assert_eq!(items.get("a").unwrap(), None);
        assert_eq!(items.count().unwrap(), 1);
        assert_eq!(
            items.find_by_value("color", &IndexValue::from("red")).unwrap(),
            vec![item("b", Some("red"), 2)]
        );
        assert_eq!(engine.stats().records_deleted, 1);
    }

    #[test]
    fn resave_after_delete_revives() {
        let engine = default_engine();
        let items = engine.store::<Item>().unwrap();
        items.save(&[item("a", None, 1)]).unwrap();
        items.delete_one("a").unwrap();
        items.save(&[item("a", None, 2)]).unwrap();

        assert_eq!(items.load().unwrap(), vec![item("a", None, 2)]);
        assert!(items.exists("a").unwrap());
    }

    #[test]
    fn range_query_uses_bounds_inclusively() {
        let engine = default_engine();
        let items = engine.store::<Item>().unwrap();
        items
            .save(&[
                item("a", None, 10),
                item("b", None, 20),
                item("c", None, 30),
            ])
            .unwrap();

        let found = items
            .find_by_range("weight", &IndexValue::from(20), &IndexValue::from(30))
            .unwrap();
        let mut keys: Vec<String> = found.iter().map(Record::key).collect();
        keys.sort();
        assert_eq!(keys, vec!["b".to_string(), "c".to_string()]);

        assert!(items
            .find_by_range("weight", &IndexValue::from(30), &IndexValue::from(20))
            .unwrap()
            .is_empty());
        assert!(items
            .find_by_range("weight", &IndexValue::from("a"), &IndexValue::from(30))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn repeated_lookup_hits_cache() {
        let engine = default_engine();
        let items = engine.store::<Item>().unwrap();
        items.save(&[item("a", Some("red"), 1)]).unwrap();

        let red = IndexValue::from("red");
        items.find_by_value("color", &red).unwrap();
        items.find_by_value("color", &red).unwrap();
        let stats = engine.stats();
        assert_eq!(stats.cache_misses, 1);
        assert_eq!(stats.cache_hits, 1);

        items.save(&[item("b", Some("red"), 2)]).unwrap();
        assert_eq!(items.find_by_value("color", &red).unwrap().len(), 2);
        assert_eq!(engine.stats().cache_misses, 2);
    }

    #[test]
    fn missing_required_property_rejected() {
        #[derive(Debug, Clone, Serialize, Deserialize)]
        struct Bare {
            id: String,
        }
        impl Record for Bare {
            const ENTITY: &'static str = "bare";
            fn key(&self) -> String {
                self.id.clone()
            }
            fn last_modified(&self) -> Timestamp {
                Timestamp(0)
            }
            fn schema() -> Vec<PropertySchema> {
                vec![PropertySchema::indexed("name", ValueKind::Text).required()]
            }
        }

        let engine = default_engine();
        let store = engine.store::<Bare>().unwrap();
        let err = store.save(&[Bare { id: "x".into() }]).unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn schema_is_recorded() {
        let engine = default_engine();
        engine.store::<Item>().unwrap();
        let meta = engine.metadata("item").unwrap();
        assert_eq!(meta.schema, Item::schema());
    }

    #[test]
    fn byte_limit_splits_save() {
        let engine = engine(EngineConfig::new("/mem").max_segment_size(200));
        let items = engine.store::<Item>().unwrap();
        let batch: Vec<Item> = (0..20)
            .map(|i| item(&format!("item-{i:02}"), Some("green"), i))
            .collect();
        items.save(&batch).unwrap();

        let meta = engine.metadata("item").unwrap();
        assert!(meta.segments.len() > 1);
        assert_eq!(meta.segments.iter().filter(|s| s.active).count(), 1);
        assert_eq!(items.load().unwrap().len(), 20);
    }

    #[test]
    fn rebuild_matches_incremental_index() {
        let engine = engine(EngineConfig::new("/mem").max_records_per_segment(2));
        let items = engine.store::<Item>().unwrap();
        items
            .save(&[
                item("a", Some("red"), 1),
                item("b", Some("blue"), 2),
                item("c", Some("red"), 3),
            ])
            .unwrap();
        items.delete_one("b").unwrap();
        items.save(&[item("c", Some("blue"), 3)]).unwrap();

        let before = items.index_stats().unwrap();
        assert_eq!(items.rebuild_index().unwrap(), 2);
        let after = items.index_stats().unwrap();
        assert_eq!(before["color"].unique_values, after["color"].unique_values);
        assert_eq!(before["color"].live_entries, after["color"].live_entries);
        assert_eq!(items.get("c").unwrap(), Some(item("c", Some("blue"), 3)));
        assert!(!items.exists("b").unwrap());
    }

    #[test]
    fn record_store_trait_defaults() {
        let engine = default_engine();
        let items = engine.store::<Item>().unwrap();
        let store: &dyn RecordStore<Item> = &items;
        store
            .save(&[item("a", None, 1), item("b", None, 5), item("c", None, 9)])
            .unwrap();

        assert_eq!(store.count_where(&|i: &Item| i.weight > 2).unwrap(), 2);
        assert!(store.exists_where(&|i: &Item| i.weight == 9).unwrap());
        assert!(!store.exists_where(&|i: &Item| i.weight == 4).unwrap());
        assert_eq!(store.query(&|i: &Item| i.weight < 2).unwrap().len(), 1);
    }

    #[test]
    fn chunk_len_respects_limits() {
        let prepared: Vec<Prepared> = (0..5)
            .map(|i| (StoredRecord::new(format!("k{i}"), Timestamp(0), vec![0; 10]), Vec::new()))
            .collect();
        let size = prepared[0].0.encoded_size() as u64;

        assert_eq!(chunk_len(&prepared, 3, u64::MAX), 3);
        assert_eq!(chunk_len(&prepared, 10, size * 2), 2);
        assert_eq!(chunk_len(&prepared, 10, 0), 1);
        assert_eq!(chunk_len(&prepared, 0, 0), 1);
    }
}
