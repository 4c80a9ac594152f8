//! Segment lifecycle management.

use super::compaction::{
    merge_records, plan_batches, BatchOutcome, CleanupReport, CompactionReport, SourceRecord,
};
use super::format::{
    decode_header, decode_record_at, decode_segment, encode_segment, DecodedSegment,
    RecordLocation, SegmentHeader, SegmentLinks,
};
use super::record::StoredRecord;
use crate::dir::StorageLayout;
use crate::error::{CoreError, CoreResult};
use crate::metadata::{EntityMetadata, EntityMetadataManager, SegmentInfo};
use crate::stats::EngineStats;
use crate::types::{Cancellation, SegmentId, Timestamp};
use parking_lot::Mutex;
use segdb_storage::{sha256_hex, FileAccess, StorageError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Per-entity mutual exclusion tokens.
#[derive(Debug, Default)]
pub struct EntityLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl EntityLocks {
    /// Returns the lock of `entity`, creating it on first use.
    pub fn get(&self, entity: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            self.locks
                .lock()
                .entry(entity.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }
}

/// Result of a segment write.
#[derive(Debug, Clone)]
pub struct WriteOutcome {
    /// Segment written.
    pub segment_id: SegmentId,
    /// Records now in the segment.
    pub record_count: u64,
    /// On-disk size of the segment.
    pub size_bytes: u64,
    /// Plaintext size before compression or encryption.
    pub plain_size: u64,
    /// SHA-256 hex of the on-disk bytes.
    pub checksum: String,
    /// Location of every record in the segment.
    pub locations: Vec<RecordLocation>,
    /// Index in `locations` of the first record added by this write.
    pub first_new: usize,
}

impl WriteOutcome {
    /// Locations of the records added by this write.
    #[must_use]
    pub fn new_locations(&self) -> &[RecordLocation] {
        &self.locations[self.first_new..]
    }
}

struct WrittenFile {
    size_bytes: u64,
    plain_size: u64,
    checksum: String,
    locations: Vec<RecordLocation>,
}

/// Owns the segment files of every entity.
///
/// `SegmentManager` decides which segment is active, writes and reads
/// segment files through the injected [`FileAccess`], and runs compaction
/// and age-based cleanup. The metadata manager is the authoritative record
/// of which segments exist; it is only updated after a write succeeded.
pub struct SegmentManager {
    access: Arc<dyn FileAccess>,
    layout: StorageLayout,
    metadata: Arc<EntityMetadataManager>,
    stats: Arc<EngineStats>,
    locks: EntityLocks,
    max_segment_size: u64,
    max_records: u64,
}

impl SegmentManager {
    /// Creates a segment manager.
    pub fn new(
        access: Arc<dyn FileAccess>,
        layout: StorageLayout,
        metadata: Arc<EntityMetadataManager>,
        stats: Arc<EngineStats>,
        max_segment_size: u64,
        max_records: u64,
    ) -> Self {
        Self {
            access,
            layout,
            metadata,
            stats,
            locks: EntityLocks::default(),
            max_segment_size,
            max_records,
        }
    }

    /// Returns the lock that serializes active-segment transitions and
    /// file removal for `entity`.
    pub fn entity_lock(&self, entity: &str) -> Arc<Mutex<()>> {
        self.locks.get(entity)
    }

    /// Returns the path of a segment file.
    #[must_use]
    pub fn segment_path(&self, entity: &str, id: SegmentId) -> PathBuf {
        self.layout.segment_path(entity, id)
    }

    /// Returns the size threshold at which segments are sealed.
    #[must_use]
    pub fn max_segment_size(&self) -> u64 {
        self.max_segment_size
    }

    fn is_full(&self, info: &SegmentInfo) -> bool {
        info.size_bytes >= self.max_segment_size || info.record_count >= self.max_records
    }

    /// Returns how many records and bytes still fit in a segment.
    #[must_use]
    pub fn remaining_capacity(&self, info: &SegmentInfo) -> (u64, u64) {
        (
            self.max_records.saturating_sub(info.record_count),
            self.max_segment_size.saturating_sub(info.size_bytes),
        )
    }

    /// Returns the current writable segment of `entity`.
    ///
    /// If there is none, or the active one is full, the active segment is
    /// sealed and the next sequential ID becomes active in a single
    /// metadata transition.
    pub fn get_active_segment(&self, entity: &str) -> CoreResult<SegmentId> {
        self.active_segment_for(entity, 0)
    }

    /// Returns a writable segment with room for `incoming` more bytes.
    ///
    /// A non-empty active segment without that room is sealed first, so a
    /// record larger than the size limit only ever lands in an empty
    /// segment.
    pub fn active_segment_for(&self, entity: &str, incoming: u64) -> CoreResult<SegmentId> {
        let lock = self.entity_lock(entity);
        let _guard = lock.lock();

        let meta = self.metadata.get_metadata(entity)?;
        if let Some(active) = meta.active_segment() {
            let fits = active.record_count == 0
                || active.size_bytes.saturating_add(incoming) <= self.max_segment_size;
            if fits && !self.is_full(active) {
                return Ok(active.id);
            }
        }

        let now = Timestamp::now();
        let compressed = self.access.is_compressed();
        let encrypted = self.access.is_encrypted();
        let (id, previous) = self.metadata.update(entity, |m| {
            let previous = m.active_segment().map(|s| s.id);
            for segment in &mut m.segments {
                segment.active = false;
            }
            let id = m.allocate_segment_id();
            let mut info = SegmentInfo::new(id, StorageLayout::segment_file_name(entity, id), now);
            info.active = true;
            info.compressed = compressed;
            info.encrypted = encrypted;
            m.segments.push(info);
            (id, previous)
        })?;

        self.stats.record_segment_created(previous.is_some());
        match previous {
            Some(sealed) => info!(entity, %sealed, active = %id, "rotated active segment"),
            None => info!(entity, active = %id, "created first segment"),
        }
        Ok(id)
    }

    fn write_file(
        &self,
        entity: &str,
        id: SegmentId,
        links: SegmentLinks,
        records: &[StoredRecord],
    ) -> CoreResult<WrittenFile> {
        let encoded = encode_segment(entity, id, links, records)?;
        let path = self.layout.segment_path(entity, id);

        let raw = self
            .access
            .ensure_directory(&self.layout.entity_dir(entity))
            .and_then(|()| self.access.write_durable(&path, &encoded.bytes))
            .and_then(|()| self.access.read_raw(&path))
            .map_err(|e| {
                error!(entity, segment_id = %id, path = %path.display(), error = %e, "segment write failed");
                self.stats.record_error();
                CoreError::from(e)
            })?;

        self.stats.record_write(raw.len() as u64);
        debug!(
            entity,
            segment_id = %id,
            records = records.len(),
            bytes = raw.len(),
            "segment written"
        );

        Ok(WrittenFile {
            size_bytes: raw.len() as u64,
            plain_size: encoded.bytes.len() as u64,
            checksum: sha256_hex(&raw),
            locations: encoded.locations,
        })
    }

    /// Replaces the contents of a segment with `records`.
    ///
    /// The file is staged and promoted atomically; segment metadata (count,
    /// size, checksum, modified time) is updated only after that succeeded.
    pub fn write(
        &self,
        entity: &str,
        id: SegmentId,
        records: &[StoredRecord],
    ) -> CoreResult<WriteOutcome> {
        self.write_with(entity, id, records, 0)
    }

    fn write_with(
        &self,
        entity: &str,
        id: SegmentId,
        records: &[StoredRecord],
        first_new: usize,
    ) -> CoreResult<WriteOutcome> {
        let meta = self.metadata.get_metadata(entity)?;
        if meta.segment(id).is_none() {
            return Err(CoreError::not_found(format!("segment {id} of entity {entity}")));
        }
        let links = SegmentLinks {
            previous: meta.previous_of(id),
            next: meta.next_of(id),
            sequence: meta.write_sequence + 1,
        };

        let written = self.write_file(entity, id, links, records)?;

        let now = Timestamp::now();
        let compressed = self.access.is_compressed();
        let encrypted = self.access.is_encrypted();
        let new_keys = &records[first_new..];
        self.metadata
            .update(entity, |m| {
                if let Some(info) = m.segment_mut(id) {
                    info.record_count = records.len() as u64;
                    info.size_bytes = written.size_bytes;
                    info.checksum = written.checksum.clone();
                    info.modified_at = now;
                    info.compressed = compressed;
                    info.encrypted = encrypted;
                    // A fresh copy of a key supersedes an earlier delete in this segment.
                    for record in new_keys {
                        info.deleted_ids.remove(&record.key);
                    }
                }
            })
            .map_err(|e| {
                error!(entity, segment_id = %id, error = %e, "segment metadata update failed");
                self.stats.record_error();
                e
            })?;

        Ok(WriteOutcome {
            segment_id: id,
            record_count: records.len() as u64,
            size_bytes: written.size_bytes,
            plain_size: written.plain_size,
            checksum: written.checksum,
            locations: written.locations,
            first_new,
        })
    }

    /// Appends records to a segment (read, extend, write).
    ///
    /// Callers must serialize appends to the same segment.
    pub fn append(
        &self,
        entity: &str,
        id: SegmentId,
        new_records: &[StoredRecord],
    ) -> CoreResult<WriteOutcome> {
        let mut records = self.read(entity, id)?;
        let first_new = records.len();
        records.extend_from_slice(new_records);
        self.write_with(entity, id, &records, first_new)
    }

    fn read_failed(&self, entity: &str, id: SegmentId, path: &Path, err: &dyn std::fmt::Display, integrity: bool) {
        error!(entity, segment_id = %id, path = %path.display(), error = %err, "segment read failed");
        if integrity {
            self.stats.record_integrity_failure();
        }
        self.stats.record_error();
    }

    fn read_bytes(&self, entity: &str, id: SegmentId) -> CoreResult<Option<Vec<u8>>> {
        let path = self.layout.segment_path(entity, id);
        match self.access.read_all_bytes(&path) {
            Ok(bytes) => {
                self.stats.record_read(bytes.len() as u64);
                Ok(Some(bytes))
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => {
                let integrity = matches!(e, StorageError::Integrity(_));
                self.read_failed(entity, id, &path, &e, integrity);
                Err(e.into())
            }
        }
    }

    /// Reads and decodes a segment file, with record locations.
    ///
    /// Returns `None` if the file does not exist.
    pub fn read_segment(&self, entity: &str, id: SegmentId) -> CoreResult<Option<DecodedSegment>> {
        let Some(bytes) = self.read_bytes(entity, id)? else {
            return Ok(None);
        };
        let path = self.layout.segment_path(entity, id);
        let decoded = decode_segment(&bytes).map_err(|e| {
            self.read_failed(entity, id, &path, &e, e.is_integrity());
            e
        })?;
        if decoded.header.entity != entity || decoded.header.segment_id != id {
            let err = CoreError::integrity(format!(
                "{} holds segment {} of entity {:?}",
                path.display(),
                decoded.header.segment_id,
                decoded.header.entity
            ));
            self.read_failed(entity, id, &path, &err, true);
            return Err(err);
        }
        Ok(Some(decoded))
    }

    /// Reads the records of a segment.
    ///
    /// A missing segment file yields an empty record set.
    pub fn read(&self, entity: &str, id: SegmentId) -> CoreResult<Vec<StoredRecord>> {
        Ok(self
            .read_segment(entity, id)?
            .map(|decoded| decoded.records)
            .unwrap_or_default())
    }

    /// Reads only the header of a segment file.
    pub fn read_header(&self, entity: &str, id: SegmentId) -> CoreResult<Option<SegmentHeader>> {
        match self.read_bytes(entity, id)? {
            Some(bytes) => decode_header(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Reads the single record at a known location.
    pub fn read_record_at(
        &self,
        entity: &str,
        id: SegmentId,
        offset: u64,
        length: u32,
    ) -> CoreResult<StoredRecord> {
        let bytes = self.read_bytes(entity, id)?.ok_or_else(|| {
            CoreError::not_found(format!("segment {id} of entity {entity}"))
        })?;
        decode_record_at(&bytes, offset, length)
    }

    /// Recomputes the checksum of the on-disk bytes and compares it with
    /// the recorded value.
    ///
    /// A never-written segment with no file verifies as intact.
    pub fn verify_integrity(&self, entity: &str, id: SegmentId) -> CoreResult<bool> {
        let meta = self.metadata.get_metadata(entity)?;
        let info = meta
            .segment(id)
            .ok_or_else(|| CoreError::not_found(format!("segment {id} of entity {entity}")))?;

        let path = self.layout.segment_path(entity, id);
        let raw = match self.access.read_raw(&path) {
            Ok(raw) => raw,
            Err(e) if e.is_not_found() => return Ok(info.is_unwritten()),
            Err(e) => {
                self.read_failed(entity, id, &path, &e, false);
                return Err(e.into());
            }
        };

        let intact = !info.is_unwritten() && sha256_hex(&raw) == info.checksum;
        if !intact {
            warn!(entity, segment_id = %id, path = %path.display(), "segment checksum mismatch");
            self.stats.record_integrity_failure();
        }
        Ok(intact)
    }

    /// Merges runs of small sealed segments.
    ///
    /// Each batch is merged independently; a failing batch is logged and
    /// skipped. `cancel` is checked between batches.
    pub fn compact(&self, entity: &str, cancel: &Cancellation) -> CoreResult<CompactionReport> {
        self.compact_with(entity, cancel, &Mutex::new(()), |_| {})
    }

    /// Merges runs of small sealed segments, switching each batch in under
    /// `writer`.
    ///
    /// Reading the sources and writing the merged file happen without
    /// `writer`. It is held only while the sources are re-checked, the
    /// metadata is switched, and `on_switch` runs. A batch whose sources
    /// changed in the meantime is abandoned.
    pub fn compact_with(
        &self,
        entity: &str,
        cancel: &Cancellation,
        writer: &Mutex<()>,
        mut on_switch: impl FnMut(&BatchOutcome),
    ) -> CoreResult<CompactionReport> {
        let meta = self.metadata.get_metadata(entity)?;
        let batches = plan_batches(&meta.segments, self.max_segment_size);
        let mut report = CompactionReport::default();

        if batches.is_empty() {
            debug!(entity, "nothing to compact");
            return Ok(report);
        }

        for batch in batches {
            if cancel.is_cancelled() {
                info!(entity, "compaction cancelled");
                report.cancelled = true;
                break;
            }
            match self.compact_batch(entity, &batch, writer, &mut on_switch) {
                Ok(Some(outcome)) => {
                    self.stats.record_compaction(outcome.sources.len() as u64);
                    report.batches.push(outcome);
                }
                Ok(None) => debug!(entity, ?batch, "batch no longer eligible"),
                Err(e) => {
                    warn!(entity, ?batch, error = %e, "compaction batch failed, skipping");
                    self.stats.record_error();
                    report.failed_batches.push(batch);
                }
            }
        }

        info!(
            entity,
            merged = report.segments_merged(),
            created = report.segments_created(),
            failed = report.failed_batches.len(),
            "compaction finished"
        );
        Ok(report)
    }

    fn compact_batch(
        &self,
        entity: &str,
        batch: &[SegmentId],
        writer: &Mutex<()>,
        on_switch: &mut dyn FnMut(&BatchOutcome),
    ) -> CoreResult<Option<BatchOutcome>> {
        let meta = self.metadata.get_metadata(entity)?;
        let (Some(&first), Some(&last)) = (batch.first(), batch.last()) else {
            return Ok(None);
        };
        let Some(first_pos) = meta.position(first) else {
            return Ok(None);
        };

        let mut snapshot: Vec<SegmentInfo> = Vec::with_capacity(batch.len());
        let mut sources = Vec::new();
        let mut input_records = 0usize;
        for &id in batch {
            let Some(info) = meta.segment(id).filter(|s| !s.active) else {
                return Ok(None);
            };
            let records = self.read(entity, id)?;
            input_records += records.len();
            sources.extend(records.into_iter().map(|record| SourceRecord {
                deleted: info.is_deleted(&record.key),
                record,
            }));
            snapshot.push(info.clone());
        }

        // Older segments outside the batch may still hold a copy of a
        // deleted key, so its delete marker has to survive.
        let merged = merge_records(sources, first_pos > 0);

        let new_id = {
            let _writer = writer.lock();
            self.metadata
                .update(entity, EntityMetadata::allocate_segment_id)?
        };
        let links = SegmentLinks {
            previous: meta.previous_of(first),
            next: meta.next_of(last),
            sequence: meta.write_sequence + 1,
        };
        let new_path = self.layout.segment_path(entity, new_id);
        let written = self.write_file(entity, new_id, links, &merged.records)?;

        // The merged segment stands in for its sources in age order, so it
        // keeps their time span.
        let created_at = snapshot.iter().map(|s| s.created_at).min().unwrap_or_default();
        let modified_at = snapshot.iter().map(|s| s.modified_at).max().unwrap_or_default();
        let mut info = SegmentInfo::new(new_id, StorageLayout::segment_file_name(entity, new_id), created_at);
        info.modified_at = modified_at;
        info.record_count = merged.records.len() as u64;
        info.size_bytes = written.size_bytes;
        info.checksum = written.checksum.clone();
        info.compressed = self.access.is_compressed();
        info.encrypted = self.access.is_encrypted();
        info.deleted_ids = merged.deleted_ids;

        let outcome = BatchOutcome {
            sources: batch.to_vec(),
            created: new_id,
            records_written: merged.records.len(),
            records_dropped: input_records - merged.records.len(),
            relocations: written.locations,
        };

        {
            let _writer = writer.lock();
            let lock = self.entity_lock(entity);
            let _guard = lock.lock();

            let unchanged = |m: &EntityMetadata| {
                snapshot.iter().all(|old| {
                    m.segment(old.id).is_some_and(|now| {
                        !now.active && now.checksum == old.checksum && now.deleted_ids == old.deleted_ids
                    })
                })
            };
            let current = match self.metadata.get_metadata(entity) {
                Ok(current) => current,
                Err(e) => {
                    let _ = self.access.delete(&new_path);
                    return Err(e);
                }
            };
            if !unchanged(&current) {
                let _ = self.access.delete(&new_path);
                return Ok(None);
            }

            let switched = self.metadata.update(entity, |m| {
                if !unchanged(&*m) {
                    return false;
                }
                let Some(pos) = m.position(first) else {
                    return false;
                };
                m.segments.insert(pos, info);
                m.segments.retain(|s| !batch.contains(&s.id));
                true
            });
            match switched {
                Ok(true) => on_switch(&outcome),
                Ok(false) => {
                    let _ = self.access.delete(&new_path);
                    return Ok(None);
                }
                Err(e) => {
                    let _ = self.access.delete(&new_path);
                    return Err(e);
                }
            }
        }

        for &id in batch {
            let path = self.layout.segment_path(entity, id);
            if let Err(e) = self.access.delete(&path) {
                warn!(entity, segment_id = %id, path = %path.display(), error = %e, "could not delete compacted segment file");
            }
        }

        debug!(entity, created = %new_id, sources = batch.len(), "batch merged");
        Ok(Some(outcome))
    }

    /// Deletes the leading run of sealed segments last modified before
    /// `cutoff`.
    ///
    /// Removal stops at the first segment that is active or newer than
    /// `cutoff`. Each segment is removed from metadata, then its file is
    /// deleted.
    /// A failing segment is logged and skipped. `cancel` is checked between
    /// segments.
    pub fn cleanup_older_than(
        &self,
        entity: &str,
        cutoff: Timestamp,
        cancel: &Cancellation,
    ) -> CoreResult<CleanupReport> {
        let meta = self.metadata.get_metadata(entity)?;
        // Only the oldest run goes: a later segment may hold the newer copy
        // or the delete marker of a key stored in an earlier one.
        let candidates: Vec<SegmentId> = meta
            .segments
            .iter()
            .take_while(|s| !s.active && s.modified_at < cutoff)
            .map(|s| s.id)
            .collect();

        let mut report = CleanupReport::default();
        for id in candidates {
            if cancel.is_cancelled() {
                info!(entity, "cleanup cancelled");
                report.cancelled = true;
                break;
            }
            match self.remove_segment(entity, id) {
                Ok(true) => report.removed.push(id),
                Ok(false) => {}
                Err(e) => {
                    warn!(entity, segment_id = %id, error = %e, "could not remove segment, skipping");
                    self.stats.record_error();
                    report.failed.push(id);
                }
            }
        }

        self.stats.record_cleanup(report.removed.len() as u64);
        info!(entity, removed = report.removed.len(), %cutoff, "cleanup finished");
        Ok(report)
    }

    fn remove_segment(&self, entity: &str, id: SegmentId) -> CoreResult<bool> {
        let lock = self.entity_lock(entity);
        let _guard = lock.lock();

        let file_name = StorageLayout::segment_file_name(entity, id);
        let removed = self.metadata.update(entity, |m| {
            if m.segment(id).is_some_and(|s| !s.active) {
                m.remove_segment(&file_name)
            } else {
                None
            }
        })?;
        if removed.is_none() {
            return Ok(false);
        }

        let path = self.layout.segment_path(entity, id);
        if let Err(e) = self.access.delete(&path) {
            warn!(entity, segment_id = %id, path = %path.display(), error = %e, "segment file left behind");
        }
        Ok(true)
    }

    /// Deletes every segment file listed in `meta`.
    pub fn delete_files(&self, meta: &EntityMetadata) -> CoreResult<()> {
        let lock = self.entity_lock(&meta.entity);
        let _guard = lock.lock();
        for segment in &meta.segments {
            self.access
                .delete(&self.layout.segment_path(&meta.entity, segment.id))?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for SegmentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentManager")
            .field("root", &self.layout.root())
            .field("max_segment_size", &self.max_segment_size)
            .field("max_records", &self.max_records)
            .finish()
    }
}
