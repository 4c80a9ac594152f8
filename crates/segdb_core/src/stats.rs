//! Engine statistics and telemetry.
//!
//! # Usage
//!
//! ```rust,ignore
//! let engine = StorageEngine::open(config)?;
//! // Perform operations...
//! let stats = engine.stats();
//! println!("Segment writes: {}", stats.segment_writes);
//! println!("Cache hits: {}", stats.cache_hits);
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Engine counters.
///
/// All counters are atomic and can be read while operations are in progress.
#[derive(Debug, Default)]
pub struct EngineStats {
    segment_reads: AtomicU64,
    segment_writes: AtomicU64,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
    segments_created: AtomicU64,
    rotations: AtomicU64,
    compactions: AtomicU64,
    segments_compacted: AtomicU64,
    segments_cleaned: AtomicU64,
    records_deleted: AtomicU64,
    index_lookups: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    integrity_failures: AtomicU64,
    index_flushes: AtomicU64,
    errors: AtomicU64,
}

impl EngineStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    // === Increment methods (internal use) ===

    pub(crate) fn record_read(&self, bytes: u64) {
        self.segment_reads.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self, bytes: u64) {
        self.segment_writes.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_segment_created(&self, rotated: bool) {
        self.segments_created.fetch_add(1, Ordering::Relaxed);
        if rotated {
            self.rotations.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_compaction(&self, segments_merged: u64) {
        self.compactions.fetch_add(1, Ordering::Relaxed);
        self.segments_compacted
            .fetch_add(segments_merged, Ordering::Relaxed);
    }

    pub(crate) fn record_cleanup(&self, segments_removed: u64) {
        self.segments_cleaned
            .fetch_add(segments_removed, Ordering::Relaxed);
    }

    pub(crate) fn record_deletes(&self, count: u64) {
        self.records_deleted.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_index_lookup(&self) {
        self.index_lookups.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_integrity_failure(&self) {
        self.integrity_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_index_flush(&self) {
        self.index_flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    // === Getter methods (public API) ===

    /// Returns the number of segment files read.
    pub fn segment_reads(&self) -> u64 {
        self.segment_reads.load(Ordering::Relaxed)
    }

    /// Returns the number of segment files written.
    pub fn segment_writes(&self) -> u64 {
        self.segment_writes.load(Ordering::Relaxed)
    }

    /// Returns the total bytes read from segment files.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    /// Returns the total bytes written to segment files.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Returns the number of segments created.
    pub fn segments_created(&self) -> u64 {
        self.segments_created.load(Ordering::Relaxed)
    }

    /// Returns how often a full active segment was sealed.
    pub fn rotations(&self) -> u64 {
        self.rotations.load(Ordering::Relaxed)
    }

    /// Returns the number of successful compaction batches.
    pub fn compactions(&self) -> u64 {
        self.compactions.load(Ordering::Relaxed)
    }

    /// Returns the number of cache hits.
    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    /// Returns the number of cache misses.
    pub fn cache_misses(&self) -> u64 {
        self.cache_misses.load(Ordering::Relaxed)
    }

    /// Returns the number of failed integrity checks.
    pub fn integrity_failures(&self) -> u64 {
        self.integrity_failures.load(Ordering::Relaxed)
    }

    /// Returns the total number of errors.
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all stats.
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        StatsSnapshot {
            segment_reads: load(&self.segment_reads),
            segment_writes: load(&self.segment_writes),
            bytes_read: load(&self.bytes_read),
            bytes_written: load(&self.bytes_written),
            segments_created: load(&self.segments_created),
            rotations: load(&self.rotations),
            compactions: load(&self.compactions),
            segments_compacted: load(&self.segments_compacted),
            segments_cleaned: load(&self.segments_cleaned),
            records_deleted: load(&self.records_deleted),
            index_lookups: load(&self.index_lookups),
            cache_hits: load(&self.cache_hits),
            cache_misses: load(&self.cache_misses),
            integrity_failures: load(&self.integrity_failures),
            index_flushes: load(&self.index_flushes),
            errors: load(&self.errors),
        }
    }
}

/// A point-in-time snapshot of engine statistics.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    /// Segment files read.
    pub segment_reads: u64,
    /// Segment files written.
    pub segment_writes: u64,
    /// Bytes read from segment files.
    pub bytes_read: u64,
    /// Bytes written to segment files.
    pub bytes_written: u64,
    /// Segments created.
    pub segments_created: u64,
    /// Active segments sealed because they were full.
    pub rotations: u64,
    /// Successful compaction batches.
    pub compactions: u64,
    /// Source segments merged away by compaction.
    pub segments_compacted: u64,
    /// Segments removed by age-based cleanup.
    pub segments_cleaned: u64,
    /// Records soft-deleted.
    pub records_deleted: u64,
    /// Index lookups.
    pub index_lookups: u64,
    /// Query cache hits.
    pub cache_hits: u64,
    /// Query cache misses (including expired entries).
    pub cache_misses: u64,
    /// Checksum or HMAC mismatches.
    pub integrity_failures: u64,
    /// Index persist operations.
    pub index_flushes: u64,
    /// Errors encountered.
    pub errors: u64,
}
