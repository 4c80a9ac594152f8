//! Segment compaction.
//!
//! Compaction merges runs of small sealed segments into one segment,
//! dropping superseded record versions and soft-deleted records.
//!
//! ## Invariants
//!
//! - Compaction **MUST NOT** change logical state
//! - The active segment is never a compaction source
//! - Within a batch, the copy in the latest source segment wins
//! - A deleted key is kept as a marked record in the merged segment only if
//!   an older segment outside the batch could still hold a copy of it

use super::format::RecordLocation;
use super::record::StoredRecord;
use crate::metadata::SegmentInfo;
use crate::types::SegmentId;
use std::collections::{BTreeSet, HashSet};

/// Groups compactable segments into merge batches.
///
/// Candidates are inactive segments smaller than a quarter of
/// `max_segment_size`. Consecutive candidates (in list order) are grouped
/// into batches whose combined size stays within half of
/// `max_segment_size`. Only batches of two or more segments are returned.
#[must_use]
pub fn plan_batches(segments: &[SegmentInfo], max_segment_size: u64) -> Vec<Vec<SegmentId>> {
    let small = max_segment_size / 4;
    let limit = max_segment_size / 2;

    let mut batches = Vec::new();
    let mut current: Vec<SegmentId> = Vec::new();
    let mut current_size = 0u64;

    let mut flush = |current: &mut Vec<SegmentId>, size: &mut u64| {
        if current.len() >= 2 {
            batches.push(std::mem::take(current));
        } else {
            current.clear();
        }
        *size = 0;
    };

    for segment in segments {
        let eligible = !segment.active && segment.size_bytes < small;
        if !eligible {
            flush(&mut current, &mut current_size);
            continue;
        }
        if !current.is_empty() && current_size + segment.size_bytes > limit {
            flush(&mut current, &mut current_size);
        }
        current.push(segment.id);
        current_size += segment.size_bytes;
    }
    flush(&mut current, &mut current_size);

    batches
}

/// A record read from a compaction source.
#[derive(Debug, Clone)]
pub struct SourceRecord {
    /// The record.
    pub record: StoredRecord,
    /// Whether the key is soft-deleted in its source segment.
    pub deleted: bool,
}

/// Output of merging one batch.
#[derive(Debug, Default)]
pub struct MergeOutput {
    /// Records to write into the merged segment.
    pub records: Vec<StoredRecord>,
    /// Keys to carry over as soft-deleted in the merged segment.
    pub deleted_ids: BTreeSet<String>,
    /// Superseded copies dropped.
    pub obsolete_removed: usize,
    /// Deleted records physically removed.
    pub deleted_removed: usize,
}

/// Merges source records, given oldest first.
///
/// `keep_deleted` carries the newest deleted copy of each key forward
/// instead of removing it.
#[must_use]
pub fn merge_records(sources: Vec<SourceRecord>, keep_deleted: bool) -> MergeOutput {
    let mut output = MergeOutput::default();
    let mut seen = HashSet::new();
    let mut newest_first = Vec::new();

    for source in sources.into_iter().rev() {
        if !seen.insert(source.record.key.clone()) {
            output.obsolete_removed += 1;
            continue;
        }
        if source.deleted {
            if keep_deleted {
                output.deleted_ids.insert(source.record.key.clone());
            } else {
                output.deleted_removed += 1;
                continue;
            }
        }
        newest_first.push(source.record);
    }

    newest_first.reverse();
    output.records = newest_first;
    output
}

/// Result of merging one batch.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// Segments merged and removed.
    pub sources: Vec<SegmentId>,
    /// The merged segment.
    pub created: SegmentId,
    /// Records written to the merged segment.
    pub records_written: usize,
    /// Superseded or deleted records dropped.
    pub records_dropped: usize,
    /// New location of every record in the merged segment.
    pub relocations: Vec<RecordLocation>,
}

/// Result of compacting one entity.
#[derive(Debug, Clone, Default)]
pub struct CompactionReport {
    /// Batches merged successfully.
    pub batches: Vec<BatchOutcome>,
    /// Batches skipped after a failure.
    pub failed_batches: Vec<Vec<SegmentId>>,
    /// Whether the pass stopped early on cancellation.
    pub cancelled: bool,
}

impl CompactionReport {
    /// Number of source segments merged away.
    #[must_use]
    pub fn segments_merged(&self) -> usize {
        self.batches.iter().map(|b| b.sources.len()).sum()
    }

    /// Number of segments created.
    #[must_use]
    pub fn segments_created(&self) -> usize {
        self.batches.len()
    }
}

/// Result of age-based cleanup.
#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    /// Segments removed.
    pub removed: Vec<SegmentId>,
    /// Segments that could not be removed.
    pub failed: Vec<SegmentId>,
    /// Whether the pass stopped early on cancellation.
    pub cancelled: bool,
}
