//! Segment storage.
//!
//! Records of an entity are stored in numbered segment files. Exactly one
//! segment per entity is active and receives appends; once it reaches the
//! configured size or record count it is sealed and a new one is created.
//! Sealed segments are only changed by compaction and age-based cleanup.

mod compaction;
mod format;
mod record;
mod store;

pub use compaction::{
    merge_records, plan_batches, BatchOutcome, CleanupReport, CompactionReport, MergeOutput,
    SourceRecord,
};
pub use format::{
    decode_header, decode_record_at, decode_segment, encode_segment, DecodedSegment,
    EncodedSegment, RecordLocation, SegmentHeader, SegmentLinks, SEGMENT_FORMAT_VERSION,
    SEGMENT_MAGIC,
};
pub use record::StoredRecord;
pub use store::{EntityLocks, SegmentManager, WriteOutcome};
