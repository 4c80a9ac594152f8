//! Segment file format.
//!
//! A segment file is a small CBOR header followed by a body of framed
//! records:
//!
//! ```text
//! | magic "SGDB" (4) | format (2) | header_len (4) | header_crc (4) | header (CBOR) | body |
//! ```
//!
//! The header carries the neighbour links, record count, key range, and a
//! CRC32 of the body; the preamble carries a CRC32 of the header bytes, so
//! every byte after the preamble is covered. This is the plaintext layout;
//! compression and encryption are applied to the whole file by the file
//! access layer.

use super::record::StoredRecord;
use crate::error::{CoreError, CoreResult};
use crate::types::SegmentId;
use crc32fast::Hasher as Crc32;
use segdb_storage::sha256_hex;
use serde::{Deserialize, Serialize};

/// Segment file magic.
pub const SEGMENT_MAGIC: [u8; 4] = *b"SGDB";
/// Current segment format version.
pub const SEGMENT_FORMAT_VERSION: u16 = 2;

const PREAMBLE_SIZE: usize = 14;

/// Header stored at the front of every segment file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentHeader {
    /// Entity the segment belongs to.
    pub entity: String,
    /// This segment's ID.
    pub segment_id: SegmentId,
    /// Write sequence of the entity when the file was written.
    pub sequence: u64,
    /// The segment before this one in the entity's list.
    pub previous: Option<SegmentId>,
    /// The segment after this one in the entity's list.
    pub next: Option<SegmentId>,
    /// Number of records in the body.
    pub record_count: u64,
    /// Length of the body in bytes.
    pub body_len: u64,
    /// CRC32 of the body.
    pub body_checksum: u32,
    /// Smallest record key.
    pub min_key: Option<String>,
    /// Largest record key.
    pub max_key: Option<String>,
    /// Format version of the file.
    pub format_version: u16,
}

/// Neighbour links and sequence written into a segment header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentLinks {
    /// Preceding segment.
    pub previous: Option<SegmentId>,
    /// Following segment.
    pub next: Option<SegmentId>,
    /// Entity write sequence.
    pub sequence: u64,
}

/// Where a record sits inside a segment body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLocation {
    /// Record primary key.
    pub key: String,
    /// Byte offset of the record frame within the body.
    pub offset: u64,
    /// Length of the record frame.
    pub length: u32,
    /// SHA-256 hex of the record payload.
    pub content_hash: String,
}

/// A fully encoded segment file.
#[derive(Debug, Clone)]
pub struct EncodedSegment {
    /// The file bytes.
    pub bytes: Vec<u8>,
    /// The header written.
    pub header: SegmentHeader,
    /// Location of every record, in body order.
    pub locations: Vec<RecordLocation>,
}

/// A decoded segment file.
#[derive(Debug, Clone)]
pub struct DecodedSegment {
    /// The header read.
    pub header: SegmentHeader,
    /// Records in body order.
    pub records: Vec<StoredRecord>,
    /// Location of every record, parallel to `records`.
    pub locations: Vec<RecordLocation>,
}

/// Encodes records into a segment file.
pub fn encode_segment(
    entity: &str,
    segment_id: SegmentId,
    links: SegmentLinks,
    records: &[StoredRecord],
) -> CoreResult<EncodedSegment> {
    let mut body = Vec::with_capacity(records.iter().map(StoredRecord::encoded_size).sum());
    let mut locations = Vec::with_capacity(records.len());

    for record in records {
        let offset = body.len() as u64;
        record.encode_into(&mut body)?;
        locations.push(RecordLocation {
            key: record.key.clone(),
            offset,
            length: (body.len() as u64 - offset) as u32,
            content_hash: sha256_hex(&record.payload),
        });
    }

    let header = SegmentHeader {
        entity: entity.to_string(),
        segment_id,
        sequence: links.sequence,
        previous: links.previous,
        next: links.next,
        record_count: records.len() as u64,
        body_len: body.len() as u64,
        body_checksum: crc32(&body),
        min_key: records.iter().map(|r| r.key.as_str()).min().map(str::to_string),
        max_key: records.iter().map(|r| r.key.as_str()).max().map(str::to_string),
        format_version: SEGMENT_FORMAT_VERSION,
    };

    Ok(EncodedSegment {
        bytes: assemble(&header, &body)?,
        header,
        locations,
    })
}

/// Lays out preamble, header, and body as file bytes.
fn assemble(header: &SegmentHeader, body: &[u8]) -> CoreResult<Vec<u8>> {
    let mut header_bytes = Vec::new();
    ciborium::ser::into_writer(header, &mut header_bytes)
        .map_err(|e| CoreError::serialization(format!("segment header: {e}")))?;
    let header_len = u32::try_from(header_bytes.len())
        .map_err(|_| CoreError::serialization("segment header too large"))?;

    let mut bytes = Vec::with_capacity(PREAMBLE_SIZE + header_bytes.len() + body.len());
    bytes.extend_from_slice(&SEGMENT_MAGIC);
    bytes.extend_from_slice(&SEGMENT_FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&header_len.to_le_bytes());
    bytes.extend_from_slice(&crc32(&header_bytes).to_le_bytes());
    bytes.extend_from_slice(&header_bytes);
    bytes.extend_from_slice(body);
    Ok(bytes)
}

fn crc32(data: &[u8]) -> u32 {
    let mut crc = Crc32::new();
    crc.update(data);
    crc.finalize()
}

/// Splits a segment file into its header and body, verifying both CRCs.
fn split(bytes: &[u8]) -> CoreResult<(SegmentHeader, &[u8])> {
    if bytes.len() < PREAMBLE_SIZE {
        return Err(CoreError::integrity("segment file truncated"));
    }
    if bytes[..4] != SEGMENT_MAGIC {
        return Err(CoreError::integrity("bad segment magic"));
    }
    let format = u16::from_le_bytes([bytes[4], bytes[5]]);
    if format != SEGMENT_FORMAT_VERSION {
        return Err(CoreError::integrity(format!(
            "unsupported segment format version {format}"
        )));
    }
    let header_len = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]) as usize;
    let header_crc = u32::from_le_bytes([bytes[10], bytes[11], bytes[12], bytes[13]]);
    let body_start = PREAMBLE_SIZE.saturating_add(header_len);
    if bytes.len() < body_start {
        return Err(CoreError::integrity("segment header truncated"));
    }

    let header_bytes = &bytes[PREAMBLE_SIZE..body_start];
    let actual = crc32(header_bytes);
    if actual != header_crc {
        return Err(CoreError::integrity(format!(
            "segment header checksum mismatch: expected {header_crc:08x}, got {actual:08x}"
        )));
    }
    let header: SegmentHeader = ciborium::de::from_reader(header_bytes)
        .map_err(|e| CoreError::integrity(format!("segment header undecodable: {e}")))?;

    let body = &bytes[body_start..];
    if body.len() as u64 != header.body_len {
        return Err(CoreError::integrity(format!(
            "segment body is {} bytes, header says {}",
            body.len(),
            header.body_len
        )));
    }
    let actual = crc32(body);
    if actual != header.body_checksum {
        return Err(CoreError::integrity(format!(
            "segment body checksum mismatch: expected {:08x}, got {actual:08x}",
            header.body_checksum
        )));
    }

    Ok((header, body))
}

/// Reads only the header of a segment file.
pub fn decode_header(bytes: &[u8]) -> CoreResult<SegmentHeader> {
    split(bytes).map(|(header, _)| header)
}

/// Decodes a segment file.
pub fn decode_segment(bytes: &[u8]) -> CoreResult<DecodedSegment> {
    let (header, body) = split(bytes)?;

    let capacity = usize::try_from(header.record_count)
        .ok()
        .filter(|&count| count <= body.len() / StoredRecord::MIN_ENCODED_SIZE)
        .ok_or_else(|| {
            CoreError::integrity(format!(
                "header claims {} records, a {}-byte body cannot hold them",
                header.record_count,
                body.len()
            ))
        })?;
    let mut records = Vec::with_capacity(capacity);
    let mut locations = Vec::with_capacity(capacity);
    let mut offset = 0usize;
    while offset < body.len() {
        let (record, used) = StoredRecord::decode(&body[offset..])?;
        locations.push(RecordLocation {
            key: record.key.clone(),
            offset: offset as u64,
            length: used as u32,
            content_hash: sha256_hex(&record.payload),
        });
        records.push(record);
        offset += used;
    }

    if records.len() as u64 != header.record_count {
        return Err(CoreError::integrity(format!(
            "segment holds {} records, header says {}",
            records.len(),
            header.record_count
        )));
    }

    Ok(DecodedSegment {
        header,
        records,
        locations,
    })
}

/// Decodes the single record at `offset` within the body of a segment file.
pub fn decode_record_at(bytes: &[u8], offset: u64, length: u32) -> CoreResult<StoredRecord> {
    let (_, body) = split(bytes)?;
    let start = usize::try_from(offset)
        .map_err(|_| CoreError::integrity("record offset out of range"))?;
    let end = start + length as usize;
    if end > body.len() {
        return Err(CoreError::integrity(format!(
            "record at {start}+{length} lies outside the {}-byte body",
            body.len()
        )));
    }
    let (record, used) = StoredRecord::decode(&body[start..end])?;
    if used != length as usize {
        return Err(CoreError::integrity("record length does not match location"));
    }
    Ok(record)
}
