//! Segment record framing.

use crate::error::{CoreError, CoreResult};
use crate::types::Timestamp;

/// A record as stored in a segment body.
///
/// ```text
/// | record_len (4) | key_len (2) | key | modified_at (8) | payload |
/// ```
///
/// `record_len` covers the whole frame including itself. The payload is the
/// CBOR encoding of the caller's record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    /// Record primary key.
    pub key: String,
    /// Last-modified timestamp reported by the record.
    pub modified_at: Timestamp,
    /// Serialized record.
    pub payload: Vec<u8>,
}

impl StoredRecord {
    /// Fixed framing size: record_len (4) + key_len (2) + modified_at (8) = 14
    const FIXED_SIZE: usize = 14;

    /// Smallest possible frame: fixed framing plus a one-byte key.
    pub(crate) const MIN_ENCODED_SIZE: usize = Self::FIXED_SIZE + 1;

    /// Creates a stored record.
    #[must_use]
    pub fn new(key: impl Into<String>, modified_at: Timestamp, payload: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            modified_at,
            payload,
        }
    }

    /// Returns the encoded size of this record.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        Self::FIXED_SIZE + self.key.len() + self.payload.len()
    }

    /// Appends the encoded record to `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] for an empty key, a key longer
    /// than 65535 bytes, or a record larger than 4 GiB.
    pub fn encode_into(&self, buf: &mut Vec<u8>) -> CoreResult<()> {
        if self.key.is_empty() {
            return Err(CoreError::invalid_operation("record key must not be empty"));
        }
        let key_len = u16::try_from(self.key.len()).map_err(|_| {
            CoreError::invalid_operation(format!(
                "record key is {} bytes, limit is {}",
                self.key.len(),
                u16::MAX
            ))
        })?;
        let record_len = u32::try_from(self.encoded_size())
            .map_err(|_| CoreError::invalid_operation("record larger than 4 GiB"))?;

        buf.reserve(self.encoded_size());
        buf.extend_from_slice(&record_len.to_le_bytes());
        buf.extend_from_slice(&key_len.to_le_bytes());
        buf.extend_from_slice(self.key.as_bytes());
        buf.extend_from_slice(&self.modified_at.as_millis().to_le_bytes());
        buf.extend_from_slice(&self.payload);
        Ok(())
    }

    /// Encodes the record to a new buffer.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.encoded_size());
        self.encode_into(&mut buf)?;
        Ok(buf)
    }

    /// Decodes one record from the start of `data`.
    ///
    /// Returns the record and the number of bytes consumed.
    pub fn decode(data: &[u8]) -> CoreResult<(Self, usize)> {
        if data.len() < Self::FIXED_SIZE {
            return Err(CoreError::integrity("record frame truncated"));
        }

        let record_len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if record_len < Self::FIXED_SIZE || data.len() < record_len {
            return Err(CoreError::integrity(format!(
                "record length {record_len} exceeds available {} bytes",
                data.len()
            )));
        }

        let key_len = u16::from_le_bytes([data[4], data[5]]) as usize;
        let key_end = 6 + key_len;
        if key_end + 8 > record_len {
            return Err(CoreError::integrity("record key overruns frame"));
        }
        let key = std::str::from_utf8(&data[6..key_end])
            .map_err(|_| CoreError::integrity("record key is not valid UTF-8"))?
            .to_string();

        let mut ts = [0u8; 8];
        ts.copy_from_slice(&data[key_end..key_end + 8]);
        let modified_at = Timestamp::from_millis(u64::from_le_bytes(ts));

        let payload = data[key_end + 8..record_len].to_vec();

        Ok((
            Self {
                key,
                modified_at,
                payload,
            },
            record_len,
        ))
    }
}
