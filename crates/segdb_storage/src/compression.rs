//! Gzip compression helpers.
//!
//! Compression is applied to plaintext: before encryption on write and
//! after decryption on read.

use crate::error::{StorageError, StorageResult};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Gzip magic bytes.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Compresses `data` with gzip at the default level.
///
/// # Errors
///
/// Returns [`StorageError::Compression`] if the encoder fails.
pub fn gzip(data: &[u8]) -> StorageResult<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| StorageError::Compression(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| StorageError::Compression(e.to_string()))
}

/// Decompresses gzip data.
///
/// # Errors
///
/// Returns [`StorageError::Compression`] if the input is not valid gzip.
pub fn gunzip(data: &[u8]) -> StorageResult<Vec<u8>> {
    if !is_gzip(data) {
        return Err(StorageError::Compression("missing gzip header".into()));
    }
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::with_capacity(data.len() * 2);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| StorageError::Compression(e.to_string()))?;
    Ok(out)
}

/// Returns true if `data` starts with the gzip magic bytes.
#[must_use]
pub fn is_gzip(data: &[u8]) -> bool {
    data.len() >= GZIP_MAGIC.len() && data[..2] == GZIP_MAGIC
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gzip_roundtrip() {
        let data = b"segment segment segment segment segment".repeat(20);
        let compressed = gzip(&data).unwrap();
        assert!(is_gzip(&compressed));
        assert!(compressed.len() < data.len());
        assert_eq!(gunzip(&compressed).unwrap(), data);
    }

    #[test]
    fn empty_input_roundtrip() {
        let compressed = gzip(b"").unwrap();
        assert!(gunzip(&compressed).unwrap().is_empty());
    }

    #[test]
    fn gunzip_rejects_plain_bytes() {
        let result = gunzip(b"not gzip at all");
        assert!(matches!(result, Err(StorageError::Compression(_))));
    }

    #[test]
    fn gunzip_rejects_truncated_stream() {
        let compressed = gzip(&b"truncate me".repeat(50)).unwrap();
        let result = gunzip(&compressed[..compressed.len() / 2]);
        assert!(result.is_err());
    }
}
