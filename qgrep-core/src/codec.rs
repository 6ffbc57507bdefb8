//! Chunk payload codec. The on-disk format fixes the codec to
//! LZ4-HC; there is no per-chunk codec selector the way a
//! multi-codec `Compressor` trait would carry one; block-mode framing matches
//! chunk sizing being known up front from the header.

use crate::error::{QgrepError, Result};
use lz4::block::{CompressionMode, compress, decompress};

const HC_LEVEL: i32 = 9;

/// Compresses `payload` (file-table | name-buffer | data-buffer) with LZ4-HC.
pub fn compress_payload(payload: &[u8]) -> Result<Vec<u8>> {
    compress(payload, Some(CompressionMode::HIGHCOMPRESSION(HC_LEVEL)), false)
        .map_err(|e| QgrepError::MalformedChunk(format!("lz4 compress failed: {e}")))
}

/// Decompresses `data` into exactly `uncompressed_size` bytes. A short or
/// over-long result is treated as a malformed chunk.
pub fn decompress_payload(data: &[u8], uncompressed_size: usize) -> Result<Vec<u8>> {
    let out = decompress(data, Some(uncompressed_size as i32))
        .map_err(|e| QgrepError::MalformedChunk(format!("lz4 decompress failed: {e}")))?;
    if out.len() != uncompressed_size {
        return Err(QgrepError::MalformedChunk(format!(
            "decompressed {} bytes, expected {}",
            out.len(),
            uncompressed_size
        )));
    }
    Ok(out)
}

/// Decompresses only the leading `file_table_size` bytes of a payload,
/// without fully decompressing the chunk. LZ4 block mode has no
/// streaming-stop API, so this decompresses the full block and truncates;
/// `file_table_size` is always far smaller than the full chunk, so the
/// extra work stays cheap relative to the I/O that already happened.
pub fn decompress_file_table(
    data: &[u8],
    uncompressed_size: usize,
    file_table_size: usize,
) -> Result<Vec<u8>> {
    let mut full = decompress_payload(data, uncompressed_size)?;
    full.truncate(file_table_size);
    Ok(full)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_payload() {
        let payload = b"the quick brown fox jumps over the lazy dog".repeat(20);
        let compressed = compress_payload(&payload).unwrap();
        let restored = decompress_payload(&compressed, payload.len()).unwrap();
        assert_eq!(restored, payload);
    }

    #[test]
    fn detects_size_mismatch() {
        let payload = b"hello world".repeat(8);
        let compressed = compress_payload(&payload).unwrap();
        assert!(decompress_payload(&compressed, payload.len() + 1).is_err());
    }

    #[test]
    fn partial_decompress_matches_prefix() {
        let payload = b"ABCDEFGHIJ0123456789".repeat(10);
        let compressed = compress_payload(&payload).unwrap();
        let prefix = decompress_file_table(&compressed, payload.len(), 10).unwrap();
        assert_eq!(prefix, &payload[..10]);
    }
}
