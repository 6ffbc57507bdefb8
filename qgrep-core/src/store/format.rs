//! On-disk layout constants and packed-struct (de)serialization for the
//! `.qgd`/`.qgf` files. Fixed little-endian fields, read/written
//! with manual byte slicing rather than a derive crate, matching the LE
//! helper style `jafreck-lz4r`'s frame header uses for its own binary format.

use crate::error::{QgrepError, Result};

pub const DATA_MAGIC: &[u8; 4] = b"QGD0";
pub const NAMES_MAGIC: &[u8; 4] = b"QGF0";

#[inline]
pub fn read_u32(src: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(src[offset..offset + 4].try_into().unwrap())
}

#[inline]
pub fn write_u32(dst: &mut Vec<u8>, value: u32) {
    dst.extend_from_slice(&value.to_le_bytes());
}

#[inline]
pub fn read_u64(src: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(src[offset..offset + 8].try_into().unwrap())
}

#[inline]
pub fn write_u64(dst: &mut Vec<u8>, value: u64) {
    dst.extend_from_slice(&value.to_le_bytes());
}

/// The fixed 7-`u32` chunk header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChunkHeader {
    pub file_count: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_table_size: u32,
    pub index_size: u32,
    pub index_hash_iterations: u32,
    pub extra_size: u32,
}

impl ChunkHeader {
    pub const LEN: usize = 7 * 4;

    pub fn write_to(&self, out: &mut Vec<u8>) {
        write_u32(out, self.file_count);
        write_u32(out, self.compressed_size);
        write_u32(out, self.uncompressed_size);
        write_u32(out, self.file_table_size);
        write_u32(out, self.index_size);
        write_u32(out, self.index_hash_iterations);
        write_u32(out, self.extra_size);
    }

    pub fn read_from(src: &[u8]) -> Result<Self> {
        if src.len() < Self::LEN {
            return Err(QgrepError::MalformedChunk("short chunk header".into()));
        }
        Ok(Self {
            file_count: read_u32(src, 0),
            compressed_size: read_u32(src, 4),
            uncompressed_size: read_u32(src, 8),
            file_table_size: read_u32(src, 12),
            index_size: read_u32(src, 16),
            index_hash_iterations: read_u32(src, 20),
            extra_size: read_u32(src, 24),
        })
    }
}

/// One entry of the uncompressed file-table. 40 bytes packed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FileTableEntry {
    pub name_off: u32,
    pub name_len: u32,
    pub data_off: u32,
    pub data_size: u32,
    pub start_line: u32,
    pub reserved: u32,
    pub file_size: u64,
    pub timestamp: u64,
}

impl FileTableEntry {
    pub const LEN: usize = 4 * 6 + 8 * 2;

    pub fn write_to(&self, out: &mut Vec<u8>) {
        write_u32(out, self.name_off);
        write_u32(out, self.name_len);
        write_u32(out, self.data_off);
        write_u32(out, self.data_size);
        write_u32(out, self.start_line);
        write_u32(out, self.reserved);
        write_u64(out, self.file_size);
        write_u64(out, self.timestamp);
    }

    pub fn read_from(src: &[u8]) -> Result<Self> {
        if src.len() < Self::LEN {
            return Err(QgrepError::MalformedChunk("short file-table entry".into()));
        }
        Ok(Self {
            name_off: read_u32(src, 0),
            name_len: read_u32(src, 4),
            data_off: read_u32(src, 8),
            data_size: read_u32(src, 12),
            start_line: read_u32(src, 16),
            reserved: read_u32(src, 20),
            file_size: read_u64(src, 24),
            timestamp: read_u64(src, 32),
        })
    }

    pub fn is_suffix(&self) -> bool {
        self.start_line > 0
    }
}

/// Header of the `.qgf` file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NamesHeader {
    pub file_count: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub name_buffer_offset: u32,
    pub path_buffer_offset: u32,
}

impl NamesHeader {
    pub const LEN: usize = 5 * 4;

    pub fn write_to(&self, out: &mut Vec<u8>) {
        write_u32(out, self.file_count);
        write_u32(out, self.compressed_size);
        write_u32(out, self.uncompressed_size);
        write_u32(out, self.name_buffer_offset);
        write_u32(out, self.path_buffer_offset);
    }

    pub fn read_from(src: &[u8]) -> Result<Self> {
        if src.len() < Self::LEN {
            return Err(QgrepError::MalformedChunk("short names header".into()));
        }
        Ok(Self {
            file_count: read_u32(src, 0),
            compressed_size: read_u32(src, 4),
            uncompressed_size: read_u32(src, 8),
            name_buffer_offset: read_u32(src, 12),
            path_buffer_offset: read_u32(src, 16),
        })
    }
}

/// A `.qgf` entry: offsets into the name/path buffers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NamesEntry {
    pub name_off: u32,
    pub path_off: u32,
}

impl NamesEntry {
    pub const LEN: usize = 4 * 2;

    pub fn write_to(&self, out: &mut Vec<u8>) {
        write_u32(out, self.name_off);
        write_u32(out, self.path_off);
    }

    pub fn read_from(src: &[u8]) -> Result<Self> {
        if src.len() < Self::LEN {
            return Err(QgrepError::MalformedChunk("short names entry".into()));
        }
        Ok(Self {
            name_off: read_u32(src, 0),
            path_off: read_u32(src, 4),
        })
    }
}

/// Target uncompressed content size a chunk is flushed at.
pub const CHUNK_TARGET_SIZE: usize = 512 * 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_header_round_trips() {
        let header = ChunkHeader {
            file_count: 3,
            compressed_size: 100,
            uncompressed_size: 200,
            file_table_size: 40,
            index_size: 64,
            index_hash_iterations: 5,
            extra_size: 12,
        };
        let mut buf = Vec::new();
        header.write_to(&mut buf);
        assert_eq!(buf.len(), ChunkHeader::LEN);
        assert_eq!(ChunkHeader::read_from(&buf).unwrap(), header);
    }

    #[test]
    fn file_table_entry_round_trips() {
        let entry = FileTableEntry {
            name_off: 1,
            name_len: 2,
            data_off: 3,
            data_size: 4,
            start_line: 5,
            reserved: 0,
            file_size: 6,
            timestamp: 7,
        };
        let mut buf = Vec::new();
        entry.write_to(&mut buf);
        assert_eq!(buf.len(), FileTableEntry::LEN);
        assert_eq!(FileTableEntry::read_from(&buf).unwrap(), entry);
        assert!(entry.is_suffix());
    }

    #[test]
    fn short_header_is_malformed() {
        assert!(ChunkHeader::read_from(&[0u8; 4]).is_err());
    }
}
