//! Builder: streams `(path, timestamp, bytes)` records into
//! bounded-size chunks, normalizing line endings and splitting oversize
//! files at line boundaries.

use crate::codec;
use crate::error::Result;
use crate::ngram::bloom::{self, Bloom};
use crate::store::format::{ChunkHeader, FileTableEntry, CHUNK_TARGET_SIZE};
use crate::store::writer::StoreWriter;
use crate::util::eol;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BuilderStats {
    pub files_ingested: u64,
    pub chunks_written: u64,
}

struct PendingPart {
    path: String,
    start_line: u32,
    file_size: u64,
    timestamp: u64,
    data_off: u32,
    data_size: u32,
}

struct ChunkAccumulator {
    content: Vec<u8>,
    parts: Vec<PendingPart>,
    extras: BTreeSet<String>,
}

impl ChunkAccumulator {
    fn new() -> Self {
        Self {
            content: Vec::new(),
            parts: Vec::new(),
            extras: BTreeSet::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    fn remaining_budget(&self) -> usize {
        CHUNK_TARGET_SIZE.saturating_sub(self.content.len())
    }

    fn push_part(&mut self, path: &str, start_line: u32, file_size: u64, timestamp: u64, bytes: &[u8]) {
        let data_off = self.content.len() as u32;
        self.content.extend_from_slice(bytes);
        self.parts.push(PendingPart {
            path: path.to_string(),
            start_line,
            file_size,
            timestamp,
            data_off,
            data_size: bytes.len() as u32,
        });
        self.extras.insert(path.to_string());
    }
}

pub struct Builder {
    writer: StoreWriter,
    acc: ChunkAccumulator,
    stats: BuilderStats,
}

impl Builder {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            writer: StoreWriter::create(path)?,
            acc: ChunkAccumulator::new(),
            stats: BuilderStats::default(),
        })
    }

    /// Ingests one file from raw disk bytes: BOM-sniffs, normalizes EOLs,
    /// and splits across chunk boundaries as needed.
    pub fn add_file(&mut self, path: &str, timestamp: u64, raw_bytes: &[u8]) -> Result<()> {
        let decoded = eol::decode_to_utf8(raw_bytes);
        let normalized = eol::normalize_eol(&decoded);
        let file_size = normalized.len() as u64;
        self.ingest(path, timestamp, file_size, &normalized, 0)?;
        self.stats.files_ingested += 1;
        Ok(())
    }

    /// Forwards already-normalized bytes for one file part (used by the
    /// updater to reuse a stored file's bytes verbatim, or to forward just
    /// a split suffix — `start_line` is whatever the stored record had).
    pub fn append_part_bytes(
        &mut self,
        path: &str,
        start_line: u32,
        file_size: u64,
        timestamp: u64,
        bytes: &[u8],
    ) -> Result<()> {
        self.ingest(path, timestamp, file_size, bytes, start_line)
    }

    /// Forwards a whole chunk the updater decided is current, without
    /// re-compressing it. Flushes any in-progress chunk first so chunk
    /// order in the output store matches merge order (the updater's
    /// `AppendChunk` path has no back-pointer into the writer).
    pub fn append_pre_encoded_chunk(
        &mut self,
        header: ChunkHeader,
        extras: Vec<u8>,
        index: Vec<u8>,
        payload: Vec<u8>,
    ) -> Result<()> {
        self.flush()?;
        self.writer.append_chunk(&header, &extras, &index, &payload)
    }

    /// Forces the current accumulator to flush even if under budget. The
    /// updater calls this at a chunk boundary it must respect, e.g. right
    /// before forwarding a pre-encoded chunk.
    pub fn flush_pending(&mut self) -> Result<()> {
        self.flush()
    }

    pub fn commit(mut self) -> Result<BuilderStats> {
        self.flush()?;
        self.stats.chunks_written = self.writer.chunks_written;
        self.writer.commit()?;
        Ok(self.stats)
    }

    fn ingest(
        &mut self,
        path: &str,
        timestamp: u64,
        file_size: u64,
        mut content: &[u8],
        mut start_line: u32,
    ) -> Result<()> {
        loop {
            if content.is_empty() {
                return Ok(());
            }
            let budget = self.acc.remaining_budget();
            if content.len() <= budget {
                self.acc.push_part(path, start_line, file_size, timestamp, content);
                return Ok(());
            }

            let split_at = find_line_boundary(content, budget);
            if split_at == 0 {
                if self.acc.is_empty() {
                    // A single line longer than the whole chunk target: emit
                    // it anyway rather than split mid-line.
                    self.acc.push_part(path, start_line, file_size, timestamp, content);
                    self.flush()?;
                    return Ok(());
                }
                self.flush()?;
                continue;
            }

            let (part, rest) = content.split_at(split_at);
            self.acc.push_part(path, start_line, file_size, timestamp, part);
            let lines_in_part = crate::util::eol::newline_count(part);
            start_line = if start_line == 0 {
                lines_in_part + 1
            } else {
                start_line + lines_in_part
            };
            content = rest;
            self.flush()?;
        }
    }

    fn flush(&mut self) -> Result<()> {
        if self.acc.parts.is_empty() {
            return Ok(());
        }

        self.acc
            .parts
            .sort_by(|a, b| a.path.cmp(&b.path).then(a.start_line.cmp(&b.start_line)));

        let mut name_buffer = Vec::new();
        let mut name_offsets = Vec::with_capacity(self.acc.parts.len());
        for p in &self.acc.parts {
            name_offsets.push((name_buffer.len() as u32, p.path.len() as u32));
            name_buffer.extend_from_slice(p.path.as_bytes());
            name_buffer.push(0);
        }

        let file_table_size = (self.acc.parts.len() * FileTableEntry::LEN) as u32;
        let name_buffer_offset = file_table_size;
        let data_buffer_offset = name_buffer_offset + name_buffer.len() as u32;

        let mut file_table_bytes = Vec::with_capacity(file_table_size as usize);
        for (i, p) in self.acc.parts.iter().enumerate() {
            let (name_off, name_len) = name_offsets[i];
            let entry = FileTableEntry {
                name_off: name_buffer_offset + name_off,
                name_len,
                data_off: data_buffer_offset + p.data_off,
                data_size: p.data_size,
                start_line: p.start_line,
                reserved: 0,
                file_size: p.file_size,
                timestamp: p.timestamp,
            };
            entry.write_to(&mut file_table_bytes);
        }

        let mut payload = Vec::with_capacity(
            file_table_bytes.len() + name_buffer.len() + self.acc.content.len(),
        );
        payload.extend_from_slice(&file_table_bytes);
        payload.extend_from_slice(&name_buffer);
        payload.extend_from_slice(&self.acc.content);

        let uncompressed_size = payload.len() as u32;
        let compressed = codec::compress_payload(&payload)?;

        let distinct_ngrams: HashSet<u32> = bloom::ngrams(&self.acc.content).collect();
        let (bit_count, iterations) = bloom::size_for(distinct_ngrams.len());
        let mut filter = Bloom::new(bit_count, iterations);
        filter.insert_content(&self.acc.content);

        let mut extras = Vec::new();
        for path in &self.acc.extras {
            extras.extend_from_slice(path.as_bytes());
            extras.push(0);
        }

        let header = ChunkHeader {
            file_count: self.acc.parts.len() as u32,
            compressed_size: compressed.len() as u32,
            uncompressed_size,
            file_table_size,
            index_size: filter.as_bytes().len() as u32,
            index_hash_iterations: filter.iterations(),
            extra_size: extras.len() as u32,
        };

        self.writer
            .append_chunk(&header, &extras, filter.as_bytes(), &compressed)?;
        self.acc = ChunkAccumulator::new();
        Ok(())
    }
}

/// Largest prefix length `<= limit` that ends right after a `\n`, or 0 if
/// no newline falls within the limit.
fn find_line_boundary(content: &[u8], limit: usize) -> usize {
    let limit = limit.min(content.len());
    match content[..limit].iter().rposition(|&b| b == b'\n') {
        Some(pos) => pos + 1,
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::reader::StoreReader;

    #[test]
    fn single_small_file_makes_one_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.qgd");
        let mut builder = Builder::create(&path).unwrap();
        builder.add_file("a.txt", 0, b"hello\nworld\n").unwrap();
        let stats = builder.commit().unwrap();
        assert_eq!(stats.chunks_written, 1);

        let mut reader = StoreReader::open(&path).unwrap();
        let chunk = reader.next_chunk().unwrap().unwrap();
        assert_eq!(chunk.header.file_count, 1);
        assert!(reader.next_chunk().unwrap().is_none());
    }

    #[test]
    fn oversize_file_splits_across_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.qgd");
        let mut builder = Builder::create(&path).unwrap();
        let content = "foo\n".repeat(200_000);
        builder.add_file("big.txt", 0, content.as_bytes()).unwrap();
        let stats = builder.commit().unwrap();
        assert!(stats.chunks_written >= 3);

        let mut reader = StoreReader::open(&path).unwrap();
        let mut chunk_count = 0;
        while reader.next_chunk().unwrap().is_some() {
            chunk_count += 1;
        }
        assert_eq!(chunk_count as u64, stats.chunks_written);
    }

    #[test]
    fn normalizes_crlf_before_splitting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.qgd");
        let mut builder = Builder::create(&path).unwrap();
        builder.add_file("a.txt", 0, b"a\r\nb\r\n").unwrap();
        builder.commit().unwrap();
    }
}
