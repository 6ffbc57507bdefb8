//! Updater: merges a sorted file list against an existing
//! store, reusing whole chunks or individual file parts verbatim whenever
//! path+mtime+size are unchanged. Ported from
//! `UpdateFileIterator`/`isChunkCurrent`/`processChunkData` in
//! `update.cpp`: the disk-file cursor advances once per *file*, and a
//! split suffix at the front of a chunk is matched against the file the
//! cursor just consumed rather than advancing again.

use crate::builder::Builder;
use crate::changelist::ChangeList;
use crate::codec;
use crate::error::Result;
use crate::store::format::FileTableEntry;
use crate::store::reader::StoreReader;
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileInfo {
    pub path: String,
    pub timestamp: u64,
    pub size: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdateStats {
    pub files_added: u64,
    pub files_removed: u64,
    pub files_changed: u64,
    pub chunks_preserved: u64,
    pub chunks_written: u64,
}

struct FileCursor<'a> {
    files: &'a [FileInfo],
    index: usize,
}

impl<'a> FileCursor<'a> {
    fn peek(&self) -> Option<&'a FileInfo> {
        self.files.get(self.index)
    }

    fn prev(&self) -> Option<&'a FileInfo> {
        self.index.checked_sub(1).and_then(|i| self.files.get(i))
    }

    fn advance(&mut self) {
        self.index += 1;
    }

    fn advance_by(&mut self, n: usize) {
        self.index += n;
    }
}

fn is_file_current(info: &FileInfo, entry: &FileTableEntry) -> bool {
    info.timestamp == entry.timestamp && info.size == entry.file_size
}

/// Parses the `\0`-terminated extras block into an ordered `Vec<String>`.
/// Entries within one chunk are always distinct paths: a file only ever
/// contributes a second part to the *next* chunk, never to the same one.
fn parse_extras(extras: &[u8]) -> Vec<String> {
    extras
        .split(|&b| b == 0)
        .filter(|s| !s.is_empty())
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .collect()
}

fn parse_file_table(bytes: &[u8], file_count: usize) -> Result<Vec<FileTableEntry>> {
    (0..file_count)
        .map(|i| FileTableEntry::read_from(&bytes[i * FileTableEntry::LEN..]))
        .collect()
}

pub fn update(store_path: impl AsRef<Path>, files: &[FileInfo]) -> Result<UpdateStats> {
    let store_path = store_path.as_ref();
    let mut stats = UpdateStats::default();
    let mut builder = Builder::create(store_path)?;
    let mut cursor = FileCursor { files, index: 0 };

    match StoreReader::open(store_path) {
        Ok(mut reader) => {
            while let Some(chunk) = reader.next_chunk()? {
                process_chunk(&mut builder, &mut cursor, &mut stats, chunk)?;
            }
        }
        Err(_) => {
            // Missing or FormatOutdated: nothing to reuse, every file is new.
        }
    }

    while let Some(info) = cursor.peek() {
        let bytes = std::fs::read(&info.path)?;
        builder.add_file(&info.path, info.timestamp, &bytes)?;
        cursor.advance();
        stats.files_added += 1;
    }

    stats.chunks_written = builder.commit()?.chunks_written;
    let qgc = store_path.with_extension("qgc");
    if qgc.exists() {
        ChangeList::truncate(&qgc)?;
    }
    Ok(stats)
}

fn process_chunk(
    builder: &mut Builder,
    cursor: &mut FileCursor<'_>,
    stats: &mut UpdateStats,
    chunk: crate::store::reader::ChunkRecord,
) -> Result<()> {
    let paths = parse_extras(chunk.extras.as_slice());
    let file_table_bytes = codec::decompress_file_table(
        chunk.payload.as_slice(),
        chunk.header.uncompressed_size as usize,
        chunk.header.file_table_size as usize,
    )?;
    let entries = parse_file_table(&file_table_bytes, chunk.header.file_count as usize)?;
    let first_is_suffix = entries.first().is_some_and(|e| e.is_suffix());
    let back = usize::from(first_is_suffix);

    if is_chunk_current(cursor, &paths, &entries, back) {
        let header = chunk.header;
        builder.append_pre_encoded_chunk(
            header,
            chunk.extras.into_vec(),
            chunk.index.into_vec(),
            chunk.payload.into_vec(),
        )?;
        cursor.advance_by(header.file_count as usize - back);
        stats.chunks_preserved += 1;
        return Ok(());
    }

    let full_payload = codec::decompress_payload(chunk.payload.as_slice(), chunk.header.uncompressed_size as usize)?;
    let part_bytes = |entry: &FileTableEntry| -> &[u8] {
        let start = entry.data_off as usize;
        &full_payload[start..start + entry.data_size as usize]
    };

    let mut skip_first = false;
    if first_is_suffix {
        if let Some(prev) = cursor.prev() {
            let entry = &entries[0];
            if *prev.path == paths[0] && is_file_current(prev, entry) {
                builder.append_part_bytes(
                    &prev.path,
                    entry.start_line,
                    entry.file_size,
                    entry.timestamp,
                    part_bytes(entry),
                )?;
                skip_first = true;
            }
        }
    }

    for i in usize::from(skip_first)..entries.len() {
        let entry = &entries[i];
        let path = &paths[i];

        while let Some(cur) = cursor.peek() {
            if cur.path.as_str() < path.as_str() {
                let bytes = std::fs::read(&cur.path)?;
                builder.add_file(&cur.path, cur.timestamp, &bytes)?;
                cursor.advance();
                stats.files_added += 1;
            } else {
                break;
            }
        }

        match cursor.peek() {
            Some(cur) if cur.path == *path => {
                if is_file_current(cur, entry) {
                    builder.append_part_bytes(
                        path,
                        entry.start_line,
                        entry.file_size,
                        entry.timestamp,
                        part_bytes(entry),
                    )?;
                } else {
                    let bytes = std::fs::read(&cur.path)?;
                    builder.add_file(&cur.path, cur.timestamp, &bytes)?;
                    stats.files_changed += 1;
                }
                cursor.advance();
            }
            _ => {
                if entry.start_line == 0 {
                    stats.files_removed += 1;
                }
            }
        }
    }

    Ok(())
}

fn is_chunk_current(
    cursor: &FileCursor<'_>,
    paths: &[String],
    entries: &[FileTableEntry],
    back: usize,
) -> bool {
    if cursor.index < back {
        return false;
    }
    let base = cursor.index - back;
    if base + entries.len() > cursor.files.len() {
        return false;
    }
    for (i, entry) in entries.iter().enumerate() {
        let info = &cursor.files[base + i];
        if info.path != paths[i] || !is_file_current(info, entry) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn file_meta(path: &Path) -> (u64, u64) {
        let m = fs::metadata(path).unwrap();
        (mtime_of(&m), m.len())
    }

    #[cfg(unix)]
    fn mtime_of(m: &fs::Metadata) -> u64 {
        use std::os::unix::fs::MetadataExt;
        m.mtime() as u64
    }

    #[cfg(not(unix))]
    fn mtime_of(_m: &fs::Metadata) -> u64 {
        0
    }

    #[test]
    fn idempotent_update_preserves_all_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, "hello\nworld\n").unwrap();
        fs::write(&b, "hi\n").unwrap();

        let store = dir.path().join("project.qgd");
        let (a_ts, a_sz) = file_meta(&a);
        let (b_ts, b_sz) = file_meta(&b);
        let files = vec![
            FileInfo { path: a.to_string_lossy().into_owned(), timestamp: a_ts, size: a_sz },
            FileInfo { path: b.to_string_lossy().into_owned(), timestamp: b_ts, size: b_sz },
        ];

        let stats1 = update(&store, &files).unwrap();
        assert_eq!(stats1.files_added, 2);

        let stats2 = update(&store, &files).unwrap();
        assert_eq!(stats2.files_added, 0);
        assert_eq!(stats2.files_changed, 0);
        assert_eq!(stats2.chunks_preserved, stats2.chunks_written);
    }

    #[test]
    fn deleting_a_file_reports_removed() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, "hello\n").unwrap();
        fs::write(&b, "hi\n").unwrap();

        let store = dir.path().join("project.qgd");
        let (a_ts, a_sz) = file_meta(&a);
        let (b_ts, b_sz) = file_meta(&b);
        let files = vec![
            FileInfo { path: a.to_string_lossy().into_owned(), timestamp: a_ts, size: a_sz },
            FileInfo { path: b.to_string_lossy().into_owned(), timestamp: b_ts, size: b_sz },
        ];
        update(&store, &files).unwrap();

        let remaining = vec![files[0].clone()];
        let stats = update(&store, &remaining).unwrap();
        assert_eq!(stats.files_removed, 1);
    }

    #[test]
    fn empty_store_adds_every_file() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        fs::write(&a, "x\n").unwrap();
        let store = dir.path().join("project.qgd");
        let (ts, sz) = file_meta(&a);
        let files = vec![FileInfo { path: a.to_string_lossy().into_owned(), timestamp: ts, size: sz }];
        let stats = update(&store, &files).unwrap();
        assert_eq!(stats.files_added, 1);
    }
}
