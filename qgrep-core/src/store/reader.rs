//! Store reader. Validates magic, then iterates chunks
//! strictly linearly — the database file is read once by the
//! producer thread and workers never touch it directly.

use crate::error::{QgrepError, Result};
use crate::store::format::{ChunkHeader, DATA_MAGIC};
use crate::util::pool::{BlockPool, PooledBuf};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

pub struct ChunkRecord {
    pub id: u32,
    pub header: ChunkHeader,
    pub extras: PooledBuf,
    pub index: PooledBuf,
    /// Still LZ4-compressed; the worker decompresses it.
    pub payload: PooledBuf,
}

pub struct StoreReader {
    path: PathBuf,
    file: BufReader<File>,
    next_id: u32,
    pool: BlockPool,
}

impl StoreReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = BufReader::new(File::open(&path)?);
        let mut magic = [0u8; 4];
        file.read_exact(&mut magic).map_err(|_| {
            QgrepError::FormatOutdated(format!("{} is too short to hold a magic", path.display()))
        })?;
        if &magic != DATA_MAGIC {
            return Err(QgrepError::FormatOutdated(format!(
                "{} has magic {:?}, expected {:?}",
                path.display(),
                magic,
                DATA_MAGIC
            )));
        }
        Ok(Self {
            path,
            file,
            next_id: 0,
            pool: BlockPool::new(crate::store::format::CHUNK_TARGET_SIZE * 2),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the next chunk in full, or `None` at a clean end of file.
    pub fn next_chunk(&mut self) -> Result<Option<ChunkRecord>> {
        let mut header_buf = [0u8; ChunkHeader::LEN];
        let read = read_up_to(&mut self.file, &mut header_buf)?;
        if read == 0 {
            return Ok(None);
        }
        if read != ChunkHeader::LEN {
            return Err(QgrepError::MalformedChunk(
                "truncated chunk header".into(),
            ));
        }
        let header = ChunkHeader::read_from(&header_buf)?;

        let mut extras = self.pool.acquire(header.extra_size as usize);
        self.file
            .read_exact(extras.as_mut_slice())
            .map_err(|_| QgrepError::MalformedChunk("truncated extras block".into()))?;

        let mut index = self.pool.acquire(header.index_size as usize);
        self.file
            .read_exact(index.as_mut_slice())
            .map_err(|_| QgrepError::MalformedChunk("truncated index block".into()))?;

        let mut payload = self.pool.acquire(header.compressed_size as usize);
        self.file
            .read_exact(payload.as_mut_slice())
            .map_err(|_| QgrepError::MalformedChunk("truncated payload".into()))?;

        let id = self.next_id;
        self.next_id += 1;
        Ok(Some(ChunkRecord {
            id,
            header,
            extras,
            index,
            payload,
        }))
    }
}

/// Like `read_exact` but returns the number of bytes actually read instead
/// of erroring when the stream ends exactly at a chunk boundary (0 bytes
/// read is the clean-EOF case `next_chunk` treats as "no more chunks").
fn read_up_to<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match r.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::writer::StoreWriter;

    #[test]
    fn rejects_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("project.qgd");
        std::fs::write(&path, b"NOPE").unwrap();
        assert!(matches!(
            StoreReader::open(&path),
            Err(QgrepError::FormatOutdated(_))
        ));
    }

    #[test]
    fn iterates_appended_chunks_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("project.qgd");
        let mut writer = StoreWriter::create(&path).unwrap();
        for i in 0..3u32 {
            let header = ChunkHeader {
                file_count: 1,
                compressed_size: 0,
                uncompressed_size: 0,
                file_table_size: 0,
                index_size: 0,
                index_hash_iterations: 0,
                extra_size: 0,
            };
            writer
                .append_chunk(&header, &[], &[], &[])
                .unwrap();
            let _ = i;
        }
        writer.commit().unwrap();

        let mut reader = StoreReader::open(&path).unwrap();
        let mut ids = Vec::new();
        while let Some(chunk) = reader.next_chunk().unwrap() {
            ids.push(chunk.id);
        }
        assert_eq!(ids, vec![0, 1, 2]);
    }
}
