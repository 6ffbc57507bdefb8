//! Store writer: stages a `.qgd_`/`.qgf_` temp file, then atomically renames
//! over the live `.qgd`/`.qgf` on commit. The Builder and the
//! Updater both push pre-framed chunks through the same `append_chunk`
//! call — no back-pointer from the writer to either collaborator.

use crate::error::Result;
use crate::store::format::{ChunkHeader, DATA_MAGIC};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub struct StoreWriter {
    path: PathBuf,
    tmp_path: PathBuf,
    file: BufWriter<File>,
    pub chunks_written: u64,
}

impl StoreWriter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let tmp_path = tmp_path_for(&path);
        let mut file = BufWriter::new(File::create(&tmp_path)?);
        file.write_all(DATA_MAGIC)?;
        Ok(Self {
            path,
            tmp_path,
            file,
            chunks_written: 0,
        })
    }

    /// Appends one fully-framed chunk: header, extras, index, compressed
    /// payload, in that order, matching the `.qgd` layout exactly.
    pub fn append_chunk(
        &mut self,
        header: &ChunkHeader,
        extras: &[u8],
        index: &[u8],
        payload: &[u8],
    ) -> Result<()> {
        let mut buf = Vec::with_capacity(ChunkHeader::LEN + extras.len() + index.len());
        header.write_to(&mut buf);
        self.file.write_all(&buf)?;
        self.file.write_all(extras)?;
        self.file.write_all(index)?;
        self.file.write_all(payload)?;
        self.chunks_written += 1;
        Ok(())
    }

    /// Flushes and atomically renames the temp file over the live path.
    pub fn commit(mut self) -> Result<()> {
        self.file.flush()?;
        drop(self.file);
        std::fs::rename(&self.tmp_path, &self.path)?;
        Ok(())
    }
}

pub fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push("_");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::format::ChunkHeader;

    #[test]
    fn commit_renames_temp_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("project.qgd");
        let mut writer = StoreWriter::create(&path).unwrap();
        let header = ChunkHeader {
            file_count: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            file_table_size: 0,
            index_size: 0,
            index_hash_iterations: 0,
            extra_size: 0,
        };
        writer.append_chunk(&header, &[], &[], &[]).unwrap();
        assert!(!path.exists());
        writer.commit().unwrap();
        assert!(path.exists());
    }
}
