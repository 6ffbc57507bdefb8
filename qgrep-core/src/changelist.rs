//! The `.qgc` change list: a sorted, deduplicated set of absolute
//! paths modified on disk but not yet reingested. The search path merges it
//! with the store so results always reflect what's on disk.

use crate::error::{QgrepError, Result};
use std::io::Write;
use std::path::Path;

#[derive(Clone, Debug, Default)]
pub struct ChangeList {
    entries: Vec<String>,
}

impl ChangeList {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        let mut entries: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        entries.sort();
        entries.dedup();
        Ok(Self { entries })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let tmp = super::store::writer::tmp_path_for(path.as_ref());
        let mut file = std::fs::File::create(&tmp)?;
        for e in &self.entries {
            writeln!(file, "{e}")?;
        }
        file.flush()?;
        drop(file);
        std::fs::rename(&tmp, path.as_ref())?;
        Ok(())
    }

    /// Truncates the change list, consumed by an update commit.
    pub fn truncate(path: impl AsRef<Path>) -> Result<()> {
        Self::default().save(path)
    }

    pub fn add(&mut self, paths: impl IntoIterator<Item = String>) {
        self.entries.extend(paths);
        self.entries.sort();
        self.entries.dedup();
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn cursor(&self) -> ChangeCursor<'_> {
        ChangeCursor::new(&self.entries)
    }

    /// A malformed `.qgc` is non-fatal: warn and treat the project as
    /// having no pending changes.
    pub fn load_lenient(path: impl AsRef<Path>) -> Self {
        match Self::load(&path) {
            Ok(list) => list,
            Err(QgrepError::Io(e)) => {
                tracing::warn!(path = %path.as_ref().display(), error = %e, "corrupt change list, ignoring");
                Self::default()
            }
            Err(e) => {
                tracing::warn!(path = %path.as_ref().display(), error = %e, "corrupt change list, ignoring");
                Self::default()
            }
        }
    }
}

/// Advances in lockstep with the store's chunk/file iteration.
pub struct ChangeCursor<'a> {
    entries: &'a [String],
    pos: usize,
}

impl<'a> ChangeCursor<'a> {
    /// Builds a cursor directly over a slice, for callers (like the search
    /// driver) that only keep the entries around, not the `ChangeList`.
    pub fn new(entries: &'a [String]) -> Self {
        Self { entries, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn peek(&self) -> Option<&'a str> {
        self.entries.get(self.pos).map(String::as_str)
    }

    pub fn advance(&mut self) -> Option<&'a str> {
        let item = self.peek();
        if item.is_some() {
            self.pos += 1;
        }
        item
    }

    /// Advances past every entry `<= bound`, returning the advanced slice.
    pub fn advance_while_le(&mut self, bound: &str) -> &'a [String] {
        let start = self.pos;
        while let Some(p) = self.peek() {
            if p <= bound {
                self.pos += 1;
            } else {
                break;
            }
        }
        &self.entries[start..self.pos]
    }

    pub fn remaining(&self) -> &'a [String] {
        &self.entries[self.pos..]
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_sorted_unique() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("project.qgc");
        let mut list = ChangeList::default();
        list.add(["b.txt".into(), "a.txt".into(), "a.txt".into()]);
        list.save(&path).unwrap();

        let loaded = ChangeList::load(&path).unwrap();
        assert_eq!(loaded.entries(), &["a.txt", "b.txt"]);
    }

    #[test]
    fn truncate_empties_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("project.qgc");
        let mut list = ChangeList::default();
        list.add(["a.txt".into()]);
        list.save(&path).unwrap();

        ChangeList::truncate(&path).unwrap();
        assert!(ChangeList::load(&path).unwrap().entries().is_empty());
    }

    #[test]
    fn cursor_advances_while_le() {
        let mut list = ChangeList::default();
        list.add(["a".into(), "b".into(), "c".into(), "e".into()]);
        let mut cursor = list.cursor();
        let advanced = cursor.advance_while_le("c");
        assert_eq!(advanced, &["a", "b", "c"]);
        assert_eq!(cursor.peek(), Some("e"));
    }
}
