//! File-path filter, built and read against the `.qgf` artifact. Ported
//! from `filter.cpp`'s `filterRegex`/`filterVisualAssist`/`filterFuzzy` and
//! `files.cpp`'s `buildFiles`/`searchFiles`, which keep two separate code
//! paths (`.qgf`-backed regex search, and a four-mode `filter()` fed from
//! an in-memory buffer built from piped stdin); both collapse here into
//! one `.qgf`-backed filter that dispatches on all four modes.
//!
//! The `.qgf` write side follows the same stage-then-rename pattern as
//! `store::writer::StoreWriter`, just over the `(entries | name_buffer |
//! path_buffer)` payload instead of chunks.

use crate::codec;
use crate::error::{QgrepError, Result};
use crate::fuzzy::{FuzzyMatcher, NO_MATCH};
use crate::highlight::{self, Range};
use crate::options::{FilterMode, SearchFlags};
use crate::search::regexec::QRegex;
use crate::store::format::{NamesEntry, NamesHeader, NAMES_MAGIC};
use crate::store::writer::tmp_path_for;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Builds the `.qgf` sibling of `store_path` from an ordered file list.
/// Each path's "name" is the substring after its last `/`, matching
/// `files.cpp`'s `getFileNames`.
pub fn build_names(store_path: impl AsRef<Path>, paths: &[String]) -> Result<()> {
    let qgf_path = store_path.as_ref().with_extension("qgf");

    let mut entries = Vec::with_capacity(paths.len());
    let mut name_buffer = Vec::new();
    let mut path_buffer = Vec::new();
    for path in paths {
        let name = path.rsplit('/').next().unwrap_or(path.as_str());
        let entry = NamesEntry {
            name_off: name_buffer.len() as u32,
            path_off: path_buffer.len() as u32,
        };
        name_buffer.extend_from_slice(name.as_bytes());
        name_buffer.push(b'\n');
        path_buffer.extend_from_slice(path.as_bytes());
        path_buffer.push(b'\n');
        entries.push(entry);
    }

    let mut payload = Vec::with_capacity(
        entries.len() * NamesEntry::LEN + name_buffer.len() + path_buffer.len(),
    );
    for e in &entries {
        e.write_to(&mut payload);
    }
    let name_buffer_offset = payload.len() as u32;
    payload.extend_from_slice(&name_buffer);
    let path_buffer_offset = payload.len() as u32;
    payload.extend_from_slice(&path_buffer);

    let header = NamesHeader {
        file_count: paths.len() as u32,
        compressed_size: 0,
        uncompressed_size: payload.len() as u32,
        name_buffer_offset,
        path_buffer_offset,
    };
    let compressed = codec::compress_payload(&payload)?;
    let header = NamesHeader {
        compressed_size: compressed.len() as u32,
        ..header
    };

    let tmp_path = tmp_path_for(&qgf_path);
    let mut out = Vec::with_capacity(4 + NamesHeader::LEN + compressed.len());
    out.extend_from_slice(NAMES_MAGIC);
    header.write_to(&mut out);
    out.extend_from_slice(&compressed);
    std::fs::write(&tmp_path, &out)?;
    std::fs::rename(&tmp_path, &qgf_path)?;
    Ok(())
}

/// The decompressed `.qgf` payload, split into its three sections. Offsets
/// in `name_offsets`/`path_offsets` are `(start, len)` pairs with the
/// trailing `\n` excluded, indexed in file order.
struct NamesIndex {
    name_buffer: Vec<u8>,
    path_buffer: Vec<u8>,
    name_offsets: Vec<(u32, u32)>,
    path_offsets: Vec<(u32, u32)>,
}

impl NamesIndex {
    fn load(qgf_path: &Path) -> Result<Self> {
        let mut file = File::open(qgf_path)?;
        let mut header_bytes = vec![0u8; 4 + NamesHeader::LEN];
        file.read_exact(&mut header_bytes)?;
        if &header_bytes[0..4] != NAMES_MAGIC {
            return Err(QgrepError::FormatOutdated(format!(
                "{}: bad .qgf magic",
                qgf_path.display()
            )));
        }
        let header = NamesHeader::read_from(&header_bytes[4..])?;

        let mut compressed = vec![0u8; header.compressed_size as usize];
        file.read_exact(&mut compressed)?;
        let payload = codec::decompress_payload(&compressed, header.uncompressed_size as usize)?;

        let entry_bytes = &payload[..header.name_buffer_offset as usize];
        let name_buffer =
            payload[header.name_buffer_offset as usize..header.path_buffer_offset as usize].to_vec();
        let path_buffer = payload[header.path_buffer_offset as usize..].to_vec();

        let mut entries = Vec::with_capacity(header.file_count as usize);
        for i in 0..header.file_count as usize {
            entries.push(NamesEntry::read_from(&entry_bytes[i * NamesEntry::LEN..])?);
        }

        let name_offsets = line_spans(&name_buffer, &entries, |e| e.name_off);
        let path_offsets = line_spans(&path_buffer, &entries, |e| e.path_off);

        Ok(Self {
            name_buffer,
            path_buffer,
            name_offsets,
            path_offsets,
        })
    }

    /// Builds the same layout in memory from an arbitrary line list,
    /// grounded in `filterutil.cpp`'s `filterBuffer`: the `filter` CLI
    /// command (unlike `files`) never touches a `.qgf` file, it splits
    /// piped stdin on `\n` into entries instead.
    fn from_paths(paths: &[String]) -> Self {
        let mut name_buffer = Vec::new();
        let mut path_buffer = Vec::new();
        let mut name_offsets = Vec::with_capacity(paths.len());
        let mut path_offsets = Vec::with_capacity(paths.len());
        for path in paths {
            let name = path.rsplit('/').next().unwrap_or(path.as_str());
            name_offsets.push((name_buffer.len() as u32, name.len() as u32));
            name_buffer.extend_from_slice(name.as_bytes());
            name_buffer.push(b'\n');
            path_offsets.push((path_buffer.len() as u32, path.len() as u32));
            path_buffer.extend_from_slice(path.as_bytes());
            path_buffer.push(b'\n');
        }
        Self {
            name_buffer,
            path_buffer,
            name_offsets,
            path_offsets,
        }
    }

    fn len(&self) -> usize {
        self.path_offsets.len()
    }

    fn name_of(&self, i: usize) -> &[u8] {
        let (off, len) = self.name_offsets[i];
        &self.name_buffer[off as usize..(off + len) as usize]
    }

    fn path_of(&self, i: usize) -> &[u8] {
        let (off, len) = self.path_offsets[i];
        &self.path_buffer[off as usize..(off + len) as usize]
    }

    fn path_str(&self, i: usize) -> String {
        String::from_utf8_lossy(self.path_of(i)).into_owned()
    }

    /// Owning entry for a match at `offset` into `buffer`: the last entry
    /// whose start is `<= offset`, via the same binary search `filter.cpp`
    /// runs over the entry table.
    fn owner_of(offsets: &[(u32, u32)], offset: u32) -> usize {
        let idx = offsets.partition_point(|&(start, _)| start <= offset);
        idx.saturating_sub(1)
    }
}

fn line_spans(buffer: &[u8], entries: &[NamesEntry], field: impl Fn(&NamesEntry) -> u32) -> Vec<(u32, u32)> {
    entries
        .iter()
        .map(|e| {
            let start = field(e) as usize;
            let len = buffer[start..]
                .iter()
                .position(|&b| b == b'\n')
                .unwrap_or(buffer.len() - start);
            (start as u32, len as u32)
        })
        .collect()
}

#[derive(Clone, Debug, Default)]
pub struct FilterOptions {
    pub mode: FilterMode,
    pub flags: SearchFlags,
    /// `0` means unlimited.
    pub limit: u32,
}

impl FilterOptions {
    fn limit(&self) -> usize {
        if self.limit == 0 {
            usize::MAX
        } else {
            self.limit as usize
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterResult {
    pub path: String,
    /// Byte ranges into `path` (or, for `Fuzzy`, single-character
    /// positions) to highlight, already requested by `HIGHLIGHT_MATCHES`.
    pub highlight_ranges: Vec<Range>,
}

/// The `files` command: dispatches against a project's on-disk `.qgf`.
pub fn run(qgf_path: impl AsRef<Path>, query: &str, opts: &FilterOptions) -> Result<Vec<FilterResult>> {
    let index = NamesIndex::load(qgf_path.as_ref())?;
    dispatch(&index, query, opts)
}

/// The standalone `filter` command: dispatches against an arbitrary line
/// list, normally piped stdin from `qgrep files` (`filterutil.cpp`'s
/// `filterBuffer`/`filterStdin`, never a `.qgf` file).
pub fn run_over_lines(paths: &[String], query: &str, opts: &FilterOptions) -> Result<Vec<FilterResult>> {
    let index = NamesIndex::from_paths(paths);
    dispatch(&index, query, opts)
}

fn dispatch(index: &NamesIndex, query: &str, opts: &FilterOptions) -> Result<Vec<FilterResult>> {
    if query.is_empty() {
        return Ok(dump_entries(index, opts.limit()));
    }
    match opts.mode {
        FilterMode::Name => filter_regex(index, query, opts, false),
        FilterMode::Path => filter_regex(index, query, opts, true),
        FilterMode::VisualAssist => filter_visual_assist(index, query, opts),
        FilterMode::Fuzzy => filter_fuzzy(&index, query, opts),
    }
}

fn dump_entries(index: &NamesIndex, limit: usize) -> Vec<FilterResult> {
    (0..index.len().min(limit))
        .map(|i| FilterResult {
            path: index.path_str(i),
            highlight_ranges: Vec::new(),
        })
        .collect()
}

fn filter_regex(
    index: &NamesIndex,
    query: &str,
    opts: &FilterOptions,
    over_paths: bool,
) -> Result<Vec<FilterResult>> {
    let re = QRegex::compile_path_filter(query)?;
    let (buffer, offsets) = if over_paths {
        (&index.path_buffer, &index.path_offsets)
    } else {
        (&index.name_buffer, &index.name_offsets)
    };

    let limit = opts.limit();
    let mut out = Vec::new();
    let mut last_owner: Option<usize> = None;
    let mut pos = 0usize;
    while let Some((start, end)) = re.find_at(buffer, pos) {
        let owner = NamesIndex::owner_of(offsets, start as u32);
        if last_owner != Some(owner) {
            last_owner = Some(owner);
            let (field_off, _) = offsets[owner];
            let ranges = if opts.flags.contains(SearchFlags::HIGHLIGHT_MATCHES) {
                vec![Range {
                    offset: start - field_off as usize,
                    len: end - start,
                }]
            } else {
                Vec::new()
            };
            out.push(FilterResult {
                path: index.path_str(owner),
                highlight_ranges: ranges,
            });
            if out.len() >= limit {
                break;
            }
        }
        pos = if end > start { end } else { end + 1 };
        if pos > buffer.len() {
            break;
        }
    }
    Ok(out)
}

struct Fragment {
    is_path: bool,
    text: String,
    re: QRegex,
}

fn filter_visual_assist(index: &NamesIndex, query: &str, opts: &FilterOptions) -> Result<Vec<FilterResult>> {
    let limit = opts.limit();
    let mut fragments = Vec::new();
    for word in query.split_whitespace() {
        let is_path = word.contains('/') || word.contains('\\');
        let re = QRegex::compile_path_filter(&regex::escape(word))?;
        fragments.push(Fragment {
            is_path,
            text: word.to_string(),
            re,
        });
    }
    if fragments.is_empty() {
        return Ok(dump_entries(index, limit));
    }

    // Path-fragments last, longer text first within a group: reject as much
    // as possible with the cheapest/most selective fragment first.
    fragments.sort_by(|a, b| {
        a.is_path
            .cmp(&b.is_path)
            .then(b.text.len().cmp(&a.text.len()))
    });

    let first = &fragments[0];
    let (buffer, offsets) = if first.is_path {
        (&index.path_buffer, &index.path_offsets)
    } else {
        (&index.name_buffer, &index.name_offsets)
    };
    let gather_limit = if fragments.len() == 1 { limit } else { usize::MAX };
    let mut candidates = Vec::new();
    let mut last_owner: Option<usize> = None;
    let mut pos = 0usize;
    while let Some((start, end)) = first.re.find_at(buffer, pos) {
        let owner = NamesIndex::owner_of(offsets, start as u32);
        if last_owner != Some(owner) {
            last_owner = Some(owner);
            candidates.push(owner);
            if candidates.len() >= gather_limit {
                break;
            }
        }
        pos = if end > start { end } else { end + 1 };
        if pos > buffer.len() {
            break;
        }
    }

    let mut out = Vec::new();
    'cand: for owner in candidates {
        let mut ranges = Vec::new();
        for frag in &fragments {
            let text = if frag.is_path {
                index.path_of(owner)
            } else {
                index.name_of(owner)
            };
            match frag.re.find_at(text, 0) {
                Some((s, e)) if opts.flags.contains(SearchFlags::HIGHLIGHT_MATCHES) => {
                    // Name-fragment offsets are relative to the name slice,
                    // which sits at the tail of the full path.
                    let base = if frag.is_path {
                        0
                    } else {
                        index.path_offsets[owner].1 as usize - text.len()
                    };
                    ranges.push(Range {
                        offset: base + s,
                        len: e - s,
                    });
                }
                Some(_) => {}
                None => continue 'cand,
            }
        }
        out.push(FilterResult {
            path: index.path_str(owner),
            highlight_ranges: ranges,
        });
        if out.len() >= limit {
            break;
        }
    }
    Ok(out)
}

fn filter_fuzzy(index: &NamesIndex, query: &str, opts: &FilterOptions) -> Result<Vec<FilterResult>> {
    let matcher = FuzzyMatcher::new(query);
    let limit = opts.limit();
    let mut ranked: Vec<(i64, usize)> = Vec::new();
    let mut perfect = 0usize;

    for i in 0..index.len() {
        let path = index.path_of(i);
        if !matcher.is_match(path) {
            continue;
        }
        let cost = matcher.rank(path, None);
        if cost == NO_MATCH {
            continue;
        }
        if cost == 0 {
            perfect += 1;
        }
        ranked.push((cost, i));
        if perfect >= limit {
            break;
        }
    }

    ranked.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
    ranked.truncate(limit);

    let mut out = Vec::with_capacity(ranked.len());
    for (_, i) in ranked {
        let ranges = if opts.flags.contains(SearchFlags::HIGHLIGHT_MATCHES) {
            let path = index.path_of(i);
            let mut positions = Vec::new();
            matcher.rank(path, Some(&mut positions));
            positions
                .into_iter()
                .map(|p| Range { offset: p, len: 1 })
                .collect()
        } else {
            Vec::new()
        };
        out.push(FilterResult {
            path: index.path_str(i),
            highlight_ranges: ranges,
        });
    }
    Ok(out)
}

/// Renders one result's path with its highlight ranges spliced in, for
/// callers that want the formatted line rather than the raw path + ranges.
pub fn format_result(result: &FilterResult) -> Vec<u8> {
    if result.highlight_ranges.is_empty() {
        return result.path.as_bytes().to_vec();
    }
    let mut out = Vec::new();
    highlight::splice(
        result.path.as_bytes(),
        result.highlight_ranges.clone(),
        b"\x1b[;01;31m",
        b"\x1b[0m",
        &mut out,
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(paths: &[&str]) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("project.qgd");
        let owned: Vec<String> = paths.iter().map(|s| s.to_string()).collect();
        build_names(&store_path, &owned).unwrap();
        let qgf = store_path.with_extension("qgf");
        (dir, qgf)
    }

    #[test]
    fn name_regex_finds_owning_path() {
        let (_dir, qgf) = build(&["src/main.rs", "src/lib.rs", "tests/smoke.rs"]);
        let opts = FilterOptions {
            mode: FilterMode::Name,
            flags: SearchFlags::empty(),
            limit: 0,
        };
        let results = run(&qgf, "lib", &opts).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "src/lib.rs");
    }

    #[test]
    fn path_regex_matches_directory_component() {
        let (_dir, qgf) = build(&["src/main.rs", "src/lib.rs", "tests/smoke.rs"]);
        let opts = FilterOptions {
            mode: FilterMode::Path,
            flags: SearchFlags::empty(),
            limit: 0,
        };
        let mut results = run(&qgf, "^src/", &opts).unwrap();
        results.sort_by(|a, b| a.path.cmp(&b.path));
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].path, "src/lib.rs");
        assert_eq!(results[1].path, "src/main.rs");
    }

    #[test]
    fn visual_assist_combines_name_and_path_fragments() {
        let (_dir, qgf) = build(&["src/main.rs", "src/lib.rs", "tests/main.rs"]);
        let opts = FilterOptions {
            mode: FilterMode::VisualAssist,
            flags: SearchFlags::empty(),
            limit: 0,
        };
        let results = run(&qgf, "main src/", &opts).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path, "src/main.rs");
    }

    #[test]
    fn fuzzy_ranks_contiguous_match_first() {
        let (_dir, qgf) = build(&["src/main.rs", "src/mmaaiinn.rs"]);
        let opts = FilterOptions {
            mode: FilterMode::Fuzzy,
            flags: SearchFlags::empty(),
            limit: 0,
        };
        let results = run(&qgf, "main", &opts).unwrap();
        assert_eq!(results[0].path, "src/main.rs");
    }

    #[test]
    fn empty_query_dumps_up_to_limit() {
        let (_dir, qgf) = build(&["a.rs", "b.rs", "c.rs"]);
        let opts = FilterOptions {
            mode: FilterMode::Name,
            flags: SearchFlags::empty(),
            limit: 2,
        };
        let results = run(&qgf, "", &opts).unwrap();
        assert_eq!(results.len(), 2);
    }
}
