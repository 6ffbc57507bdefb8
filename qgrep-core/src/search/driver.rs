//! Search driver, wiring the store reader, the change list, the
//! n-gram prefilter, the work queue, and the ordered-output aggregator into
//! the pipeline `search.cpp::searchProject` runs: one producer thread reads
//! chunks and dispatches work, `N` workers decompress and scan, one writer
//! thread serializes results in chunk order.

use crate::changelist::{ChangeCursor, ChangeList};
use crate::codec;
use crate::error::Result;
use crate::highlight;
use crate::options::{QueryOptions, SearchFlags};
use crate::search::ordered_output::OrderedOutput;
use crate::search::regexec::{NgramRegex, QRegex};
use crate::search::workqueue::WorkQueue;
use crate::store::format::FileTableEntry;
use crate::store::reader::StoreReader;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

/// Default in-flight byte budget for the work queue.
const MAX_QUEUED_CHUNK_DATA: u64 = 256 * 1024 * 1024;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchOutcome {
    pub lines_emitted: u64,
}

pub fn search(
    store_path: impl AsRef<Path>,
    pattern: &str,
    opts: &QueryOptions,
    sink: Box<dyn Write + Send>,
) -> Result<SearchOutcome> {
    let store_path = store_path.as_ref();
    let flags = opts.flags;
    let ignorecase = flags.contains(SearchFlags::IGNORECASE);

    let regex = QRegex::compile(pattern, flags)?;
    let include_re = opts
        .include
        .as_deref()
        .map(QRegex::compile_path_filter)
        .transpose()?;
    let exclude_re = opts
        .exclude
        .as_deref()
        .map(QRegex::compile_path_filter)
        .transpose()?;
    let ngregex = if flags.contains(SearchFlags::BRUTEFORCE) {
        NgramRegex::build(None, ignorecase)
    } else {
        NgramRegex::build(Some(&regex), ignorecase)
    };

    let qgc = store_path.with_extension("qgc");
    let changes = ChangeList::load_lenient(&qgc);
    let changes = Arc::new(changes.entries().to_vec());

    let line_limit = if opts.is_limit_unbounded() {
        0
    } else {
        opts.line_limit as u64
    };
    let output = Arc::new(OrderedOutput::new(sink, line_limit));

    let mut reader = StoreReader::open(store_path)?;
    let queue = WorkQueue::new(WorkQueue::default_workers(), MAX_QUEUED_CHUNK_DATA)?;

    let regex = Arc::new(regex);
    let include_re = Arc::new(include_re);
    let exclude_re = Arc::new(exclude_re);

    let mut chunk_id: u64 = 0;
    let mut cursor = ChangeCursor::new(&changes[..]);

    while !output.is_limit_reached() {
        let Some(chunk) = reader.next_chunk()? else {
            break;
        };

        let last_path = parse_last_extra(chunk.extras.as_slice());
        let begin = cursor.position();
        if let Some(p) = &last_path {
            cursor.advance_while_le(p);
        }
        let end = cursor.position();
        let intersects_changes = end != begin;

        if !ngregex.is_empty() && !chunk.index.as_slice().is_empty() && !intersects_changes {
            let index = crate::ngram::bloom::Bloom::from_bytes(
                chunk.index.as_slice().to_vec(),
                chunk.header.index_hash_iterations,
            );
            if !ngregex.matches(&index) {
                chunk_id += 1;
                continue;
            }
        }

        let id = chunk_id;
        chunk_id += 1;

        let cost = (chunk.header.compressed_size + chunk.header.uncompressed_size) as u64;
        let regex = Arc::clone(&regex);
        let include_re = Arc::clone(&include_re);
        let exclude_re = Arc::clone(&exclude_re);
        let changes = Arc::clone(&changes);
        let output = Arc::clone(&output);
        let flags_copy = flags;

        queue.push(cost, move || {
            process_chunk(
                &regex,
                opt_ref(&include_re),
                opt_ref(&exclude_re),
                flags_copy,
                &changes[begin..end],
                chunk,
                id,
                &output,
            );
        });
    }

    queue.join();

    if !cursor.is_empty() {
        let mut buf = Vec::new();
        for path in cursor.remaining() {
            if output.is_limit_reached() {
                break;
            }
            process_changed_file(
                &regex,
                opt_ref(&include_re),
                opt_ref(&exclude_re),
                flags,
                path,
                &output,
                chunk_id,
                &mut buf,
            );
        }
        output.submit(chunk_id, buf);
    }

    let total = output.lines_emitted();
    Arc::try_unwrap(output)
        .unwrap_or_else(|arc| {
            // Only reachable if a worker panicked mid-flight and leaked a
            // clone; finishing anyway keeps the writer thread from hanging.
            drop(arc);
            panic!("ordered output still shared after queue join")
        })
        .finish();

    Ok(SearchOutcome { lines_emitted: total })
}

fn parse_last_extra(extras: &[u8]) -> Option<String> {
    extras
        .split(|&b| b == 0)
        .filter(|s| !s.is_empty())
        .last()
        .map(|s| String::from_utf8_lossy(s).into_owned())
}

/// `Arc<Option<QRegex>>` -> `Option<&QRegex>` without the deref-coercion
/// ambiguity between `Arc`'s and `Option`'s own `as_ref`.
fn opt_ref(o: &Option<QRegex>) -> Option<&QRegex> {
    o.as_ref()
}

fn ignore_path(path: &str, include_re: Option<&QRegex>, exclude_re: Option<&QRegex>) -> bool {
    if let Some(re) = include_re {
        if !re.is_match(path.as_bytes()) {
            return true;
        }
    }
    if let Some(re) = exclude_re {
        if re.is_match(path.as_bytes()) {
            return true;
        }
    }
    false
}

#[allow(clippy::too_many_arguments)]
fn process_chunk(
    regex: &QRegex,
    include_re: Option<&QRegex>,
    exclude_re: Option<&QRegex>,
    flags: SearchFlags,
    changes: &[String],
    chunk: crate::store::reader::ChunkRecord,
    chunk_id: u64,
    output: &OrderedOutput,
) {
    let payload = match codec::decompress_payload(chunk.payload.as_slice(), chunk.header.uncompressed_size as usize) {
        Ok(p) => p,
        Err(_) => {
            output.submit(chunk_id, Vec::new());
            return;
        }
    };

    let file_table_size = chunk.header.file_table_size as usize;
    let file_count = chunk.header.file_count as usize;
    let mut entries = Vec::with_capacity(file_count);
    for i in 0..file_count {
        let off = i * FileTableEntry::LEN;
        if off + FileTableEntry::LEN > file_table_size {
            break;
        }
        match FileTableEntry::read_from(&payload[off..]) {
            Ok(e) => entries.push(e),
            Err(_) => break,
        }
    }

    let mut buf = Vec::new();
    let mut change_idx = 0usize;

    for entry in &entries {
        if output.is_limit_reached() {
            break;
        }

        let name_start = entry.name_off as usize;
        let name_end = name_start + entry.name_len as usize;
        let path = match payload.get(name_start..name_end) {
            Some(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            None => continue,
        };

        while change_idx < changes.len() && changes[change_idx].as_str() < path.as_str() {
            process_changed_file(
                regex, include_re, exclude_re, flags, &changes[change_idx], output, chunk_id, &mut buf,
            );
            change_idx += 1;
        }

        if change_idx < changes.len() && changes[change_idx] == path {
            process_changed_file(
                regex, include_re, exclude_re, flags, &changes[change_idx], output, chunk_id, &mut buf,
            );
            change_idx += 1;
        } else if ignore_path(&path, include_re, exclude_re) {
            // skip
        } else {
            let data_start = entry.data_off as usize;
            let data_end = data_start + entry.data_size as usize;
            if let Some(data) = payload.get(data_start..data_end) {
                scan_file_data(
                    regex, flags, &path, data, entry.start_line, output, chunk_id, &mut buf,
                );
            }
        }
    }

    while change_idx < changes.len() {
        process_changed_file(
            regex, include_re, exclude_re, flags, &changes[change_idx], output, chunk_id, &mut buf,
        );
        change_idx += 1;
    }

    output.submit(chunk_id, buf);
}

#[allow(clippy::too_many_arguments)]
fn process_changed_file(
    regex: &QRegex,
    include_re: Option<&QRegex>,
    exclude_re: Option<&QRegex>,
    flags: SearchFlags,
    path: &str,
    output: &OrderedOutput,
    chunk_id: u64,
    buf: &mut Vec<u8>,
) {
    if ignore_path(path, include_re, exclude_re) {
        return;
    }
    let Ok(raw) = std::fs::read(path) else {
        return;
    };
    let decoded = crate::util::eol::decode_to_utf8(&raw);
    let normalized = crate::util::eol::normalize_eol(&decoded);
    scan_file_data(regex, flags, path, &normalized, 0, output, chunk_id, buf)
}

/// Scans `data` for matches, recording each one against `output`'s global
/// line counter as it is found (not in a batch at the end of the chunk) so
/// a concurrent `is_limit_reached()` check in another worker sees up-to-date
/// progress instead of only whatever the previous chunk emitted.
#[allow(clippy::too_many_arguments)]
fn scan_file_data(
    regex: &QRegex,
    flags: SearchFlags,
    path: &str,
    data: &[u8],
    start_line: u32,
    output: &OrderedOutput,
    _chunk_id: u64,
    buf: &mut Vec<u8>,
) {
    let mut line = start_line;
    let mut pos = 0usize;

    while pos <= data.len() {
        if output.is_limit_reached() {
            break;
        }

        let Some((mstart, mend)) = regex.find_at(data, pos) else {
            break;
        };
        // Discard a zero-length match right at the end: `.*` would
        // otherwise produce a spurious extra line per file part.
        if mstart == data.len() {
            break;
        }

        let preceding = &data[pos..mstart];
        line += 1 + crate::util::eol::newline_count(preceding);

        let line_start = data[..mstart]
            .iter()
            .rposition(|&b| b == b'\n')
            .map(|p| p + 1)
            .unwrap_or(0);
        let line_end = data[mend..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|p| mend + p)
            .unwrap_or(data.len());

        format_match(
            buf,
            path,
            line,
            (mstart - line_start) as u32 + 1,
            &data[line_start..line_end],
            regex,
            mstart - line_start,
            mend - mstart,
            flags,
        );
        output.record_lines(1);

        if line_end >= data.len() {
            break;
        }
        pos = line_end + 1;
    }
}

#[allow(clippy::too_many_arguments)]
fn format_match(
    out: &mut Vec<u8>,
    path: &str,
    line: u32,
    column: u32,
    line_text: &[u8],
    regex: &QRegex,
    match_offset: usize,
    match_len: usize,
    flags: SearchFlags,
) {
    let visual_studio = flags.contains(SearchFlags::VISUALSTUDIO);
    let highlight_on = flags.contains(SearchFlags::HIGHLIGHT);
    let highlight_matches = flags.contains(SearchFlags::HIGHLIGHT_MATCHES);
    let column_on = flags.contains(SearchFlags::COLUMNNUMBER);

    const ANSI_MATCH: &[u8] = b"\x1b[;01;31m";
    const ANSI_PATH: &[u8] = b"\x1b[;0;35m";
    const ANSI_NUMBER: &[u8] = b"\x1b[;0;32m";
    const ANSI_SEP: &[u8] = b"\x1b[;0;36m";
    const ANSI_END: &[u8] = b"\x1b[0m";

    if highlight_on {
        out.extend_from_slice(ANSI_PATH);
    }
    if visual_studio {
        for b in path.bytes() {
            out.push(if b == b'/' { b'\\' } else { b });
        }
    } else {
        out.extend_from_slice(path.as_bytes());
    }
    if highlight_on {
        out.extend_from_slice(ANSI_END);
    }

    let sep_open: &[u8] = if visual_studio { b"(" } else { b":" };
    let sep_mid: &[u8] = if visual_studio { b"," } else { b":" };
    let sep_close: &[u8] = if visual_studio { b"):" } else { b":" };

    if highlight_on {
        out.extend_from_slice(ANSI_SEP);
    }
    out.extend_from_slice(sep_open);
    if highlight_on {
        out.extend_from_slice(ANSI_NUMBER);
    }
    out.extend_from_slice(line.to_string().as_bytes());
    if column_on {
        if highlight_on {
            out.extend_from_slice(ANSI_SEP);
        }
        out.extend_from_slice(sep_mid);
        if highlight_on {
            out.extend_from_slice(ANSI_NUMBER);
        }
        out.extend_from_slice(column.to_string().as_bytes());
    }
    if highlight_on {
        out.extend_from_slice(ANSI_SEP);
    }
    out.extend_from_slice(sep_close);
    if highlight_on {
        out.extend_from_slice(ANSI_END);
    }

    if highlight_matches {
        let mut ranges = vec![highlight::Range {
            offset: match_offset,
            len: match_len,
        }];
        collect_trailing_matches(regex, line_text, match_offset + match_len, &mut ranges);
        highlight::splice(line_text, ranges, ANSI_MATCH, ANSI_END, out);
    } else {
        out.extend_from_slice(line_text);
    }
    out.push(b'\n');
}

/// Finds every further non-overlapping match in `line` starting at
/// `from`, for `HIGHLIGHT_MATCHES` (ported loosely from `highlightRegex`,
/// whose body wasn't present in the retrieval pack — this reproduces its
/// documented contract: all matches on the line, not just the first).
fn collect_trailing_matches(regex: &QRegex, line: &[u8], from: usize, out: &mut Vec<highlight::Range>) {
    let mut pos = from;
    while pos <= line.len() {
        let Some((mstart, mend)) = regex.find_at(line, pos) else {
            break;
        };
        if mstart == line.len() {
            break;
        }
        out.push(highlight::Range {
            offset: mstart,
            len: mend - mstart,
        });
        pos = if mend > mstart { mend } else { mstart + 1 };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;

    fn build_store(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("project.qgd");
        let mut builder = Builder::create(&path).unwrap();
        builder.add_file("a.txt", 0, b"hello world\nfoo needle bar\n").unwrap();
        builder.add_file("b.txt", 0, b"nothing here\n").unwrap();
        builder.commit().unwrap();
        path
    }

    #[derive(Clone, Default)]
    struct VecSink(Arc<std::sync::Mutex<Vec<u8>>>);
    impl Write for VecSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn finds_matches_across_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let store = build_store(dir.path());
        let sink = VecSink::default();
        let captured = sink.0.clone();

        let opts = QueryOptions::default();
        let outcome = search(&store, "needle", &opts, Box::new(sink)).unwrap();
        assert_eq!(outcome.lines_emitted, 1);
        let text = String::from_utf8(captured.lock().unwrap().clone()).unwrap();
        assert!(text.contains("a.txt:2:5:foo needle bar"));
    }

    #[test]
    fn no_match_emits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = build_store(dir.path());
        let sink = VecSink::default();
        let opts = QueryOptions::default();
        let outcome = search(&store, "zzzznotfound", &opts, Box::new(sink)).unwrap();
        assert_eq!(outcome.lines_emitted, 0);
    }

    #[test]
    fn line_limit_caps_matches_within_a_single_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("project.qgd");
        let mut builder = Builder::create(&path).unwrap();
        // Small enough to stay in one chunk, large enough that an
        // end-of-chunk-only limit check would blow past the limit.
        let content = "foo\n".repeat(2000);
        builder.add_file("big.txt", 0, content.as_bytes()).unwrap();
        let stats = builder.commit().unwrap();
        assert_eq!(stats.chunks_written, 1);

        let sink = VecSink::default();
        let captured = sink.0.clone();
        let opts = QueryOptions {
            line_limit: 5,
            ..QueryOptions::default()
        };
        let outcome = search(&path, "foo", &opts, Box::new(sink)).unwrap();
        assert_eq!(outcome.lines_emitted, 5);
        let text = String::from_utf8(captured.lock().unwrap().clone()).unwrap();
        assert_eq!(text.lines().count(), 5);
    }
}
