use std::io::{BufRead, IsTerminal, Write};
use std::path::Path;
#[cfg(not(unix))]
use std::time::UNIX_EPOCH;

use qgrep_core::{ChangeList, QgrepError, Result, SearchFlags};
use walkdir::WalkDir;

use crate::config;
use crate::options;

fn mtime_of(meta: &std::fs::Metadata) -> u64 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        return meta.mtime() as u64;
    }
    #[cfg(not(unix))]
    {
        meta.modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Walks a project root and collects every regular file, sorted by path the
/// way the updater's merge cursor expects (`update.cpp`'s sorted file list).
fn collect_files(root: &Path) -> Result<Vec<qgrep_core::updater::FileInfo>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let meta = entry.metadata()?;
        files.push(qgrep_core::updater::FileInfo {
            path: entry.path().to_string_lossy().into_owned(),
            timestamp: mtime_of(&meta),
            size: meta.len(),
        });
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

fn rebuild_one(name: &str, fresh: bool) -> Result<()> {
    let root = config::root_of(name)?;
    let store_path = config::store_path(name)?;
    if fresh {
        let _ = std::fs::remove_file(&store_path);
        let _ = std::fs::remove_file(store_path.with_extension("qgc"));
    }
    let files = collect_files(&root)?;
    let stats = qgrep_core::update(&store_path, &files)?;
    let paths: Vec<String> = files.into_iter().map(|f| f.path).collect();
    qgrep_core::filter::build_names(&store_path, &paths)?;
    eprintln!(
        "{name}: {} added, {} changed, {} removed, {} chunks ({} reused)",
        stats.files_added, stats.files_changed, stats.files_removed, stats.chunks_written, stats.chunks_preserved
    );
    Ok(())
}

pub fn handle_init(name: &str, root: &Path) -> Result<()> {
    config::register(name, root)?;
    println!("Project {name} registered at {}, run `qgrep update {name}` to build", root.display());
    Ok(())
}

pub fn handle_build(projects: &str) -> Result<()> {
    for name in config::resolve_list(projects)? {
        rebuild_one(&name, true)?;
    }
    Ok(())
}

pub fn handle_update(projects: &str) -> Result<()> {
    for name in config::resolve_list(projects)? {
        rebuild_one(&name, false)?;
    }
    Ok(())
}

/// Splits `search`/`files` trailing args into option tokens plus a final
/// query, matching `processSearchCommand`'s `argv[argc-1]` convention.
fn split_query(rest: Vec<String>) -> (Vec<String>, String) {
    let mut rest = rest;
    match rest.pop() {
        Some(query) => (rest, query),
        None => (Vec::new(), String::new()),
    }
}

pub fn handle_search(projects: &str, rest: Vec<String>) -> Result<()> {
    let (tokens, query) = split_query(rest);
    let is_tty = std::io::stdout().is_terminal();
    let mut opts = options::resolve(&tokens, is_tty)?;
    if query.is_empty() {
        opts.flags.remove(SearchFlags::HIGHLIGHT_MATCHES);
    }
    let summary = opts.flags.contains(SearchFlags::SUMMARY);

    let names = config::resolve_list(projects)?;
    let start = std::time::Instant::now();
    let mut total = 0u64;
    let mut remaining = if opts.is_limit_unbounded() { u64::MAX } else { opts.line_limit as u64 };

    for name in names {
        if remaining == 0 {
            break;
        }
        let store_path = config::store_path(&name)?;
        let mut project_opts = opts.clone();
        project_opts.line_limit = if remaining == u64::MAX { 0 } else { remaining as u32 };
        let sink: Box<dyn Write + Send> = Box::new(std::io::stdout());
        let outcome = qgrep_core::search(&store_path, &query, &project_opts, sink)?;
        total += outcome.lines_emitted;
        if remaining != u64::MAX {
            remaining = remaining.saturating_sub(outcome.lines_emitted);
        }
    }

    if summary {
        let elapsed = start.elapsed().as_secs_f64();
        let suffix = if remaining == 0 && !opts.is_limit_unbounded() { "+" } else { "" };
        eprintln!("Search complete, found {total}{suffix} matches in {elapsed:.2} sec");
    }
    Ok(())
}

pub fn handle_files(projects: &str, rest: Vec<String>) -> Result<()> {
    let (tokens, query) = split_query(rest);
    let is_tty = std::io::stdout().is_terminal();
    let mut opts = options::resolve(&tokens, is_tty)?;
    if query.is_empty() {
        opts.flags.remove(SearchFlags::HIGHLIGHT_MATCHES);
    }

    let names = config::resolve_list(projects)?;
    let mut remaining: u64 = if opts.is_limit_unbounded() { u64::MAX } else { opts.line_limit as u64 };
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    for name in names {
        if remaining == 0 {
            break;
        }
        let qgf_path = config::store_path(&name)?.with_extension("qgf");
        let filter_opts = qgrep_core::FilterOptions {
            mode: opts.filter_mode,
            flags: opts.flags,
            limit: if remaining == u64::MAX { 0 } else { remaining as u32 },
        };
        let results = qgrep_core::filter::run(&qgf_path, &query, &filter_opts)?;
        if remaining != u64::MAX {
            remaining = remaining.saturating_sub(results.len() as u64);
        }
        for r in &results {
            out.write_all(&qgrep_core::filter::format_result(r))?;
            out.write_all(b"\n")?;
        }
    }
    Ok(())
}

/// The standalone `filter` command: reads newline-delimited paths from
/// stdin (typically piped from `qgrep files`) instead of a `.qgf`.
pub fn handle_filter(rest: Vec<String>) -> Result<()> {
    let (tokens, query) = split_query(rest);
    let is_tty = std::io::stdout().is_terminal();
    let mut opts = options::resolve(&tokens, is_tty)?;
    if query.is_empty() {
        opts.flags.remove(SearchFlags::HIGHLIGHT_MATCHES);
    }

    let stdin = std::io::stdin();
    let lines: Vec<String> = stdin.lock().lines().collect::<std::io::Result<_>>()?;

    let filter_opts = qgrep_core::FilterOptions {
        mode: opts.filter_mode,
        flags: opts.flags,
        limit: opts.line_limit,
    };
    let results = qgrep_core::filter::run_over_lines(&lines, &query, &filter_opts)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for r in &results {
        out.write_all(&qgrep_core::filter::format_result(r))?;
        out.write_all(b"\n")?;
    }
    Ok(())
}

pub fn handle_info(projects: &str) -> Result<()> {
    let names = config::resolve_list(projects)?;
    for (i, name) in names.iter().enumerate() {
        if i != 0 {
            println!();
        }
        println!("Project {name}:");
        let store_path = config::store_path(name)?;
        match qgrep_core::StoreReader::open(&store_path) {
            Ok(mut reader) => {
                let mut files = 0u64;
                let mut chunks = 0u64;
                let mut bytes = 0u64;
                let mut compressed = 0u64;
                while let Some(chunk) = reader.next_chunk()? {
                    files += chunk.header.file_count as u64;
                    chunks += 1;
                    bytes += chunk.header.uncompressed_size as u64;
                    compressed += chunk.header.compressed_size as u64;
                }
                println!("File parts: {files}");
                println!("Chunks: {chunks} ({bytes} bytes uncompressed, {compressed} bytes compressed)");
            }
            Err(e) => println!("(not yet built: {e})"),
        }
    }
    Ok(())
}

pub fn handle_watch(projects: &str) -> Result<()> {
    let _ = config::resolve_list(projects)?;
    Err(QgrepError::Io(std::io::Error::other(
        "watch: not implemented in this environment",
    )))
}

pub fn handle_change(projects: &str, files: Vec<String>) -> Result<()> {
    for name in config::resolve_list(projects)? {
        let qgc = config::store_path(&name)?.with_extension("qgc");
        let mut list = ChangeList::load_lenient(&qgc);
        list.add(files.iter().cloned());
        list.save(&qgc)?;
    }
    Ok(())
}

pub fn handle_interactive(projects: &str) -> Result<()> {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if let Some(rest) = line.strip_prefix("search ") {
            handle_search(projects, vec![rest.to_string()])?;
        } else if let Some(rest) = line.strip_prefix("files ") {
            handle_files(projects, vec![rest.to_string()])?;
        }
    }
    Ok(())
}

pub fn handle_projects() -> Result<()> {
    for name in config::load_all()?.keys() {
        println!("{name}");
    }
    Ok(())
}

pub fn handle_version() -> Result<()> {
    println!("{}", qgrep_core::VERSION);
    Ok(())
}

pub fn handle_help() -> Result<()> {
    use clap::CommandFactory;
    let _ = crate::presentation::cli::Cli::command().print_long_help();
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_query_takes_last_token_as_query() {
        let (tokens, query) = split_query(vec!["iC".to_string(), "foo".to_string()]);
        assert_eq!(tokens, vec!["iC".to_string()]);
        assert_eq!(query, "foo");
    }

    #[test]
    fn split_query_handles_empty() {
        let (tokens, query) = split_query(Vec::new());
        assert!(tokens.is_empty());
        assert!(query.is_empty());
    }
}
