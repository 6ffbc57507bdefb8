//! Hand-rolled scanner for qgrep's concatenated option-letter syntax
//! (`iVCL5fi<re>`), ported from `main.cpp`'s
//! `parseSearchOptions`/`getSearchOptions`. Not expressible as ordinary
//! `clap` flags, so it stays a small byte-at-a-time scanner rather than
//! reaching for a parser-combinator crate.

use qgrep_core::{FilterMode, QgrepError, QueryOptions, Result, SearchFlags};
use std::io;

/// Parses `$QGREP_OPTIONS` (if set) followed by every command-line option
/// token, in that order — later options win on overlapping bits.
pub fn resolve(tokens: &[String], is_tty: bool) -> Result<QueryOptions> {
    let mut flags = if is_tty {
        SearchFlags::HIGHLIGHT
    } else {
        SearchFlags::empty()
    };
    let mut limit: u32 = 0;
    let mut include = String::new();
    let mut exclude = String::new();
    let mut filter_mode = None;

    if let Ok(global) = std::env::var("QGREP_OPTIONS") {
        parse_one(&global, &mut flags, &mut limit, &mut include, &mut exclude, &mut filter_mode)?;
    }
    for tok in tokens {
        parse_one(tok, &mut flags, &mut limit, &mut include, &mut exclude, &mut filter_mode)?;
    }

    if flags.contains(SearchFlags::HIGHLIGHT) {
        flags |= SearchFlags::HIGHLIGHT_MATCHES;
    }

    Ok(QueryOptions {
        flags,
        line_limit: limit,
        include: (!include.is_empty()).then_some(include),
        exclude: (!exclude.is_empty()).then_some(exclude),
        filter_mode: filter_mode.unwrap_or(FilterMode::Path),
    })
}

fn parse_one(
    opts: &str,
    flags: &mut SearchFlags,
    limit: &mut u32,
    include: &mut String,
    exclude: &mut String,
    filter_mode: &mut Option<FilterMode>,
) -> Result<()> {
    let chars: Vec<char> = opts.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            'i' => {
                *flags |= SearchFlags::IGNORECASE;
                i += 1;
            }
            'l' => {
                *flags |= SearchFlags::LITERAL;
                i += 1;
            }
            'b' => {
                *flags |= SearchFlags::BRUTEFORCE;
                i += 1;
            }
            'V' => {
                *flags |= SearchFlags::VISUALSTUDIO;
                i += 1;
            }
            'C' => {
                *flags |= SearchFlags::COLUMNNUMBER;
                i += 1;
            }
            'S' => {
                *flags |= SearchFlags::SUMMARY;
                i += 1;
            }
            'H' => {
                i += 1;
                match chars.get(i) {
                    Some('D') => {
                        flags.remove(SearchFlags::HIGHLIGHT | SearchFlags::HIGHLIGHT_MATCHES);
                        i += 1;
                    }
                    Some('M') => {
                        *flags |= SearchFlags::HIGHLIGHT_MATCHES;
                        i += 1;
                    }
                    _ => *flags |= SearchFlags::HIGHLIGHT,
                }
            }
            'L' => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && chars[end].is_ascii_digit() {
                    end += 1;
                }
                let n: u32 = chars[start..end].iter().collect::<String>().parse().unwrap_or(0);
                *limit = n;
                i = end;
            }
            'f' => {
                i += 1;
                match chars.get(i) {
                    Some('i') => {
                        let (re, end) = scan_or_regex(&chars, i + 1);
                        push_or(include, &re);
                        i = end;
                    }
                    Some('e') => {
                        let (re, end) = scan_or_regex(&chars, i + 1);
                        push_or(exclude, &re);
                        i = end;
                    }
                    Some('n') => {
                        *filter_mode = Some(FilterMode::Name);
                        i += 1;
                    }
                    Some('p') => {
                        *filter_mode = Some(FilterMode::Path);
                        i += 1;
                    }
                    Some('s') => {
                        *filter_mode = Some(FilterMode::VisualAssist);
                        i += 1;
                    }
                    Some('f') => {
                        *filter_mode = Some(FilterMode::Fuzzy);
                        i += 1;
                    }
                    other => {
                        return Err(unknown(&format!("f{}", other.map(|c| c.to_string()).unwrap_or_default())));
                    }
                }
            }
            ' ' => i += 1,
            other => return Err(unknown(&other.to_string())),
        }
    }
    Ok(())
}

/// Scans from `start` to the next space or end of string, the regex for
/// one `fi`/`fe` occurrence.
fn scan_or_regex(chars: &[char], start: usize) -> (String, usize) {
    let mut end = start;
    while end < chars.len() && chars[end] != ' ' {
        end += 1;
    }
    (chars[start..end].iter().collect(), end)
}

/// Multiple `fi`/`fe` occurrences OR together, matching `parseOrRegex`.
fn push_or(acc: &mut String, fragment: &str) {
    if !acc.is_empty() {
        acc.push('|');
    }
    acc.push('(');
    acc.push_str(fragment);
    acc.push(')');
}

fn unknown(opt: &str) -> QgrepError {
    QgrepError::Io(io::Error::other(format!("unknown search option '{opt}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combines_letters_and_limit() {
        let opts = resolve(&["iCL100".to_string()], false).unwrap();
        assert!(opts.flags.contains(SearchFlags::IGNORECASE));
        assert!(opts.flags.contains(SearchFlags::COLUMNNUMBER));
        assert_eq!(opts.line_limit, 100);
    }

    #[test]
    fn include_exclude_regexes_or_together() {
        let opts = resolve(&["fi.*\\.rs".to_string(), "fi.*\\.toml".to_string()], false).unwrap();
        assert_eq!(opts.include.as_deref(), Some("(.*\\.rs)|(.*\\.toml)"));
    }

    #[test]
    fn highlight_implies_highlight_matches() {
        let opts = resolve(&["H".to_string()], false).unwrap();
        assert!(opts.flags.contains(SearchFlags::HIGHLIGHT));
        assert!(opts.flags.contains(SearchFlags::HIGHLIGHT_MATCHES));
    }

    #[test]
    fn highlight_disable_clears_both() {
        let opts = resolve(&["HD".to_string()], true).unwrap();
        assert!(!opts.flags.contains(SearchFlags::HIGHLIGHT));
        assert!(!opts.flags.contains(SearchFlags::HIGHLIGHT_MATCHES));
    }

    #[test]
    fn file_mode_letters_select_filter_mode() {
        let opts = resolve(&["fs".to_string()], false).unwrap();
        assert_eq!(opts.filter_mode, FilterMode::VisualAssist);
    }

    #[test]
    fn unknown_letter_is_an_error() {
        assert!(resolve(&["z".to_string()], false).is_err());
    }
}
