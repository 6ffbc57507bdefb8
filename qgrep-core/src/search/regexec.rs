//! Content regex compilation and the n-gram prefilter, ported from
//! `regex.cpp`'s `RE2Regex` / `search.cpp`'s `NgramRegex`. RE2's
//! own required-literal decomposition (`Regex::prefilterPrepare` /
//! `prefilterMatch`, a boolean formula over which atoms matched) is
//! replaced with `regex-syntax`'s literal extractor: it yields a flat set
//! of alternative literals any match must contain, so the prefilter
//! degrades from "evaluate a formula" to "any one of these literals'
//! n-grams must be present" — still sound (no false negatives), just less
//! precise than RE2's full AND/OR tree when the pattern mixes required and
//! optional literals.

use crate::error::{QgrepError, Result};
use crate::ngram::bloom::Bloom;
use crate::options::SearchFlags;
use regex::bytes::{Regex, RegexBuilder};

/// A compiled content regex plus whatever case-folding the flags asked for.
pub struct QRegex {
    re: Regex,
}

impl QRegex {
    pub fn compile(pattern: &str, flags: SearchFlags) -> Result<Self> {
        let literal = flags.contains(SearchFlags::LITERAL);
        let ignorecase = flags.contains(SearchFlags::IGNORECASE);
        let pattern_str = if literal {
            regex::escape(pattern)
        } else {
            pattern.to_string()
        };
        let re = RegexBuilder::new(&pattern_str)
            .case_insensitive(ignorecase)
            .build()
            .map_err(QgrepError::RegexParse)?;
        Ok(Self { re })
    }

    /// Plain include/exclude path filters: always case-insensitive, never
    /// literal (the `fi`/`fe` options take a regex, not a fixed string).
    pub fn compile_path_filter(pattern: &str) -> Result<Self> {
        let re = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(QgrepError::RegexParse)?;
        Ok(Self { re })
    }

    pub fn is_match(&self, haystack: &[u8]) -> bool {
        self.re.is_match(haystack)
    }

    /// Finds the next match starting at or after `start`, returning
    /// `(match_start, match_end)` in absolute offsets.
    pub fn find_at(&self, haystack: &[u8], start: usize) -> Option<(usize, usize)> {
        self.re.find_at(haystack, start).map(|m| (m.start(), m.end()))
    }

    fn required_literals(&self, ignorecase: bool) -> Vec<Vec<u8>> {
        const MAX_ATOMS: usize = 16;

        let mut parser_builder = regex_syntax::ParserBuilder::new();
        parser_builder.case_insensitive(ignorecase);
        let hir = match parser_builder.build().parse(self.re.as_str()) {
            Ok(hir) => hir,
            Err(_) => return Vec::new(),
        };

        let seq = regex_syntax::hir::literal::Extractor::new().extract(&hir);
        match seq.literals() {
            Some(lits) if !lits.is_empty() && lits.len() <= MAX_ATOMS => {
                lits.iter().map(|l| l.as_bytes().to_vec()).collect()
            }
            // Infinite, empty, or too sprawling a set: no filtering gain,
            // fall back to "always scan" which is trivially sound.
            _ => Vec::new(),
        }
    }
}

/// `ignorecase`/`literal` feed into both the scan
/// regex and the literal extraction used for the prefilter.
pub fn regex_flags_ignorecase(flags: SearchFlags) -> bool {
    flags.contains(SearchFlags::IGNORECASE)
}

/// The query's n-gram prefilter: one alternative per required literal.
pub struct NgramRegex {
    atoms: Vec<Vec<u8>>,
}

impl NgramRegex {
    /// `None` means brute-force: every chunk is scanned regardless of its
    /// index.
    pub fn build(re: Option<&QRegex>, ignorecase: bool) -> Self {
        let atoms = match re {
            Some(re) => re.required_literals(ignorecase),
            None => Vec::new(),
        };
        Self { atoms }
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    /// Returns true unless every atom is provably absent from the chunk's
    /// index, in which case the chunk cannot contain a match.
    pub fn matches(&self, index: &Bloom) -> bool {
        if self.atoms.is_empty() {
            return true;
        }
        self.atoms.iter().any(|atom| index.atom_matches(atom))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_case_insensitive() {
        let re = QRegex::compile("HELLO", SearchFlags::IGNORECASE).unwrap();
        assert!(re.is_match(b"say hello there"));
    }

    #[test]
    fn literal_mode_escapes_metacharacters() {
        let re = QRegex::compile("a.b", SearchFlags::LITERAL).unwrap();
        assert!(re.is_match(b"a.b"));
        assert!(!re.is_match(b"axb"));
    }

    #[test]
    fn ngram_regex_is_empty_for_wildcard() {
        let re = QRegex::compile(".*", SearchFlags::empty()).unwrap();
        let ngre = NgramRegex::build(Some(&re), false);
        assert!(ngre.is_empty());
    }

    #[test]
    fn ngram_regex_rejects_chunk_missing_literal() {
        let re = QRegex::compile("needle_pattern", SearchFlags::empty()).unwrap();
        let ngre = NgramRegex::build(Some(&re), false);
        assert!(!ngre.is_empty());

        let mut present = Bloom::new(2048, 4);
        present.insert_content(b"a needle_pattern in a haystack");
        assert!(ngre.matches(&present));

        let mut absent = Bloom::new(2048, 4);
        absent.insert_content(b"nothing interesting here");
        assert!(!ngre.matches(&absent));
    }

    #[test]
    fn brute_force_has_no_atoms() {
        let ngre = NgramRegex::build(None, false);
        assert!(ngre.is_empty());
    }
}
