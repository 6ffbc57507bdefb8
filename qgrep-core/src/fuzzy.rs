//! Fuzzy subsequence matcher with positional ranking, ported
//! from `fuzzymatch.cpp`'s memoized cost model: adjacent characters cost 0,
//! a non-adjacent step costs `10 + (gap - 2)`.

use std::collections::HashMap;

/// Sentinel for "no subsequence match", mirroring the original's `INT_MAX`.
pub const NO_MATCH: i64 = i64::MAX;

pub struct FuzzyMatcher {
    query_folded: Vec<u8>,
    acceptance: [bool; 256],
}

impl FuzzyMatcher {
    pub fn new(query: &str) -> Self {
        let query_folded: Vec<u8> = query.bytes().map(|b| b.to_ascii_lowercase()).collect();
        let mut acceptance = [false; 256];
        for &b in &query_folded {
            acceptance[b as usize] = true;
        }
        Self {
            query_folded,
            acceptance,
        }
    }

    /// Greedy subsequence test: does `text` contain every query character in
    /// order (not necessarily contiguous), case-folded?
    pub fn is_match(&self, text: &[u8]) -> bool {
        let mut qi = 0;
        for &b in text {
            if qi == self.query_folded.len() {
                break;
            }
            if b.to_ascii_lowercase() == self.query_folded[qi] {
                qi += 1;
            }
        }
        qi == self.query_folded.len()
    }

    /// Best-match cost, filling `positions` (if given) with the chosen text
    /// offset for each query character. Returns `NO_MATCH` if `text` does
    /// not contain the query as a subsequence.
    pub fn rank(&self, text: &[u8], positions: Option<&mut Vec<usize>>) -> i64 {
        if self.query_folded.is_empty() {
            if let Some(p) = positions {
                p.clear();
            }
            return 0;
        }
        if !self.is_match(text) {
            return NO_MATCH;
        }

        let mut candidates: HashMap<u8, Vec<usize>> = HashMap::new();
        for (i, &b) in text.iter().enumerate() {
            let folded = b.to_ascii_lowercase();
            if self.acceptance[folded as usize] {
                candidates.entry(folded).or_default().push(i);
            }
        }

        let mut memo: HashMap<(usize, usize), (i64, Option<usize>)> = HashMap::new();
        let cost = self.solve(0, 0, &candidates, &mut memo);

        if let Some(out) = positions {
            out.clear();
            let mut from = 0;
            for qi in 0..self.query_folded.len() {
                let (_, chosen) = memo[&(from, qi)];
                let pos = chosen.expect("match already verified");
                out.push(pos);
                from = pos + 1;
            }
        }

        cost
    }

    /// Minimal cost to match `query_folded[qi..]` using text positions
    /// `>= from`. Memoized by `(from, qi)`, matching the original's
    /// `(text_offset, query_offset)` memo key.
    fn solve(
        &self,
        from: usize,
        qi: usize,
        candidates: &HashMap<u8, Vec<usize>>,
        memo: &mut HashMap<(usize, usize), (i64, Option<usize>)>,
    ) -> i64 {
        if qi == self.query_folded.len() {
            return 0;
        }
        if let Some(&(cost, _)) = memo.get(&(from, qi)) {
            return cost;
        }

        let target = self.query_folded[qi];
        let mut best = NO_MATCH;
        let mut best_pos = None;

        if let Some(positions) = candidates.get(&target) {
            let start = positions.partition_point(|&p| p < from);
            for &p in &positions[start..] {
                let gap = (p - from + 1) as i64;
                let step_cost = if gap <= 1 { 0 } else { 10 + (gap - 2) };
                let rest = self.solve(p + 1, qi + 1, candidates, memo);
                if rest == NO_MATCH {
                    continue;
                }
                let total = step_cost + rest;
                if total < best {
                    best = total;
                    best_pos = Some(p);
                }
            }
        }

        memo.insert((from, qi), (best, best_pos));
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contiguous_substring_has_zero_cost() {
        let m = FuzzyMatcher::new("hello");
        assert_eq!(m.rank(b"say hello there", None), 0);
    }

    #[test]
    fn case_insensitive() {
        let m = FuzzyMatcher::new("HeLLo");
        assert!(m.is_match(b"hello world"));
    }

    #[test]
    fn non_adjacent_costs_positive_and_monotone() {
        let m = FuzzyMatcher::new("ac");
        let tight = m.rank(b"abc", None);
        let loose = m.rank(b"axxxc", None);
        assert!(tight > 0);
        assert!(loose > tight);
    }

    #[test]
    fn no_match_returns_sentinel() {
        let m = FuzzyMatcher::new("xyz");
        assert_eq!(m.rank(b"abc", None), NO_MATCH);
    }

    #[test]
    fn positions_are_filled_in_order() {
        let m = FuzzyMatcher::new("ab");
        let mut positions = Vec::new();
        m.rank(b"xaxb", Some(&mut positions));
        assert_eq!(positions, vec![1, 3]);
    }
}
