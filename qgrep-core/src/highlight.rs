//! Highlight range merge-and-splice, modeled on
//! `highlight.cpp`: ranges merge when they touch or overlap
//! (`next.offset <= last.offset + last.len`), taking the outer union.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Range {
    pub offset: usize,
    pub len: usize,
}

fn merge(mut ranges: Vec<Range>) -> Vec<Range> {
    ranges.sort_by_key(|r| r.offset);
    let mut merged: Vec<Range> = Vec::with_capacity(ranges.len());
    for r in ranges {
        match merged.last_mut() {
            Some(last) if r.offset <= last.offset + last.len => {
                let end = (last.offset + last.len).max(r.offset + r.len);
                last.len = end - last.offset;
            }
            _ => merged.push(r),
        }
    }
    merged
}

/// Splices `line` with `begin`/`end` markers wrapping each merged range,
/// appending the result to `out`.
pub fn splice(line: &[u8], ranges: Vec<Range>, begin: &[u8], end: &[u8], out: &mut Vec<u8>) {
    let merged = merge(ranges);
    let mut cursor = 0;
    for r in merged {
        let start = r.offset.min(line.len());
        let stop = (r.offset + r.len).min(line.len());
        if start < cursor {
            continue;
        }
        out.extend_from_slice(&line[cursor..start]);
        out.extend_from_slice(begin);
        out.extend_from_slice(&line[start..stop]);
        out.extend_from_slice(end);
        cursor = stop;
    }
    out.extend_from_slice(&line[cursor..]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_overlapping_ranges() {
        let ranges = vec![
            Range { offset: 0, len: 3 },
            Range { offset: 2, len: 3 },
        ];
        assert_eq!(merge(ranges), vec![Range { offset: 0, len: 5 }]);
    }

    #[test]
    fn merges_touching_ranges() {
        let ranges = vec![
            Range { offset: 0, len: 2 },
            Range { offset: 2, len: 2 },
        ];
        assert_eq!(merge(ranges), vec![Range { offset: 0, len: 4 }]);
    }

    #[test]
    fn leaves_disjoint_ranges_separate() {
        let ranges = vec![
            Range { offset: 0, len: 1 },
            Range { offset: 5, len: 1 },
        ];
        assert_eq!(merge(ranges), ranges);
    }

    #[test]
    fn splices_markers_around_matches() {
        let mut out = Vec::new();
        splice(
            b"hello world",
            vec![Range { offset: 6, len: 5 }],
            b"[",
            b"]",
            &mut out,
        );
        assert_eq!(out, b"hello [world]");
    }
}
