//! Per-chunk 4-gram Bloom index, ported from the double-hashing
//! scheme in `tribloom.hpp`: `h(i) = h1 + i*h2 mod bit_count`,
//! built here on `xxhash-rust`'s xxh32 instead of the bespoke integer mixers.

use xxhash_rust::xxh32::xxh32;

const SEED_1: u32 = 0x9747_b28c;
const SEED_2: u32 = 0x85eb_ca6b;

/// Target false-positive rate the builder sizes new indexes for.
const TARGET_FP_RATE: f64 = 0.01;

/// Folds a byte to lower-case ASCII; there is no Unicode-aware folding.
#[inline]
pub fn fold_byte(b: u8) -> u8 {
    b.to_ascii_lowercase()
}

/// Packs four case-folded bytes big-endian into the n-gram key.
#[inline]
pub fn ngram_key(window: [u8; 4]) -> u32 {
    u32::from_be_bytes(window.map(fold_byte))
}

/// Yields the 32-bit key of every overlapping 4-byte window of `content`.
pub fn ngrams(content: &[u8]) -> impl Iterator<Item = u32> + '_ {
    content
        .windows(4)
        .map(|w| ngram_key([w[0], w[1], w[2], w[3]]))
}

fn hash1(key: u32) -> u32 {
    xxh32(&key.to_le_bytes(), SEED_1)
}

fn hash2(key: u32) -> u32 {
    xxh32(&key.to_le_bytes(), SEED_2) | 1
}

/// Chooses `(bit_count, iterations)` for `distinct_ngrams` entries at
/// `TARGET_FP_RATE`, rounded up to a whole byte count for `bit_count`.
pub fn size_for(distinct_ngrams: usize) -> (u32, u32) {
    let n = distinct_ngrams.max(1) as f64;
    let m = (-(n * TARGET_FP_RATE.ln()) / std::f64::consts::LN_2.powi(2)).ceil();
    let m = m.max(64.0);
    let k = ((m / n) * std::f64::consts::LN_2).round().max(1.0) as u32;
    let bit_count = (m as u32 + 7) / 8 * 8;
    (bit_count, k.min(32))
}

/// A chunk's Bloom filter. `iterations` is persisted in the chunk header so
/// readers probe with the same `k` the writer used.
pub struct Bloom {
    bits: Vec<u8>,
    bit_count: u32,
    iterations: u32,
}

impl Bloom {
    pub fn new(bit_count: u32, iterations: u32) -> Self {
        let byte_len = (bit_count as usize + 7) / 8;
        Self {
            bits: vec![0u8; byte_len],
            bit_count,
            iterations,
        }
    }

    pub fn from_bytes(bits: Vec<u8>, iterations: u32) -> Self {
        let bit_count = (bits.len() * 8) as u32;
        Self {
            bits,
            bit_count,
            iterations,
        }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    fn probe_positions(&self, key: u32) -> impl Iterator<Item = u32> + '_ {
        let h1 = hash1(key);
        let h2 = hash2(key);
        let bit_count = self.bit_count;
        (0..self.iterations).map(move |i| (h1.wrapping_add(i.wrapping_mul(h2))) % bit_count)
    }

    fn set_bit(&mut self, pos: u32) {
        let byte = (pos / 8) as usize;
        let bit = (pos % 8) as u8;
        self.bits[byte] |= 1 << bit;
    }

    fn get_bit(&self, pos: u32) -> bool {
        let byte = (pos / 8) as usize;
        let bit = (pos % 8) as u8;
        self.bits[byte] & (1 << bit) != 0
    }

    pub fn insert(&mut self, key: u32) {
        for pos in self.probe_positions(key) {
            self.set_bit(pos);
        }
    }

    /// True means "maybe present"; false is a definite absence.
    pub fn might_contain(&self, key: u32) -> bool {
        self.probe_positions(key).all(|pos| self.get_bit(pos))
    }

    pub fn insert_content(&mut self, content: &[u8]) {
        for key in ngrams(content) {
            self.insert(key);
        }
    }

    /// A literal atom "matches" the chunk only if every one of its 4-grams
    /// is present. A literal shorter than 4 bytes has no
    /// 4-grams and trivially matches (cannot be used to reject).
    pub fn atom_matches(&self, atom: &[u8]) -> bool {
        ngrams(atom).all(|key| self.might_contain(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_inserted_ngrams() {
        let content = b"hello world";
        let (bits, k) = size_for(content.len());
        let mut bloom = Bloom::new(bits, k);
        bloom.insert_content(content);
        for key in ngrams(content) {
            assert!(bloom.might_contain(key));
        }
    }

    #[test]
    fn atom_match_is_case_insensitive() {
        let content = b"Hello World";
        let (bits, k) = size_for(content.len());
        let mut bloom = Bloom::new(bits, k);
        bloom.insert_content(content);
        assert!(bloom.atom_matches(b"HELLO"));
        assert!(bloom.atom_matches(b"world"));
    }

    #[test]
    fn short_atom_trivially_matches() {
        let bloom = Bloom::new(64, 3);
        assert!(bloom.atom_matches(b"ab"));
    }

    #[test]
    fn absent_ngram_usually_rejected() {
        let content = b"aaaaaaaaaa";
        let (bits, k) = size_for(content.len());
        let mut bloom = Bloom::new(bits, k);
        bloom.insert_content(content);
        assert!(!bloom.atom_matches(b"zzzzzzzzzzzzzzzz"));
    }
}
