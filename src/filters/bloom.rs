//! Bloom filter over removed-triple identities.
//!
//! Checking "was this base row removed" against the removed overlay
//! store costs a keyed lookup per row. Since removals are rare, almost
//! every check answers no; this filter gives that answer in O(1) with
//! no false negatives, so the store is only consulted for the few rows
//! the filter cannot rule out. Stale positives after a swap are
//! harmless: the authoritative store lookup still decides.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Fixed-size bit array with k indexes per key derived by double
/// hashing.
///
/// The filter only ever grows; removing an identity is not supported.
/// It is rebuilt from scratch whenever the removed overlay store is
/// replaced.
#[derive(Clone, Debug)]
pub struct RemovalMembershipFilter {
    bits: Vec<u64>,
    size_bits: usize,
    hash_count: u32,
}

impl RemovalMembershipFilter {
    /// Size the filter for `expected_items` keys at the target
    /// `error_rate`, using the standard closed forms
    /// `m = -n ln p / (ln 2)^2` and `k = (m / n) ln 2`.
    pub fn new(expected_items: usize, error_rate: f64) -> Self {
        let n = expected_items.max(1) as f64;
        let p = error_rate.clamp(1e-9, 0.5);
        let m = (-(n * p.ln()) / (std::f64::consts::LN_2 * std::f64::consts::LN_2)).ceil();
        let k = ((m / n) * std::f64::consts::LN_2).round().max(1.0);
        Self::with_parameters(m as usize, k as u32)
    }

    pub fn with_parameters(size_bits: usize, hash_count: u32) -> Self {
        let size_bits = size_bits.max(64);
        Self {
            bits: vec![0u64; (size_bits + 63) / 64],
            size_bits,
            hash_count: hash_count.max(1),
        }
    }

    pub fn size_bits(&self) -> usize {
        self.size_bits
    }

    pub fn hash_count(&self) -> u32 {
        self.hash_count
    }

    pub fn add(&mut self, id: &str) {
        let (h1, h2) = Self::hash_pair(id);
        for i in 0..self.hash_count {
            let bit = self.index(h1, h2, i);
            self.bits[bit / 64] |= 1u64 << (bit % 64);
        }
    }

    /// May return true for identities never added (bounded false
    /// positive rate); never returns false for an added identity.
    pub fn may_contain(&self, id: &str) -> bool {
        let (h1, h2) = Self::hash_pair(id);
        (0..self.hash_count).all(|i| {
            let bit = self.index(h1, h2, i);
            self.bits[bit / 64] & (1u64 << (bit % 64)) != 0
        })
    }

    fn index(&self, h1: u64, h2: u64, round: u32) -> usize {
        let combined = h1.wrapping_add((round as u64).wrapping_mul(h2));
        (combined % self.size_bits as u64) as usize
    }

    fn hash_pair(id: &str) -> (u64, u64) {
        let mut first = DefaultHasher::new();
        id.hash(&mut first);
        let h1 = first.finish();

        let mut second = DefaultHasher::new();
        // Distinct seed so the two hashes are independent
        0x9e3779b97f4a7c15u64.hash(&mut second);
        id.hash(&mut second);
        let h2 = second.finish() | 1;
        (h1, h2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_false_negatives() {
        let mut filter = RemovalMembershipFilter::new(1000, 0.02);
        for i in 0..1000 {
            filter.add(&format!("s{} p{} o{}", i, i, i));
        }
        for i in 0..1000 {
            assert!(filter.may_contain(&format!("s{} p{} o{}", i, i, i)));
        }
    }

    #[test]
    fn test_sizing_formulas() {
        let filter = RemovalMembershipFilter::new(500_000, 0.02);
        // m = -n ln(0.02) / (ln 2)^2 is about 4.07 million bits
        assert!(filter.size_bits() > 4_000_000);
        assert!(filter.size_bits() < 4_200_000);
        assert!(filter.hash_count() >= 5 && filter.hash_count() <= 6);
    }
}
