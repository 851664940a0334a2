//! Per-pattern cache of virtual-to-real offset correspondences.
//!
//! The base reader is expensive to rescan from offset zero for every
//! deep page. Once a query has walked past the removed rows up to some
//! virtual position, the real base offset it ended up at is remembered
//! here, so a later page for the same pattern resumes near the right
//! real offset instead of rescanning from the start.

use rand::Rng;
use std::collections::HashMap;

/// A known correspondence between a virtual offset (position in the
/// deletion-filtered sequence) and a real offset (position in the base
/// dataset).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OffsetEntry {
    pub virtual_offset: usize,
    pub real_offset: usize,
}

/// Offsets known for one query pattern, as two parallel sequences
/// strictly increasing by virtual offset. The anchor entry (0, 0) is
/// always present.
struct PatternOffsets {
    virtuals: Vec<usize>,
    reals: Vec<usize>,
}

impl PatternOffsets {
    fn anchor() -> Self {
        Self { virtuals: vec![0], reals: vec![0] }
    }
}

/// Memory-bounded cache of offset translations per query pattern.
///
/// Both bounds are enforced with uniform random eviction: patterns
/// beyond `query_limit` evict a random pattern, entries beyond
/// `offset_limit` evict a random non-anchor entry of that pattern. The
/// cache is approximate; a miss only costs a longer walk in the base
/// reader.
pub struct OffsetTranslationCache {
    query_limit: usize,
    offset_limit: usize,
    patterns: HashMap<String, PatternOffsets>,
    keys: Vec<String>,
}

impl OffsetTranslationCache {
    pub fn new(query_limit: usize, offset_limit: usize) -> Self {
        Self {
            query_limit: query_limit.max(1),
            offset_limit: offset_limit.max(2),
            patterns: HashMap::new(),
            keys: Vec::new(),
        }
    }

    /// Drop every cached translation. Called whenever the overlays
    /// mutate, since real offsets computed before a mutation may no
    /// longer skip the right number of removed rows.
    pub fn flush(&mut self) {
        self.patterns.clear();
        self.keys.clear();
    }

    pub fn tracked_patterns(&self) -> usize {
        self.keys.len()
    }

    /// Number of entries cached for one pattern, anchor included.
    pub fn entries_for(&self, key: &str) -> usize {
        self.patterns.get(key).map_or(0, |p| p.virtuals.len())
    }

    /// The entry with the largest virtual offset not exceeding
    /// `virtual_offset`. Never fails: an unknown pattern is initialized
    /// with the anchor entry first, which matches every offset.
    pub fn get_closest_lower(&mut self, key: &str, virtual_offset: usize) -> OffsetEntry {
        self.ensure_pattern(key);
        let pattern = &self.patterns[key];
        let position = pattern.virtuals.partition_point(|v| *v <= virtual_offset);
        // The anchor guarantees position >= 1
        let index = position.saturating_sub(1);
        OffsetEntry {
            virtual_offset: pattern.virtuals[index],
            real_offset: pattern.reals[index],
        }
    }

    /// Record that virtual offset `virtual_offset` corresponds to real
    /// offset `real_offset` for this pattern.
    ///
    /// Inserts in sorted position. An entry with an equal virtual or an
    /// equal real offset is updated in place, keeping the larger real
    /// offset; a later, more advanced correspondence supersedes a stale
    /// shorter one.
    pub fn add(&mut self, key: &str, virtual_offset: usize, real_offset: usize) {
        self.ensure_pattern(key);
        self.evict_offset(key);
        let pattern = self.patterns.get_mut(key).expect("pattern was just ensured");

        let position = pattern.virtuals.partition_point(|v| *v < virtual_offset);
        if position < pattern.virtuals.len() && pattern.virtuals[position] == virtual_offset {
            pattern.reals[position] = pattern.reals[position].max(real_offset);
            return;
        }
        // Both sequences increase together, so an equal real offset can
        // be found the same way.
        let real_position = pattern.reals.partition_point(|r| *r < real_offset);
        if real_position < pattern.reals.len() && pattern.reals[real_position] == real_offset {
            pattern.virtuals[real_position] = pattern.virtuals[real_position].max(virtual_offset);
            return;
        }

        pattern.virtuals.insert(position, virtual_offset);
        pattern.reals.insert(position, real_offset);
    }

    fn ensure_pattern(&mut self, key: &str) {
        if self.patterns.contains_key(key) {
            return;
        }
        self.evict_query();
        self.patterns.insert(key.to_string(), PatternOffsets::anchor());
        self.keys.push(key.to_string());
    }

    /// Evict one pattern at random once the pattern bound is reached.
    fn evict_query(&mut self) {
        if self.keys.len() < self.query_limit {
            return;
        }
        let target = rand::thread_rng().gen_range(0..self.keys.len());
        let key = self.keys.swap_remove(target);
        self.patterns.remove(&key);
    }

    /// Evict one offset entry at random (never the anchor) once the
    /// per-pattern bound is reached.
    fn evict_offset(&mut self, key: &str) {
        let pattern = self.patterns.get_mut(key).expect("pattern was just ensured");
        if pattern.virtuals.len() < self.offset_limit {
            return;
        }
        let target = rand::thread_rng().gen_range(1..pattern.virtuals.len());
        pattern.virtuals.remove(target);
        pattern.reals.remove(target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_pattern_returns_anchor() {
        let mut cache = OffsetTranslationCache::new(150, 500);
        let entry = cache.get_closest_lower("q", 350);
        assert_eq!(entry, OffsetEntry { virtual_offset: 0, real_offset: 0 });
    }

    #[test]
    fn test_returns_closest_lower_entry() {
        let mut cache = OffsetTranslationCache::new(150, 500);
        cache.add("q", 400, 403);
        cache.add("q", 300, 301);
        let entry = cache.get_closest_lower("q", 350);
        assert_eq!(entry, OffsetEntry { virtual_offset: 300, real_offset: 301 });
    }

    #[test]
    fn test_equal_virtual_keeps_larger_real() {
        let mut cache = OffsetTranslationCache::new(150, 500);
        cache.add("q", 100, 110);
        cache.add("q", 100, 105);
        let entry = cache.get_closest_lower("q", 100);
        assert_eq!(entry.real_offset, 110);
        assert_eq!(cache.entries_for("q"), 2);
    }

    #[test]
    fn test_query_limit_bounds_tracked_patterns() {
        let mut cache = OffsetTranslationCache::new(3, 500);
        cache.add("q1", 10, 10);
        cache.add("q2", 10, 11);
        cache.add("q3", 10, 15);
        assert_eq!(cache.tracked_patterns(), 3);
        cache.add("q4", 10, 20);
        assert_eq!(cache.tracked_patterns(), 3);
    }

    #[test]
    fn test_offset_limit_bounds_entries() {
        let mut cache = OffsetTranslationCache::new(150, 5);
        for i in 1..20usize {
            cache.add("q", i * 10, i * 10 + i);
        }
        assert_eq!(cache.entries_for("q"), 5);
        // The anchor survives every eviction
        assert_eq!(cache.get_closest_lower("q", 0).real_offset, 0);
    }

    #[test]
    fn test_flush_returns_to_empty_state() {
        let mut cache = OffsetTranslationCache::new(150, 500);
        cache.add("q", 300, 400);
        assert_eq!(cache.get_closest_lower("q", 500).virtual_offset, 300);
        cache.flush();
        assert_eq!(cache.tracked_patterns(), 0);
        let entry = cache.get_closest_lower("q", 500);
        assert_eq!(entry, OffsetEntry { virtual_offset: 0, real_offset: 0 });
    }
}
