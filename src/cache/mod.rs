//! Caches bridging virtual (post-deletion) and real (base dataset) row
//! offsets.

pub mod offset_cache;

pub use offset_cache::{OffsetEntry, OffsetTranslationCache};
