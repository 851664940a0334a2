//! Contracts for the base dataset reader and the overlay triple
//! stores, plus the bundled file-backed implementations.
//!
//! The engine only ever talks to these traits. The bundled
//! implementations keep rows in memory with a newline-delimited triple
//! file behind them, which is enough for moderate datasets and for the
//! overlays; a compressed-index reader or an external key-value store
//! can be swapped in behind the same contracts.

pub mod base;
pub mod file_store;

use crate::core::{Triple, TriplePattern};
use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub use base::FileBaseReader;
pub use file_store::{FileStoreFactory, FileTripleStore};

/// Read-only access to the large base dataset.
#[async_trait]
pub trait BaseReader: Send + Sync {
    /// Pattern search with pagination. Returns the matching rows and an
    /// estimated total match count.
    async fn search(
        &self,
        pattern: &TriplePattern,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<(Vec<Triple>, usize)>;

    async fn close(&self) -> Result<()>;
}

/// A small mutable triple store, used for the added and removed
/// overlays.
#[async_trait]
pub trait TripleStore: Send + Sync {
    async fn get(
        &self,
        pattern: &TriplePattern,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<Triple>>;

    async fn put(&self, rows: &[Triple]) -> Result<()>;

    async fn del(&self, row: &Triple) -> Result<()>;

    async fn approximate_size(&self, pattern: &TriplePattern) -> Result<usize>;

    /// Snapshot of every stored row, used to repopulate the removal
    /// membership filter at startup and after swaps.
    async fn stream(&self) -> Result<Vec<Triple>>;

    async fn close(&self) -> Result<()>;

    /// Storage location, recorded in the workspace pointer files.
    fn location(&self) -> &Path;
}

/// Creates and reopens overlay stores at given storage locations.
///
/// The apply protocol never mutates live stores in place; it builds
/// replacements at fresh locations through this factory and swaps them
/// in.
#[async_trait]
pub trait OverlayStoreFactory: Send + Sync {
    async fn create(&self, location: &Path) -> Result<Box<dyn TripleStore>>;

    async fn open(&self, location: &Path) -> Result<Box<dyn TripleStore>>;

    async fn open_or_create(&self, location: &Path) -> Result<Box<dyn TripleStore>> {
        if location.exists() {
            self.open(location).await
        } else {
            self.create(location).await
        }
    }
}

/// Owned path helper for pointer files.
pub fn read_pointer(path: &Path) -> Option<PathBuf> {
    std::fs::read_to_string(path)
        .ok()
        .map(|contents| PathBuf::from(contents.trim()))
        .filter(|p| !p.as_os_str().is_empty())
}

pub fn write_pointer(path: &Path, target: &Path) -> Result<()> {
    std::fs::write(path, target.display().to_string())?;
    Ok(())
}
