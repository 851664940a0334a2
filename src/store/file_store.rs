//! File-backed overlay store.

use crate::core::{Triple, TriplePattern};
use crate::error::{Error, Result};
use crate::parsing::parse_triple_line;
use async_trait::async_trait;
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

const DATA_FILE: &str = "triples.nt";

/// An overlay store backed by a directory holding one newline-delimited
/// triple file. Rows are kept in memory in insertion order and written
/// through on every mutation.
pub struct FileTripleStore {
    location: PathBuf,
    inner: RwLock<StoreRows>,
}

struct StoreRows {
    rows: Vec<Triple>,
    ids: HashSet<String>,
}

impl FileTripleStore {
    /// Create an empty store at `location`.
    pub fn create(location: &Path) -> Result<Self> {
        fs::create_dir_all(location)?;
        fs::write(location.join(DATA_FILE), "")?;
        Ok(Self {
            location: location.to_path_buf(),
            inner: RwLock::new(StoreRows { rows: Vec::new(), ids: HashSet::new() }),
        })
    }

    /// Open an existing store, loading its rows into memory.
    pub fn open(location: &Path) -> Result<Self> {
        let contents = fs::read_to_string(location.join(DATA_FILE))?;
        let mut rows = Vec::new();
        let mut ids = HashSet::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match parse_triple_line(line) {
                Ok(triple) => {
                    if ids.insert(triple.id()) {
                        rows.push(triple);
                    }
                }
                Err(e) => tracing::warn!("skipping corrupt store line: {}", e),
            }
        }
        Ok(Self {
            location: location.to_path_buf(),
            inner: RwLock::new(StoreRows { rows, ids }),
        })
    }

    fn rewrite_file(&self, rows: &[Triple]) -> Result<()> {
        let mut file = fs::File::create(self.location.join(DATA_FILE))?;
        for row in rows {
            writeln!(file, "{}", row.to_line())?;
        }
        Ok(())
    }

    fn append_file(&self, rows: &[Triple]) -> Result<()> {
        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(self.location.join(DATA_FILE))?;
        for row in rows {
            writeln!(file, "{}", row.to_line())?;
        }
        Ok(())
    }

    fn lock_poisoned() -> Error {
        Error::Store("store lock poisoned".to_string())
    }
}

#[async_trait]
impl super::TripleStore for FileTripleStore {
    async fn get(
        &self,
        pattern: &TriplePattern,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<Triple>> {
        let inner = self.inner.read().map_err(|_| Self::lock_poisoned())?;
        let matches = inner.rows.iter().filter(|t| pattern.matches(t)).skip(offset);
        Ok(match limit {
            Some(limit) => matches.take(limit).cloned().collect(),
            None => matches.cloned().collect(),
        })
    }

    async fn put(&self, rows: &[Triple]) -> Result<()> {
        let mut inner = self.inner.write().map_err(|_| Self::lock_poisoned())?;
        let mut fresh = Vec::new();
        for row in rows {
            if inner.ids.insert(row.id()) {
                inner.rows.push(row.clone());
                fresh.push(row.clone());
            }
        }
        drop(inner);
        self.append_file(&fresh)
    }

    async fn del(&self, row: &Triple) -> Result<()> {
        let mut inner = self.inner.write().map_err(|_| Self::lock_poisoned())?;
        if !inner.ids.remove(&row.id()) {
            return Ok(());
        }
        inner.rows.retain(|t| t != row);
        let rows = inner.rows.clone();
        drop(inner);
        self.rewrite_file(&rows)
    }

    async fn approximate_size(&self, pattern: &TriplePattern) -> Result<usize> {
        let inner = self.inner.read().map_err(|_| Self::lock_poisoned())?;
        Ok(inner.rows.iter().filter(|t| pattern.matches(t)).count())
    }

    async fn stream(&self) -> Result<Vec<Triple>> {
        let inner = self.inner.read().map_err(|_| Self::lock_poisoned())?;
        Ok(inner.rows.clone())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn location(&self) -> &Path {
        &self.location
    }
}

/// Factory producing [`FileTripleStore`] instances.
pub struct FileStoreFactory;

#[async_trait]
impl super::OverlayStoreFactory for FileStoreFactory {
    async fn create(&self, location: &Path) -> Result<Box<dyn super::TripleStore>> {
        Ok(Box::new(FileTripleStore::create(location)?))
    }

    async fn open(&self, location: &Path) -> Result<Box<dyn super::TripleStore>> {
        Ok(Box::new(FileTripleStore::open(location)?))
    }
}
