//! File-backed base dataset reader.

use crate::core::{Triple, TriplePattern};
use crate::error::{Error, Result};
use crate::parsing::parse_triple_line;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Base dataset reader over a newline-delimited triple file.
///
/// The file is loaded once at open. Opening never fails: a missing or
/// unreadable file produces a reader whose every search reports the
/// load error, so the engine can start up and recover on the next
/// successful reload instead of refusing to boot.
pub struct FileBaseReader {
    path: PathBuf,
    rows: std::result::Result<Vec<Triple>, String>,
}

impl FileBaseReader {
    pub fn open(path: &Path) -> Self {
        let rows = match std::fs::read_to_string(path) {
            Ok(contents) => {
                let mut rows = Vec::new();
                for line in contents.lines() {
                    let line = line.trim();
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    match parse_triple_line(line) {
                        Ok(triple) => rows.push(triple),
                        Err(e) => {
                            tracing::warn!("skipping malformed base dataset line: {}", e)
                        }
                    }
                }
                tracing::info!("loaded base dataset {} ({} rows)", path.display(), rows.len());
                Ok(rows)
            }
            Err(e) => {
                tracing::error!("cannot load base dataset {}: {}", path.display(), e);
                Err(format!("{}: {}", path.display(), e))
            }
        };
        Self { path: path.to_path_buf(), rows }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.rows.as_ref().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl super::BaseReader for FileBaseReader {
    async fn search(
        &self,
        pattern: &TriplePattern,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<(Vec<Triple>, usize)> {
        let rows = self
            .rows
            .as_ref()
            .map_err(|e| Error::BaseReader(e.clone()))?;

        let mut total = 0usize;
        let mut page = Vec::new();
        for row in rows {
            if !pattern.matches(row) {
                continue;
            }
            if total >= offset && limit.map_or(true, |l| page.len() < l) {
                page.push(row.clone());
            }
            total += 1;
        }
        Ok((page, total))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
