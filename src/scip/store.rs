//! Process-wide cache of parsed semantic indices
//!
//! Entries are keyed by index file path. Each key owns a `OnceCell` latch:
//! concurrent lookups against a cold key wait on the same parse instead of
//! parsing the file twice. A failed parse leaves nothing behind, so the next
//! request retries from disk.
//!
//! # Locking
//!
//! The table lock is only held to fetch or insert a latch, never across I/O
//! or decoding.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::OnceCell;
use parking_lot::RwLock;

use super::index::{LookupKind, SemanticIndex, SymbolLocation};
use crate::error::{CodeBrowserError, Result};

type Latch = Arc<OnceCell<Arc<SemanticIndex>>>;

/// Cache of parsed SCIP indices
#[derive(Clone, Default)]
pub struct SemanticIndexStore {
    entries: Arc<RwLock<HashMap<PathBuf, Latch>>>,
}

impl SemanticIndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an index is cached or present on disk
    pub fn has_index(&self, index_path: &Path) -> bool {
        self.is_cached(index_path) || index_path.is_file()
    }

    pub fn is_cached(&self, index_path: &Path) -> bool {
        self.entries
            .read()
            .get(index_path)
            .is_some_and(|latch| latch.get().is_some())
    }

    /// Number of fully parsed indices held in memory
    pub fn cached_count(&self) -> usize {
        self.entries
            .read()
            .values()
            .filter(|latch| latch.get().is_some())
            .count()
    }

    /// Drop the cached index for a path; returns whether one was held
    ///
    /// Lookups already holding the old index finish against it.
    pub fn invalidate(&self, index_path: &Path) -> bool {
        let removed = self.entries.write().remove(index_path);
        let had_index = removed.is_some_and(|latch| latch.get().is_some());
        if had_index {
            tracing::info!("Invalidated semantic index {}", index_path.display());
        }
        had_index
    }

    /// Load an index, parsing it at most once per key
    ///
    /// Blocks the calling thread while parsing; async callers should use
    /// [`SemanticIndexStore::load`].
    pub fn load_blocking(&self, index_path: &Path) -> Result<Arc<SemanticIndex>> {
        let latch = self.latch_for(index_path);
        let result = latch
            .get_or_try_init(|| read_index(index_path).map(Arc::new))
            .cloned();

        if result.is_err() {
            let mut entries = self.entries.write();
            if let Some(current) = entries.get(index_path) {
                if Arc::ptr_eq(current, &latch) && current.get().is_none() {
                    entries.remove(index_path);
                }
            }
        }
        result
    }

    /// Load an index on the blocking pool
    ///
    /// The parse runs to completion even if the caller is dropped, so a
    /// cancelled request still warms the cache for the next one.
    pub async fn load(&self, index_path: &Path) -> Result<Arc<SemanticIndex>> {
        if let Some(index) = self.cached(index_path) {
            return Ok(index);
        }
        let store = self.clone();
        let path = index_path.to_path_buf();
        tokio::task::spawn_blocking(move || store.load_blocking(&path))
            .await
            .map_err(|e| CodeBrowserError::Io(io::Error::other(e.to_string())))?
    }

    /// Symbol under a 0-based cursor in `file_path`
    pub async fn find_symbol_at(
        &self,
        index_path: &Path,
        file_path: &str,
        line: i32,
        column: i32,
    ) -> Result<Option<String>> {
        let index = self.load(index_path).await?;
        let symbol = index.find_symbol_at(file_path, line, column)?;
        Ok(symbol.map(str::to_string))
    }

    /// All occurrences of `symbol` with the role selected by `kind`
    pub async fn occurrences_of(
        &self,
        index_path: &Path,
        symbol: &str,
        kind: LookupKind,
    ) -> Result<Vec<SymbolLocation>> {
        let index = self.load(index_path).await?;
        Ok(index.occurrences_of(symbol, kind))
    }

    fn cached(&self, index_path: &Path) -> Option<Arc<SemanticIndex>> {
        self.entries
            .read()
            .get(index_path)
            .and_then(|latch| latch.get().cloned())
    }

    fn latch_for(&self, index_path: &Path) -> Latch {
        if let Some(latch) = self.entries.read().get(index_path) {
            return Arc::clone(latch);
        }
        let mut entries = self.entries.write();
        Arc::clone(entries.entry(index_path.to_path_buf()).or_default())
    }
}

fn read_index(path: &Path) -> Result<SemanticIndex> {
    let start = Instant::now();
    let bytes = fs::read(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => CodeBrowserError::NoIndex {
            path: path.to_path_buf(),
        },
        _ => CodeBrowserError::Io(e),
    })?;

    let index = SemanticIndex::decode(&bytes).map_err(|e| CodeBrowserError::IndexCorrupt {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    tracing::info!(
        "Loaded semantic index {} ({} documents, {} occurrences, {} bytes, tool: {}) in {:?}",
        path.display(),
        index.document_count(),
        index.occurrence_count(),
        bytes.len(),
        index.tool().unwrap_or("unknown"),
        start.elapsed()
    );
    Ok(index)
}
