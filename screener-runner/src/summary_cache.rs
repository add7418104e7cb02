//! Summary cache: one EMA summary row per symbol, persisted as a CSV table.
//!
//! - Upsert replaces the whole row for a symbol (never two rows per symbol)
//! - Rows keep first-insertion order, which is the tie-break order for sorting
//! - Saves are atomic (write `.tmp`, rename) so readers see old or new, never partial

use screener_core::domain::SummaryRow;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("summary cache {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to write summary cache: {0}")]
    Write(String),
}

/// In-memory summary table keyed by symbol.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryCache {
    rows: Vec<SummaryRow>,
    index: HashMap<String, usize>,
}

impl SummaryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from rows; a later row for the same symbol replaces an earlier one in place.
    pub fn from_rows(rows: impl IntoIterator<Item = SummaryRow>) -> Self {
        let mut cache = Self::new();
        for row in rows {
            cache.upsert(row);
        }
        cache
    }

    /// Insert or replace the row for `row.symbol`.
    pub fn upsert(&mut self, row: SummaryRow) {
        match self.index.get(&row.symbol) {
            Some(&i) => self.rows[i] = row,
            None => {
                self.index.insert(row.symbol.clone(), self.rows.len());
                self.rows.push(row);
            }
        }
    }

    pub fn get(&self, symbol: &str) -> Option<&SummaryRow> {
        self.index.get(symbol).map(|&i| &self.rows[i])
    }

    /// Rows in first-insertion order.
    pub fn rows(&self) -> &[SummaryRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Load a persisted table. A missing file is an empty cache.
    pub fn load(path: &Path) -> Result<Self, CacheError> {
        if !path.is_file() {
            return Ok(Self::new());
        }

        let corrupt = |reason: String| CacheError::Corrupt {
            path: path.to_path_buf(),
            reason,
        };

        let mut reader = csv::Reader::from_path(path).map_err(|e| corrupt(e.to_string()))?;
        let mut rows = Vec::new();
        for record in reader.deserialize::<SummaryRow>() {
            rows.push(record.map_err(|e| corrupt(e.to_string()))?);
        }
        Ok(Self::from_rows(rows))
    }

    /// Load, degrading an unreadable or corrupt table to an empty cache.
    pub fn load_or_empty(path: &Path) -> Self {
        match Self::load(path) {
            Ok(cache) => cache,
            Err(e) => {
                tracing::warn!("{e}; treating summary cache as empty");
                Self::new()
            }
        }
    }

    /// Persist atomically.
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = path.with_extension("csv.tmp");
        {
            let mut writer =
                csv::Writer::from_path(&tmp_path).map_err(|e| CacheError::Write(e.to_string()))?;
            for row in &self.rows {
                writer
                    .serialize(row)
                    .map_err(|e| CacheError::Write(e.to_string()))?;
            }
            writer.flush()?;
        }

        fs::rename(&tmp_path, path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            CacheError::Io(e)
        })?;
        Ok(())
    }
}
