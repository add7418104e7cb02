//! Universe configuration: the tradable symbol list.
//!
//! The universe is a CSV export of an index's constituents (e.g. the NSE
//! "MW-NIFTY-TOTAL-MARKET" market-watch download). The symbol column is the
//! header named `SYMBOL` (any case) or the first column. The index's own row
//! is excluded.

use super::provider::{DataError, RawTable};
use std::collections::HashSet;
use std::path::Path;

/// Index name whose summary row appears in NSE market-watch exports.
pub const DEFAULT_INDEX_NAME: &str = "NIFTY TOTAL MARKET";

/// The ordered set of symbols to screen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Universe {
    symbols: Vec<String>,
}

impl Universe {
    pub fn new(symbols: Vec<String>) -> Self {
        let mut seen = HashSet::new();
        let symbols = symbols
            .into_iter()
            .filter(|s| !s.is_empty() && seen.insert(s.clone()))
            .collect();
        Self { symbols }
    }

    /// Load a universe from a CSV file.
    pub fn from_file(path: &Path, index_name: &str) -> Result<Self, DataError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_csv(&content, index_name)
    }

    /// Parse a universe from CSV text.
    pub fn from_csv(content: &str, index_name: &str) -> Result<Self, DataError> {
        let table = RawTable::from_csv_text(content)?;
        let col = table.column("symbol").unwrap_or(0);

        let symbols = table
            .rows
            .iter()
            .filter_map(|row| row.get(col))
            .map(|s| s.trim().trim_matches('"').trim().to_string())
            .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case(index_name))
            .collect();

        Ok(Self::new(symbols))
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.iter().any(|s| s == symbol)
    }

    /// Total number of symbols.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}
