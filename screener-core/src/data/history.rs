//! Flat-file price history store.
//!
//! Layout: `{data_dir}/{SYMBOL}.csv`, header `date,close`, oldest first.
//!
//! - Atomic writes (write to .tmp, rename into place)
//! - Appends merge and re-sort (append order is not assumed sorted)

use super::normalize::{merge_bars, sort_and_dedupe};
use super::provider::DataError;
use crate::domain::Bar;
use std::fs;
use std::path::{Path, PathBuf};

/// Per-symbol CSV history files under one directory.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    data_dir: PathBuf,
}

impl HistoryStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Root directory of the store.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path of the history file for a symbol. Path separators in symbols become `_`.
    pub fn path(&self, symbol: &str) -> PathBuf {
        let file: String = symbol
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        self.data_dir.join(format!("{file}.csv"))
    }

    pub fn has_history(&self, symbol: &str) -> bool {
        self.path(symbol).is_file()
    }

    /// Load a symbol's history, oldest first. `None` when nothing is stored.
    pub fn load(&self, symbol: &str) -> Result<Option<Vec<Bar>>, DataError> {
        let path = self.path(symbol);
        if !path.is_file() {
            return Ok(None);
        }

        let mut reader = csv::Reader::from_path(&path)?;
        let mut bars = Vec::new();
        for record in reader.deserialize::<Bar>() {
            bars.push(record?);
        }
        Ok(Some(sort_and_dedupe(bars)))
    }

    /// Replace a symbol's history. Input is normalized before writing.
    pub fn write(&self, symbol: &str, bars: &[Bar]) -> Result<Vec<Bar>, DataError> {
        if bars.is_empty() {
            return Err(DataError::NoUsableHistory(format!(
                "refusing to store empty history for {symbol}"
            )));
        }

        fs::create_dir_all(&self.data_dir)?;
        let bars = sort_and_dedupe(bars.to_vec());

        let path = self.path(symbol);
        let tmp_path = path.with_extension("csv.tmp");
        {
            let mut writer = csv::Writer::from_path(&tmp_path)?;
            for bar in &bars {
                writer.serialize(bar)?;
            }
            writer.flush()?;
        }

        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            DataError::Io(e)
        })?;

        Ok(bars)
    }

    /// Merge new bars into the stored history and write it back.
    ///
    /// A new bar replaces a stored bar with the same date.
    pub fn append(&self, symbol: &str, new_bars: &[Bar]) -> Result<Vec<Bar>, DataError> {
        let existing = self.load(symbol)?.unwrap_or_default();
        let merged = merge_bars(&existing, new_bars);
        self.write(symbol, &merged)
    }

    /// Symbols with a history file, sorted.
    pub fn symbols(&self) -> Result<Vec<String>, DataError> {
        if !self.data_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut symbols = Vec::new();
        for entry in fs::read_dir(&self.data_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                symbols.push(stem.to_string());
            }
        }
        symbols.sort();
        Ok(symbols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 8, day).unwrap()
    }

    fn sample_bars() -> Vec<Bar> {
        vec![Bar::new(d(12), 100.0), Bar::new(d(13), 101.5)]
    }

    #[test]
    fn write_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path());

        store.write("ABC", &sample_bars()).unwrap();
        let loaded = store.load("ABC").unwrap().unwrap();

        assert_eq!(loaded, sample_bars());
        assert!(store.has_history("ABC"));
        assert!(!dir.path().join("ABC.csv.tmp").exists());
    }

    #[test]
    fn load_nonexistent_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path());
        assert!(store.load("NOPE").unwrap().is_none());
        assert!(!store.has_history("NOPE"));
    }

    #[test]
    fn append_out_of_order_resorts() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path());

        store.write("ABC", &sample_bars()).unwrap();
        let updated = store
            .append("ABC", &[Bar::new(d(14), 103.0), Bar::new(d(11), 99.0)])
            .unwrap();

        let dates: Vec<_> = updated.iter().map(|b| b.date).collect();
        assert_eq!(dates, vec![d(11), d(12), d(13), d(14)]);
        assert_eq!(store.load("ABC").unwrap().unwrap(), updated);
    }

    #[test]
    fn append_same_day_replaces_close() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path());

        store.write("ABC", &sample_bars()).unwrap();
        let updated = store.append("ABC", &[Bar::new(d(13), 105.0)]).unwrap();
        assert_eq!(updated.len(), 2);
        assert_eq!(updated[1].close, 105.0);
    }

    #[test]
    fn empty_history_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path());
        assert!(matches!(
            store.write("ABC", &[]),
            Err(DataError::NoUsableHistory(_))
        ));
    }

    #[test]
    fn symbols_lists_csv_files_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path());
        store.write("XYZ", &sample_bars()).unwrap();
        store.write("ABC", &sample_bars()).unwrap();
        fs::write(dir.path().join("manifest.json"), "{}").unwrap();

        assert_eq!(store.symbols().unwrap(), vec!["ABC", "XYZ"]);
    }

    #[test]
    fn symbols_with_slashes_get_safe_file_names() {
        let store = HistoryStore::new("/tmp/x");
        assert_eq!(store.path("A/B"), PathBuf::from("/tmp/x/A_B.csv"));
    }
}
