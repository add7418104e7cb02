//! Run manifest: explicit per-symbol backfill status.
//!
//! Persisted at `{data_dir}/manifest.json`. The backfill consults it instead
//! of probing history files symbol by symbol; it is seeded from the store once
//! for symbols it has never seen.

use chrono::NaiveDateTime;
use screener_core::data::HistoryStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolStatus {
    Missing,
    Backfilled,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub status: SymbolStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    symbols: BTreeMap<String, ManifestEntry>,
}

impl RunManifest {
    /// Load from disk; a missing or unreadable manifest starts empty.
    pub fn load(path: &Path) -> Self {
        let Ok(text) = fs::read_to_string(path) else {
            return Self::default();
        };
        serde_json::from_str(&text).unwrap_or_else(|e| {
            tracing::warn!("ignoring unreadable manifest {}: {e}", path.display());
            Self::default()
        })
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)
    }

    /// Status of a symbol; unknown symbols are `Missing`.
    pub fn status(&self, symbol: &str) -> SymbolStatus {
        self.symbols
            .get(symbol)
            .map_or(SymbolStatus::Missing, |e| e.status)
    }

    pub fn entry(&self, symbol: &str) -> Option<&ManifestEntry> {
        self.symbols.get(symbol)
    }

    /// Record symbols the manifest has never seen, as `Backfilled` when the
    /// store already holds their history and `Missing` otherwise.
    pub fn seed_from_store<'a>(
        &mut self,
        symbols: impl IntoIterator<Item = &'a String>,
        store: &HistoryStore,
        at: NaiveDateTime,
    ) {
        for symbol in symbols {
            if self.symbols.contains_key(symbol) {
                continue;
            }
            let status = if store.has_history(symbol) {
                SymbolStatus::Backfilled
            } else {
                SymbolStatus::Missing
            };
            self.set(symbol, status, None, at);
        }
    }

    pub fn mark_backfilled(&mut self, symbol: &str, at: NaiveDateTime) {
        self.set(symbol, SymbolStatus::Backfilled, None, at);
    }

    pub fn mark_failed(&mut self, symbol: &str, reason: impl Into<String>, at: NaiveDateTime) {
        self.set(symbol, SymbolStatus::Failed, Some(reason.into()), at);
    }

    fn set(&mut self, symbol: &str, status: SymbolStatus, reason: Option<String>, at: NaiveDateTime) {
        self.symbols.insert(
            symbol.to_string(),
            ManifestEntry {
                status,
                reason,
                updated_at: at,
            },
        );
    }

    /// Symbols from `universe` that still need a download, in universe order.
    pub fn pending(&self, universe: &[String]) -> Vec<String> {
        universe
            .iter()
            .filter(|s| self.status(s) != SymbolStatus::Backfilled)
            .cloned()
            .collect()
    }

    pub fn count(&self, status: SymbolStatus) -> usize {
        self.symbols.values().filter(|e| e.status == status).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use screener_core::domain::Bar;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 8, 13)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    #[test]
    fn seeds_from_existing_history_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path());
        store
            .write("ABC", &[Bar::new(at().date(), 10.0)])
            .unwrap();

        let universe = vec!["ABC".to_string(), "XYZ".to_string()];
        let mut manifest = RunManifest::default();
        manifest.seed_from_store(&universe, &store, at());

        assert_eq!(manifest.status("ABC"), SymbolStatus::Backfilled);
        assert_eq!(manifest.status("XYZ"), SymbolStatus::Missing);
        assert_eq!(manifest.pending(&universe), vec!["XYZ".to_string()]);

        // A recorded failure is not overwritten by re-seeding.
        manifest.mark_failed("XYZ", "HTTP 503", at());
        manifest.seed_from_store(&universe, &store, at());
        assert_eq!(manifest.status("XYZ"), SymbolStatus::Failed);
        assert_eq!(manifest.pending(&universe), vec!["XYZ".to_string()]);
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");

        let mut manifest = RunManifest::default();
        manifest.mark_backfilled("ABC", at());
        manifest.mark_failed("XYZ", "no usable history", at());
        manifest.save(&path).unwrap();

        let loaded = RunManifest::load(&path);
        assert_eq!(loaded, manifest);
        assert_eq!(loaded.count(SymbolStatus::Failed), 1);
        assert_eq!(
            loaded.entry("XYZ").unwrap().reason.as_deref(),
            Some("no usable history")
        );
    }
}
