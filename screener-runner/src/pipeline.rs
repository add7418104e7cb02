//! Update pipeline: backfill and daily incremental update.
//!
//! Backfill:
//! 1. Seed the run manifest from the history store (first run only)
//! 2. Fetch every `Missing`/`Failed` symbol over the lookback window on a
//!    worker pool, one provider session per worker, writing each history
//! 3. Record outcomes in the manifest (calling thread only)
//! 4. Recompute EMAs for every universe symbol with history, upsert, save
//! 5. Write the checkpoint
//!
//! Daily update:
//! 1. Gate on "new exchange day since the checkpoint" and "past the cutoff"
//! 2. Fetch the market snapshot once
//! 3. Append today's bar for every snapshot symbol the manifest marks
//!    backfilled, recompute, upsert
//! 4. Save the cache and the checkpoint
//!
//! One symbol's failure never aborts the batch.

use chrono::{NaiveDate, NaiveDateTime, Utc};
use rayon::prelude::*;
use screener_core::data::{
    date_chunks, download_history, DataError, DownloadProgress, HistoryStore, MarketDataProvider,
    MarketSnapshot, Universe,
};
use screener_core::domain::{Bar, SummaryRow};
use serde::Serialize;
use thiserror::Error;

use crate::checkpoint::{Checkpoint, Phase, RunCounts};
use crate::config::{ConfigError, ScreenerConfig};
use crate::lock::RunLock;
use crate::manifest::{RunManifest, SymbolStatus};
use crate::summary_cache::{CacheError, SummaryCache};

/// Errors that abort a pipeline run as a whole.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] DataError),
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("another pipeline run holds {0}")]
    Busy(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Outcome of a backfill run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackfillReport {
    pub total_symbols: usize,
    /// Symbols already backfilled before this run.
    pub existing: usize,
    pub downloaded: usize,
    pub failed: Vec<FailedSymbol>,
    /// Rows upserted into the summary cache.
    pub summarized: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedSymbol {
    pub symbol: String,
    pub reason: String,
}

/// Outcome of a daily update request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DailyUpdateOutcome {
    Updated(DailyUpdateReport),
    NotNeeded { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyUpdateReport {
    pub as_of: NaiveDate,
    pub updated: usize,
    /// Universe symbols absent from the snapshot or not yet backfilled.
    pub skipped: usize,
    pub failed: Vec<FailedSymbol>,
}

/// The update pipeline over one configured data and cache directory.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: ScreenerConfig,
    store: HistoryStore,
}

impl Pipeline {
    pub fn new(config: ScreenerConfig) -> Self {
        let store = HistoryStore::new(&config.paths.data_dir);
        Self { config, store }
    }

    pub fn config(&self) -> &ScreenerConfig {
        &self.config
    }

    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    pub fn load_universe(&self) -> Result<Universe, PipelineError> {
        let universe =
            Universe::from_file(&self.config.paths.universe_file, &self.config.pipeline.index_name)?;
        tracing::info!(
            "loaded {} symbols from {}",
            universe.len(),
            self.config.paths.universe_file.display()
        );
        Ok(universe)
    }

    /// Current wall-clock time at the exchange.
    pub fn exchange_now(&self) -> Result<NaiveDateTime, PipelineError> {
        let offset = self.config.pipeline.exchange_offset()?;
        Ok(Utc::now().with_timezone(&offset).naive_local())
    }

    /// Current summary table; a missing or corrupt file reads as empty.
    pub fn summary(&self) -> SummaryCache {
        SummaryCache::load_or_empty(&self.config.summary_path())
    }

    fn lock(&self) -> Result<RunLock, PipelineError> {
        let path = self.config.lock_path();
        RunLock::try_acquire(&path)?
            .ok_or_else(|| PipelineError::Busy(path.display().to_string()))
    }

    // ── Backfill ─────────────────────────────────────────────────────

    /// Download missing histories and rebuild the summary cache.
    ///
    /// `providers` holds one session per worker; the fetch stage runs on a
    /// pool of that many threads. Re-running after completion changes nothing.
    pub fn run_backfill(
        &self,
        providers: &mut [Box<dyn MarketDataProvider>],
        now: NaiveDateTime,
        progress: &dyn DownloadProgress,
    ) -> Result<BackfillReport, PipelineError> {
        if providers.is_empty() {
            return Err(ConfigError::Invalid("backfill needs at least one provider".into()).into());
        }

        let _lock = self.lock()?;
        let universe = self.load_universe()?;
        let manifest_path = self.config.manifest_path();
        let mut manifest = RunManifest::load(&manifest_path);
        manifest.seed_from_store(universe.symbols(), &self.store, now);

        let pending = manifest.pending(universe.symbols());
        let existing = universe.len() - pending.len();
        tracing::info!(
            "backfill: {} symbols, {existing} already stored, {} to download",
            universe.len(),
            pending.len()
        );

        let chunks = date_chunks(
            now.date(),
            self.config.pipeline.lookback_days,
            self.config.pipeline.chunk_days,
        );
        let results = self.fetch_all(providers, &pending, &chunks, progress)?;

        let mut downloaded = 0;
        let mut failed = Vec::new();
        for (symbol, result) in results {
            match result {
                Ok(()) => {
                    manifest.mark_backfilled(&symbol, now);
                    downloaded += 1;
                }
                Err(e) => {
                    let reason = e.to_string();
                    manifest.mark_failed(&symbol, reason.clone(), now);
                    failed.push(FailedSymbol { symbol, reason });
                }
            }
        }
        manifest.save(&manifest_path)?;
        progress.on_batch_complete(downloaded, failed.len(), pending.len());

        let summarized = self.rebuild_summary(&universe)?;

        let report = BackfillReport {
            total_symbols: universe.len(),
            existing,
            downloaded,
            failed,
            summarized,
        };
        Checkpoint::new(
            now,
            Phase::BackfillComplete,
            RunCounts {
                total_symbols: report.total_symbols,
                existing: report.existing,
                downloaded: report.downloaded,
                failed: report.failed.len(),
                summarized: report.summarized,
                ..RunCounts::default()
            },
        )
        .save(&self.config.checkpoint_path())?;

        tracing::info!(
            "backfill complete: {downloaded} downloaded, {} failed, {summarized} summarized",
            report.failed.len()
        );
        Ok(report)
    }

    /// Fetch and store each pending symbol. Symbols are striped round-robin
    /// across the providers; each provider works through its stripe serially.
    fn fetch_all(
        &self,
        providers: &mut [Box<dyn MarketDataProvider>],
        pending: &[String],
        chunks: &[(NaiveDate, NaiveDate)],
        progress: &dyn DownloadProgress,
    ) -> Result<Vec<(String, Result<(), DataError>)>, PipelineError> {
        let workers = providers.len();
        let total = pending.len();

        let mut stripes: Vec<Vec<(usize, &String)>> = vec![Vec::new(); workers];
        for (i, symbol) in pending.iter().enumerate() {
            stripes[i % workers].push((i, symbol));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("failed to start worker pool: {e}")))?;

        let store = &self.store;
        let mut results: Vec<(usize, String, Result<(), DataError>)> = pool.install(|| {
            providers
                .par_iter_mut()
                .zip(stripes.into_par_iter())
                .flat_map_iter(|(provider, stripe)| {
                    stripe.into_iter().map(move |(i, symbol)| {
                        progress.on_start(symbol, i, total);
                        let result = download_history(provider.as_mut(), symbol, chunks)
                            .and_then(|bars| store.write(symbol, &bars))
                            .map(|_| ());
                        progress.on_complete(symbol, i, total, &result);
                        (i, symbol.clone(), result)
                    })
                })
                .collect()
        });

        results.sort_by_key(|(i, _, _)| *i);
        Ok(results.into_iter().map(|(_, s, r)| (s, r)).collect())
    }

    /// Recompute and upsert a row for every universe symbol with history.
    fn rebuild_summary(&self, universe: &Universe) -> Result<usize, PipelineError> {
        let path = self.config.summary_path();
        let mut cache = SummaryCache::load_or_empty(&path);
        let threshold = self.config.pipeline.band_threshold;

        let mut summarized = 0;
        for symbol in universe.symbols() {
            let bars = match self.store.load(symbol) {
                Ok(Some(bars)) => bars,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!("{symbol}: unreadable history, skipping summary: {e}");
                    continue;
                }
            };
            match SummaryRow::from_history(symbol, &bars, threshold) {
                Some(row) => {
                    cache.upsert(row);
                    summarized += 1;
                }
                None => tracing::debug!("{symbol}: {} bars, no EMA window available", bars.len()),
            }
        }

        cache.save(&path)?;
        Ok(summarized)
    }

    // ── Daily update ─────────────────────────────────────────────────

    /// Why a daily update at `now` would be skipped, or `None` when it should run.
    pub fn daily_gate(&self, now: NaiveDateTime) -> Result<Option<String>, PipelineError> {
        if let Some(cp) = Checkpoint::load(&self.config.checkpoint_path()) {
            if now.date() <= cp.last_update.date() {
                return Ok(Some(format!(
                    "already updated on {} ({})",
                    cp.last_update.date(),
                    cp.phase
                )));
            }
        }

        let cutoff = self.config.pipeline.cutoff_time()?;
        if now.time() < cutoff {
            return Ok(Some(format!(
                "market not closed yet ({} < {})",
                now.time().format("%H:%M"),
                cutoff.format("%H:%M")
            )));
        }
        Ok(None)
    }

    /// Take the run lock, then gate again: a run that finished between the
    /// first gate check and the lock may already have covered today.
    /// `Ok(Err(reason))` releases the lock and means nothing is left to do.
    fn lock_for_update(&self, now: NaiveDateTime) -> Result<Result<RunLock, String>, PipelineError> {
        let lock = self.lock()?;
        match self.daily_gate(now)? {
            Some(reason) => Ok(Err(reason)),
            None => Ok(Ok(lock)),
        }
    }

    /// Append the latest traded price as today's bar and refresh the summary.
    ///
    /// `now` is exchange-local time. A gate miss is `NotNeeded`, not an error.
    pub fn run_daily_update(
        &self,
        provider: &mut dyn MarketDataProvider,
        now: NaiveDateTime,
    ) -> Result<DailyUpdateOutcome, PipelineError> {
        if let Some(reason) = self.daily_gate(now)? {
            tracing::info!("daily update not needed: {reason}");
            return Ok(DailyUpdateOutcome::NotNeeded { reason });
        }

        let _lock = match self.lock_for_update(now)? {
            Ok(lock) => lock,
            Err(reason) => {
                tracing::info!("daily update not needed: {reason}");
                return Ok(DailyUpdateOutcome::NotNeeded { reason });
            }
        };
        let universe = self.load_universe()?;
        let manifest_path = self.config.manifest_path();
        let mut manifest = RunManifest::load(&manifest_path);
        manifest.seed_from_store(universe.symbols(), &self.store, now);
        let table = provider.fetch_snapshot()?;
        let snapshot = MarketSnapshot::from_table(&table, &self.config.pipeline.index_name)?;
        tracing::info!("snapshot from {}: {} quotes", provider.name(), snapshot.len());

        let path = self.config.summary_path();
        let mut cache = SummaryCache::load_or_empty(&path);
        let threshold = self.config.pipeline.band_threshold;
        let today = now.date();

        let mut updated = 0;
        let mut skipped = 0;
        let mut failed = Vec::new();
        for symbol in universe.symbols() {
            let Some(ltp) = snapshot.ltp(symbol) else {
                skipped += 1;
                continue;
            };
            if manifest.status(symbol) != SymbolStatus::Backfilled {
                tracing::debug!("{symbol}: not backfilled, run a backfill first");
                skipped += 1;
                continue;
            }

            match self.store.append(symbol, &[Bar::new(today, ltp)]) {
                Ok(bars) => {
                    if let Some(row) = SummaryRow::from_history(symbol, &bars, threshold) {
                        cache.upsert(row);
                    }
                    updated += 1;
                }
                Err(e) => {
                    tracing::warn!("{symbol}: append failed: {e}");
                    failed.push(FailedSymbol {
                        symbol: symbol.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        cache.save(&path)?;
        manifest.save(&manifest_path)?;
        Checkpoint::new(
            now,
            Phase::DailyUpdateComplete,
            RunCounts {
                total_symbols: universe.len(),
                updated,
                skipped,
                failed: failed.len(),
                ..RunCounts::default()
            },
        )
        .save(&self.config.checkpoint_path())?;

        tracing::info!("daily update complete: {updated} updated, {skipped} skipped, {} failed", failed.len());
        Ok(DailyUpdateOutcome::Updated(DailyUpdateReport {
            as_of: today,
            updated,
            skipped,
            failed,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline(dir: &std::path::Path) -> Pipeline {
        let mut config = ScreenerConfig::default();
        config.paths.data_dir = dir.join("data");
        config.paths.cache_dir = dir.join("cache");
        config.paths.universe_file = dir.join("universe.csv");
        Pipeline::new(config)
    }

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 8, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn gate_without_checkpoint_only_checks_cutoff() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path());
        assert!(p.daily_gate(at(13, 15, 29)).unwrap().is_some());
        assert!(p.daily_gate(at(13, 15, 30)).unwrap().is_none());
    }

    #[test]
    fn gate_blocks_same_day_after_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path());
        Checkpoint::new(at(13, 16, 0), Phase::DailyUpdateComplete, RunCounts::default())
            .save(&p.config().checkpoint_path())
            .unwrap();

        let reason = p.daily_gate(at(13, 18, 0)).unwrap().unwrap();
        assert!(reason.contains("already updated"));
        assert!(p.daily_gate(at(14, 15, 45)).unwrap().is_none());
    }

    #[test]
    fn backfill_without_providers_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path());
        let err = p
            .run_backfill(&mut [], at(13, 10, 0), &screener_core::data::NoProgress)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn held_lock_reports_busy() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path());
        let _held = RunLock::try_acquire(&p.config().lock_path()).unwrap().unwrap();
        assert!(matches!(p.lock(), Err(PipelineError::Busy(_))));
    }

    #[test]
    fn update_lock_rechecks_gate() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path());
        assert!(p.daily_gate(at(14, 16, 0)).unwrap().is_none());

        // Another run completes today before this one gets the lock.
        Checkpoint::new(at(14, 15, 50), Phase::DailyUpdateComplete, RunCounts::default())
            .save(&p.config().checkpoint_path())
            .unwrap();

        let reason = p.lock_for_update(at(14, 16, 0)).unwrap().unwrap_err();
        assert!(reason.contains("already updated"));
        assert!(!p.config().lock_path().exists());
    }

    #[test]
    fn update_lock_is_held_when_gate_passes() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path());
        let lock = p.lock_for_update(at(14, 16, 0)).unwrap().unwrap();
        assert!(lock.path().exists());
        assert!(matches!(p.lock(), Err(PipelineError::Busy(_))));
    }
}
