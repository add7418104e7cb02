//! Read-only status snapshot of the cache, checkpoint and manifest.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::checkpoint::{Checkpoint, Phase, RunCounts};
use crate::config::ScreenerConfig;
use crate::lock::RunLock;
use crate::manifest::{RunManifest, SymbolStatus};
use crate::summary_cache::SummaryCache;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineStatus {
    pub cache_exists: bool,
    /// Rows in the summary cache.
    pub cache_size: usize,
    pub last_update: Option<NaiveDateTime>,
    pub phase: Option<Phase>,
    pub last_counts: Option<RunCounts>,
    pub backfilled: usize,
    pub failed: usize,
    pub missing: usize,
    /// True while a live run holds the lock file.
    pub running: bool,
}

impl PipelineStatus {
    pub fn gather(config: &ScreenerConfig) -> Self {
        let summary_path = config.summary_path();
        let cache = SummaryCache::load_or_empty(&summary_path);
        let checkpoint = Checkpoint::load(&config.checkpoint_path());
        let manifest = RunManifest::load(&config.manifest_path());

        Self {
            cache_exists: summary_path.is_file(),
            cache_size: cache.len(),
            last_update: checkpoint.as_ref().map(|c| c.last_update),
            phase: checkpoint.as_ref().map(|c| c.phase),
            last_counts: checkpoint.map(|c| c.counts),
            backfilled: manifest.count(SymbolStatus::Backfilled),
            failed: manifest.count(SymbolStatus::Failed),
            missing: manifest.count(SymbolStatus::Missing),
            running: RunLock::is_held(&config.lock_path()),
        }
    }
}
