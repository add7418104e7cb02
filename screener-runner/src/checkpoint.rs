//! Last-update checkpoint (`last_update.json`).
//!
//! Records when the summary cache was last refreshed and by which phase. The
//! daily update gate reads it; status reporting surfaces it.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Which pipeline run wrote the checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    BackfillComplete,
    DailyUpdateComplete,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::BackfillComplete => write!(f, "backfill_complete"),
            Phase::DailyUpdateComplete => write!(f, "daily_update_complete"),
        }
    }
}

/// Counters recorded with a checkpoint. Fields a phase does not use stay zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunCounts {
    pub total_symbols: usize,
    pub existing: usize,
    pub downloaded: usize,
    pub failed: usize,
    pub summarized: usize,
    pub updated: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Exchange-local time of the run.
    pub last_update: NaiveDateTime,
    pub phase: Phase,
    #[serde(flatten)]
    pub counts: RunCounts,
}

impl Checkpoint {
    pub fn new(last_update: NaiveDateTime, phase: Phase, counts: RunCounts) -> Self {
        Self {
            last_update,
            phase,
            counts,
        }
    }

    /// Read the checkpoint. A missing or unparseable file reads as `None`.
    pub fn load(path: &Path) -> Option<Self> {
        let text = fs::read_to_string(path).ok()?;
        match serde_json::from_str(&text) {
            Ok(cp) => Some(cp),
            Err(e) => {
                tracing::warn!("ignoring unreadable checkpoint {}: {e}", path.display());
                None
            }
        }
    }

    /// Write atomically.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)
    }
}
