//! Screener configuration.
//!
//! Loaded from TOML with a serde default for every field, then overridden by
//! environment variables:
//!
//! | variable | field |
//! |---|---|
//! | `SCREENER_DATA_DIR` | `paths.data_dir` |
//! | `SCREENER_CACHE_DIR` | `paths.cache_dir` |
//! | `SCREENER_UNIVERSE` | `paths.universe_file` |
//! | `SCREENER_BIND` | `server.bind` |
//! | `SCREENER_PORT` | `server.port` |

use chrono::{FixedOffset, NaiveTime};
use screener_core::data::{NseConfig, DEFAULT_INDEX_NAME};
use screener_core::domain::DEFAULT_BAND_THRESHOLD;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "screener.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenerConfig {
    pub paths: PathsConfig,
    pub provider: NseConfig,
    pub pipeline: PipelineConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Per-symbol history files and the run manifest.
    pub data_dir: PathBuf,
    /// Summary table, checkpoint and lock file.
    pub cache_dir: PathBuf,
    /// CSV list of symbols to screen.
    pub universe_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("stock_data"),
            cache_dir: PathBuf::from("ema_cache"),
            universe_file: PathBuf::from("MW-NIFTY-TOTAL-MARKET.csv"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Calendar days of history fetched by a backfill.
    pub lookback_days: u32,
    /// Largest date range requested in one historical call.
    pub chunk_days: u32,
    /// Backfill fetch threads, each with its own provider session.
    pub workers: usize,
    /// Exchange-local time (HH:MM) after which the daily bar is final.
    pub cutoff: String,
    /// Exchange offset from UTC in minutes (IST = +330).
    pub utc_offset_minutes: i32,
    /// Band half-width as a fraction (0.025 = ±2.5%).
    pub band_threshold: f64,
    /// Index row excluded from the universe and the snapshot.
    pub index_name: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            lookback_days: 365,
            chunk_days: 365,
            workers: 1,
            cutoff: "15:30".into(),
            utc_offset_minutes: 330,
            band_threshold: DEFAULT_BAND_THRESHOLD,
            index_name: DEFAULT_INDEX_NAME.into(),
        }
    }
}

impl PipelineConfig {
    pub fn cutoff_time(&self) -> Result<NaiveTime, ConfigError> {
        NaiveTime::parse_from_str(self.cutoff.trim(), "%H:%M")
            .map_err(|e| ConfigError::Invalid(format!("cutoff '{}': {e}", self.cutoff)))
    }

    pub fn exchange_offset(&self) -> Result<FixedOffset, ConfigError> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            ConfigError::Invalid(format!("utc_offset_minutes {} out of range", self.utc_offset_minutes))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 5000,
        }
    }
}

impl ScreenerConfig {
    /// Parse TOML text. Missing sections and fields take their defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration.
    ///
    /// An explicit `path` must exist. Without one, `screener.toml` in the
    /// working directory is used when present, defaults otherwise. Environment
    /// overrides are applied last, then the result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_str("SCREENER_DATA_DIR") {
            self.paths.data_dir = PathBuf::from(v);
        }
        if let Some(v) = env_str("SCREENER_CACHE_DIR") {
            self.paths.cache_dir = PathBuf::from(v);
        }
        if let Some(v) = env_str("SCREENER_UNIVERSE") {
            self.paths.universe_file = PathBuf::from(v);
        }
        if let Some(v) = env_str("SCREENER_BIND") {
            self.server.bind = v;
        }
        if let Some(port) = env_str("SCREENER_PORT").and_then(|s| s.parse().ok()) {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.max_attempts == 0 {
            return Err(ConfigError::Invalid("provider.max_attempts must be at least 1".into()));
        }
        if self.pipeline.workers == 0 {
            return Err(ConfigError::Invalid("pipeline.workers must be at least 1".into()));
        }
        if self.pipeline.chunk_days == 0 {
            return Err(ConfigError::Invalid("pipeline.chunk_days must be at least 1".into()));
        }
        if !(self.pipeline.band_threshold > 0.0 && self.pipeline.band_threshold.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "pipeline.band_threshold must be positive, got {}",
                self.pipeline.band_threshold
            )));
        }
        self.pipeline.cutoff_time()?;
        self.pipeline.exchange_offset()?;
        Ok(())
    }

    pub fn summary_path(&self) -> PathBuf {
        self.paths.cache_dir.join("ema_summary.csv")
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.paths.cache_dir.join("last_update.json")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.paths.cache_dir.join("pipeline.lock")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.paths.data_dir.join("manifest.json")
    }
}

fn env_str(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let cfg = ScreenerConfig::from_toml("").unwrap();
        assert_eq!(cfg, ScreenerConfig::default());
        assert_eq!(cfg.pipeline.lookback_days, 365);
        assert_eq!(cfg.pipeline.band_threshold, 0.025);
        assert_eq!(cfg.provider.max_attempts, 3);
        cfg.validate().unwrap();
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = ScreenerConfig::from_toml(
            r#"
            [paths]
            data_dir = "/srv/prices"

            [pipeline]
            workers = 4
            cutoff = "16:00"

            [provider]
            request_delay_ms = 500
            "#,
        )
        .unwrap();

        assert_eq!(cfg.paths.data_dir, PathBuf::from("/srv/prices"));
        assert_eq!(cfg.paths.cache_dir, PathBuf::from("ema_cache"));
        assert_eq!(cfg.pipeline.workers, 4);
        assert_eq!(cfg.pipeline.cutoff_time().unwrap(), NaiveTime::from_hms_opt(16, 0, 0).unwrap());
        assert_eq!(cfg.provider.request_delay_ms, 500);
        assert_eq!(cfg.provider.retry_delay_ms, 6_000);
        assert_eq!(cfg.manifest_path(), PathBuf::from("/srv/prices/manifest.json"));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg = ScreenerConfig::default();
        cfg.provider.max_attempts = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = ScreenerConfig::default();
        cfg.pipeline.workers = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = ScreenerConfig::default();
        cfg.pipeline.band_threshold = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = ScreenerConfig::default();
        cfg.pipeline.cutoff = "half past three".into();
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn unknown_toml_type_is_parse_error() {
        assert!(matches!(
            ScreenerConfig::from_toml("[pipeline]\nworkers = \"many\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn default_offset_is_ist() {
        let offset = PipelineConfig::default().exchange_offset().unwrap();
        assert_eq!(offset.local_minus_utc(), 19_800);
    }
}
