//! Screener Runner: update pipeline, summary cache, query layer, configuration.
//!
//! This crate builds on `screener-core` to provide:
//! - TOML configuration with environment overrides
//! - Summary cache (one row per symbol, atomic CSV persistence)
//! - Backfill and daily-update pipeline with a per-symbol run manifest
//! - Checkpoint and cross-process run lock
//! - Query/filter layer with band recompute, search and stable sort
//! - Status reporting

pub mod checkpoint;
pub mod config;
pub mod lock;
pub mod manifest;
pub mod pipeline;
pub mod query;
pub mod status;
pub mod summary_cache;

pub use checkpoint::{Checkpoint, Phase, RunCounts};
pub use config::{ConfigError, ScreenerConfig};
pub use lock::RunLock;
pub use manifest::{ManifestEntry, RunManifest, SymbolStatus};
pub use pipeline::{
    BackfillReport, DailyUpdateOutcome, DailyUpdateReport, FailedSymbol, Pipeline, PipelineError,
};
pub use query::{
    number_rows, query, NumberedRow, QueryParams, QueryResponse, QuerySummary, SortDirection,
    SortField, DEFAULT_BAND_PCT,
};
pub use status::PipelineStatus;
pub use summary_cache::{CacheError, SummaryCache};
