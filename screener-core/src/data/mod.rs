//! Data ingestion: provider access, normalization and the per-symbol history store

pub mod download;
pub mod history;
pub mod normalize;
pub mod nse;
pub mod provider;
pub mod session;
pub mod snapshot;
pub mod universe;

pub use download::{date_chunks, download_history};
pub use history::HistoryStore;
pub use normalize::{merge_bars, normalize, parse_date, parse_price, sort_and_dedupe};
pub use nse::{looks_tabular, NseConfig, NseProvider};
pub use provider::{DataError, DownloadProgress, LogProgress, MarketDataProvider, NoProgress, RawTable};
pub use session::{RequestThrottle, SessionPolicy};
pub use snapshot::{MarketSnapshot, SnapshotQuote};
pub use universe::{Universe, DEFAULT_INDEX_NAME};
