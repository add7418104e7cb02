//! Data provider trait, raw tabular payloads and structured error types.
//!
//! The MarketDataProvider trait abstracts over the upstream source (the NSE
//! HTTP endpoints in production, canned CSV in tests). Providers hand back raw
//! tables; turning them into bars is the normalizer's job.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured error types for data operations.
///
/// These are designed to be displayable in CLI output and REST responses.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network failure: {0}")]
    NetworkFailure(String),

    #[error("HTTP {status} from provider for {target}")]
    HttpStatus { status: u16, target: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("no usable history: {0}")]
    NoUsableHistory(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("data error: {0}")]
    Other(String),
}

impl DataError {
    /// Failures worth another attempt within the same run.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DataError::NetworkFailure(_)
                | DataError::HttpStatus { .. }
                | DataError::MalformedResponse(_)
        )
    }
}

impl From<csv::Error> for DataError {
    fn from(e: csv::Error) -> Self {
        DataError::Csv(e.to_string())
    }
}

/// A parsed CSV payload: cleaned header names plus raw string cells.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Parse CSV text. Header cells are trimmed of whitespace, quotes and byte-order marks.
    pub fn from_csv_text(text: &str) -> Result<Self, DataError> {
        let text = text.trim_start_matches('\u{feff}');
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let headers = reader
            .headers()?
            .iter()
            .map(clean_header)
            .collect::<Vec<_>>();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            if record.iter().all(|cell| cell.trim().is_empty()) {
                continue;
            }
            rows.push(record.iter().map(|c| c.to_string()).collect());
        }

        Ok(Self { headers, rows })
    }

    /// Index of the first header equal (case-insensitive) to `name`.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
    }

    /// Cell at (`row`, `col`), `None` for short rows.
    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row)?.get(col).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Strip whitespace, quotes, a BOM and its mis-decoded Latin-1 form from a header cell.
pub fn clean_header(raw: &str) -> String {
    raw.replace('\u{feff}', "")
        .replace("ï»¿", "")
        .trim()
        .trim_matches('"')
        .trim()
        .to_string()
}

/// Trait for upstream market data sources.
///
/// Implementations own their HTTP session and rate-limit state, so calls take
/// `&mut self`. The pipeline gives each worker its own handle.
pub trait MarketDataProvider: Send {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch daily history for `symbol` over `[from, to]` as a raw table.
    ///
    /// Implementations apply their own retry policy; an `Err` means the
    /// attempt budget is spent.
    fn fetch_history(
        &mut self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<RawTable, DataError>;

    /// Fetch the latest market snapshot (one row per symbol with its last traded price).
    fn fetch_snapshot(&mut self) -> Result<RawTable, DataError>;
}

/// Progress callback for multi-symbol operations.
pub trait DownloadProgress: Send + Sync {
    /// Called when starting to fetch a symbol.
    fn on_start(&self, symbol: &str, index: usize, total: usize);

    /// Called when a symbol fetch completes.
    fn on_complete(&self, symbol: &str, index: usize, total: usize, result: &Result<(), DataError>);

    /// Called when the entire batch is done.
    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize);
}

/// Progress reporter that emits tracing events.
pub struct LogProgress;

impl DownloadProgress for LogProgress {
    fn on_start(&self, symbol: &str, index: usize, total: usize) {
        tracing::debug!("[{}/{}] fetching {symbol}", index + 1, total);
    }

    fn on_complete(
        &self,
        symbol: &str,
        index: usize,
        total: usize,
        result: &Result<(), DataError>,
    ) {
        match result {
            Ok(()) => tracing::info!("[{}/{}] downloaded {symbol}", index + 1, total),
            Err(e) => tracing::warn!("[{}/{}] failed {symbol}: {e}", index + 1, total),
        }
    }

    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize) {
        tracing::info!("download complete: {succeeded}/{total} succeeded, {failed} failed");
    }
}

/// Progress reporter that discards everything.
pub struct NoProgress;

impl DownloadProgress for NoProgress {
    fn on_start(&self, _symbol: &str, _index: usize, _total: usize) {}

    fn on_complete(
        &self,
        _symbol: &str,
        _index: usize,
        _total: usize,
        _result: &Result<(), DataError>,
    ) {
    }

    fn on_batch_complete(&self, _succeeded: usize, _failed: usize, _total: usize) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_headers_with_quotes_and_bom() {
        let text = "\u{feff}\"Date \",\"close \"\n\"13-Aug-2025\",\"1,234.50\"\n";
        let table = RawTable::from_csv_text(text).unwrap();
        assert_eq!(table.headers, vec!["Date", "close"]);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.cell(0, 1), Some("1,234.50"));
    }

    #[test]
    fn mojibake_bom_is_stripped() {
        assert_eq!(clean_header("ï»¿\"Date\""), "Date");
    }

    #[test]
    fn blank_rows_are_skipped_and_short_rows_kept() {
        let text = "SYMBOL,LTP\nABC,10\n,\nXYZ\n";
        let table = RawTable::from_csv_text(text).unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.cell(1, 1), None);
        assert_eq!(table.column("ltp"), Some(1));
    }

    #[test]
    fn retryable_classification() {
        assert!(DataError::NetworkFailure("x".into()).is_retryable());
        assert!(DataError::HttpStatus {
            status: 503,
            target: "ABC".into()
        }
        .is_retryable());
        assert!(DataError::MalformedResponse("html".into()).is_retryable());
        assert!(DataError::HttpStatus {
            status: 404,
            target: "ABC".into()
        }
        .is_retryable());
        assert!(!DataError::NoUsableHistory("none".into()).is_retryable());
    }
}
