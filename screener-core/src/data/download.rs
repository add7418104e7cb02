//! Download orchestrator: chunked history fetches merged into one normalized history.

use super::normalize::{normalize, sort_and_dedupe};
use super::provider::{DataError, MarketDataProvider};
use crate::domain::Bar;
use chrono::{Duration, NaiveDate};

/// Split the window `[end - lookback_days, end]` into inclusive ranges whose
/// endpoints are at most `chunk_days` apart, oldest first.
pub fn date_chunks(end: NaiveDate, lookback_days: u32, chunk_days: u32) -> Vec<(NaiveDate, NaiveDate)> {
    let start = end - Duration::days(i64::from(lookback_days));
    let step = i64::from(chunk_days.max(1));

    let mut chunks = Vec::new();
    let mut from = start;
    while from <= end {
        let to = (from + Duration::days(step)).min(end);
        chunks.push((from, to));
        from = to + Duration::days(1);
    }
    chunks
}

/// Fetch every chunk of the window, normalize and merge.
///
/// Duplicate dates across chunks keep the first (oldest-chunk) occurrence.
/// Individual chunk failures are tolerated as long as at least one chunk
/// yields bars; otherwise the last error is returned.
pub fn download_history(
    provider: &mut dyn MarketDataProvider,
    symbol: &str,
    chunks: &[(NaiveDate, NaiveDate)],
) -> Result<Vec<Bar>, DataError> {
    let mut bars = Vec::new();
    let mut last_error = None;

    for &(from, to) in chunks {
        let result = provider
            .fetch_history(symbol, from, to)
            .and_then(|table| normalize(&table));
        match result {
            Ok(chunk_bars) => bars.extend(chunk_bars),
            Err(e) => {
                tracing::warn!("{symbol}: chunk {from}..{to} failed: {e}");
                last_error = Some(e);
            }
        }
    }

    if bars.is_empty() {
        return Err(last_error.unwrap_or_else(|| {
            DataError::NoUsableHistory(format!("no chunks requested for {symbol}"))
        }));
    }

    Ok(sort_and_dedupe(bars))
}
