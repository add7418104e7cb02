//! Normalization of raw provider tables into ordered close histories.
//!
//! - Close column chosen from an ordered alias list (close, ltp, last, price)
//! - Thousands separators and quoting stripped from prices
//! - Unparseable rows dropped
//! - Stable ascending sort by date, first occurrence kept on duplicate dates

use super::provider::{DataError, RawTable};
use crate::domain::Bar;
use chrono::NaiveDate;

/// Close-price column aliases, highest priority first. Matched case-insensitively.
pub const CLOSE_ALIASES: [&str; 4] = ["close", "ltp", "last", "price"];

/// Date formats seen in NSE downloads and in our own history files.
const DATE_FORMATS: [&str; 5] = ["%d-%b-%Y", "%d-%m-%Y", "%Y-%m-%d", "%d/%m/%Y", "%d %b %Y"];

/// Parse a date cell in any accepted format.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim().trim_matches('"').trim();
    if s.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Parse a price cell: strips quotes, whitespace and thousands separators.
pub fn parse_price(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| *c != ',' && *c != '"' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Normalize a raw table into an oldest-first history.
///
/// Fails with `NoUsableHistory` when no alias column yields a single valid row.
pub fn normalize(table: &RawTable) -> Result<Vec<Bar>, DataError> {
    let date_col = table.column("date").unwrap_or(0);

    let mut matched_any = false;
    for alias in CLOSE_ALIASES {
        let Some(close_col) = table.column(alias) else {
            continue;
        };
        matched_any = true;

        let bars: Vec<Bar> = (0..table.rows.len())
            .filter_map(|i| {
                let date = parse_date(table.cell(i, date_col)?)?;
                let close = parse_price(table.cell(i, close_col)?)?;
                Some(Bar::new(date, close))
            })
            .filter(Bar::is_sane)
            .collect();

        if !bars.is_empty() {
            return Ok(sort_and_dedupe(bars));
        }
    }

    if matched_any {
        Err(DataError::NoUsableHistory(format!(
            "zero valid rows out of {}",
            table.rows.len()
        )))
    } else {
        Err(DataError::NoUsableHistory(format!(
            "no close-price column among {:?}",
            table.headers
        )))
    }
}

/// Stable ascending sort by date, keeping the first occurrence of each date.
///
/// Idempotent: applying it to its own output changes nothing.
pub fn sort_and_dedupe(mut bars: Vec<Bar>) -> Vec<Bar> {
    bars.sort_by_key(|b| b.date);
    bars.dedup_by_key(|b| b.date);
    bars
}

/// Merge new bars into an existing history. A new bar replaces an existing bar with the same date.
pub fn merge_bars(existing: &[Bar], new_bars: &[Bar]) -> Vec<Bar> {
    let combined: Vec<Bar> = new_bars.iter().chain(existing.iter()).copied().collect();
    sort_and_dedupe(combined)
}
