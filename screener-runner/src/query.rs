//! Query/filter layer over the summary cache.
//!
//! Filters by band membership around one EMA (recomputed at the caller's band
//! width), searches symbols, and sorts stably by any summary field. Rows are
//! returned as cached; only the filter predicate uses the caller's band.

use screener_core::domain::SummaryRow;
use screener_core::indicators::EmaPeriod;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::summary_cache::SummaryCache;

/// Default band width in percent.
pub const DEFAULT_BAND_PCT: f64 = 2.5;

/// Sortable summary columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Symbol,
    Ema(EmaPeriod),
    LastClose,
    AsOfDate,
    WithinBand(EmaPeriod),
    DistancePct(EmaPeriod),
}

impl FromStr for SortField {
    type Err = String;

    /// Accepts the persisted column names (`EMA_50`, `LAST_CLOSE`, `DISTANCE_PCT_200`, ...),
    /// case-insensitively, plus `DATE` and `DISTANCE_FROM_EMA_P` as aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let period = |suffix: &str| {
            suffix
                .parse::<EmaPeriod>()
                .map_err(|_| format!("unknown sort field '{s}'"))
        };

        match upper.as_str() {
            "SYMBOL" => Ok(SortField::Symbol),
            "LAST_CLOSE" => Ok(SortField::LastClose),
            "AS_OF_DATE" | "DATE" => Ok(SortField::AsOfDate),
            _ => {
                if let Some(p) = upper.strip_prefix("EMA_") {
                    period(p).map(SortField::Ema)
                } else if let Some(p) = upper.strip_prefix("WITHIN_BAND_") {
                    period(p).map(SortField::WithinBand)
                } else if let Some(p) = upper
                    .strip_prefix("DISTANCE_PCT_")
                    .or_else(|| upper.strip_prefix("DISTANCE_FROM_EMA_"))
                {
                    period(p).map(SortField::DistancePct)
                } else {
                    Err(format!("unknown sort field '{s}'"))
                }
            }
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortField::Symbol => write!(f, "SYMBOL"),
            SortField::Ema(p) => write!(f, "EMA_{p}"),
            SortField::LastClose => write!(f, "LAST_CLOSE"),
            SortField::AsOfDate => write!(f, "AS_OF_DATE"),
            SortField::WithinBand(p) => write!(f, "WITHIN_BAND_{p}"),
            SortField::DistancePct(p) => write!(f, "DISTANCE_PCT_{p}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortDirection::Asc),
            "desc" | "descending" => Ok(SortDirection::Desc),
            other => Err(format!("unknown sort order '{other}' (expected asc or desc)")),
        }
    }
}

/// Parameters of one query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParams {
    /// Keep only rows within the band around this EMA.
    pub filter: Option<EmaPeriod>,
    /// Band half-width in percent (2.5 = ±2.5%).
    pub band_pct: f64,
    pub sort: Option<SortField>,
    pub direction: SortDirection,
    /// Case-insensitive substring match on the symbol.
    pub search: Option<String>,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            filter: None,
            band_pct: DEFAULT_BAND_PCT,
            sort: None,
            direction: SortDirection::Asc,
            search: None,
        }
    }
}

/// Run a query. An empty cache yields an empty result.
pub fn query(cache: &SummaryCache, params: &QueryParams) -> Vec<SummaryRow> {
    let threshold = params.band_pct / 100.0;
    let needle = params
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_ascii_uppercase);

    let mut rows: Vec<SummaryRow> = cache
        .rows()
        .iter()
        .filter(|row| match params.filter {
            Some(period) => row.within_band_at(period, threshold) == Some(true),
            None => true,
        })
        .filter(|row| match &needle {
            Some(n) => row.symbol.to_ascii_uppercase().contains(n.as_str()),
            None => true,
        })
        .cloned()
        .collect();

    if let Some(field) = params.sort {
        rows.sort_by(|a, b| compare(a, b, field, params.direction));
    }
    rows
}

/// Order two rows on `field`. Absent values go last in either direction.
fn compare(a: &SummaryRow, b: &SummaryRow, field: SortField, direction: SortDirection) -> Ordering {
    let directed = |ord: Ordering| match direction {
        SortDirection::Asc => ord,
        SortDirection::Desc => ord.reverse(),
    };
    let optional = |x: Option<f64>, y: Option<f64>| match (x, y) {
        (Some(x), Some(y)) => directed(x.total_cmp(&y)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };

    match field {
        SortField::Symbol => directed(a.symbol.cmp(&b.symbol)),
        SortField::LastClose => directed(a.last_close.total_cmp(&b.last_close)),
        SortField::AsOfDate => directed(a.as_of_date.cmp(&b.as_of_date)),
        SortField::Ema(p) => optional(a.ema(p), b.ema(p)),
        SortField::DistancePct(p) => optional(a.distance_pct(p), b.distance_pct(p)),
        SortField::WithinBand(p) => optional(
            a.within_band(p).map(|v| f64::from(u8::from(v))),
            b.within_band(p).map(|v| f64::from(u8::from(v))),
        ),
    }
}

// ── Response shape ───────────────────────────────────────────────────

/// A result row with its 1-based position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumberedRow {
    #[serde(rename = "ROW_NUMBER")]
    pub row_number: usize,
    #[serde(flatten)]
    pub row: SummaryRow,
}

/// Aggregates over a result set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuerySummary {
    pub total_stocks: usize,
    pub above_ema_50: usize,
    pub above_ema_100: usize,
    pub above_ema_200: usize,
    pub above_ema_50_percentage: f64,
    pub above_ema_100_percentage: f64,
    pub above_ema_200_percentage: f64,
    /// Mean signed distance in percent over rows where the EMA exists.
    pub avg_distance_50: Option<f64>,
    pub avg_distance_100: Option<f64>,
    pub avg_distance_200: Option<f64>,
    pub filter_applied: String,
    pub band_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    pub data: Vec<NumberedRow>,
    pub summary: QuerySummary,
}

impl QueryResponse {
    pub fn new(rows: Vec<SummaryRow>, params: &QueryParams) -> Self {
        let summary = QuerySummary::from_rows(&rows, params);
        Self {
            data: number_rows(rows),
            summary,
        }
    }
}

pub fn number_rows(rows: Vec<SummaryRow>) -> Vec<NumberedRow> {
    rows.into_iter()
        .enumerate()
        .map(|(i, row)| NumberedRow {
            row_number: i + 1,
            row,
        })
        .collect()
}

impl QuerySummary {
    pub fn from_rows(rows: &[SummaryRow], params: &QueryParams) -> Self {
        let total = rows.len();
        let above = |p: EmaPeriod| rows.iter().filter(|r| r.is_above(p)).count();
        let pct = |n: usize| {
            if total == 0 {
                0.0
            } else {
                round_to(n as f64 / total as f64 * 100.0, 1)
            }
        };
        let avg = |p: EmaPeriod| {
            let values: Vec<f64> = rows.iter().filter_map(|r| r.distance_pct(p)).collect();
            if values.is_empty() {
                None
            } else {
                Some(round_to(values.iter().sum::<f64>() / values.len() as f64, 2))
            }
        };

        let (a50, a100, a200) = (above(EmaPeriod::P50), above(EmaPeriod::P100), above(EmaPeriod::P200));
        Self {
            total_stocks: total,
            above_ema_50: a50,
            above_ema_100: a100,
            above_ema_200: a200,
            above_ema_50_percentage: pct(a50),
            above_ema_100_percentage: pct(a100),
            above_ema_200_percentage: pct(a200),
            avg_distance_50: avg(EmaPeriod::P50),
            avg_distance_100: avg(EmaPeriod::P100),
            avg_distance_200: avg(EmaPeriod::P200),
            filter_applied: params
                .filter
                .map_or_else(|| "all".to_string(), |p| p.to_string()),
            band_percentage: params.band_pct,
        }
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
