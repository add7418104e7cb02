//! SummaryRow: the materialized per-symbol view of latest EMAs and band status.

use super::bar::{closes, Bar};
use crate::indicators::{EmaPeriod, EmaSet};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Default band half-width around an EMA (±2.5%).
pub const DEFAULT_BAND_THRESHOLD: f64 = 0.025;

/// True iff `|last_close - ema| / ema <= threshold`. The boundary is inside the band.
pub fn within_band(last_close: f64, ema: f64, threshold: f64) -> bool {
    (last_close - ema).abs() / ema <= threshold
}

/// Signed distance of the close from the EMA, in percent of the EMA.
pub fn band_distance_pct(last_close: f64, ema: f64) -> f64 {
    (last_close - ema) / ema * 100.0
}

/// One row of the summary cache.
///
/// Band fields are `None` exactly when the matching EMA is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SummaryRow {
    pub symbol: String,
    pub ema_50: Option<f64>,
    pub ema_100: Option<f64>,
    pub ema_200: Option<f64>,
    pub last_close: f64,
    pub as_of_date: NaiveDate,
    pub within_band_50: Option<bool>,
    pub within_band_100: Option<bool>,
    pub within_band_200: Option<bool>,
    pub distance_pct_50: Option<f64>,
    pub distance_pct_100: Option<f64>,
    pub distance_pct_200: Option<f64>,
}

impl SummaryRow {
    /// Build a row from an oldest-first history.
    ///
    /// Returns `None` when the history is empty or too short for every window.
    pub fn from_history(symbol: &str, bars: &[Bar], band_threshold: f64) -> Option<Self> {
        let last = bars.last()?;
        let emas = EmaSet::standard(&closes(bars));
        Self::from_emas(symbol, &emas, last.close, last.date, band_threshold)
    }

    pub fn from_emas(
        symbol: &str,
        emas: &EmaSet,
        last_close: f64,
        as_of_date: NaiveDate,
        band_threshold: f64,
    ) -> Option<Self> {
        if !emas.any_available() {
            return None;
        }

        let band = |p: EmaPeriod| emas.period(p).map(|e| within_band(last_close, e, band_threshold));
        let dist = |p: EmaPeriod| emas.period(p).map(|e| band_distance_pct(last_close, e));

        Some(Self {
            symbol: symbol.to_string(),
            ema_50: emas.period(EmaPeriod::P50),
            ema_100: emas.period(EmaPeriod::P100),
            ema_200: emas.period(EmaPeriod::P200),
            last_close,
            as_of_date,
            within_band_50: band(EmaPeriod::P50),
            within_band_100: band(EmaPeriod::P100),
            within_band_200: band(EmaPeriod::P200),
            distance_pct_50: dist(EmaPeriod::P50),
            distance_pct_100: dist(EmaPeriod::P100),
            distance_pct_200: dist(EmaPeriod::P200),
        })
    }

    pub fn ema(&self, period: EmaPeriod) -> Option<f64> {
        match period {
            EmaPeriod::P50 => self.ema_50,
            EmaPeriod::P100 => self.ema_100,
            EmaPeriod::P200 => self.ema_200,
        }
    }

    /// Cached band flag (computed at the cache's default threshold).
    pub fn within_band(&self, period: EmaPeriod) -> Option<bool> {
        match period {
            EmaPeriod::P50 => self.within_band_50,
            EmaPeriod::P100 => self.within_band_100,
            EmaPeriod::P200 => self.within_band_200,
        }
    }

    pub fn distance_pct(&self, period: EmaPeriod) -> Option<f64> {
        match period {
            EmaPeriod::P50 => self.distance_pct_50,
            EmaPeriod::P100 => self.distance_pct_100,
            EmaPeriod::P200 => self.distance_pct_200,
        }
    }

    /// Band predicate recomputed at an arbitrary threshold (fraction, 0.01 = 1%).
    pub fn within_band_at(&self, period: EmaPeriod, threshold: f64) -> Option<bool> {
        self.ema(period)
            .map(|e| within_band(self.last_close, e, threshold))
    }

    /// True when the close sits strictly above the EMA.
    pub fn is_above(&self, period: EmaPeriod) -> bool {
        self.ema(period).is_some_and(|e| self.last_close > e)
    }
}
