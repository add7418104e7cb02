//! Bar: one end-of-day close for a symbol.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Daily close for a single symbol.
///
/// Only the close is kept: every downstream computation (EMA, band distance)
/// works on closes alone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub close: f64,
}

impl Bar {
    pub fn new(date: NaiveDate, close: f64) -> Self {
        Self { date, close }
    }

    /// A close that can feed the EMA recurrence: finite and strictly positive.
    pub fn is_sane(&self) -> bool {
        self.close.is_finite() && self.close > 0.0
    }
}

/// Extract the close series from an oldest-first history.
pub fn closes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}
