//! Exponential Moving Average (EMA).
//!
//! Recursive: EMA[t] = alpha * close[t] + (1 - alpha) * EMA[t-1], alpha = 2 / (period + 1).
//! Seed: EMA[0] = close[0] (the first price, NOT the SMA of the first `period` closes).
//! Availability: a value is reported only once the history holds at least `period` closes.
//!
//! The first-price seed diverges from the SMA-seeded convention used by most charting
//! packages. The two converge as the history grows, but with a 365-day window the
//! 200-period value still carries a visible share of the seed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The three screening windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EmaPeriod {
    #[serde(rename = "50")]
    P50,
    #[serde(rename = "100")]
    P100,
    #[serde(rename = "200")]
    P200,
}

impl EmaPeriod {
    pub const ALL: [EmaPeriod; 3] = [EmaPeriod::P50, EmaPeriod::P100, EmaPeriod::P200];

    /// Window length in bars.
    pub fn len(self) -> usize {
        match self {
            EmaPeriod::P50 => 50,
            EmaPeriod::P100 => 100,
            EmaPeriod::P200 => 200,
        }
    }

    pub fn from_len(len: usize) -> Option<Self> {
        match len {
            50 => Some(EmaPeriod::P50),
            100 => Some(EmaPeriod::P100),
            200 => Some(EmaPeriod::P200),
            _ => None,
        }
    }
}

impl fmt::Display for EmaPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.len())
    }
}

impl FromStr for EmaPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<usize>()
            .ok()
            .and_then(EmaPeriod::from_len)
            .ok_or_else(|| format!("unknown EMA period '{s}' (expected 50, 100 or 200)"))
    }
}

/// Compute the final EMA value of `prices` for `period`.
///
/// Returns `None` when the history is shorter than `period` (or `period` is zero).
/// Insufficient history is a "not yet available" state, not an error.
pub fn compute_ema(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let mut ema = prices[0];
    for &price in &prices[1..] {
        ema = alpha * price + (1.0 - alpha) * ema;
    }
    Some(ema)
}

/// Full EMA series for `prices`, one value per input.
///
/// Empty when the history is shorter than `period`.
pub fn ema_series(prices: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || prices.len() < period {
        return Vec::new();
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(prices.len());
    let mut prev = prices[0];
    out.push(prev);
    for &price in &prices[1..] {
        prev = alpha * price + (1.0 - alpha) * prev;
        out.push(prev);
    }
    out
}

/// EMA values keyed by window length. Absent windows had too little history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmaSet {
    values: BTreeMap<usize, Option<f64>>,
}

impl EmaSet {
    /// EMAs for the three screening windows.
    pub fn standard(prices: &[f64]) -> Self {
        let periods: Vec<usize> = EmaPeriod::ALL.iter().map(|p| p.len()).collect();
        compute_multiple_emas(prices, &periods)
    }

    /// Value for a window length; `None` when absent or never requested.
    pub fn get(&self, period: usize) -> Option<f64> {
        self.values.get(&period).copied().flatten()
    }

    pub fn period(&self, period: EmaPeriod) -> Option<f64> {
        self.get(period.len())
    }

    /// True when at least one requested window produced a value.
    pub fn any_available(&self) -> bool {
        self.values.values().any(Option::is_some)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, Option<f64>)> + '_ {
        self.values.iter().map(|(&p, &v)| (p, v))
    }
}

/// Apply [`compute_ema`] independently for every period against the same prices.
pub fn compute_multiple_emas(prices: &[f64], periods: &[usize]) -> EmaSet {
    let values = periods
        .iter()
        .map(|&p| (p, compute_ema(prices, p)))
        .collect();
    EmaSet { values }
}
