//! Indicator implementations.
//!
//! Only the EMA is needed by the screener. It works on plain close series
//! rather than bars so the pipeline can feed it straight from the store.

pub mod ema;

pub use ema::{compute_ema, compute_multiple_emas, ema_series, EmaPeriod, EmaSet};

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
