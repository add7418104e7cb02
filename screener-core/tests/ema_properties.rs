//! Property tests for EMA engine invariants.
//!
//! Uses proptest to verify:
//! 1. Availability: a period is absent exactly when history is shorter than it
//! 2. Boundedness: the EMA never leaves the [min, max] range of its inputs
//! 3. Fixed point: a constant series has that constant as its EMA
//! 4. Independence: each period in a multi-EMA set matches the single-period result

use proptest::prelude::*;
use screener_core::domain::{within_band, Bar, SummaryRow};
use screener_core::indicators::{compute_ema, compute_multiple_emas, ema_series, EmaPeriod};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_price() -> impl Strategy<Value = f64> {
    (10.0..5000.0_f64).prop_map(|p| (p * 100.0).round() / 100.0)
}

fn arb_prices(max_len: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(arb_price(), 1..max_len)
}

// ── 1. Availability ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn absent_iff_history_shorter_than_period(prices in arb_prices(260), period in 1usize..250) {
        let ema = compute_ema(&prices, period);
        prop_assert_eq!(ema.is_none(), prices.len() < period);
    }
}

// ── 2. Boundedness ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn ema_stays_within_input_range(prices in arb_prices(260), period in 1usize..60) {
        prop_assume!(prices.len() >= period);
        let min = prices.iter().copied().fold(f64::INFINITY, f64::min);
        let max = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let ema = compute_ema(&prices, period).unwrap();
        prop_assert!(ema >= min - 1e-9 && ema <= max + 1e-9, "ema {} outside [{}, {}]", ema, min, max);
    }

    #[test]
    fn series_last_value_matches_final_ema(prices in arb_prices(260), period in 1usize..60) {
        prop_assume!(prices.len() >= period);
        let series = ema_series(&prices, period);
        prop_assert_eq!(series.len(), prices.len());
        prop_assert_eq!(series.last().copied(), compute_ema(&prices, period));
    }
}

// ── 3. Fixed point ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn constant_series_is_its_own_ema(price in arb_price(), len in 200usize..300) {
        let prices = vec![price; len];
        for period in [50, 100, 200] {
            let ema = compute_ema(&prices, period).unwrap();
            prop_assert!((ema - price).abs() < 1e-9);
        }
    }
}

// ── 4. Independence ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn multiple_emas_match_single_period(prices in arb_prices(260)) {
        let set = compute_multiple_emas(&prices, &[50, 100, 200]);
        for period in EmaPeriod::ALL {
            prop_assert_eq!(set.period(period), compute_ema(&prices, period.len()));
        }
    }

    #[test]
    fn band_flag_agrees_with_distance(last in arb_price(), ema in arb_price(), band in 0.001..0.2_f64) {
        let distance = (last - ema).abs() / ema;
        prop_assert_eq!(within_band(last, ema, band), distance <= band);
    }
}

// ── Worked examples ──────────────────────────────────────────────────

fn fifty_points() -> Vec<f64> {
    let base = [100.0, 102.0, 101.0, 105.0, 103.0];
    (0..50).map(|i| base[i % base.len()] + (i / 5) as f64).collect()
}

#[test]
fn fifty_points_yield_ema_50_but_not_ema_60() {
    let prices = fifty_points();
    assert!(compute_ema(&prices, 50).is_some());
    assert!(compute_ema(&prices, 60).is_none());
}

#[test]
fn summary_row_exists_only_with_some_ema() {
    let start = chrono::NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
    let bars: Vec<Bar> = fifty_points()
        .into_iter()
        .enumerate()
        .map(|(i, close)| Bar::new(start + chrono::Duration::days(i as i64), close))
        .collect();

    let row = SummaryRow::from_history("ABC", &bars, 0.025).unwrap();
    assert!(row.ema(EmaPeriod::P50).is_some());
    assert!(row.ema(EmaPeriod::P100).is_none());
    assert!(row.within_band(EmaPeriod::P100).is_none());
    assert_eq!(row.as_of_date, bars.last().unwrap().date);

    assert!(SummaryRow::from_history("ABC", &bars[..49], 0.025).is_none());
}
