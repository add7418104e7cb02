//! Property tests for the query layer.
//!
//! Uses proptest to verify:
//! 1. Band filter: exactly the rows within the caller's band are kept
//! 2. Ordering: present values are ordered, absent values always trail
//! 3. Stability: rows with equal keys keep their cache order

use chrono::NaiveDate;
use proptest::prelude::*;
use screener_core::domain::{band_distance_pct, within_band, SummaryRow, DEFAULT_BAND_THRESHOLD};
use screener_core::indicators::EmaPeriod;
use screener_runner::{query, QueryParams, SortDirection, SortField, SummaryCache};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_ema() -> impl Strategy<Value = Option<f64>> {
    prop::option::of(50.0..150.0_f64)
}

fn arb_period() -> impl Strategy<Value = EmaPeriod> {
    prop::sample::select(EmaPeriod::ALL.to_vec())
}

fn arb_direction() -> impl Strategy<Value = SortDirection> {
    prop_oneof![Just(SortDirection::Asc), Just(SortDirection::Desc)]
}

/// Rows with unique symbols `S000..`, in symbol order. Closes come from a
/// small set so equal sort keys are common.
fn arb_rows(max: usize) -> impl Strategy<Value = Vec<SummaryRow>> {
    prop::collection::vec(
        (prop::sample::select(vec![90.0, 100.0, 110.0]), arb_ema(), arb_ema(), arb_ema()),
        0..max,
    )
    .prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(i, (close, e50, e100, e200))| row(&format!("S{i:03}"), close, [e50, e100, e200]))
            .collect()
    })
}

fn row(symbol: &str, last_close: f64, emas: [Option<f64>; 3]) -> SummaryRow {
    let band = |e: Option<f64>| e.map(|e| within_band(last_close, e, DEFAULT_BAND_THRESHOLD));
    let dist = |e: Option<f64>| e.map(|e| band_distance_pct(last_close, e));
    SummaryRow {
        symbol: symbol.to_string(),
        ema_50: emas[0],
        ema_100: emas[1],
        ema_200: emas[2],
        last_close,
        as_of_date: NaiveDate::from_ymd_opt(2025, 8, 13).unwrap(),
        within_band_50: band(emas[0]),
        within_band_100: band(emas[1]),
        within_band_200: band(emas[2]),
        distance_pct_50: dist(emas[0]),
        distance_pct_100: dist(emas[1]),
        distance_pct_200: dist(emas[2]),
    }
}

// ── 1. Band filter ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn filter_keeps_exactly_rows_in_band(
        rows in arb_rows(40),
        period in arb_period(),
        band_pct in 0.5..20.0_f64,
    ) {
        let cache = SummaryCache::from_rows(rows.clone());
        let params = QueryParams { filter: Some(period), band_pct, ..QueryParams::default() };
        let kept = query(&cache, &params);

        let expected: Vec<&str> = rows
            .iter()
            .filter(|r| r.ema(period).is_some_and(|e| within_band(r.last_close, e, band_pct / 100.0)))
            .map(|r| r.symbol.as_str())
            .collect();
        let kept_symbols: Vec<&str> = kept.iter().map(|r| r.symbol.as_str()).collect();
        prop_assert_eq!(kept_symbols, expected);
    }
}

// ── 2. Ordering ──────────────────────────────────────────────────────

proptest! {
    #[test]
    fn absent_values_trail_in_both_directions(
        rows in arb_rows(40),
        period in arb_period(),
        direction in arb_direction(),
    ) {
        let cache = SummaryCache::from_rows(rows.clone());
        let params = QueryParams {
            sort: Some(SortField::DistancePct(period)),
            direction,
            ..QueryParams::default()
        };
        let sorted = query(&cache, &params);
        prop_assert_eq!(sorted.len(), rows.len());

        let values: Vec<Option<f64>> = sorted.iter().map(|r| r.distance_pct(period)).collect();
        let present = values.iter().take_while(|v| v.is_some()).count();
        prop_assert!(values[present..].iter().all(Option::is_none));

        for pair in values[..present].windows(2) {
            let (a, b) = (pair[0].unwrap(), pair[1].unwrap());
            match direction {
                SortDirection::Asc => prop_assert!(a <= b),
                SortDirection::Desc => prop_assert!(a >= b),
            }
        }
    }
}

// ── 3. Stability ─────────────────────────────────────────────────────

proptest! {
    #[test]
    fn equal_keys_keep_cache_order(rows in arb_rows(40), direction in arb_direction()) {
        let cache = SummaryCache::from_rows(rows);
        let params = QueryParams {
            sort: Some(SortField::LastClose),
            direction,
            ..QueryParams::default()
        };
        let sorted = query(&cache, &params);

        for pair in sorted.windows(2) {
            if pair[0].last_close == pair[1].last_close {
                prop_assert!(pair[0].symbol < pair[1].symbol);
            }
        }
    }
}
