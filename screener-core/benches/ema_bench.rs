//! Criterion benchmarks for screener hot paths.
//!
//! Benchmarks:
//! 1. Single-period EMA over a one-year close series
//! 2. Standard 50/100/200 EMA set
//! 3. Summary row construction from bars
//! 4. CSV normalization of an NSE-style export

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use screener_core::data::{normalize, RawTable};
use screener_core::domain::{Bar, SummaryRow};
use screener_core::indicators::{compute_ema, EmaSet};

// ── Helpers ──────────────────────────────────────────────────────────

fn make_closes(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 100.0 + (i as f64 * 0.1).sin() * 10.0)
        .collect()
}

fn make_bars(n: usize) -> Vec<Bar> {
    let base = chrono::NaiveDate::from_ymd_opt(2020, 1, 2).unwrap();
    make_closes(n)
        .into_iter()
        .enumerate()
        .map(|(i, close)| Bar::new(base + chrono::Duration::days(i as i64), close))
        .collect()
}

fn make_export(n: usize) -> String {
    let mut out = String::from("\"Date \",\"series \",\"close \"\n");
    for bar in make_bars(n).iter().rev() {
        out.push_str(&format!(
            "\"{}\",\"EQ\",\"{:.2}\"\n",
            bar.date.format("%d-%b-%Y"),
            bar.close
        ));
    }
    out
}

// ── Benchmarks ───────────────────────────────────────────────────────

fn bench_ema(c: &mut Criterion) {
    let mut group = c.benchmark_group("ema");
    for n in [250usize, 1000, 5000] {
        let closes = make_closes(n);
        group.bench_with_input(BenchmarkId::new("single_50", n), &closes, |b, closes| {
            b.iter(|| compute_ema(black_box(closes), 50))
        });
        group.bench_with_input(BenchmarkId::new("standard_set", n), &closes, |b, closes| {
            b.iter(|| EmaSet::standard(black_box(closes)))
        });
    }
    group.finish();
}

fn bench_summary(c: &mut Criterion) {
    let bars = make_bars(365);
    c.bench_function("summary_row_365", |b| {
        b.iter(|| SummaryRow::from_history("ABC", black_box(&bars), 0.025))
    });
}

fn bench_normalize(c: &mut Criterion) {
    let text = make_export(365);
    c.bench_function("normalize_365", |b| {
        b.iter(|| {
            let table = RawTable::from_csv_text(black_box(&text)).unwrap();
            normalize(&table).unwrap()
        })
    });
}

criterion_group!(benches, bench_ema, bench_summary, bench_normalize);
criterion_main!(benches);
