//! Screener Core: domain types, EMA engine, price history store, NSE data provider.
//!
//! This crate contains everything below the update pipeline:
//! - Domain types (daily close bars, per-symbol summary rows)
//! - EMA engine (first-price-seeded recurrence over 50/100/200 windows)
//! - CSV normalization with close-column alias sniffing
//! - Flat-file price history store with atomic writes
//! - Market data provider trait and the NSE HTTP implementation
//! - Universe and latest-snapshot readers

pub mod data;
pub mod domain;
pub mod indicators;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: types shared with the pipeline worker pool are Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::Bar>();
        require_sync::<domain::Bar>();
        require_send::<domain::SummaryRow>();
        require_sync::<domain::SummaryRow>();
        require_send::<indicators::EmaSet>();
        require_sync::<indicators::EmaSet>();
        require_send::<data::HistoryStore>();
        require_sync::<data::HistoryStore>();
        require_send::<data::RawTable>();
        require_sync::<data::RawTable>();
        require_send::<data::MarketSnapshot>();
        require_sync::<data::MarketSnapshot>();
        require_send::<data::DataError>();
        require_sync::<data::DataError>();

        // Provider handles move into worker threads but are never shared.
        require_send::<data::NseProvider>();
        require_send::<Box<dyn data::MarketDataProvider>>();
    }
}
