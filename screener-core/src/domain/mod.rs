//! Domain types shared by the store, the EMA engine and the pipeline.

pub mod bar;
pub mod summary;

pub use bar::Bar;
pub use summary::{band_distance_pct, within_band, SummaryRow, DEFAULT_BAND_THRESHOLD};
