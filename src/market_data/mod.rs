//! Per-symbol minute time series and the bar aggregation state machine.

pub mod aggregator;
pub mod store;

pub use aggregator::{apply_minute_bar, apply_tick};
pub use store::{MinuteSeries, TimeSeriesStore};
