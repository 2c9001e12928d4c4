//! Bar aggregation state machine.
//!
//! Merges sub-minute tick bars into canonical minute rows and lets
//! authoritative minute bars supersede whatever the ticks accumulated.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::{minute_bucket, Bar, BarEvent};
use crate::market_data::TimeSeriesStore;

fn event_bar(event: &BarEvent) -> Bar {
    Bar::new(event.open, event.high, event.low, event.close, event.volume)
}

/// Apply a sub-minute tick to the store.
///
/// Returns the minute bucket the tick landed in so the caller can signal
/// strategy dispatch, or `None` when the symbol is not tracked. Duplicate
/// and out-of-order same-minute ticks fold into the existing row.
pub fn apply_tick(store: &mut TimeSeriesStore, event: &BarEvent) -> Option<DateTime<Utc>> {
    let bucket = minute_bucket(event.bucket_start);
    match store.series_mut(&event.symbol) {
        Some(series) => {
            series.merge_tick(bucket, event_bar(event));
            Some(bucket)
        }
        None => {
            debug!(symbol = %event.symbol, "tick for untracked symbol ignored");
            None
        }
    }
}

/// Apply an authoritative minute bar: overwrite the bucket row outright and
/// add the bar's volume to the symbol's session running total.
pub fn apply_minute_bar(store: &mut TimeSeriesStore, event: &BarEvent) {
    let bucket = minute_bucket(event.bucket_start);
    match store.series_mut(&event.symbol) {
        Some(series) => {
            series.overwrite(bucket, event_bar(event));
            store.add_volume_today(&event.symbol, event.volume);
        }
        None => {
            debug!(symbol = %event.symbol, "minute bar for untracked symbol ignored");
        }
    }
}
