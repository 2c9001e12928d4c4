use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

use crate::domain::Bar;

/// Ordered minute-bucketed series for one symbol.
///
/// Append/update only for the session's lifetime; rows are never deleted.
#[derive(Debug, Clone, Default)]
pub struct MinuteSeries {
    bars: BTreeMap<DateTime<Utc>, Bar>,
}

impl MinuteSeries {
    pub fn get(&self, bucket: DateTime<Utc>) -> Option<&Bar> {
        self.bars.get(&bucket)
    }

    /// Insert or replace a row unconditionally
    pub fn overwrite(&mut self, bucket: DateTime<Utc>, bar: Bar) {
        self.bars.insert(bucket, bar);
    }

    /// Insert the tick verbatim if the bucket is empty, otherwise merge it
    /// into the existing row (open kept, range widened, last close wins).
    pub fn merge_tick(&mut self, bucket: DateTime<Utc>, tick: Bar) {
        match self.bars.get_mut(&bucket) {
            Some(existing) => existing.merge_tick(&tick),
            None => {
                self.bars.insert(bucket, tick);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Bars in ascending bucket order
    pub fn iter(&self) -> impl Iterator<Item = (&DateTime<Utc>, &Bar)> {
        self.bars.iter()
    }

    /// Most recent `n` closes in ascending bucket order, ending at `as_of`
    pub fn closes_up_to(&self, as_of: DateTime<Utc>, n: usize) -> Vec<Decimal> {
        let mut closes: Vec<Decimal> = self
            .bars
            .range(..=as_of)
            .rev()
            .take(n)
            .map(|(_, bar)| bar.close)
            .collect();
        closes.reverse();
        closes
    }

    pub fn last(&self) -> Option<(&DateTime<Utc>, &Bar)> {
        self.bars.iter().next_back()
    }
}

/// One ordered, mutable OHLCV series per tracked symbol, plus per-symbol
/// session counters. The tracked-symbol set is fixed at session start;
/// events for unknown symbols create nothing.
#[derive(Debug, Default)]
pub struct TimeSeriesStore {
    series: HashMap<String, MinuteSeries>,
    volume_today: HashMap<String, u64>,
    prev_closes: HashMap<String, Decimal>,
}

impl TimeSeriesStore {
    pub fn new(symbols: impl IntoIterator<Item = String>) -> Self {
        let series: HashMap<String, MinuteSeries> = symbols
            .into_iter()
            .map(|s| (s, MinuteSeries::default()))
            .collect();
        Self {
            series,
            volume_today: HashMap::new(),
            prev_closes: HashMap::new(),
        }
    }

    pub fn is_tracked(&self, symbol: &str) -> bool {
        self.series.contains_key(symbol)
    }

    pub fn symbols(&self) -> Vec<String> {
        self.series.keys().cloned().collect()
    }

    pub fn series(&self, symbol: &str) -> Option<&MinuteSeries> {
        self.series.get(symbol)
    }

    pub fn series_mut(&mut self, symbol: &str) -> Option<&mut MinuteSeries> {
        self.series.get_mut(symbol)
    }

    /// Seed one symbol's series from historical backfill
    pub fn seed(&mut self, symbol: &str, bars: impl IntoIterator<Item = (DateTime<Utc>, Bar)>) {
        if let Some(series) = self.series.get_mut(symbol) {
            for (bucket, bar) in bars {
                series.overwrite(bucket, bar);
            }
        }
    }

    pub fn set_prev_close(&mut self, symbol: &str, close: Decimal) {
        if self.is_tracked(symbol) {
            self.prev_closes.insert(symbol.to_string(), close);
        }
    }

    pub fn prev_close(&self, symbol: &str) -> Option<Decimal> {
        self.prev_closes.get(symbol).copied()
    }

    pub fn set_volume_today(&mut self, symbol: &str, volume: u64) {
        if self.is_tracked(symbol) {
            self.volume_today.insert(symbol.to_string(), volume);
        }
    }

    pub fn add_volume_today(&mut self, symbol: &str, volume: u64) {
        if let Some(v) = self.volume_today.get_mut(symbol) {
            *v += volume;
        } else if self.is_tracked(symbol) {
            self.volume_today.insert(symbol.to_string(), volume);
        }
    }

    pub fn volume_today(&self, symbol: &str) -> u64 {
        self.volume_today.get(symbol).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn bar(close: Decimal) -> Bar {
        Bar::new(close, close, close, close, 1)
    }

    #[test]
    fn untracked_symbols_are_not_seeded() {
        let mut store = TimeSeriesStore::new(["AAPL".to_string()]);
        let bucket = Utc.with_ymd_and_hms(2024, 3, 14, 9, 30, 0).unwrap();

        store.seed("TSLA", [(bucket, bar(dec!(200)))]);
        assert!(!store.is_tracked("TSLA"));
        assert!(store.series("TSLA").is_none());

        store.seed("AAPL", [(bucket, bar(dec!(100)))]);
        assert_eq!(store.series("AAPL").unwrap().len(), 1);
    }

    #[test]
    fn closes_up_to_returns_ascending_window() {
        let mut series = MinuteSeries::default();
        let t0 = Utc.with_ymd_and_hms(2024, 3, 14, 9, 30, 0).unwrap();
        for i in 0..5 {
            series.overwrite(t0 + chrono::Duration::minutes(i), bar(Decimal::from(100 + i)));
        }

        let closes = series.closes_up_to(t0 + chrono::Duration::minutes(3), 3);
        assert_eq!(closes, vec![dec!(101), dec!(102), dec!(103)]);
    }
}
