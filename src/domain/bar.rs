use chrono::{DateTime, Timelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One OHLCV record for a symbol over a fixed time bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: u64,
}

impl Bar {
    pub fn new(open: Decimal, high: Decimal, low: Decimal, close: Decimal, volume: u64) -> Self {
        Self {
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Merge a later same-minute tick into this bar.
    ///
    /// Open is kept, high/low widen, close is the most recent observation,
    /// volumes sum. Order-sensitive on purpose: only the close is provisional.
    pub fn merge_tick(&mut self, tick: &Bar) {
        self.high = self.high.max(tick.high);
        self.low = self.low.min(tick.low);
        self.close = tick.close;
        self.volume += tick.volume;
    }
}

/// Truncate a timestamp to its minute bucket
pub fn minute_bucket(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn minute_bucket_truncates_seconds_and_subseconds() {
        let ts = Utc
            .with_ymd_and_hms(2024, 3, 14, 9, 30, 42)
            .unwrap()
            .with_nanosecond(123_456_789)
            .unwrap();
        let bucket = minute_bucket(ts);
        assert_eq!(bucket, Utc.with_ymd_and_hms(2024, 3, 14, 9, 30, 0).unwrap());
    }

    #[test]
    fn merge_tick_keeps_open_widens_range_sums_volume() {
        let mut bar = Bar::new(dec!(100), dec!(101), dec!(99), dec!(100.5), 10);
        let tick = Bar::new(dec!(100.5), dec!(102), dec!(100), dec!(101), 15);

        bar.merge_tick(&tick);

        assert_eq!(bar.open, dec!(100));
        assert_eq!(bar.high, dec!(102));
        assert_eq!(bar.low, dec!(99));
        assert_eq!(bar.close, dec!(101));
        assert_eq!(bar.volume, 25);
    }
}
