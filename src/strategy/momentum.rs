//! Sample short-momentum strategy.
//!
//! Shorts a symbol after a sharp drop over the lookback window and covers on
//! mean reversion. Mostly here to exercise the dispatch contract; real
//! deployments register their own implementations of [`Strategy`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::domain::{OrderSide, OrderType, TimeInForce};
use crate::error::Result;
use crate::market_data::MinuteSeries;

use super::traits::{Signal, Strategy};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomentumShortConfig {
    /// Bars to look back when measuring momentum
    pub lookback_minutes: usize,
    /// Fractional drop over the lookback that triggers a short entry
    /// (0.02 = 2%)
    pub entry_drop_pct: Decimal,
    /// Fractional rebound from the entry-bar close that triggers a cover
    pub cover_rebound_pct: Decimal,
    pub shares: u64,
}

impl Default for MomentumShortConfig {
    fn default() -> Self {
        Self {
            lookback_minutes: 10,
            entry_drop_pct: dec!(0.02),
            cover_rebound_pct: dec!(0.01),
            shares: 100,
        }
    }
}

pub struct MomentumShort {
    run_id: Uuid,
    config: MomentumShortConfig,
}

impl MomentumShort {
    pub fn new(config: MomentumShortConfig) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            config,
        }
    }

    fn momentum(&self, series: &MinuteSeries, as_of: DateTime<Utc>) -> Option<(Decimal, Decimal)> {
        let closes = series.closes_up_to(as_of, self.config.lookback_minutes);
        if closes.len() < self.config.lookback_minutes {
            return None;
        }
        let first = *closes.first()?;
        let last = *closes.last()?;
        if first.is_zero() {
            return None;
        }
        Some(((last - first) / first, last))
    }
}

#[async_trait]
impl Strategy for MomentumShort {
    fn name(&self) -> &str {
        "momentum_short"
    }

    fn run_id(&self) -> Uuid {
        self.run_id
    }

    async fn evaluate(
        &self,
        _symbol: &str,
        position_qty: i64,
        series: &MinuteSeries,
        as_of: DateTime<Utc>,
    ) -> Result<Option<Signal>> {
        let Some((momentum, last_close)) = self.momentum(series, as_of) else {
            return Ok(None);
        };

        if position_qty == 0 && momentum <= -self.config.entry_drop_pct {
            let stop = last_close * (Decimal::ONE + self.config.cover_rebound_pct);
            let target = last_close * (Decimal::ONE - self.config.entry_drop_pct);
            return Ok(Some(Signal {
                side: OrderSide::Sell,
                qty: self.config.shares,
                order_type: OrderType::Market,
                limit_price: None,
                time_in_force: TimeInForce::Day,
                indicators: json!({ "momentum": momentum.to_string() }),
                stop_price: Some(stop),
                target_price: Some(target),
            }));
        }

        if position_qty < 0 && momentum >= self.config.cover_rebound_pct {
            return Ok(Some(Signal {
                side: OrderSide::Buy,
                qty: position_qty.unsigned_abs(),
                order_type: OrderType::Market,
                limit_price: None,
                time_in_force: TimeInForce::Day,
                indicators: json!({ "momentum": momentum.to_string(), "cover": true }),
                stop_price: None,
                target_price: None,
            }));
        }

        Ok(None)
    }
}
