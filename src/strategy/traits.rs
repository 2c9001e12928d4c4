//! The in-process interface this core exposes to its strategy consumers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::{OrderSide, OrderType, TimeInForce};
use crate::error::Result;
use crate::market_data::MinuteSeries;

/// Action a strategy wants taken for a symbol on the current bar.
///
/// The dispatcher submits the order, records the open-order entry and
/// captures the indicators for the eventual trade record; strategies never
/// touch session state directly.
#[derive(Debug, Clone)]
pub struct Signal {
    pub side: OrderSide,
    pub qty: u64,
    pub order_type: OrderType,
    pub limit_price: Option<Decimal>,
    pub time_in_force: TimeInForce,
    /// Opaque metadata persisted with the fill's trade record
    pub indicators: Value,
    pub stop_price: Option<Decimal>,
    pub target_price: Option<Decimal>,
}

/// A pluggable trading strategy, evaluated per bar per symbol in priority
/// order. Returning `Some` counts as having acted and short-circuits
/// lower-priority strategies for that symbol and bar.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    /// Session-scoped run id, assigned when the strategy is registered
    fn run_id(&self) -> Uuid;

    async fn evaluate(
        &self,
        symbol: &str,
        position_qty: i64,
        series: &MinuteSeries,
        as_of: DateTime<Utc>,
    ) -> Result<Option<Signal>>;
}
