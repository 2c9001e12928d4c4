use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::domain::{Bar, OrderRequest, PlacedOrder};
use crate::error::Result;
use crate::session::SessionWindow;

/// Pre-existing broker position reported at startup
#[derive(Debug, Clone)]
pub struct BrokerPosition {
    pub symbol: String,
    pub qty: i64,
    pub cost_basis: Decimal,
}

/// Broker order commands and queries.
///
/// Submission and cancellation are best-effort: the broker transport gives
/// no exactly-once guarantee, so callers leave local state unchanged on
/// error and let the next bar retry the decision.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    async fn submit_order(&self, request: &OrderRequest) -> Result<PlacedOrder>;

    async fn cancel_order(&self, order_id: &str) -> Result<()>;

    async fn list_open_orders(&self) -> Result<Vec<PlacedOrder>>;

    async fn list_positions(&self) -> Result<Vec<BrokerPosition>>;
}

/// Real-time data subscription control
#[async_trait]
pub trait MarketDataFeed: Send + Sync {
    async fn subscribe(&self, channels: &[String]) -> Result<()>;

    async fn unsubscribe(&self, channels: &[String]) -> Result<()>;

    /// Close every open subscription at session end
    async fn close(&self) -> Result<()>;
}

/// Historical minute-bar backfill used to seed the time-series store
#[async_trait]
pub trait HistoricalData: Send + Sync {
    async fn get_historical_data(
        &self,
        symbols: &[String],
    ) -> Result<HashMap<String, Vec<(DateTime<Utc>, Bar)>>>;
}

/// Exchange trading-calendar lookup. Failure here is fatal to session start.
#[async_trait]
pub trait TradingCalendar: Send + Sync {
    async fn session_window(&self, date: NaiveDate) -> Result<SessionWindow>;
}
