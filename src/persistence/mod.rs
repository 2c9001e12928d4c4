//! Trade-record persistence boundary.
//!
//! Writes are fire-and-forget from the engine's perspective: failures are
//! logged, never retried here.

pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;

pub use postgres::PostgresTradeStore;

/// Persisted record of one completed fill
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Strategy run that submitted the order; none for liquidations
    pub run_id: Option<Uuid>,
    pub symbol: String,
    /// Filled quantity, always positive
    pub qty: u64,
    /// "buy" or "sell"
    pub operation: String,
    pub price: Decimal,
    /// Strategy-produced metadata captured at submission time
    pub indicators: Value,
}

#[async_trait]
pub trait TradeStore: Send + Sync {
    async fn save_trade_record(
        &self,
        record: &TradeRecord,
        fill_time: DateTime<Utc>,
        stop_price: Option<Decimal>,
        target_price: Option<Decimal>,
    ) -> Result<()>;

    /// Open a strategy-run row at session start
    async fn register_run(&self, run_id: Uuid, strategy: &str) -> Result<()>;

    /// Stamp a strategy run with its end time and reason at teardown
    async fn record_run_end(&self, run_id: Uuid, reason: &str) -> Result<()>;
}
