use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }

    /// Side that flattens a position of the given signed quantity
    pub fn flattening(position_qty: i64) -> Self {
        if position_qty < 0 {
            OrderSide::Buy
        } else {
            OrderSide::Sell
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

/// Time in force
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeInForce {
    /// Valid for the current trading session only
    Day,
    /// Good Till Cancelled
    Gtc,
}

/// Order request submitted to the broker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub qty: u64,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub limit_price: Option<Decimal>,
    pub time_in_force: TimeInForce,
}

impl OrderRequest {
    /// Market order with single-session time-in-force
    pub fn market(symbol: impl Into<String>, qty: u64, side: OrderSide) -> Self {
        Self {
            symbol: symbol.into(),
            qty,
            side,
            order_type: OrderType::Market,
            limit_price: None,
            time_in_force: TimeInForce::Day,
        }
    }

    pub fn limit(symbol: impl Into<String>, qty: u64, side: OrderSide, price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            qty,
            side,
            order_type: OrderType::Limit,
            limit_price: Some(price),
            time_in_force: TimeInForce::Day,
        }
    }
}

/// Broker acknowledgement of a submitted (or pre-existing) order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacedOrder {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub qty: u64,
    pub submitted_at: DateTime<Utc>,
}

/// The single outstanding order tracked per symbol
#[derive(Debug, Clone)]
pub struct OpenOrder {
    pub symbol: String,
    pub broker_order_id: String,
    pub side: OrderSide,
    pub submitted_qty: u64,
    pub submitted_at: DateTime<Utc>,
    /// Run that submitted the order; liquidations carry none
    pub strategy_run_id: Option<Uuid>,
}

impl OpenOrder {
    pub fn from_placed(placed: &PlacedOrder, strategy_run_id: Option<Uuid>) -> Self {
        Self {
            symbol: placed.symbol.clone(),
            broker_order_id: placed.order_id.clone(),
            side: placed.side,
            submitted_qty: placed.qty,
            submitted_at: placed.submitted_at,
            strategy_run_id,
        }
    }

    /// True when the order was submitted strictly before `as_of` and has
    /// been outstanding for at least `min_age`.
    pub fn is_stale(&self, as_of: DateTime<Utc>, min_age: Duration) -> bool {
        as_of > self.submitted_at && as_of - self.submitted_at >= min_age
    }
}
