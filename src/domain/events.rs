//! Events consumed by the engine loop.
//!
//! The broker feed's callback channels are modelled as explicit tagged
//! variants so every handler is a plain function of (event, session state).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::order::OrderSide;

/// OHLCV event from the real-time feed, at tick (sub-minute) or minute
/// granularity depending on the channel it arrived on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarEvent {
    pub symbol: String,
    /// Start of the bucket the feed aggregated over
    pub bucket_start: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: u64,
}

/// Kind of a broker trade-update notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeUpdateEvent {
    PartialFill,
    Fill,
    Canceled,
    Rejected,
}

impl TradeUpdateEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TradeUpdateEvent::Fill | TradeUpdateEvent::Canceled | TradeUpdateEvent::Rejected
        )
    }
}

impl std::fmt::Display for TradeUpdateEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeUpdateEvent::PartialFill => write!(f, "partial_fill"),
            TradeUpdateEvent::Fill => write!(f, "fill"),
            TradeUpdateEvent::Canceled => write!(f, "canceled"),
            TradeUpdateEvent::Rejected => write!(f, "rejected"),
        }
    }
}

/// Broker trade-update notification.
///
/// `filled_qty` is the broker's *cumulative* filled quantity for the order,
/// not the increment since the previous notification. Reconciliation depends
/// on this; verify against the broker's actual event semantics before
/// switching transports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeUpdate {
    pub event: TradeUpdateEvent,
    pub symbol: String,
    pub order_id: String,
    pub side: OrderSide,
    pub filled_qty: u64,
    pub filled_avg_price: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
}

impl TradeUpdate {
    /// Cumulative filled quantity, negative for the sell side
    pub fn signed_filled_qty(&self) -> i64 {
        let qty = self.filled_qty as i64;
        match self.side {
            OrderSide::Buy => qty,
            OrderSide::Sell => -qty,
        }
    }
}

/// Top-level event consumed by the engine's dispatcher loop
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Sub-minute tick bar from the data feed
    Tick(BarEvent),
    /// Authoritative minute bar from the data feed
    MinuteBar(BarEvent),
    /// Order lifecycle notification from the broker
    TradeUpdate(TradeUpdate),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn signed_filled_qty_negates_sells() {
        let update = TradeUpdate {
            event: TradeUpdateEvent::Fill,
            symbol: "AAPL".to_string(),
            order_id: "ord-1".to_string(),
            side: OrderSide::Sell,
            filled_qty: 40,
            filled_avg_price: Some(dec!(101.5)),
            timestamp: Utc::now(),
        };
        assert_eq!(update.signed_filled_qty(), -40);
    }
}
