//! External collaborator boundaries: broker commands and queries, the
//! real-time feed, historical backfill and the trading calendar.

pub mod paper;
pub mod traits;

pub use paper::PaperBroker;
pub use traits::{BrokerClient, BrokerPosition, HistoricalData, MarketDataFeed, TradingCalendar};

/// Feed channel carrying sub-minute tick bars for a symbol
pub fn tick_channel(symbol: &str) -> String {
    format!("A.{symbol}")
}

/// Feed channel carrying authoritative minute bars for a symbol
pub fn minute_channel(symbol: &str) -> String {
    format!("AM.{symbol}")
}

/// Both data channels for a symbol, as passed to subscribe/unsubscribe
pub fn symbol_channels(symbol: &str) -> Vec<String> {
    vec![tick_channel(symbol), minute_channel(symbol)]
}
