//! Session-scoped mutable state.
//!
//! One explicitly owned object passed to every handler: the position ledger,
//! the open-order table, partial-fill accumulators and pending indicators.
//! The engine runs handlers one at a time, so none of this needs locking.

use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashMap;

use crate::domain::{OpenOrder, OrderSide};
use crate::market_data::TimeSeriesStore;

/// Net position for one tracked symbol
#[derive(Debug, Clone, Default)]
pub struct Position {
    /// Signed net quantity; negative is short
    pub qty: i64,
    /// Cost basis imported from the broker at session start
    pub cost_basis: Decimal,
}

#[derive(Debug, Default)]
pub struct SessionState {
    pub series: TimeSeriesStore,
    positions: HashMap<String, Position>,
    open_orders: HashMap<String, OpenOrder>,
    /// Signed quantity already applied from partial fills for the
    /// current open order, per symbol
    partial_fills: HashMap<String, i64>,
    buy_indicators: HashMap<String, Value>,
    sell_indicators: HashMap<String, Value>,
    stop_prices: HashMap<String, Decimal>,
    target_prices: HashMap<String, Decimal>,
}

impl SessionState {
    pub fn new(symbols: impl IntoIterator<Item = String>) -> Self {
        let series = TimeSeriesStore::new(symbols);
        let positions = series
            .symbols()
            .into_iter()
            .map(|s| (s, Position::default()))
            .collect();
        Self {
            series,
            positions,
            ..Default::default()
        }
    }

    // --- position ledger -----------------------------------------------

    pub fn position_qty(&self, symbol: &str) -> i64 {
        self.positions.get(symbol).map(|p| p.qty).unwrap_or(0)
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    /// Import a pre-existing broker position at session start
    pub fn import_position(&mut self, symbol: &str, qty: i64, cost_basis: Decimal) {
        self.positions
            .insert(symbol.to_string(), Position { qty, cost_basis });
    }

    /// Apply a net-new fill delta to the ledger. Only reconciliation calls
    /// this.
    pub(crate) fn apply_fill_delta(&mut self, symbol: &str, delta: i64) {
        self.positions.entry(symbol.to_string()).or_default().qty += delta;
    }

    // --- open orders ----------------------------------------------------

    pub fn open_order(&self, symbol: &str) -> Option<&OpenOrder> {
        self.open_orders.get(symbol)
    }

    pub fn has_open_order(&self, symbol: &str) -> bool {
        self.open_orders.contains_key(symbol)
    }

    /// Record a newly submitted order; replaces any accumulator left over
    /// from a previous order on the symbol.
    pub fn set_open_order(&mut self, order: OpenOrder) {
        self.partial_fills.remove(&order.symbol);
        self.open_orders.insert(order.symbol.clone(), order);
    }

    /// Clear the open order and its accumulator on a terminal trade event
    pub(crate) fn clear_open_order(&mut self, symbol: &str) {
        self.open_orders.remove(symbol);
        self.partial_fills.remove(symbol);
    }

    // --- partial-fill accumulator --------------------------------------

    pub fn partial_fill_qty(&self, symbol: &str) -> i64 {
        self.partial_fills.get(symbol).copied().unwrap_or(0)
    }

    pub(crate) fn set_partial_fill_qty(&mut self, symbol: &str, qty: i64) {
        if qty == 0 {
            self.partial_fills.remove(symbol);
        } else {
            self.partial_fills.insert(symbol.to_string(), qty);
        }
    }

    // --- pending indicators and exit prices ----------------------------

    fn indicator_table(&mut self, side: OrderSide) -> &mut HashMap<String, Value> {
        match side {
            OrderSide::Buy => &mut self.buy_indicators,
            OrderSide::Sell => &mut self.sell_indicators,
        }
    }

    pub fn set_indicators(&mut self, symbol: &str, side: OrderSide, indicators: Value) {
        self.indicator_table(side)
            .insert(symbol.to_string(), indicators);
    }

    pub fn indicators(&self, symbol: &str, side: OrderSide) -> Option<&Value> {
        match side {
            OrderSide::Buy => self.buy_indicators.get(symbol),
            OrderSide::Sell => self.sell_indicators.get(symbol),
        }
    }

    pub(crate) fn take_indicators(&mut self, symbol: &str, side: OrderSide) -> Option<Value> {
        self.indicator_table(side).remove(symbol)
    }

    /// Drop any indicators captured for the symbol, both sides
    pub(crate) fn clear_indicators(&mut self, symbol: &str) {
        self.buy_indicators.remove(symbol);
        self.sell_indicators.remove(symbol);
    }

    pub fn set_exit_prices(
        &mut self,
        symbol: &str,
        stop: Option<Decimal>,
        target: Option<Decimal>,
    ) {
        if let Some(stop) = stop {
            self.stop_prices.insert(symbol.to_string(), stop);
        }
        if let Some(target) = target {
            self.target_prices.insert(symbol.to_string(), target);
        }
    }

    pub fn stop_price(&self, symbol: &str) -> Option<Decimal> {
        self.stop_prices.get(symbol).copied()
    }

    pub fn target_price(&self, symbol: &str) -> Option<Decimal> {
        self.target_prices.get(symbol).copied()
    }
}
