//! Order-lifecycle reconciliation.
//!
//! Consumes broker trade-update events and keeps the position ledger
//! consistent across partial fills, full fills, cancels and rejects. The
//! only component allowed to mutate positions, open orders and the
//! partial-fill accumulators.

use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::domain::{OrderSide, TradeUpdate, TradeUpdateEvent};
use crate::error::Result;
use crate::persistence::{TradeRecord, TradeStore};
use crate::state::SessionState;

pub struct Reconciler {
    store: Arc<dyn TradeStore>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn TradeStore>) -> Self {
        Self { store }
    }

    /// Apply one broker trade update to the session state.
    ///
    /// Updates for symbols with no open order are reconciliation noise:
    /// logged and discarded, never an error.
    pub async fn apply(&self, state: &mut SessionState, update: &TradeUpdate) -> Result<()> {
        let symbol = update.symbol.as_str();
        let Some(open_order) = state.open_order(symbol).cloned() else {
            warn!(event = %update.event, %symbol, "trade update without open order, discarding");
            return Ok(());
        };

        match update.event {
            TradeUpdateEvent::PartialFill => {
                let delta = self.apply_cumulative_fill(state, symbol, update);
                state.set_partial_fill_qty(symbol, update.signed_filled_qty());
                debug!(
                    %symbol,
                    delta,
                    cumulative = update.filled_qty,
                    "partial fill applied"
                );
            }
            TradeUpdateEvent::Fill => {
                let delta = self.apply_cumulative_fill(state, symbol, update);
                state.set_partial_fill_qty(symbol, 0);
                info!(
                    %symbol,
                    side = %update.side,
                    delta,
                    qty = update.filled_qty,
                    "order filled"
                );

                self.persist_fill(state, update, open_order.strategy_run_id)
                    .await;

                state.clear_open_order(symbol);
                state.clear_indicators(symbol);
            }
            TradeUpdateEvent::Canceled | TradeUpdateEvent::Rejected => {
                info!(%symbol, event = %update.event, order_id = %open_order.broker_order_id, "order closed without fill");
                state.set_partial_fill_qty(symbol, 0);
                state.clear_open_order(symbol);
                state.clear_indicators(symbol);
            }
        }

        Ok(())
    }

    /// Convert the broker's cumulative filled quantity into a net-new delta
    /// relative to what the accumulator already applied, and apply it.
    fn apply_cumulative_fill(
        &self,
        state: &mut SessionState,
        symbol: &str,
        update: &TradeUpdate,
    ) -> i64 {
        let cumulative = update.signed_filled_qty();
        let delta = cumulative - state.partial_fill_qty(symbol);
        state.apply_fill_delta(symbol, delta);
        delta
    }

    /// Persist the trade record for a completed fill.
    ///
    /// Buy fills always persist. Sell fills persist only when sell intent
    /// was recorded beforehand; a sell fill that arrives with no indicators
    /// must not forge a signal record.
    async fn persist_fill(
        &self,
        state: &mut SessionState,
        update: &TradeUpdate,
        run_id: Option<uuid::Uuid>,
    ) {
        let symbol = update.symbol.as_str();
        let price = update.filled_avg_price.unwrap_or_default();

        let record = match update.side {
            OrderSide::Buy => {
                let indicators = state
                    .take_indicators(symbol, OrderSide::Buy)
                    .unwrap_or_else(|| json!(null));
                Some(TradeRecord {
                    run_id,
                    symbol: symbol.to_string(),
                    qty: update.filled_qty,
                    operation: "buy".to_string(),
                    price,
                    indicators,
                })
            }
            OrderSide::Sell => {
                state
                    .take_indicators(symbol, OrderSide::Sell)
                    .map(|indicators| TradeRecord {
                        run_id,
                        symbol: symbol.to_string(),
                        qty: update.filled_qty,
                        operation: "sell".to_string(),
                        price,
                        indicators,
                    })
            }
        };

        let Some(record) = record else {
            debug!(%symbol, "sell fill with no recorded intent, skipping trade record");
            return;
        };

        // Fire-and-forget: a persistence failure never unwinds ledger state
        if let Err(e) = self
            .store
            .save_trade_record(
                &record,
                update.timestamp,
                state.stop_price(symbol),
                state.target_price(symbol),
            )
            .await
        {
            error!(%symbol, "failed to persist trade record: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;
    use uuid::Uuid;

    use crate::domain::OpenOrder;

    #[derive(Default)]
    struct RecordingStore {
        saved: Mutex<Vec<(TradeRecord, Option<Decimal>, Option<Decimal>)>>,
    }

    #[async_trait]
    impl TradeStore for RecordingStore {
        async fn save_trade_record(
            &self,
            record: &TradeRecord,
            _fill_time: DateTime<Utc>,
            stop_price: Option<Decimal>,
            target_price: Option<Decimal>,
        ) -> Result<()> {
            self.saved
                .lock()
                .unwrap()
                .push((record.clone(), stop_price, target_price));
            Ok(())
        }

        async fn register_run(&self, _run_id: Uuid, _strategy: &str) -> Result<()> {
            Ok(())
        }

        async fn record_run_end(&self, _run_id: Uuid, _reason: &str) -> Result<()> {
            Ok(())
        }
    }

    fn open_order(state: &mut SessionState, symbol: &str, side: OrderSide, qty: u64) {
        state.set_open_order(OpenOrder {
            symbol: symbol.to_string(),
            broker_order_id: "ord-1".to_string(),
            side,
            submitted_qty: qty,
            submitted_at: Utc::now(),
            strategy_run_id: Some(Uuid::new_v4()),
        });
    }

    fn update(
        symbol: &str,
        event: TradeUpdateEvent,
        side: OrderSide,
        filled_qty: u64,
    ) -> TradeUpdate {
        TradeUpdate {
            event,
            symbol: symbol.to_string(),
            order_id: "ord-1".to_string(),
            side,
            filled_qty,
            filled_avg_price: Some(dec!(100.25)),
            timestamp: Utc::now(),
        }
    }

    fn setup() -> (Reconciler, Arc<RecordingStore>, SessionState) {
        let store = Arc::new(RecordingStore::default());
        let reconciler = Reconciler::new(store.clone());
        let state = SessionState::new(["AAPL".to_string()]);
        (reconciler, store, state)
    }

    #[tokio::test]
    async fn cumulative_partial_fills_apply_net_new_deltas_only() {
        let (reconciler, store, mut state) = setup();
        open_order(&mut state, "AAPL", OrderSide::Buy, 100);

        reconciler
            .apply(
                &mut state,
                &update("AAPL", TradeUpdateEvent::PartialFill, OrderSide::Buy, 40),
            )
            .await
            .unwrap();
        assert_eq!(state.position_qty("AAPL"), 40);
        assert_eq!(state.partial_fill_qty("AAPL"), 40);

        reconciler
            .apply(
                &mut state,
                &update("AAPL", TradeUpdateEvent::Fill, OrderSide::Buy, 100),
            )
            .await
            .unwrap();
        assert_eq!(state.position_qty("AAPL"), 100);
        assert_eq!(state.partial_fill_qty("AAPL"), 0);
        assert!(!state.has_open_order("AAPL"));

        let saved = store.saved.lock().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].0.qty, 100);
        assert_eq!(saved[0].0.operation, "buy");
    }

    #[tokio::test]
    async fn many_partials_then_fill_match_final_cumulative_qty() {
        let (reconciler, _store, mut state) = setup();
        open_order(&mut state, "AAPL", OrderSide::Sell, 90);

        for cumulative in [10, 25, 60] {
            reconciler
                .apply(
                    &mut state,
                    &update(
                        "AAPL",
                        TradeUpdateEvent::PartialFill,
                        OrderSide::Sell,
                        cumulative,
                    ),
                )
                .await
                .unwrap();
        }
        reconciler
            .apply(
                &mut state,
                &update("AAPL", TradeUpdateEvent::Fill, OrderSide::Sell, 90),
            )
            .await
            .unwrap();

        assert_eq!(state.position_qty("AAPL"), -90);
        assert_eq!(state.partial_fill_qty("AAPL"), 0);
    }

    #[tokio::test]
    async fn duplicate_partial_fill_notification_is_idempotent() {
        let (reconciler, _store, mut state) = setup();
        open_order(&mut state, "AAPL", OrderSide::Buy, 100);

        let partial = update("AAPL", TradeUpdateEvent::PartialFill, OrderSide::Buy, 40);
        reconciler.apply(&mut state, &partial).await.unwrap();
        reconciler.apply(&mut state, &partial).await.unwrap();
        assert_eq!(state.position_qty("AAPL"), 40);
    }

    #[tokio::test]
    async fn cancel_clears_order_state_and_leaves_position_untouched() {
        let (reconciler, store, mut state) = setup();
        state.import_position("AAPL", 25, dec!(2500));
        open_order(&mut state, "AAPL", OrderSide::Buy, 100);
        state.set_indicators("AAPL", OrderSide::Buy, json!({"macd": 0.4}));

        reconciler
            .apply(
                &mut state,
                &update("AAPL", TradeUpdateEvent::Canceled, OrderSide::Buy, 0),
            )
            .await
            .unwrap();

        assert_eq!(state.position_qty("AAPL"), 25);
        assert!(!state.has_open_order("AAPL"));
        assert_eq!(state.partial_fill_qty("AAPL"), 0);
        assert!(state.indicators("AAPL", OrderSide::Buy).is_none());
        assert!(store.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejected_after_partials_rolls_forward_nothing_more() {
        let (reconciler, _store, mut state) = setup();
        open_order(&mut state, "AAPL", OrderSide::Buy, 100);

        reconciler
            .apply(
                &mut state,
                &update("AAPL", TradeUpdateEvent::PartialFill, OrderSide::Buy, 30),
            )
            .await
            .unwrap();
        reconciler
            .apply(
                &mut state,
                &update("AAPL", TradeUpdateEvent::Rejected, OrderSide::Buy, 30),
            )
            .await
            .unwrap();

        // Partial fill already happened at the broker; only order-tracking
        // state resets.
        assert_eq!(state.position_qty("AAPL"), 30);
        assert_eq!(state.partial_fill_qty("AAPL"), 0);
        assert!(!state.has_open_order("AAPL"));
    }

    #[tokio::test]
    async fn update_without_open_order_is_discarded() {
        let (reconciler, store, mut state) = setup();

        reconciler
            .apply(
                &mut state,
                &update("AAPL", TradeUpdateEvent::Fill, OrderSide::Buy, 100),
            )
            .await
            .unwrap();

        assert_eq!(state.position_qty("AAPL"), 0);
        assert!(store.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn sell_fill_without_intent_clears_state_but_persists_nothing() {
        let (reconciler, store, mut state) = setup();
        state.import_position("AAPL", 50, dec!(5000));
        open_order(&mut state, "AAPL", OrderSide::Sell, 50);

        reconciler
            .apply(
                &mut state,
                &update("AAPL", TradeUpdateEvent::Fill, OrderSide::Sell, 50),
            )
            .await
            .unwrap();

        assert_eq!(state.position_qty("AAPL"), 0);
        assert!(!state.has_open_order("AAPL"));
        assert!(store.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn liquidation_sell_fill_persists_with_its_marker() {
        let (reconciler, store, mut state) = setup();
        state.import_position("AAPL", 50, dec!(5000));
        open_order(&mut state, "AAPL", OrderSide::Sell, 50);
        state.set_indicators("AAPL", OrderSide::Sell, json!({"liquidation": 1}));
        state.set_exit_prices("AAPL", Some(dec!(95)), Some(dec!(110)));

        reconciler
            .apply(
                &mut state,
                &update("AAPL", TradeUpdateEvent::Fill, OrderSide::Sell, 50),
            )
            .await
            .unwrap();

        let saved = store.saved.lock().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].0.operation, "sell");
        assert_eq!(saved[0].0.indicators, json!({"liquidation": 1}));
        assert_eq!(saved[0].1, Some(dec!(95)));
        assert_eq!(saved[0].2, Some(dec!(110)));
    }
}
