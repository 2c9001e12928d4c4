//! Per-bar strategy dispatch.
//!
//! For each (symbol, minute bucket) signalled by the aggregator: enforce the
//! aging-order cancel policy, the pre-close liquidation cutoff, then walk
//! strategies in priority order until one acts. At most one order goes out
//! per symbol per bar.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::broker::{BrokerClient, MarketDataFeed};
use crate::domain::{OpenOrder, OrderRequest};
use crate::error::Result;
use crate::session::SessionWindow;
use crate::state::SessionState;
use crate::strategy::liquidation;
use crate::strategy::traits::{Signal, Strategy};

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Minutes to the close at or under which liquidation replaces
    /// strategy evaluation
    pub liquidation_cutoff_minutes: i64,
    /// Minimum age before an unfilled order is cancelled for resubmission
    pub stale_order_minutes: i64,
    /// Minutes after the open during which strategies sit out the
    /// opening auction noise
    pub cool_down_minutes: i64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            liquidation_cutoff_minutes: 15,
            stale_order_minutes: 1,
            cool_down_minutes: 5,
        }
    }
}

pub struct StrategyDispatch {
    strategies: Vec<Arc<dyn Strategy>>,
    broker: Arc<dyn BrokerClient>,
    feed: Arc<dyn MarketDataFeed>,
    config: DispatchConfig,
}

impl StrategyDispatch {
    pub fn new(
        strategies: Vec<Arc<dyn Strategy>>,
        broker: Arc<dyn BrokerClient>,
        feed: Arc<dyn MarketDataFeed>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            strategies,
            broker,
            feed,
            config,
        }
    }

    /// Handle one aggregator signal for `symbol`.
    ///
    /// `bucket` is the minute row strategies read; `event_ts` is the
    /// originating tick's timestamp, used for order-age checks and the
    /// time-to-close computation.
    pub async fn on_bar(
        &self,
        state: &mut SessionState,
        symbol: &str,
        bucket: DateTime<Utc>,
        event_ts: DateTime<Utc>,
        window: &SessionWindow,
    ) -> Result<()> {
        // An outstanding order suppresses evaluation entirely. Checked
        // before any await so a submission cannot race a later bar.
        if let Some(order) = state.open_order(symbol) {
            if order.is_stale(event_ts, Duration::minutes(self.config.stale_order_minutes)) {
                info!(
                    %symbol,
                    order_id = %order.broker_order_id,
                    submitted_at = %order.submitted_at,
                    "cancelling aged unfilled order"
                );
                let order_id = order.broker_order_id.clone();
                if let Err(e) = self.broker.cancel_order(&order_id).await {
                    warn!(%symbol, "failed to cancel aged order: {e}");
                }
            }
            return Ok(());
        }

        let position_qty = state.position_qty(symbol);

        if window.minutes_to_close(event_ts) <= self.config.liquidation_cutoff_minutes {
            info!(
                %symbol,
                minutes_to_close = window.minutes_to_close(event_ts),
                "inside liquidation cutoff"
            );
            return liquidation::liquidate(state, symbol, self.broker.as_ref(), self.feed.as_ref())
                .await;
        }

        if !window.cooled_down(event_ts, self.config.cool_down_minutes) {
            debug!(%symbol, "inside post-open cool-down, skipping evaluation");
            return Ok(());
        }

        let mut acted: Option<(Arc<dyn Strategy>, Signal)> = None;
        if let Some(series) = state.series.series(symbol) {
            for strategy in &self.strategies {
                match strategy.evaluate(symbol, position_qty, series, bucket).await {
                    Ok(Some(signal)) => {
                        info!(strategy = strategy.name(), %symbol, "strategy acted");
                        acted = Some((Arc::clone(strategy), signal));
                        break;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(strategy = strategy.name(), %symbol, "strategy evaluation failed: {e}");
                    }
                }
            }
        }

        if let Some((strategy, signal)) = acted {
            self.submit_signal(state, symbol, strategy.as_ref(), signal)
                .await;
        }
        Ok(())
    }

    /// Submit the signalled order and record the bookkeeping that
    /// reconciliation depends on. On transport failure state is left
    /// unchanged so the next bar retries the decision.
    async fn submit_signal(
        &self,
        state: &mut SessionState,
        symbol: &str,
        strategy: &dyn Strategy,
        signal: Signal,
    ) {
        let request = OrderRequest {
            symbol: symbol.to_string(),
            qty: signal.qty,
            side: signal.side,
            order_type: signal.order_type,
            limit_price: signal.limit_price,
            time_in_force: signal.time_in_force,
        };

        match self.broker.submit_order(&request).await {
            Ok(placed) => {
                state.set_indicators(symbol, signal.side, signal.indicators);
                state.set_exit_prices(symbol, signal.stop_price, signal.target_price);
                state.set_open_order(OpenOrder::from_placed(&placed, Some(strategy.run_id())));
                info!(
                    %symbol,
                    side = %signal.side,
                    qty = signal.qty,
                    order_id = %placed.order_id,
                    strategy = strategy.name(),
                    "order submitted"
                );
            }
            Err(e) => {
                warn!(%symbol, "order submission failed, will retry next bar: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use uuid::Uuid;

    use crate::domain::{Bar, OrderSide, OrderType, PlacedOrder, TimeInForce};
    use crate::error::TraderError;
    use crate::market_data::MinuteSeries;

    #[derive(Default)]
    struct FakeBroker {
        submitted: Mutex<Vec<OrderRequest>>,
        cancelled: Mutex<Vec<String>>,
        fail_submissions: bool,
    }

    #[async_trait]
    impl BrokerClient for FakeBroker {
        async fn submit_order(&self, request: &OrderRequest) -> Result<PlacedOrder> {
            if self.fail_submissions {
                return Err(TraderError::OrderSubmission("transport down".to_string()));
            }
            self.submitted.lock().unwrap().push(request.clone());
            Ok(PlacedOrder {
                order_id: format!("ord-{}", self.submitted.lock().unwrap().len()),
                symbol: request.symbol.clone(),
                side: request.side,
                qty: request.qty,
                submitted_at: Utc::now(),
            })
        }

        async fn cancel_order(&self, order_id: &str) -> Result<()> {
            self.cancelled.lock().unwrap().push(order_id.to_string());
            Ok(())
        }

        async fn list_open_orders(&self) -> Result<Vec<PlacedOrder>> {
            Ok(Vec::new())
        }

        async fn list_positions(&self) -> Result<Vec<crate::broker::BrokerPosition>> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct FakeFeed {
        unsubscribed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MarketDataFeed for FakeFeed {
        async fn subscribe(&self, _channels: &[String]) -> Result<()> {
            Ok(())
        }

        async fn unsubscribe(&self, channels: &[String]) -> Result<()> {
            self.unsubscribed
                .lock()
                .unwrap()
                .extend(channels.iter().cloned());
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    /// Always acts with a fixed buy signal
    struct AlwaysAct {
        run_id: Uuid,
        evaluations: AtomicUsize,
    }

    impl AlwaysAct {
        fn new() -> Self {
            Self {
                run_id: Uuid::new_v4(),
                evaluations: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Strategy for AlwaysAct {
        fn name(&self) -> &str {
            "always-act"
        }

        fn run_id(&self) -> Uuid {
            self.run_id
        }

        async fn evaluate(
            &self,
            _symbol: &str,
            _position_qty: i64,
            _series: &MinuteSeries,
            _as_of: DateTime<Utc>,
        ) -> Result<Option<Signal>> {
            self.evaluations.fetch_add(1, Ordering::SeqCst);
            Ok(Some(Signal {
                side: OrderSide::Buy,
                qty: 100,
                order_type: OrderType::Market,
                limit_price: None,
                time_in_force: TimeInForce::Day,
                indicators: json!({"signal": "test"}),
                stop_price: None,
                target_price: None,
            }))
        }
    }

    fn window() -> SessionWindow {
        SessionWindow {
            market_open: Utc.with_ymd_and_hms(2024, 3, 14, 13, 30, 0).unwrap(),
            market_close: Utc.with_ymd_and_hms(2024, 3, 14, 20, 0, 0).unwrap(),
        }
    }

    fn state_with_bar(ts: DateTime<Utc>) -> SessionState {
        let mut state = SessionState::new(["AAPL".to_string()]);
        state
            .series
            .series_mut("AAPL")
            .unwrap()
            .overwrite(ts, Bar::new(dec!(100), dec!(101), dec!(99), dec!(100), 10));
        state
    }

    fn mid_session() -> DateTime<Utc> {
        // Two hours before the close, well outside the cutoff
        Utc.with_ymd_and_hms(2024, 3, 14, 18, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn first_acting_strategy_short_circuits_the_rest() {
        let broker = Arc::new(FakeBroker::default());
        let feed = Arc::new(FakeFeed::default());
        let first = Arc::new(AlwaysAct::new());
        let second = Arc::new(AlwaysAct::new());
        let strategies: Vec<Arc<dyn Strategy>> = vec![first.clone(), second.clone()];
        let dispatch =
            StrategyDispatch::new(strategies, broker.clone(), feed, DispatchConfig::default());

        let ts = mid_session();
        let mut state = state_with_bar(ts);
        dispatch
            .on_bar(&mut state, "AAPL", ts, ts, &window())
            .await
            .unwrap();

        assert_eq!(first.evaluations.load(Ordering::SeqCst), 1);
        assert_eq!(second.evaluations.load(Ordering::SeqCst), 0);
        assert_eq!(broker.submitted.lock().unwrap().len(), 1);
        assert!(state.has_open_order("AAPL"));
    }

    #[tokio::test]
    async fn cool_down_window_suppresses_evaluation() {
        let broker = Arc::new(FakeBroker::default());
        let feed = Arc::new(FakeFeed::default());
        let strategy = Arc::new(AlwaysAct::new());
        let strategies: Vec<Arc<dyn Strategy>> = vec![strategy.clone()];
        let dispatch =
            StrategyDispatch::new(strategies, broker.clone(), feed, DispatchConfig::default());

        // Two minutes after the open, inside the default five-minute cool-down
        let ts = Utc.with_ymd_and_hms(2024, 3, 14, 13, 32, 0).unwrap();
        let mut state = state_with_bar(ts);
        dispatch
            .on_bar(&mut state, "AAPL", ts, ts, &window())
            .await
            .unwrap();

        assert_eq!(strategy.evaluations.load(Ordering::SeqCst), 0);
        assert!(broker.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn open_order_suppresses_evaluation() {
        let broker = Arc::new(FakeBroker::default());
        let feed = Arc::new(FakeFeed::default());
        let strategy = Arc::new(AlwaysAct::new());
        let strategies: Vec<Arc<dyn Strategy>> = vec![strategy.clone()];
        let dispatch =
            StrategyDispatch::new(strategies, broker.clone(), feed, DispatchConfig::default());

        let ts = mid_session();
        let mut state = state_with_bar(ts);
        state.set_open_order(OpenOrder {
            symbol: "AAPL".to_string(),
            broker_order_id: "ord-0".to_string(),
            side: OrderSide::Buy,
            submitted_qty: 100,
            // Fresh order, not yet stale
            submitted_at: ts,
            strategy_run_id: None,
        });

        dispatch
            .on_bar(&mut state, "AAPL", ts, ts, &window())
            .await
            .unwrap();

        assert_eq!(strategy.evaluations.load(Ordering::SeqCst), 0);
        assert!(broker.submitted.lock().unwrap().is_empty());
        assert!(broker.cancelled.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn aged_order_is_cancelled_and_still_suppresses_evaluation() {
        let broker = Arc::new(FakeBroker::default());
        let feed = Arc::new(FakeFeed::default());
        let strategy = Arc::new(AlwaysAct::new());
        let strategies: Vec<Arc<dyn Strategy>> = vec![strategy.clone()];
        let dispatch =
            StrategyDispatch::new(strategies, broker.clone(), feed, DispatchConfig::default());

        let ts = mid_session();
        let mut state = state_with_bar(ts);
        state.set_open_order(OpenOrder {
            symbol: "AAPL".to_string(),
            broker_order_id: "ord-0".to_string(),
            side: OrderSide::Buy,
            submitted_qty: 100,
            submitted_at: ts - Duration::minutes(2),
            strategy_run_id: None,
        });

        dispatch
            .on_bar(&mut state, "AAPL", ts, ts, &window())
            .await
            .unwrap();

        assert_eq!(
            broker.cancelled.lock().unwrap().as_slice(),
            ["ord-0".to_string()]
        );
        assert_eq!(strategy.evaluations.load(Ordering::SeqCst), 0);
        // The order clears via a canceled trade update, not here
        assert!(state.has_open_order("AAPL"));
    }

    #[tokio::test]
    async fn inside_cutoff_flat_position_unsubscribes_instead_of_trading() {
        let broker = Arc::new(FakeBroker::default());
        let feed = Arc::new(FakeFeed::default());
        let strategy = Arc::new(AlwaysAct::new());
        let strategies: Vec<Arc<dyn Strategy>> = vec![strategy.clone()];
        let dispatch = StrategyDispatch::new(
            strategies,
            broker.clone(),
            feed.clone(),
            DispatchConfig::default(),
        );

        // 14 minutes before the close
        let ts = Utc.with_ymd_and_hms(2024, 3, 14, 19, 46, 0).unwrap();
        let mut state = state_with_bar(ts);
        dispatch
            .on_bar(&mut state, "AAPL", ts, ts, &window())
            .await
            .unwrap();

        assert!(broker.submitted.lock().unwrap().is_empty());
        assert_eq!(strategy.evaluations.load(Ordering::SeqCst), 0);
        assert_eq!(
            feed.unsubscribed.lock().unwrap().as_slice(),
            crate::broker::symbol_channels("AAPL").as_slice()
        );
    }

    #[tokio::test]
    async fn inside_cutoff_open_position_submits_flattening_order() {
        let broker = Arc::new(FakeBroker::default());
        let feed = Arc::new(FakeFeed::default());
        let dispatch = StrategyDispatch::new(
            vec![],
            broker.clone(),
            feed,
            DispatchConfig::default(),
        );

        let ts = Utc.with_ymd_and_hms(2024, 3, 14, 19, 50, 0).unwrap();
        let mut state = state_with_bar(ts);
        state.import_position("AAPL", -40, dec!(4000));

        dispatch
            .on_bar(&mut state, "AAPL", ts, ts, &window())
            .await
            .unwrap();

        let submitted = broker.submitted.lock().unwrap();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].side, OrderSide::Buy);
        assert_eq!(submitted[0].qty, 40);
        assert_eq!(submitted[0].order_type, OrderType::Market);
        assert_eq!(submitted[0].time_in_force, TimeInForce::Day);
        assert!(state.has_open_order("AAPL"));
        assert_eq!(
            state.indicators("AAPL", OrderSide::Buy),
            Some(&json!({"liquidation": 1}))
        );
    }

    #[tokio::test]
    async fn failed_submission_leaves_state_unchanged_for_retry() {
        let broker = Arc::new(FakeBroker {
            fail_submissions: true,
            ..Default::default()
        });
        let feed = Arc::new(FakeFeed::default());
        let strategy = Arc::new(AlwaysAct::new());
        let strategies: Vec<Arc<dyn Strategy>> = vec![strategy.clone()];
        let dispatch = StrategyDispatch::new(strategies, broker, feed, DispatchConfig::default());

        let ts = mid_session();
        let mut state = state_with_bar(ts);
        dispatch
            .on_bar(&mut state, "AAPL", ts, ts, &window())
            .await
            .unwrap();

        assert!(!state.has_open_order("AAPL"));
        assert!(state.indicators("AAPL", OrderSide::Buy).is_none());

        // Next bar retries the decision
        dispatch
            .on_bar(&mut state, "AAPL", ts + Duration::minutes(1), ts, &window())
            .await
            .unwrap();
        assert_eq!(strategy.evaluations.load(Ordering::SeqCst), 2);
    }
}
