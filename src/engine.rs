//! Event dispatcher loop.
//!
//! Every bar event, trade update and the teardown signal funnel into one
//! task; handler bodies run to their next await without preemption, which is
//! what lets the session state go unlocked.

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use crate::broker::{symbol_channels, BrokerClient, HistoricalData, MarketDataFeed};
use crate::domain::{BarEvent, EngineEvent};
use crate::error::Result;
use crate::market_data::{apply_minute_bar, apply_tick};
use crate::reconcile::Reconciler;
use crate::session::SessionWindow;
use crate::state::SessionState;
use crate::strategy::StrategyDispatch;

pub struct TradingEngine {
    state: SessionState,
    dispatch: StrategyDispatch,
    reconciler: Reconciler,
    broker: Arc<dyn BrokerClient>,
    feed: Arc<dyn MarketDataFeed>,
    window: SessionWindow,
}

impl TradingEngine {
    pub fn new(
        state: SessionState,
        dispatch: StrategyDispatch,
        reconciler: Reconciler,
        broker: Arc<dyn BrokerClient>,
        feed: Arc<dyn MarketDataFeed>,
        window: SessionWindow,
    ) -> Self {
        Self {
            state,
            dispatch,
            reconciler,
            broker,
            feed,
            window,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Seed session state from the outside world before the first event:
    /// historical backfill, pre-existing broker orders and positions, then
    /// the data subscriptions.
    pub async fn seed(&mut self, history: &dyn HistoricalData) -> Result<()> {
        let symbols = self.state.series.symbols();
        info!(count = symbols.len(), "tracking symbols");

        let backfill = history.get_historical_data(&symbols).await?;
        for (symbol, bars) in backfill {
            self.state.series.seed(&symbol, bars);
        }

        // Derive the session counters from the backfill: last close before
        // the open is the previous session's close, and bars inside today's
        // window already count toward the running volume.
        for symbol in &symbols {
            let Some(series) = self.state.series.series(symbol) else {
                continue;
            };
            let mut prev_close = None;
            let mut volume = 0u64;
            for (bucket, bar) in series.iter() {
                if *bucket < self.window.market_open {
                    prev_close = Some(bar.close);
                } else {
                    volume += bar.volume;
                }
            }
            if let Some(close) = prev_close {
                self.state.series.set_prev_close(symbol, close);
            }
            if volume > 0 {
                self.state.series.set_volume_today(symbol, volume);
            }
        }

        // Orders left over from a previous run would violate the
        // one-open-order-per-symbol invariant; cancel them up front.
        for order in self.broker.list_open_orders().await? {
            if self.state.series.is_tracked(&order.symbol) {
                info!(symbol = %order.symbol, order_id = %order.order_id, "cancelling pre-existing order");
                if let Err(e) = self.broker.cancel_order(&order.order_id).await {
                    warn!(symbol = %order.symbol, "failed to cancel pre-existing order: {e}");
                }
            }
        }

        for position in self.broker.list_positions().await? {
            if self.state.series.is_tracked(&position.symbol) {
                info!(symbol = %position.symbol, qty = position.qty, "importing pre-existing position");
                self.state
                    .import_position(&position.symbol, position.qty, position.cost_basis);
            }
        }

        let mut channels = Vec::with_capacity(symbols.len() * 2);
        for symbol in &symbols {
            channels.extend(symbol_channels(symbol));
        }
        self.feed.subscribe(&channels).await?;

        Ok(())
    }

    /// Consume events until the channel closes or the halt signal fires.
    ///
    /// Per-event failures are transport or reconciliation noise: logged, the
    /// loop keeps going. Only the halt signal (or channel closure) ends the
    /// session.
    pub async fn run(
        &mut self,
        mut events: mpsc::Receiver<EngineEvent>,
        mut halt: watch::Receiver<bool>,
    ) {
        info!("engine loop started");
        loop {
            tokio::select! {
                changed = halt.changed() => {
                    if changed.is_err() || *halt.borrow() {
                        info!("halt signalled, engine loop stopping");
                        break;
                    }
                }
                event = events.recv() => match event {
                    Some(event) => {
                        if let Err(e) = self.handle(event).await {
                            error!("event handling failed: {e}");
                        }
                    }
                    None => {
                        info!("event channel closed, engine loop stopping");
                        break;
                    }
                },
            }
        }
    }

    pub async fn handle(&mut self, event: EngineEvent) -> Result<()> {
        match event {
            EngineEvent::Tick(bar) => self.on_tick(bar).await,
            EngineEvent::MinuteBar(bar) => {
                apply_minute_bar(&mut self.state.series, &bar);
                Ok(())
            }
            EngineEvent::TradeUpdate(update) => {
                self.reconciler.apply(&mut self.state, &update).await
            }
        }
    }

    async fn on_tick(&mut self, bar: BarEvent) -> Result<()> {
        let Some(bucket) = apply_tick(&mut self.state.series, &bar) else {
            return Ok(());
        };
        self.dispatch
            .on_bar(
                &mut self.state,
                &bar.symbol,
                bucket,
                bar.bucket_start,
                &self.window,
            )
            .await
    }
}
