//! Deterministic in-memory broker for dry runs and tests.
//!
//! Accepts every order immediately and records subscription changes without
//! any transport. Fills are not auto-generated; tests drive them explicitly
//! through [`PaperBroker::emit_fill`] so fill ordering stays deterministic.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{EngineEvent, OrderRequest, PlacedOrder, TradeUpdate, TradeUpdateEvent};
use crate::error::{Result, TraderError};

use super::traits::{BrokerClient, BrokerPosition, MarketDataFeed};

#[derive(Debug, Default)]
struct PaperState {
    orders: HashMap<String, PlacedOrder>,
    subscriptions: Vec<String>,
    closed: bool,
}

pub struct PaperBroker {
    state: Mutex<PaperState>,
    events: Option<mpsc::Sender<EngineEvent>>,
}

impl PaperBroker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PaperState::default()),
            events: None,
        }
    }

    /// Wire an event channel so emitted fills reach the engine loop
    pub fn with_events(events: mpsc::Sender<EngineEvent>) -> Self {
        Self {
            state: Mutex::new(PaperState::default()),
            events: Some(events),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PaperState> {
        self.state.lock().expect("paper broker state poisoned")
    }

    pub fn open_order_count(&self) -> usize {
        self.lock().orders.len()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.lock().subscriptions.clone()
    }

    /// Emit a trade update for a previously accepted order.
    ///
    /// `filled_qty` is cumulative, matching the live broker's semantics.
    pub async fn emit_fill(
        &self,
        order_id: &str,
        event: TradeUpdateEvent,
        filled_qty: u64,
        price: Decimal,
    ) -> Result<()> {
        let order = self
            .lock()
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| TraderError::BrokerQuery(format!("unknown order {order_id}")))?;
        if event.is_terminal() {
            self.lock().orders.remove(order_id);
        }

        let update = TradeUpdate {
            event,
            symbol: order.symbol,
            order_id: order.order_id,
            side: order.side,
            filled_qty,
            filled_avg_price: Some(price),
            timestamp: Utc::now(),
        };
        if let Some(events) = &self.events {
            events
                .send(EngineEvent::TradeUpdate(update))
                .await
                .map_err(|e| TraderError::Internal(format!("event channel closed: {e}")))?;
        }
        Ok(())
    }
}

impl Default for PaperBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerClient for PaperBroker {
    async fn submit_order(&self, request: &OrderRequest) -> Result<PlacedOrder> {
        let placed = PlacedOrder {
            order_id: Uuid::new_v4().to_string(),
            symbol: request.symbol.clone(),
            side: request.side,
            qty: request.qty,
            submitted_at: Utc::now(),
        };
        info!(
            symbol = %placed.symbol,
            side = %placed.side,
            qty = placed.qty,
            order_id = %placed.order_id,
            "paper order accepted"
        );
        self.lock()
            .orders
            .insert(placed.order_id.clone(), placed.clone());
        Ok(placed)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        // Idempotent: cancelling an unknown or already-terminal order is a no-op
        self.lock().orders.remove(order_id);
        debug!(%order_id, "paper order cancelled");
        Ok(())
    }

    async fn list_open_orders(&self) -> Result<Vec<PlacedOrder>> {
        Ok(self.lock().orders.values().cloned().collect())
    }

    async fn list_positions(&self) -> Result<Vec<BrokerPosition>> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl MarketDataFeed for PaperBroker {
    async fn subscribe(&self, channels: &[String]) -> Result<()> {
        let mut state = self.lock();
        for channel in channels {
            if !state.subscriptions.contains(channel) {
                state.subscriptions.push(channel.clone());
            }
        }
        debug!(count = channels.len(), "paper feed subscribed");
        Ok(())
    }

    async fn unsubscribe(&self, channels: &[String]) -> Result<()> {
        let mut state = self.lock();
        state.subscriptions.retain(|c| !channels.contains(c));
        debug!(count = channels.len(), "paper feed unsubscribed");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.lock();
        state.subscriptions.clear();
        state.closed = true;
        info!("paper feed closed");
        Ok(())
    }
}
