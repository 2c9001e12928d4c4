//! Forced position flattening ahead of the close or at teardown.

use serde_json::json;
use tracing::{error, info, warn};

use crate::broker::{symbol_channels, BrokerClient, MarketDataFeed};
use crate::domain::{OpenOrder, OrderRequest, OrderSide};
use crate::error::Result;
use crate::state::SessionState;

/// Flatten the symbol's position with a market order, or tear down its data
/// subscription when already flat. Submission failures are reported and do
/// not stop liquidation of other symbols.
pub async fn liquidate(
    state: &mut SessionState,
    symbol: &str,
    broker: &dyn BrokerClient,
    feed: &dyn MarketDataFeed,
) -> Result<()> {
    let position_qty = state.position_qty(symbol);

    if position_qty != 0 {
        info!(%symbol, position_qty, "liquidating remaining position");
        let side = OrderSide::flattening(position_qty);
        // Mark the fill as a liquidation so reconciliation records it as
        // such instead of a strategy signal.
        state.set_indicators(symbol, side, json!({"liquidation": 1}));

        let request = OrderRequest::market(symbol, position_qty.unsigned_abs(), side);
        match broker.submit_order(&request).await {
            Ok(placed) => {
                state.set_open_order(OpenOrder::from_placed(&placed, None));
            }
            Err(e) => {
                error!(%symbol, "failed to liquidate: {e}");
            }
        }
    } else if let Err(e) = feed.unsubscribe(&symbol_channels(symbol)).await {
        // Flat and nothing pending: the symbol needs no further bars
        warn!(%symbol, "failed to unsubscribe: {e}");
    }

    Ok(())
}
