pub mod bar;
pub mod events;
pub mod order;

pub use bar::{minute_bucket, Bar};
pub use events::{BarEvent, EngineEvent, TradeUpdate, TradeUpdateEvent};
pub use order::{OpenOrder, OrderRequest, OrderSide, OrderType, PlacedOrder, TimeInForce};
