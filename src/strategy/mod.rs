//! Strategy interface, per-bar dispatch and forced liquidation.

pub mod dispatch;
pub mod liquidation;
pub mod momentum;
pub mod traits;

pub use dispatch::{DispatchConfig, StrategyDispatch};
pub use momentum::{MomentumShort, MomentumShortConfig};
pub use traits::{Signal, Strategy};
