pub mod broker;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod market_data;
pub mod persistence;
pub mod reconcile;
pub mod session;
pub mod state;
pub mod strategy;

pub use config::AppConfig;
pub use engine::TradingEngine;
pub use error::{Result, TraderError};
pub use reconcile::Reconciler;
pub use session::{SessionController, SessionWindow, StrategyRun, WallClockCalendar};
pub use state::{Position, SessionState};
pub use strategy::{DispatchConfig, Signal, Strategy, StrategyDispatch};
