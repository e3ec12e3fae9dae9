// Core grid trading logic

pub mod order_manager;
pub mod strategy;
pub mod types;

pub use order_manager::{GridOrderManager, GridStatusView, OrderUpdate, StopSummary};
pub use strategy::{CycleAction, CycleError, CycleReport, GridTradingStrategy};
pub use types::{rung_price, GridLevel, GridState, GridStatus, LevelStatus, OrderRole};
