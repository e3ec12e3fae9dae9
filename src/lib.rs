// Grid Order Bot Library
//
// A grid trading order-lifecycle manager for the Alpaca brokerage: rung
// ladders around a smoothed center, reactive sell/rebuy replacement on
// fills, and crash-safe JSON state persistence.

pub mod broker;
pub mod config;
pub mod core;
pub mod error;
pub mod persistence;

// Re-export core trading types
pub use core::{
    CycleAction, CycleError, CycleReport, GridLevel, GridOrderManager, GridState, GridStatus,
    GridStatusView, GridTradingStrategy, LevelStatus, OrderRole, OrderUpdate, StopSummary,
};

// Re-export error types
pub use error::{TradingError, TradingResult};

// Re-export broker types
pub use broker::{
    alpaca::AlpacaClient, Account, Bar, BarsQuery, Broker, BrokerError, BrokerOrderStatus,
    BrokerResult, LimitOrderRequest, Order, OrderSide, Position, TimeInForce,
};

// Re-export configuration
pub use config::{ApiConfig, Config, ConfigError, GridConfig, LoggingConfig};

// Re-export persistence
pub use persistence::{JsonFileStore, MemoryStore, StateStore, StoreError, StoreResult};
