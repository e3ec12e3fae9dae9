// Broker facade consumed by the grid engine
//
// The grid manager never talks HTTP directly; it trades through this trait
// so tests can inject a scripted broker and retry logic can pattern-match
// on typed errors instead of sniffing message strings.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod alpaca;

pub use alpaca::AlpacaClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeInForce {
    /// Good till cancelled - the only policy grid orders use.
    Gtc,
    Day,
    Ioc,
}

impl TimeInForce {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeInForce::Gtc => "gtc",
            TimeInForce::Day => "day",
            TimeInForce::Ioc => "ioc",
        }
    }
}

/// Broker-side order status, normalized across venues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerOrderStatus {
    New,
    Accepted,
    PartiallyFilled,
    Filled,
    Canceled,
    Expired,
    Rejected,
    #[serde(other)]
    Unknown,
}

impl BrokerOrderStatus {
    /// Terminal states that will never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BrokerOrderStatus::Filled
                | BrokerOrderStatus::Canceled
                | BrokerOrderStatus::Expired
                | BrokerOrderStatus::Rejected
        )
    }
}

/// An order as reported by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub client_order_id: Option<String>,
    pub symbol: String,
    pub side: OrderSide,
    pub status: BrokerOrderStatus,
    pub qty: f64,
    pub limit_price: Option<f64>,
    pub filled_qty: f64,
    pub filled_avg_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub qty: f64,
    pub market_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub portfolio_value: f64,
    pub cash: f64,
}

/// One OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LimitOrderRequest {
    pub symbol: String,
    pub qty: f64,
    pub limit_price: f64,
    pub side: OrderSide,
    pub time_in_force: TimeInForce,
    /// Deterministic tag encoding (symbol, rung) for idempotent retries.
    pub client_order_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BarsQuery {
    pub symbol: String,
    pub timeframe: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub limit: usize,
}

/// Typed broker failure taxonomy.
///
/// Callers match on variants to decide retry behavior; there is no string
/// inspection anywhere above this boundary.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BrokerError {
    #[error("rate limited (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("malformed broker response: {0}")]
    Decode(String),

    #[error("transient broker error: {0}")]
    Transient(String),
}

impl BrokerError {
    /// Whether retrying the same call next cycle is worthwhile.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BrokerError::RateLimited { .. } | BrokerError::Transient(_)
        )
    }
}

pub type BrokerResult<T> = Result<T, BrokerError>;

/// The operations the grid engine needs from a brokerage.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn place_limit_order(&self, request: &LimitOrderRequest) -> BrokerResult<Order>;

    async fn cancel_order(&self, order_id: &str) -> BrokerResult<()>;

    /// Currently open orders for one symbol.
    async fn get_open_orders(&self, symbol: &str) -> BrokerResult<Vec<Order>>;

    async fn get_order(&self, order_id: &str) -> BrokerResult<Order>;

    async fn get_positions(&self) -> BrokerResult<Vec<Position>>;

    /// Liquidate the full position in `symbol` at market.
    async fn close_position(&self, symbol: &str) -> BrokerResult<()>;

    async fn get_account(&self) -> BrokerResult<Account>;

    async fn get_bars(&self, query: &BarsQuery) -> BrokerResult<Vec<Bar>>;
}
