// Common test utilities and helpers

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use grid_order_bot::{
    Account, Bar, BarsQuery, Broker, BrokerError, BrokerOrderStatus, BrokerResult, GridConfig,
    LimitOrderRequest, Order, Position,
};

/// Create a grid configuration with sensible test defaults
pub fn create_test_grid_config() -> GridConfig {
    GridConfig {
        spacing_pct: 2.0,
        levels: 3,
        symbols: "BTC/USD".to_string(),
        allocation_pct: 10.0,
        boundary_stop_pct: 10.0,
        recenter_threshold_pct: 5.0,
        check_interval_minutes: 5,
        enabled: true,
    }
}

#[derive(Default)]
struct MockState {
    next_id: usize,
    orders: HashMap<String, Order>,
    open_ids: Vec<String>,
    placed: Vec<LimitOrderRequest>,
    cancelled: Vec<String>,
    closed_positions: Vec<String>,
    positions: Vec<Position>,
    account: Option<Account>,
    /// Closes keyed by (symbol, timeframe).
    bars: HashMap<(String, String), Vec<f64>>,
    fail_place: bool,
    fail_cancel: bool,
    fail_open_orders: bool,
}

/// Scripted broker: orders rest until a test marks them filled or
/// cancelled, market data is whatever the test seeds.
#[derive(Default)]
pub struct MockBroker {
    state: Mutex<MockState>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_account(&self, portfolio_value: f64, cash: f64) {
        self.state.lock().unwrap().account = Some(Account {
            portfolio_value,
            cash,
        });
    }

    pub fn set_bars(&self, symbol: &str, timeframe: &str, closes: &[f64]) {
        self.state
            .lock()
            .unwrap()
            .bars
            .insert((symbol.to_string(), timeframe.to_string()), closes.to_vec());
    }

    pub fn add_position(&self, symbol: &str, qty: f64, market_value: f64) {
        self.state.lock().unwrap().positions.push(Position {
            symbol: symbol.to_string(),
            qty,
            market_value,
        });
    }

    pub fn fail_place(&self, fail: bool) {
        self.state.lock().unwrap().fail_place = fail;
    }

    pub fn fail_cancel(&self, fail: bool) {
        self.state.lock().unwrap().fail_cancel = fail;
    }

    pub fn fail_open_orders(&self, fail: bool) {
        self.state.lock().unwrap().fail_open_orders = fail;
    }

    /// Simulate a fill on the broker side.
    pub fn mark_filled(&self, order_id: &str, filled_qty: f64, filled_price: f64) {
        let mut state = self.state.lock().unwrap();
        state.open_ids.retain(|id| id != order_id);
        if let Some(order) = state.orders.get_mut(order_id) {
            order.status = BrokerOrderStatus::Filled;
            order.filled_qty = filled_qty;
            order.filled_avg_price = Some(filled_price);
        }
    }

    /// Simulate a broker-side cancellation (e.g. expired GTC).
    pub fn mark_cancelled(&self, order_id: &str) {
        let mut state = self.state.lock().unwrap();
        state.open_ids.retain(|id| id != order_id);
        if let Some(order) = state.orders.get_mut(order_id) {
            order.status = BrokerOrderStatus::Canceled;
        }
    }

    pub fn placed_requests(&self) -> Vec<LimitOrderRequest> {
        self.state.lock().unwrap().placed.clone()
    }

    pub fn cancelled_ids(&self) -> Vec<String> {
        self.state.lock().unwrap().cancelled.clone()
    }

    pub fn closed_positions(&self) -> Vec<String> {
        self.state.lock().unwrap().closed_positions.clone()
    }

    pub fn open_order_count(&self) -> usize {
        self.state.lock().unwrap().open_ids.len()
    }

    /// Seed a resting order directly, for tests that start from persisted
    /// grid state instead of driving placement through the engine.
    pub fn inject_open_order(&self, order: Order) {
        let mut state = self.state.lock().unwrap();
        state.open_ids.push(order.id.clone());
        state.orders.insert(order.id.clone(), order);
    }

    /// Broker order id for a client order id the engine generated.
    pub fn order_id_for_client(&self, client_order_id: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .orders
            .values()
            .find(|o| o.client_order_id.as_deref() == Some(client_order_id))
            .map(|o| o.id.clone())
    }
}

#[async_trait]
impl Broker for MockBroker {
    async fn place_limit_order(&self, request: &LimitOrderRequest) -> BrokerResult<Order> {
        let mut state = self.state.lock().unwrap();
        if state.fail_place {
            return Err(BrokerError::Transient("mock place failure".to_string()));
        }

        state.next_id += 1;
        let id = format!("mock-{}", state.next_id);
        let order = Order {
            id: id.clone(),
            client_order_id: Some(request.client_order_id.clone()),
            symbol: request.symbol.clone(),
            side: request.side,
            status: BrokerOrderStatus::Accepted,
            qty: request.qty,
            limit_price: Some(request.limit_price),
            filled_qty: 0.0,
            filled_avg_price: None,
        };

        state.placed.push(request.clone());
        state.open_ids.push(id.clone());
        state.orders.insert(id, order.clone());
        Ok(order)
    }

    async fn cancel_order(&self, order_id: &str) -> BrokerResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_cancel {
            return Err(BrokerError::Transient("mock cancel failure".to_string()));
        }

        if !state.orders.contains_key(order_id) {
            return Err(BrokerError::NotFound(order_id.to_string()));
        }
        state.open_ids.retain(|id| id != order_id);
        if let Some(order) = state.orders.get_mut(order_id) {
            order.status = BrokerOrderStatus::Canceled;
        }
        state.cancelled.push(order_id.to_string());
        Ok(())
    }

    async fn get_open_orders(&self, symbol: &str) -> BrokerResult<Vec<Order>> {
        let state = self.state.lock().unwrap();
        if state.fail_open_orders {
            return Err(BrokerError::Transient("mock open orders failure".to_string()));
        }

        Ok(state
            .open_ids
            .iter()
            .filter_map(|id| state.orders.get(id))
            .filter(|o| o.symbol == symbol)
            .cloned()
            .collect())
    }

    async fn get_order(&self, order_id: &str) -> BrokerResult<Order> {
        let state = self.state.lock().unwrap();
        state
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| BrokerError::NotFound(order_id.to_string()))
    }

    async fn get_positions(&self) -> BrokerResult<Vec<Position>> {
        Ok(self.state.lock().unwrap().positions.clone())
    }

    async fn close_position(&self, symbol: &str) -> BrokerResult<()> {
        let mut state = self.state.lock().unwrap();
        state.positions.retain(|p| p.symbol != symbol);
        state.closed_positions.push(symbol.to_string());
        Ok(())
    }

    async fn get_account(&self) -> BrokerResult<Account> {
        self.state
            .lock()
            .unwrap()
            .account
            .clone()
            .ok_or_else(|| BrokerError::Transient("no account seeded".to_string()))
    }

    async fn get_bars(&self, query: &BarsQuery) -> BrokerResult<Vec<Bar>> {
        let state = self.state.lock().unwrap();
        let closes = state
            .bars
            .get(&(query.symbol.clone(), query.timeframe.clone()))
            .cloned()
            .unwrap_or_default();

        let start = Utc::now() - Duration::hours(closes.len() as i64);
        Ok(closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                timestamp: start + Duration::hours(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1.0,
            })
            .collect())
    }
}
