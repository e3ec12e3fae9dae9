// Grid order lifecycle management
//
// Single authority for translating grid state into broker limit orders,
// detecting fills, and placing replacements. Every mutating operation
// persists the full state document so a restart resumes exactly where the
// previous process stopped.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::broker::{
    Broker, BrokerOrderStatus, LimitOrderRequest, OrderSide, TimeInForce,
};
use crate::core::types::{
    rung_price, GridLevel, GridState, GridStatus, LevelStatus, OrderRole,
};
use crate::error::{TradingError, TradingResult};
use crate::persistence::StateStore;

/// Fill and placement counts from one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OrderUpdate {
    pub buys_filled: usize,
    pub sells_filled: usize,
    pub orders_placed: usize,
}

/// Read-only projection of one grid, safe to hand to dashboards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridStatusView {
    pub symbol: String,
    pub status: GridStatus,
    pub center_price: f64,
    pub open_buy_orders: usize,
    pub open_sell_orders: usize,
    pub filled_positions: usize,
    pub total_invested: f64,
    pub realized_profit: f64,
    pub last_updated: chrono::DateTime<chrono::Utc>,
}

impl GridStatusView {
    pub fn of(grid: &GridState) -> Self {
        let open_buys = grid
            .levels
            .iter()
            .filter(|l| l.order_type == OrderRole::Buy && l.status == LevelStatus::Open)
            .count();
        let open_sells = grid
            .levels
            .iter()
            .filter(|l| l.order_type == OrderRole::Sell && l.status == LevelStatus::Open)
            .count();

        Self {
            symbol: grid.symbol.clone(),
            status: grid.status,
            center_price: grid.center_price,
            open_buy_orders: open_buys,
            open_sell_orders: open_sells,
            filled_positions: grid.filled_buys().len(),
            total_invested: grid.total_invested,
            realized_profit: grid.realized_profit,
            last_updated: grid.last_updated,
        }
    }
}

/// Result of halting a grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StopSummary {
    pub orders_cancelled: usize,
    pub positions_closed: usize,
    pub realized_profit: f64,
}

/// A level whose open order disappeared from the broker's open set,
/// queued for a terminal-state lookup.
struct FillCandidate {
    level: i32,
    order_id: String,
    role: OrderRole,
}

pub struct GridOrderManager {
    grids: HashMap<String, GridState>,
    broker: Arc<dyn Broker>,
    store: Box<dyn StateStore>,
}

impl GridOrderManager {
    /// Build the manager and restore any persisted grids.
    ///
    /// A corrupt or unreadable store logs and starts empty rather than
    /// refusing to run; the next persist rewrites the document.
    pub fn new(broker: Arc<dyn Broker>, store: Box<dyn StateStore>) -> Self {
        let grids = match store.load() {
            Ok(grids) => {
                if !grids.is_empty() {
                    info!(
                        grids = grids.len(),
                        symbols = ?grids.keys().collect::<Vec<_>>(),
                        "grid state loaded"
                    );
                }
                grids
            }
            Err(e) => {
                error!(error = %e, "failed to load grid state, starting empty");
                HashMap::new()
            }
        };

        Self {
            grids,
            broker,
            store,
        }
    }

    /// Persist the full document. Failure is logged, not fatal: in-memory
    /// state stays authoritative for this process lifetime.
    fn persist(&self) {
        if let Err(e) = self.store.save(&self.grids) {
            error!(error = %e, "failed to save grid state");
        } else {
            debug!(grids = self.grids.len(), "grid state saved");
        }
    }

    /// Construct a fresh grid for `symbol`, replacing any prior state.
    ///
    /// Pure state construction: no broker calls are made here. Both buy and
    /// sell rungs are created `pending`, but only buys are ever pre-placed.
    pub fn initialize_grid(
        &mut self,
        symbol: &str,
        center_price: f64,
        spacing_pct: f64,
        num_levels: usize,
        qty_per_level: f64,
    ) {
        let mut levels = Vec::with_capacity(num_levels * 2);

        // Buy rungs below center
        for i in 1..=num_levels as i32 {
            levels.push(GridLevel::pending(
                -i,
                rung_price(center_price, spacing_pct, -i),
                OrderRole::Buy,
            ));
        }

        // Sell rungs above center
        for i in 1..=num_levels as i32 {
            levels.push(GridLevel::pending(
                i,
                rung_price(center_price, spacing_pct, i),
                OrderRole::Sell,
            ));
        }

        let grid = GridState::new(symbol, center_price, spacing_pct, qty_per_level, levels);
        self.grids.insert(symbol.to_string(), grid);
        self.persist();

        info!(
            symbol,
            center_price,
            spacing_pct,
            num_levels,
            qty_per_level,
            "grid initialized"
        );
    }

    /// Submit limit orders for every pending buy rung.
    ///
    /// Sell rungs are deliberately not pre-placed; they are created
    /// reactively when their paired buy fills, which bounds capital
    /// exposure to the buy side. Returns the number of orders placed.
    pub async fn place_grid_orders(&mut self, symbol: &str) -> usize {
        let (qty, pending_buys) = match self.grids.get(symbol) {
            Some(grid) if grid.status == GridStatus::Active => {
                let pending: Vec<(i32, f64)> = grid
                    .levels
                    .iter()
                    .filter(|l| l.status == LevelStatus::Pending && l.order_type == OrderRole::Buy)
                    .map(|l| (l.level, l.price))
                    .collect();
                (grid.qty_per_level, pending)
            }
            _ => return 0,
        };

        let mut orders_placed = 0;

        for (level, price) in pending_buys {
            let request = LimitOrderRequest {
                symbol: symbol.to_string(),
                qty,
                limit_price: price,
                side: OrderSide::Buy,
                time_in_force: TimeInForce::Gtc,
                client_order_id: format!("grid_{}_{}", symbol, level),
            };

            match self.broker.place_limit_order(&request).await {
                Ok(order) => {
                    if let Some(grid) = self.grids.get_mut(symbol) {
                        if let Some(l) = grid.level_mut(level) {
                            l.order_id = Some(order.id.clone());
                            l.status = LevelStatus::Open;
                        }
                    }
                    orders_placed += 1;
                    info!(symbol, level, price, qty, order_id = %order.id, "grid buy order placed");
                }
                Err(e) => {
                    // Level stays pending; retried on the next call.
                    error!(symbol, level, error = %e, "failed to place grid order");
                }
            }
        }

        if let Some(grid) = self.grids.get_mut(symbol) {
            grid.touch();
        }
        self.persist();

        orders_placed
    }

    /// Core reconciliation: detect fills on open rungs and place
    /// replacement orders.
    ///
    /// A filled buy places a sell one rung up for the filled quantity; a
    /// filled sell books profit against the center and re-arms the buy one
    /// rung down. Every broker failure is contained to its level so the
    /// rest of the pass proceeds.
    pub async fn check_and_update_orders(&mut self, symbol: &str) -> OrderUpdate {
        let mut results = OrderUpdate::default();

        match self.grids.get(symbol) {
            Some(grid) if grid.status == GridStatus::Active => {}
            _ => return results,
        }

        let open_order_ids: HashSet<String> = match self.broker.get_open_orders(symbol).await {
            Ok(orders) => orders.into_iter().map(|o| o.id).collect(),
            Err(e) => {
                error!(symbol, error = %e, "failed to get open orders");
                return results;
            }
        };

        // Rungs whose order left the open set need a terminal-state lookup.
        // Vec order matches ladder construction, so an upper buy's fill is
        // booked before a lower buy targets its rung for a replacement sell.
        let candidates: Vec<FillCandidate> = {
            let Some(grid) = self.grids.get(symbol) else {
                return results;
            };
            grid.levels
                .iter()
                .filter(|l| l.status == LevelStatus::Open)
                .filter_map(|l| {
                    l.order_id.as_ref().map(|id| FillCandidate {
                        level: l.level,
                        order_id: id.clone(),
                        role: l.order_type,
                    })
                })
                .filter(|c| !open_order_ids.contains(&c.order_id))
                .collect()
        };

        for candidate in candidates {
            let order = match self.broker.get_order(&candidate.order_id).await {
                Ok(order) => order,
                Err(e) => {
                    error!(symbol, order_id = %candidate.order_id, error = %e,
                        "failed to check order status");
                    continue;
                }
            };

            match order.status {
                BrokerOrderStatus::Filled => {
                    let filled_qty = order.filled_qty;
                    let filled_price = order.filled_avg_price.unwrap_or(0.0);

                    if let Some(grid) = self.grids.get_mut(symbol) {
                        if let Some(l) = grid.level_mut(candidate.level) {
                            l.status = LevelStatus::Filled;
                            l.filled_qty = filled_qty;
                            l.filled_price = Some(filled_price);
                        }
                    }

                    match candidate.role {
                        OrderRole::Buy => {
                            results.buys_filled += 1;
                            self.handle_buy_fill(
                                symbol,
                                candidate.level,
                                filled_qty,
                                filled_price,
                                &mut results,
                            )
                            .await;
                        }
                        OrderRole::Sell => {
                            results.sells_filled += 1;
                            self.handle_sell_fill(
                                symbol,
                                candidate.level,
                                filled_qty,
                                filled_price,
                                &mut results,
                            )
                            .await;
                        }
                    }
                }
                BrokerOrderStatus::Canceled | BrokerOrderStatus::Expired => {
                    if let Some(grid) = self.grids.get_mut(symbol) {
                        if let Some(l) = grid.level_mut(candidate.level) {
                            l.status = LevelStatus::Cancelled;
                        }
                    }
                    info!(symbol, level = candidate.level, order_id = %candidate.order_id,
                        "grid order cancelled");
                }
                _ => {
                    // Not terminal yet (e.g. pending replacement on the
                    // broker side); check again next cycle.
                    debug!(symbol, order_id = %candidate.order_id, status = ?order.status,
                        "order left open set but is not terminal");
                }
            }
        }

        if let Some(grid) = self.grids.get_mut(symbol) {
            grid.touch();
        }
        self.persist();

        if results.buys_filled > 0 || results.sells_filled > 0 {
            let realized = self
                .grids
                .get(symbol)
                .map(|g| g.realized_profit)
                .unwrap_or(0.0);
            info!(
                symbol,
                buys_filled = results.buys_filled,
                sells_filled = results.sells_filled,
                orders_placed = results.orders_placed,
                realized_profit = realized,
                "grid orders updated"
            );
        }

        results
    }

    /// A buy at `level` filled: book the invested capital and rest a sell
    /// one rung up for the filled quantity.
    async fn handle_buy_fill(
        &mut self,
        symbol: &str,
        level: i32,
        filled_qty: f64,
        filled_price: f64,
        results: &mut OrderUpdate,
    ) {
        let (center, spacing) = match self.grids.get_mut(symbol) {
            Some(grid) => {
                grid.total_invested += filled_price * filled_qty;
                (grid.center_price, grid.spacing_pct)
            }
            None => return,
        };

        let sell_level = level + 1;
        let sell_price = rung_price(center, spacing, sell_level);

        // Never stack a second open order on a rung.
        if self.rung_is_open(symbol, sell_level) {
            warn!(symbol, level = sell_level,
                "replacement sell skipped, rung already holds an open order");
            return;
        }

        let request = LimitOrderRequest {
            symbol: symbol.to_string(),
            qty: filled_qty,
            limit_price: sell_price,
            side: OrderSide::Sell,
            time_in_force: TimeInForce::Gtc,
            client_order_id: format!("grid_{}_sell_{}", symbol, level),
        };

        match self.broker.place_limit_order(&request).await {
            Ok(order) => {
                if let Some(grid) = self.grids.get_mut(symbol) {
                    match grid.level_mut(sell_level) {
                        Some(existing) => existing.reopen(OrderRole::Sell, sell_price, order.id),
                        None => {
                            let mut new_level =
                                GridLevel::pending(sell_level, sell_price, OrderRole::Sell);
                            new_level.order_id = Some(order.id);
                            new_level.status = LevelStatus::Open;
                            grid.levels.push(new_level);
                        }
                    }
                }
                results.orders_placed += 1;
                info!(
                    symbol,
                    buy_level = level,
                    sell_level,
                    sell_price,
                    "sell order placed after buy fill"
                );
            }
            Err(e) => {
                error!(symbol, level, error = %e, "failed to place sell after buy fill");
            }
        }
    }

    /// A sell at `level` filled: book profit against the center, release
    /// the invested capital, and re-arm the buy one rung down.
    async fn handle_sell_fill(
        &mut self,
        symbol: &str,
        level: i32,
        filled_qty: f64,
        filled_price: f64,
        results: &mut OrderUpdate,
    ) {
        let (center, spacing, qty_per_level, profit) = match self.grids.get_mut(symbol) {
            Some(grid) => {
                // Profit is measured against the grid center, not FIFO-matched
                // against the paired buy.
                let profit = (filled_price - grid.center_price) * filled_qty;
                grid.realized_profit += profit;
                grid.total_invested -= filled_price * filled_qty;
                (
                    grid.center_price,
                    grid.spacing_pct,
                    grid.qty_per_level,
                    profit,
                )
            }
            None => return,
        };

        let buy_level = level - 1;
        let buy_price = rung_price(center, spacing, buy_level);

        if self.rung_is_open(symbol, buy_level) {
            warn!(symbol, level = buy_level,
                "rebuy skipped, rung already holds an open order");
            return;
        }

        let request = LimitOrderRequest {
            symbol: symbol.to_string(),
            qty: qty_per_level,
            limit_price: buy_price,
            side: OrderSide::Buy,
            time_in_force: TimeInForce::Gtc,
            client_order_id: format!("grid_{}_rebuy_{}", symbol, buy_level),
        };

        match self.broker.place_limit_order(&request).await {
            Ok(order) => {
                if let Some(grid) = self.grids.get_mut(symbol) {
                    match grid.level_mut(buy_level) {
                        Some(existing) => existing.reopen(OrderRole::Buy, buy_price, order.id),
                        None => {
                            // Keep every live broker order represented by a rung.
                            let mut new_level =
                                GridLevel::pending(buy_level, buy_price, OrderRole::Buy);
                            new_level.order_id = Some(order.id);
                            new_level.status = LevelStatus::Open;
                            grid.levels.push(new_level);
                        }
                    }
                }
                results.orders_placed += 1;
                info!(
                    symbol,
                    sell_level = level,
                    buy_level,
                    buy_price,
                    profit,
                    "buy order placed after sell fill"
                );
            }
            Err(e) => {
                error!(symbol, level, error = %e, "failed to place buy after sell fill");
            }
        }
    }

    fn rung_is_open(&self, symbol: &str, level: i32) -> bool {
        self.grids
            .get(symbol)
            .and_then(|g| g.level(level))
            .map(|l| l.status == LevelStatus::Open)
            .unwrap_or(false)
    }

    /// Cancel every open grid order for `symbol` and mark the grid stopped.
    ///
    /// A cancel failure leaves the level `open` locally so a later pass can
    /// retry; it never aborts the loop.
    pub async fn cancel_all_orders(&mut self, symbol: &str) -> usize {
        let open: Vec<(i32, String)> = match self.grids.get(symbol) {
            Some(grid) => grid
                .levels
                .iter()
                .filter(|l| l.status == LevelStatus::Open)
                .filter_map(|l| l.order_id.as_ref().map(|id| (l.level, id.clone())))
                .collect(),
            None => return 0,
        };

        let mut cancelled = 0;

        for (level, order_id) in open {
            match self.broker.cancel_order(&order_id).await {
                Ok(()) => {
                    if let Some(grid) = self.grids.get_mut(symbol) {
                        if let Some(l) = grid.level_mut(level) {
                            l.status = LevelStatus::Cancelled;
                        }
                    }
                    cancelled += 1;
                    info!(symbol, level, order_id = %order_id, "grid order cancelled");
                }
                Err(e) => {
                    error!(symbol, order_id = %order_id, error = %e,
                        "failed to cancel grid order");
                }
            }
        }

        if let Some(grid) = self.grids.get_mut(symbol) {
            grid.status = GridStatus::Stopped;
            grid.touch();
        }
        self.persist();

        cancelled
    }

    /// Circuit breaker: cancel all orders and liquidate any broker position
    /// held for `symbol`.
    pub async fn stop_grid(&mut self, symbol: &str) -> TradingResult<StopSummary> {
        if !self.grids.contains_key(symbol) {
            return Err(TradingError::GridNotFound(symbol.to_string()));
        }

        let orders_cancelled = self.cancel_all_orders(symbol).await;

        let has_inventory = self
            .grids
            .get(symbol)
            .map(|g| !g.filled_buys().is_empty())
            .unwrap_or(false);

        let mut positions_closed = 0;
        if has_inventory {
            match self.broker.get_positions().await {
                Ok(positions) => {
                    if positions.iter().any(|p| p.symbol == symbol) {
                        match self.broker.close_position(symbol).await {
                            Ok(()) => {
                                positions_closed = 1;
                                info!(symbol, "grid position closed");
                            }
                            Err(e) => {
                                error!(symbol, error = %e, "failed to close grid position");
                            }
                        }
                    }
                }
                Err(e) => {
                    error!(symbol, error = %e, "failed to fetch positions during stop");
                }
            }
        }

        let realized_profit = match self.grids.get_mut(symbol) {
            Some(grid) => {
                grid.status = GridStatus::Stopped;
                grid.realized_profit
            }
            None => 0.0,
        };
        self.persist();

        Ok(StopSummary {
            orders_cancelled,
            positions_closed,
            realized_profit,
        })
    }

    /// Rebuild the grid around `new_center`, preserving the prior
    /// quantity per level. Used when price drifted too far for the old
    /// center to be economically useful.
    pub async fn recenter_grid(
        &mut self,
        symbol: &str,
        new_center: f64,
        spacing_pct: f64,
        num_levels: usize,
    ) -> bool {
        let (old_center, qty_per_level) = match self.grids.get(symbol) {
            Some(grid) => (grid.center_price, grid.qty_per_level),
            None => return false,
        };

        info!(symbol, old_center, new_center, "recentering grid");

        self.cancel_all_orders(symbol).await;
        self.initialize_grid(symbol, new_center, spacing_pct, num_levels, qty_per_level);
        self.place_grid_orders(symbol).await;

        true
    }

    /// Read-only status projection, or None if no grid exists.
    pub fn get_grid_status(&self, symbol: &str) -> Option<GridStatusView> {
        self.grids.get(symbol).map(GridStatusView::of)
    }

    /// Status of every managed grid, ordered by symbol.
    pub fn get_grid_summary(&self) -> Vec<GridStatusView> {
        let mut views: Vec<GridStatusView> = self.grids.values().map(GridStatusView::of).collect();
        views.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        views
    }

    /// Direct read access for tests and the strategy driver.
    pub fn grid(&self, symbol: &str) -> Option<&GridState> {
        self.grids.get(symbol)
    }
}
