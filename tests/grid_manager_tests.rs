// Integration tests for grid order lifecycle management

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use common::MockBroker;
use grid_order_bot::{
    BrokerOrderStatus, GridLevel, GridOrderManager, GridState, GridStatus, LevelStatus,
    MemoryStore, Order, OrderRole, OrderSide, StateStore,
};

const SYMBOL: &str = "BTC/USD";

fn new_manager() -> (Arc<MockBroker>, MemoryStore, GridOrderManager) {
    let broker = Arc::new(MockBroker::new());
    let store = MemoryStore::new();
    let manager = GridOrderManager::new(broker.clone(), Box::new(store.clone()));
    (broker, store, manager)
}

#[tokio::test]
async fn test_initialize_creates_symmetric_pending_ladder() {
    let (_broker, _store, mut manager) = new_manager();

    manager.initialize_grid(SYMBOL, 100.0, 2.0, 3, 1.0);

    let grid = manager.grid(SYMBOL).unwrap();
    assert_eq!(grid.levels.len(), 6);
    assert_eq!(grid.status, GridStatus::Active);

    for (level, price) in [(-1, 98.0), (-2, 96.0), (-3, 94.0)] {
        let l = grid.level(level).unwrap();
        assert_eq!(l.price, price);
        assert_eq!(l.order_type, OrderRole::Buy);
        assert_eq!(l.status, LevelStatus::Pending);
    }

    for (level, price) in [(1, 102.0), (2, 104.0), (3, 106.0)] {
        let l = grid.level(level).unwrap();
        assert_eq!(l.price, price);
        assert_eq!(l.order_type, OrderRole::Sell);
        assert_eq!(l.status, LevelStatus::Pending);
    }
}

#[tokio::test]
async fn test_place_grid_orders_submits_buys_only() {
    let (broker, _store, mut manager) = new_manager();
    manager.initialize_grid(SYMBOL, 100.0, 2.0, 3, 1.0);

    let placed = manager.place_grid_orders(SYMBOL).await;
    assert_eq!(placed, 3);

    let requests = broker.placed_requests();
    assert_eq!(requests.len(), 3);
    assert!(requests.iter().all(|r| r.side == OrderSide::Buy));
    assert!(requests.iter().all(|r| r.qty == 1.0));

    let ids: Vec<&str> = requests
        .iter()
        .map(|r| r.client_order_id.as_str())
        .collect();
    assert_eq!(
        ids,
        vec!["grid_BTC/USD_-1", "grid_BTC/USD_-2", "grid_BTC/USD_-3"]
    );

    // Sell rungs stay pending until their paired buy fills.
    let grid = manager.grid(SYMBOL).unwrap();
    assert_eq!(grid.level(1).unwrap().status, LevelStatus::Pending);
    assert_eq!(grid.level(-1).unwrap().status, LevelStatus::Open);
    assert!(grid.level(-1).unwrap().order_id.is_some());
}

#[tokio::test]
async fn test_place_grid_orders_is_idempotent() {
    let (broker, _store, mut manager) = new_manager();
    manager.initialize_grid(SYMBOL, 100.0, 2.0, 3, 1.0);

    assert_eq!(manager.place_grid_orders(SYMBOL).await, 3);
    assert_eq!(manager.place_grid_orders(SYMBOL).await, 0);
    assert_eq!(broker.placed_requests().len(), 3);
}

#[tokio::test]
async fn test_place_failure_leaves_level_pending_for_retry() {
    let (broker, _store, mut manager) = new_manager();
    manager.initialize_grid(SYMBOL, 100.0, 2.0, 3, 1.0);

    broker.fail_place(true);
    assert_eq!(manager.place_grid_orders(SYMBOL).await, 0);
    let grid = manager.grid(SYMBOL).unwrap();
    assert!(grid
        .levels
        .iter()
        .all(|l| l.status == LevelStatus::Pending));

    broker.fail_place(false);
    assert_eq!(manager.place_grid_orders(SYMBOL).await, 3);
}

#[tokio::test]
async fn test_buy_fill_places_sell_one_rung_up() {
    let (broker, _store, mut manager) = new_manager();
    manager.initialize_grid(SYMBOL, 100.0, 2.0, 3, 1.0);
    manager.place_grid_orders(SYMBOL).await;

    let buy_id = broker.order_id_for_client("grid_BTC/USD_-1").unwrap();
    broker.mark_filled(&buy_id, 1.0, 98.0);

    let update = manager.check_and_update_orders(SYMBOL).await;
    assert_eq!(update.buys_filled, 1);
    assert_eq!(update.sells_filled, 0);
    assert_eq!(update.orders_placed, 1);

    let grid = manager.grid(SYMBOL).unwrap();
    assert_eq!(grid.level(-1).unwrap().status, LevelStatus::Filled);
    assert_eq!(grid.level(-1).unwrap().filled_price, Some(98.0));
    assert_eq!(grid.total_invested, 98.0);

    // The replacement sell for buy rung -1 lands on rung 0, the center.
    let sell = broker
        .placed_requests()
        .into_iter()
        .find(|r| r.client_order_id == "grid_BTC/USD_sell_-1")
        .unwrap();
    assert_eq!(sell.side, OrderSide::Sell);
    assert_eq!(sell.limit_price, 100.0);
    assert_eq!(sell.qty, 1.0);

    let rung0 = grid.level(0).unwrap();
    assert_eq!(rung0.order_type, OrderRole::Sell);
    assert_eq!(rung0.status, LevelStatus::Open);
}

#[tokio::test]
async fn test_crash_through_ladder_cascades_sells_downward() {
    let (broker, _store, mut manager) = new_manager();
    manager.initialize_grid(SYMBOL, 100.0, 2.0, 3, 1.0);
    manager.place_grid_orders(SYMBOL).await;

    // Price crashes through every buy rung before the next check.
    for (client_id, price) in [
        ("grid_BTC/USD_-1", 98.0),
        ("grid_BTC/USD_-2", 96.0),
        ("grid_BTC/USD_-3", 94.0),
    ] {
        let id = broker.order_id_for_client(client_id).unwrap();
        broker.mark_filled(&id, 1.0, price);
    }

    let update = manager.check_and_update_orders(SYMBOL).await;
    assert_eq!(update.buys_filled, 3);
    assert_eq!(update.orders_placed, 3);

    // Upper fills are booked before lower ones, so each replacement sell
    // repurposes the just-filled rung above its buy.
    let sells: Vec<_> = broker
        .placed_requests()
        .into_iter()
        .filter(|r| r.side == OrderSide::Sell)
        .collect();
    assert_eq!(sells.len(), 3);
    assert!(sells
        .iter()
        .any(|r| r.client_order_id == "grid_BTC/USD_sell_-1" && r.limit_price == 100.0));
    assert!(sells
        .iter()
        .any(|r| r.client_order_id == "grid_BTC/USD_sell_-2" && r.limit_price == 98.0));
    assert!(sells
        .iter()
        .any(|r| r.client_order_id == "grid_BTC/USD_sell_-3" && r.limit_price == 96.0));

    let grid = manager.grid(SYMBOL).unwrap();
    assert_eq!(grid.total_invested, 98.0 + 96.0 + 94.0);
    for level in [-1, -2] {
        let l = grid.level(level).unwrap();
        assert_eq!(l.order_type, OrderRole::Sell);
        assert_eq!(l.status, LevelStatus::Open);
    }
}

#[tokio::test]
async fn test_replacement_skipped_when_target_rung_holds_open_order() {
    let (broker, _store, mut manager) = new_manager();
    manager.initialize_grid(SYMBOL, 100.0, 2.0, 3, 1.0);
    manager.place_grid_orders(SYMBOL).await;

    // Only the deeper buy fills; the rung above still holds a live order,
    // so its replacement sell must not stack a second order there.
    let id = broker.order_id_for_client("grid_BTC/USD_-2").unwrap();
    broker.mark_filled(&id, 1.0, 96.0);

    let update = manager.check_and_update_orders(SYMBOL).await;
    assert_eq!(update.buys_filled, 1);
    assert_eq!(update.orders_placed, 0);

    let grid = manager.grid(SYMBOL).unwrap();
    assert_eq!(grid.level(-1).unwrap().status, LevelStatus::Open);
    assert_eq!(grid.level(-1).unwrap().order_type, OrderRole::Buy);
    assert_eq!(grid.total_invested, 96.0);
}

#[tokio::test]
async fn test_sell_fill_books_profit_and_rebuys_one_rung_down() {
    let broker = Arc::new(MockBroker::new());
    let store = MemoryStore::new();

    // Seed a grid whose sell at rung 3 is already resting at the broker.
    let mut levels = vec![GridLevel::pending(-1, 98.0, OrderRole::Buy)];
    let mut sell = GridLevel::pending(3, 106.0, OrderRole::Sell);
    sell.order_id = Some("sell-3".to_string());
    sell.status = LevelStatus::Open;
    levels.push(sell);

    let mut state = GridState::new(SYMBOL, 100.0, 2.0, 5.0, levels);
    state.total_invested = 530.0;
    let mut grids = HashMap::new();
    grids.insert(SYMBOL.to_string(), state);
    store.save(&grids).unwrap();

    broker.inject_open_order(Order {
        id: "sell-3".to_string(),
        client_order_id: Some("grid_BTC/USD_sell_2".to_string()),
        symbol: SYMBOL.to_string(),
        side: OrderSide::Sell,
        status: BrokerOrderStatus::Accepted,
        qty: 5.0,
        limit_price: Some(106.0),
        filled_qty: 0.0,
        filled_avg_price: None,
    });

    let mut manager = GridOrderManager::new(broker.clone(), Box::new(store));
    broker.mark_filled("sell-3", 5.0, 106.0);

    let update = manager.check_and_update_orders(SYMBOL).await;
    assert_eq!(update.sells_filled, 1);
    assert_eq!(update.orders_placed, 1);

    let grid = manager.grid(SYMBOL).unwrap();
    // Profit is booked against the grid center: (106 - 100) * 5.
    assert_eq!(grid.realized_profit, 30.0);
    assert_eq!(grid.total_invested, 0.0);

    // The freed capital re-arms a buy one rung down at full level size.
    let rebuy = broker
        .placed_requests()
        .into_iter()
        .find(|r| r.client_order_id == "grid_BTC/USD_rebuy_2")
        .unwrap();
    assert_eq!(rebuy.side, OrderSide::Buy);
    assert_eq!(rebuy.limit_price, 104.0);
    assert_eq!(rebuy.qty, 5.0);

    let rung2 = grid.level(2).unwrap();
    assert_eq!(rung2.order_type, OrderRole::Buy);
    assert_eq!(rung2.status, LevelStatus::Open);
}

#[tokio::test]
async fn test_broker_cancelled_order_marks_level_cancelled() {
    let (broker, _store, mut manager) = new_manager();
    manager.initialize_grid(SYMBOL, 100.0, 2.0, 3, 1.0);
    manager.place_grid_orders(SYMBOL).await;

    let id = broker.order_id_for_client("grid_BTC/USD_-2").unwrap();
    broker.mark_cancelled(&id);

    let update = manager.check_and_update_orders(SYMBOL).await;
    assert_eq!(update.buys_filled, 0);
    assert_eq!(update.orders_placed, 0);

    let grid = manager.grid(SYMBOL).unwrap();
    assert_eq!(grid.level(-2).unwrap().status, LevelStatus::Cancelled);
    assert_eq!(grid.level(-1).unwrap().status, LevelStatus::Open);
}

#[tokio::test]
async fn test_open_orders_failure_skips_cycle_without_mutation() {
    let (broker, _store, mut manager) = new_manager();
    manager.initialize_grid(SYMBOL, 100.0, 2.0, 3, 1.0);
    manager.place_grid_orders(SYMBOL).await;

    broker.fail_open_orders(true);
    let update = manager.check_and_update_orders(SYMBOL).await;
    assert_eq!(update, Default::default());

    let grid = manager.grid(SYMBOL).unwrap();
    assert!(grid
        .levels
        .iter()
        .filter(|l| l.order_type == OrderRole::Buy)
        .all(|l| l.status == LevelStatus::Open));
}

#[tokio::test]
async fn test_cancel_all_orders_stops_grid() {
    let (broker, _store, mut manager) = new_manager();
    manager.initialize_grid(SYMBOL, 100.0, 2.0, 3, 1.0);
    manager.place_grid_orders(SYMBOL).await;

    let cancelled = manager.cancel_all_orders(SYMBOL).await;
    assert_eq!(cancelled, 3);
    assert_eq!(broker.cancelled_ids().len(), 3);
    assert_eq!(broker.open_order_count(), 0);

    let grid = manager.grid(SYMBOL).unwrap();
    assert_eq!(grid.status, GridStatus::Stopped);
    assert!(grid
        .levels
        .iter()
        .filter(|l| l.order_type == OrderRole::Buy)
        .all(|l| l.status == LevelStatus::Cancelled));
}

#[tokio::test]
async fn test_cancel_failure_leaves_level_open_for_retry() {
    let (broker, _store, mut manager) = new_manager();
    manager.initialize_grid(SYMBOL, 100.0, 2.0, 3, 1.0);
    manager.place_grid_orders(SYMBOL).await;

    broker.fail_cancel(true);
    assert_eq!(manager.cancel_all_orders(SYMBOL).await, 0);

    let grid = manager.grid(SYMBOL).unwrap();
    assert!(grid
        .levels
        .iter()
        .filter(|l| l.order_type == OrderRole::Buy)
        .all(|l| l.status == LevelStatus::Open));
    // The grid still stops: remaining orders get retried by a later pass.
    assert_eq!(grid.status, GridStatus::Stopped);
}

#[tokio::test]
async fn test_stop_grid_liquidates_inventory() {
    let (broker, _store, mut manager) = new_manager();
    manager.initialize_grid(SYMBOL, 100.0, 2.0, 3, 1.0);
    manager.place_grid_orders(SYMBOL).await;

    let buy_id = broker.order_id_for_client("grid_BTC/USD_-1").unwrap();
    broker.mark_filled(&buy_id, 1.0, 98.0);
    manager.check_and_update_orders(SYMBOL).await;

    broker.add_position(SYMBOL, 1.0, 98.0);

    let summary = manager.stop_grid(SYMBOL).await.unwrap();
    assert_eq!(summary.positions_closed, 1);
    assert!(summary.orders_cancelled >= 2);
    assert_eq!(broker.closed_positions(), vec![SYMBOL.to_string()]);
    assert_eq!(manager.grid(SYMBOL).unwrap().status, GridStatus::Stopped);
}

#[tokio::test]
async fn test_stop_grid_without_inventory_skips_liquidation() {
    let (broker, _store, mut manager) = new_manager();
    manager.initialize_grid(SYMBOL, 100.0, 2.0, 3, 1.0);
    manager.place_grid_orders(SYMBOL).await;

    let summary = manager.stop_grid(SYMBOL).await.unwrap();
    assert_eq!(summary.positions_closed, 0);
    assert!(broker.closed_positions().is_empty());
}

#[tokio::test]
async fn test_stop_grid_unknown_symbol_errors() {
    let (_broker, _store, mut manager) = new_manager();
    assert!(manager.stop_grid("DOGE/USD").await.is_err());
}

#[tokio::test]
async fn test_recenter_rebuilds_around_new_center() {
    let (broker, _store, mut manager) = new_manager();
    manager.initialize_grid(SYMBOL, 100.0, 2.0, 3, 2.5);
    manager.place_grid_orders(SYMBOL).await;

    assert!(manager.recenter_grid(SYMBOL, 110.0, 2.0, 3).await);

    let grid = manager.grid(SYMBOL).unwrap();
    assert_eq!(grid.center_price, 110.0);
    assert_eq!(grid.qty_per_level, 2.5);
    assert_eq!(grid.status, GridStatus::Active);
    assert_eq!(grid.level(-1).unwrap().price, 107.8);

    // Old orders cancelled, fresh buys resting.
    assert_eq!(broker.cancelled_ids().len(), 3);
    assert_eq!(broker.open_order_count(), 3);
}

#[tokio::test]
async fn test_restart_resumes_from_persisted_state() {
    let broker = Arc::new(MockBroker::new());
    let store = MemoryStore::new();

    {
        let mut manager = GridOrderManager::new(broker.clone(), Box::new(store.clone()));
        manager.initialize_grid(SYMBOL, 100.0, 2.0, 3, 1.0);
        manager.place_grid_orders(SYMBOL).await;
    }

    // Fill happens while the process is down.
    let buy_id = broker.order_id_for_client("grid_BTC/USD_-1").unwrap();
    broker.mark_filled(&buy_id, 1.0, 98.0);

    let mut manager = GridOrderManager::new(broker.clone(), Box::new(store.clone()));
    let update = manager.check_and_update_orders(SYMBOL).await;
    assert_eq!(update.buys_filled, 1);
    assert_eq!(update.orders_placed, 1);

    let grid = manager.grid(SYMBOL).unwrap();
    assert_eq!(grid.total_invested, 98.0);
    assert_eq!(grid.level(0).unwrap().status, LevelStatus::Open);
}

struct BrokenStore;

impl grid_order_bot::StateStore for BrokenStore {
    fn load(&self) -> grid_order_bot::StoreResult<HashMap<String, GridState>> {
        Ok(HashMap::new())
    }

    fn save(&self, _grids: &HashMap<String, GridState>) -> grid_order_bot::StoreResult<()> {
        Err(grid_order_bot::StoreError::Write("disk full".to_string()))
    }
}

#[tokio::test]
async fn test_persist_failure_does_not_abort_trading() {
    let broker = Arc::new(MockBroker::new());
    let mut manager = GridOrderManager::new(broker.clone(), Box::new(BrokenStore));

    manager.initialize_grid(SYMBOL, 100.0, 2.0, 3, 1.0);
    assert_eq!(manager.place_grid_orders(SYMBOL).await, 3);

    // In-memory state stays authoritative even when saves fail.
    let grid = manager.grid(SYMBOL).unwrap();
    assert_eq!(grid.status, GridStatus::Active);
    assert_eq!(broker.open_order_count(), 3);
}

#[tokio::test]
async fn test_restart_with_unchanged_orders_is_a_no_op() {
    let broker = Arc::new(MockBroker::new());
    let store = MemoryStore::new();

    let snapshot = {
        let mut manager = GridOrderManager::new(broker.clone(), Box::new(store.clone()));
        manager.initialize_grid(SYMBOL, 100.0, 2.0, 3, 1.0);
        manager.place_grid_orders(SYMBOL).await;
        manager.grid(SYMBOL).unwrap().clone()
    };

    // Nothing happened at the broker while the process was down.
    let mut manager = GridOrderManager::new(broker.clone(), Box::new(store.clone()));
    let update = manager.check_and_update_orders(SYMBOL).await;

    assert_eq!(update, Default::default());
    assert_eq!(broker.placed_requests().len(), 3);
    assert_eq!(broker.open_order_count(), 3);

    let grid = manager.grid(SYMBOL).unwrap();
    assert_eq!(grid.levels, snapshot.levels);
    assert_eq!(grid.total_invested, snapshot.total_invested);
    assert_eq!(grid.realized_profit, snapshot.realized_profit);
}

#[tokio::test]
async fn test_grid_status_counts_orders_and_fills() {
    let (broker, _store, mut manager) = new_manager();
    manager.initialize_grid(SYMBOL, 100.0, 2.0, 3, 1.0);
    manager.place_grid_orders(SYMBOL).await;

    let buy_id = broker.order_id_for_client("grid_BTC/USD_-1").unwrap();
    broker.mark_filled(&buy_id, 1.0, 98.0);
    manager.check_and_update_orders(SYMBOL).await;

    let view = manager.get_grid_status(SYMBOL).unwrap();
    assert_eq!(view.symbol, SYMBOL);
    assert_eq!(view.status, GridStatus::Active);
    assert_eq!(view.open_buy_orders, 2);
    assert_eq!(view.open_sell_orders, 1);
    assert_eq!(view.filled_positions, 1);
    assert_eq!(view.total_invested, 98.0);

    assert!(manager.get_grid_status("DOGE/USD").is_none());
}
