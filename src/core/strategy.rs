// Grid trading strategy driver
//
// Periodic orchestration above GridOrderManager: decides per symbol whether
// to initialize, recenter, hard-stop, or simply reconcile, using broker
// market data for pricing and the account for sizing.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::broker::{BarsQuery, Broker};
use crate::config::GridConfig;
use crate::core::order_manager::{GridOrderManager, GridStatusView, OrderUpdate, StopSummary};
use crate::core::types::GridStatus;
use crate::error::{TradingError, TradingResult};

/// What the strategy did for one symbol this cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CycleAction {
    Initialize {
        center_price: f64,
        qty_per_level: f64,
        orders_placed: usize,
    },
    Update(OrderUpdate),
    Recenter {
        new_center: f64,
    },
    BoundaryStop(StopSummary),
}

/// Per-symbol error captured without aborting the cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleError {
    pub symbol: String,
    pub error: String,
}

/// Outcome of one full pass over the configured symbols.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub timestamp: DateTime<Utc>,
    pub enabled: bool,
    pub symbols: BTreeMap<String, CycleAction>,
    pub errors: Vec<CycleError>,
}

impl CycleReport {
    fn disabled() -> Self {
        Self {
            timestamp: Utc::now(),
            enabled: false,
            symbols: BTreeMap::new(),
            errors: Vec::new(),
        }
    }
}

pub struct GridTradingStrategy {
    config: GridConfig,
    symbols: Vec<String>,
    broker: Arc<dyn Broker>,
}

impl GridTradingStrategy {
    pub fn new(config: GridConfig, broker: Arc<dyn Broker>) -> Self {
        let symbols = config.symbol_list();
        Self {
            config,
            symbols,
            broker,
        }
    }

    /// Run one strategy cycle across all configured symbols.
    ///
    /// A failure for one symbol is recorded and the remaining symbols still
    /// get their pass. The caller owns the schedule; this method never
    /// sleeps.
    pub async fn run_grid_cycle(&self, manager: &mut GridOrderManager) -> CycleReport {
        if !self.config.enabled {
            debug!("grid trading disabled, skipping cycle");
            return CycleReport::disabled();
        }

        let mut report = CycleReport {
            timestamp: Utc::now(),
            enabled: true,
            symbols: BTreeMap::new(),
            errors: Vec::new(),
        };

        for symbol in &self.symbols {
            match self.run_symbol(symbol, manager).await {
                Ok(action) => {
                    report.symbols.insert(symbol.clone(), action);
                }
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, retryable = e.is_retryable(), "cycle error");
                    report.errors.push(CycleError {
                        symbol: symbol.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        report
    }

    async fn run_symbol(
        &self,
        symbol: &str,
        manager: &mut GridOrderManager,
    ) -> TradingResult<CycleAction> {
        // No live price means no decision this cycle, not even grid setup.
        let current_price = self.current_price(symbol).await?;

        let needs_init = match manager.grid(symbol) {
            None => true,
            Some(grid) => grid.status == GridStatus::Stopped,
        };

        if needs_init {
            return self.start_grid(symbol, manager, current_price).await;
        }

        let center = manager
            .grid(symbol)
            .map(|g| g.center_price)
            .ok_or_else(|| TradingError::GridNotFound(symbol.to_string()))?;
        let deviation_pct = ((current_price - center) / center).abs() * 100.0;

        if deviation_pct > self.config.boundary_stop_pct {
            // Circuit breaker. The grid ends Stopped, so the next cycle
            // rebuilds it around the new price regime.
            warn!(
                symbol,
                current_price, center, deviation_pct, "price breached grid boundary, stopping"
            );
            let summary = manager.stop_grid(symbol).await?;
            return Ok(CycleAction::BoundaryStop(summary));
        }

        if deviation_pct > self.config.recenter_threshold_pct {
            // Recenter only on a smoothed center; the instantaneous price is
            // too noisy to rebuild a whole ladder around.
            if let Some(new_center) = self.grid_center(symbol).await {
                info!(symbol, new_center, deviation_pct, "recentering grid");
                manager
                    .recenter_grid(
                        symbol,
                        new_center,
                        self.config.spacing_pct,
                        self.config.levels,
                    )
                    .await;
                return Ok(CycleAction::Recenter { new_center });
            }
            warn!(
                symbol,
                deviation_pct, "recenter deferred, not enough history for a smoothed center"
            );
        }

        let update = manager.check_and_update_orders(symbol).await;
        Ok(CycleAction::Update(update))
    }

    async fn start_grid(
        &self,
        symbol: &str,
        manager: &mut GridOrderManager,
        current_price: f64,
    ) -> TradingResult<CycleAction> {
        let center_price = match self.grid_center(symbol).await {
            Some(center) => center,
            None => {
                // Thin history: fall back to the live price so new listings
                // still get a grid.
                warn!(
                    symbol,
                    price = current_price,
                    "not enough history for a smoothed center, using current price"
                );
                current_price
            }
        };

        let qty_per_level = self.qty_per_level(symbol, center_price).await?;

        manager.initialize_grid(
            symbol,
            center_price,
            self.config.spacing_pct,
            self.config.levels,
            qty_per_level,
        );
        let orders_placed = manager.place_grid_orders(symbol).await;

        Ok(CycleAction::Initialize {
            center_price,
            qty_per_level,
            orders_placed,
        })
    }

    /// Smoothed grid center: mean close of the last 24 hourly bars.
    ///
    /// Returns None with fewer than 12 bars rather than centering a grid on
    /// a handful of samples.
    async fn grid_center(&self, symbol: &str) -> Option<f64> {
        let end = Utc::now();
        let query = BarsQuery {
            symbol: symbol.to_string(),
            timeframe: "1Hour".to_string(),
            start: end - Duration::hours(24),
            end,
            limit: 24,
        };

        let bars = match self.broker.get_bars(&query).await {
            Ok(bars) => bars,
            Err(e) => {
                warn!(symbol, error = %e, "failed to fetch hourly bars for grid center");
                return None;
            }
        };

        if bars.len() < 12 {
            debug!(symbol, bars = bars.len(), "too few hourly bars for grid center");
            return None;
        }

        let mean = bars.iter().map(|b| b.close).sum::<f64>() / bars.len() as f64;
        Some((mean * 100.0).round() / 100.0)
    }

    /// Latest traded price from minute bars over the last hour.
    async fn current_price(&self, symbol: &str) -> TradingResult<f64> {
        let end = Utc::now();
        let query = BarsQuery {
            symbol: symbol.to_string(),
            timeframe: "1Min".to_string(),
            start: end - Duration::hours(1),
            end,
            limit: 10,
        };

        let bars = self.broker.get_bars(&query).await?;
        bars.last()
            .map(|b| b.close)
            .ok_or_else(|| TradingError::PriceUnavailable(symbol.to_string()))
    }

    /// Size one rung from the portfolio allocation.
    ///
    /// allocation is split evenly across the buy rungs, then converted to
    /// quantity at the center price and rounded to the symbol's precision.
    async fn qty_per_level(&self, symbol: &str, center_price: f64) -> TradingResult<f64> {
        let account = self.broker.get_account().await?;
        let allocation = account.portfolio_value * self.config.allocation_pct / 100.0;
        let per_level_notional = allocation / self.config.levels as f64;
        let qty = round_qty(symbol, per_level_notional / center_price);

        if qty <= 0.0 {
            return Err(TradingError::InsufficientAllocation(symbol.to_string()));
        }

        Ok(qty)
    }

    /// Combined status of all managed grids, for status commands and logs.
    pub fn get_grid_summary(&self, manager: &GridOrderManager) -> Vec<GridStatusView> {
        manager.get_grid_summary()
    }
}

/// Round an order quantity to the precision the venue accepts.
fn round_qty(symbol: &str, qty: f64) -> f64 {
    let decimals: u32 = if symbol.contains("BTC") {
        4
    } else if symbol.contains("ETH") {
        3
    } else {
        2
    };
    let factor = 10f64.powi(decimals as i32);
    (qty * factor).floor() / factor
}
