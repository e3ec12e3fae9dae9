// Grid entities: levels, per-symbol state, and rung price math

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Side a grid level trades on. A rung that was a buy can later host a
/// sell (and back again) as fills cascade through the ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderRole {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelStatus {
    #[default]
    Pending,
    Open,
    Filled,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GridStatus {
    #[default]
    Active,
    Paused,
    Stopped,
}

/// Price of rung `level` on a grid's signed ladder.
///
/// The ladder is uniform: `price(i) = center * (1 + spacing_pct/100 * i)`,
/// so negative rungs sit below center (buy side) and positive rungs above
/// (sell side). Rung 0 prices at exactly the center; it is never created by
/// grid initialization but is a valid target for a replacement sell.
pub fn rung_price(center_price: f64, spacing_pct: f64, level: i32) -> f64 {
    round_price(center_price * (1.0 + spacing_pct / 100.0 * level as f64))
}

/// Round a price to cents.
pub fn round_price(price: f64) -> f64 {
    (price * 100.0).round() / 100.0
}

/// One rung of the grid and the state of its broker order, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridLevel {
    /// Signed rung index: negative below center, positive above.
    pub level: i32,
    /// Absolute limit price for this rung.
    pub price: f64,
    pub order_type: OrderRole,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub status: LevelStatus,
    #[serde(default)]
    pub filled_qty: f64,
    #[serde(default)]
    pub filled_price: Option<f64>,
}

impl GridLevel {
    /// A freshly constructed rung with no broker order yet.
    pub fn pending(level: i32, price: f64, order_type: OrderRole) -> Self {
        Self {
            level,
            price,
            order_type,
            order_id: None,
            status: LevelStatus::Pending,
            filled_qty: 0.0,
            filled_price: None,
        }
    }

    /// Repurpose this rung for a new open order, clearing stale fill data.
    pub fn reopen(&mut self, order_type: OrderRole, price: f64, order_id: String) {
        self.order_type = order_type;
        self.price = price;
        self.order_id = Some(order_id);
        self.status = LevelStatus::Open;
        self.filled_qty = 0.0;
        self.filled_price = None;
    }
}

fn default_spacing_pct() -> f64 {
    2.0
}

/// Full state of one symbol's grid. Mutated only through `GridOrderManager`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridState {
    pub symbol: String,
    pub center_price: f64,
    /// Spacing between adjacent rungs, as a percentage of center.
    /// Persisted so replacement orders can be priced after a restart.
    /// Documents written before this field existed assumed 2%.
    #[serde(default = "default_spacing_pct")]
    pub spacing_pct: f64,
    pub qty_per_level: f64,
    #[serde(default)]
    pub levels: Vec<GridLevel>,
    #[serde(default)]
    pub total_invested: f64,
    #[serde(default)]
    pub realized_profit: f64,
    #[serde(default)]
    pub status: GridStatus,
    pub last_updated: DateTime<Utc>,
}

impl GridState {
    pub fn new(
        symbol: &str,
        center_price: f64,
        spacing_pct: f64,
        qty_per_level: f64,
        levels: Vec<GridLevel>,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            center_price,
            spacing_pct,
            qty_per_level,
            levels,
            total_invested: 0.0,
            realized_profit: 0.0,
            status: GridStatus::Active,
            last_updated: Utc::now(),
        }
    }

    /// Get a rung by its signed index.
    pub fn level(&self, level_num: i32) -> Option<&GridLevel> {
        self.levels.iter().find(|l| l.level == level_num)
    }

    pub fn level_mut(&mut self, level_num: i32) -> Option<&mut GridLevel> {
        self.levels.iter_mut().find(|l| l.level == level_num)
    }

    /// All rungs currently holding an open broker order.
    pub fn open_levels(&self) -> Vec<&GridLevel> {
        self.levels
            .iter()
            .filter(|l| l.status == LevelStatus::Open)
            .collect()
    }

    /// Filled buy rungs, i.e. inventory the grid currently holds.
    pub fn filled_buys(&self) -> Vec<&GridLevel> {
        self.levels
            .iter()
            .filter(|l| l.order_type == OrderRole::Buy && l.status == LevelStatus::Filled)
            .collect()
    }

    pub fn touch(&mut self) {
        self.last_updated = Utc::now();
    }
}
