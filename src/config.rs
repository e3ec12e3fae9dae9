// Configuration management for the grid order bot

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub key_id: String,
    pub secret_key: String,
    /// Trading API base URL (paper or live).
    pub base_url: String,
    /// Market data API base URL.
    pub data_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Spacing between adjacent rungs, percent of center price.
    pub spacing_pct: f64,
    /// Rungs above and below center.
    pub levels: usize,
    /// Comma-separated symbols to run grids on.
    pub symbols: String,
    /// Percent of portfolio value committed across all buy rungs.
    pub allocation_pct: f64,
    /// Hard stop: liquidate when price drifts this far from center.
    pub boundary_stop_pct: f64,
    /// Rebuild the grid around a fresh center beyond this deviation.
    pub recenter_threshold_pct: f64,
    pub check_interval_minutes: u64,
    pub enabled: bool,
}

impl GridConfig {
    /// Symbols as a trimmed list, empty entries dropped.
    pub fn symbol_list(&self) -> Vec<String> {
        self.symbols
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub enable_cycle_logging: bool,
    pub enable_order_logging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub grid: GridConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                key_id: "YOUR_KEY_ID".to_string(),
                secret_key: "YOUR_SECRET_KEY".to_string(),
                base_url: "https://paper-api.alpaca.markets".to_string(),
                data_url: "https://data.alpaca.markets".to_string(),
            },
            grid: GridConfig {
                spacing_pct: 2.0,
                levels: 3,
                symbols: "BTC/USD,ETH/USD".to_string(),
                allocation_pct: 10.0,
                boundary_stop_pct: 10.0,
                recenter_threshold_pct: 5.0,
                check_interval_minutes: 5,
                enabled: true,
            },
            logging: LoggingConfig {
                enable_cycle_logging: true,
                enable_order_logging: true,
            },
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|e| ConfigError::FileRead(e.to_string()))?;

        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;

        fs::write(path, content).map_err(|e| ConfigError::FileWrite(e.to_string()))?;

        Ok(())
    }

    /// Load configuration from file, or create default if file doesn't exist
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            let config = Self::default();
            config.to_file(&path)?;
            tracing::info!("created default config file: {}", path.as_ref().display());
            Ok(config)
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid.spacing_pct <= 0.0 {
            return Err(ConfigError::Validation(
                "spacing_pct must be positive".to_string(),
            ));
        }

        if self.grid.levels == 0 {
            return Err(ConfigError::Validation(
                "levels must be greater than 0".to_string(),
            ));
        }

        if self.grid.symbol_list().is_empty() {
            return Err(ConfigError::Validation(
                "symbols must name at least one symbol".to_string(),
            ));
        }

        if self.grid.allocation_pct <= 0.0 || self.grid.allocation_pct > 100.0 {
            return Err(ConfigError::Validation(
                "allocation_pct must be in (0, 100]".to_string(),
            ));
        }

        if self.grid.boundary_stop_pct <= 0.0 {
            return Err(ConfigError::Validation(
                "boundary_stop_pct must be positive".to_string(),
            ));
        }

        if self.grid.recenter_threshold_pct <= 0.0 {
            return Err(ConfigError::Validation(
                "recenter_threshold_pct must be positive".to_string(),
            ));
        }

        // A recenter threshold at or above the boundary stop would never fire.
        if self.grid.recenter_threshold_pct >= self.grid.boundary_stop_pct {
            return Err(ConfigError::Validation(
                "recenter_threshold_pct must be below boundary_stop_pct".to_string(),
            ));
        }

        if self.grid.check_interval_minutes == 0 {
            return Err(ConfigError::Validation(
                "check_interval_minutes must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(String),

    #[error("Failed to write config file: {0}")]
    FileWrite(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}
