//! Unified error handling for the grid order bot
//!
//! One error type replaces Box<dyn Error> throughout the application with
//! context-rich, actionable error messages.

use std::fmt;
use std::io;

use crate::broker::BrokerError;
use crate::config::ConfigError;
use crate::persistence::StoreError;

/// Main error type for the grid order bot
#[derive(Debug)]
pub enum TradingError {
    // Configuration errors
    ConfigNotFound(String),
    ConfigParse(String),
    ConfigValidation(String),

    // State store errors
    StateRead(String),
    StateWrite(String),
    StateDecode(String),

    // Broker errors keep their typed form so callers can still match
    Broker(BrokerError),

    // Strategy errors
    GridNotFound(String),
    PriceUnavailable(String),
    InsufficientData(String),
    InsufficientAllocation(String),

    // IO errors
    FileNotFound(String),
    FileRead(String),
    FileWrite(String),

    // General errors
    Internal(String),
}

impl TradingError {
    /// Get a user-friendly error message with helpful context
    pub fn user_message(&self) -> String {
        match self {
            TradingError::ConfigNotFound(path) => {
                format!(
                    "Configuration file not found: {}\n\n\
                    💡 Quick fix:\n\
                    1. Run: grid-bot init\n\
                    2. Edit config.toml with your API keys\n\
                    3. Try again",
                    path
                )
            }
            TradingError::ConfigValidation(msg) => {
                format!(
                    "Configuration validation error: {}\n\n\
                    💡 Check config.toml for:\n\
                    - Valid API keys (not placeholders)\n\
                    - Positive numeric values\n\
                    - recenter threshold below the boundary stop",
                    msg
                )
            }
            TradingError::Broker(BrokerError::RateLimited { retry_after }) => {
                format!(
                    "Broker rate limit exceeded (retry after {}s)\n\n\
                    💡 The next cycle will retry automatically",
                    retry_after.unwrap_or(60)
                )
            }
            TradingError::InsufficientAllocation(symbol) => {
                format!(
                    "Allocation too small to size a grid for {}\n\n\
                    💡 Either:\n\
                    - Increase [grid] allocation_pct\n\
                    - Reduce [grid] levels",
                    symbol
                )
            }
            _ => self.to_string(),
        }
    }

    /// Check if error is retryable on the next cycle
    pub fn is_retryable(&self) -> bool {
        match self {
            TradingError::Broker(e) => e.is_retryable(),
            TradingError::PriceUnavailable(_) | TradingError::InsufficientData(_) => true,
            _ => false,
        }
    }

    /// Get error category for logging/metrics
    pub fn category(&self) -> &'static str {
        match self {
            TradingError::ConfigNotFound(_)
            | TradingError::ConfigParse(_)
            | TradingError::ConfigValidation(_) => "config",

            TradingError::StateRead(_)
            | TradingError::StateWrite(_)
            | TradingError::StateDecode(_) => "state",

            TradingError::Broker(_) => "broker",

            TradingError::GridNotFound(_)
            | TradingError::PriceUnavailable(_)
            | TradingError::InsufficientData(_)
            | TradingError::InsufficientAllocation(_) => "strategy",

            TradingError::FileNotFound(_)
            | TradingError::FileRead(_)
            | TradingError::FileWrite(_) => "io",

            TradingError::Internal(_) => "internal",
        }
    }
}

impl fmt::Display for TradingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradingError::ConfigNotFound(path) => {
                write!(f, "Configuration file not found: {}", path)
            }
            TradingError::ConfigParse(msg) => {
                write!(f, "Configuration parse error: {}", msg)
            }
            TradingError::ConfigValidation(msg) => {
                write!(f, "Configuration validation error: {}", msg)
            }

            TradingError::StateRead(msg) => {
                write!(f, "Failed to read grid state: {}", msg)
            }
            TradingError::StateWrite(msg) => {
                write!(f, "Failed to write grid state: {}", msg)
            }
            TradingError::StateDecode(msg) => {
                write!(f, "Failed to decode grid state: {}", msg)
            }

            TradingError::Broker(err) => {
                write!(f, "Broker error: {}", err)
            }

            TradingError::GridNotFound(symbol) => {
                write!(f, "No grid exists for symbol: {}", symbol)
            }
            TradingError::PriceUnavailable(symbol) => {
                write!(f, "Could not get current price for: {}", symbol)
            }
            TradingError::InsufficientData(msg) => {
                write!(f, "Insufficient market data: {}", msg)
            }
            TradingError::InsufficientAllocation(symbol) => {
                write!(f, "Insufficient allocation for grid: {}", symbol)
            }

            TradingError::FileNotFound(path) => {
                write!(f, "File not found: {}", path)
            }
            TradingError::FileRead(msg) => {
                write!(f, "File read error: {}", msg)
            }
            TradingError::FileWrite(msg) => {
                write!(f, "File write error: {}", msg)
            }

            TradingError::Internal(msg) => {
                write!(f, "Internal error: {}", msg)
            }
        }
    }
}

impl std::error::Error for TradingError {}

// Conversion implementations for common error types

impl From<io::Error> for TradingError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => TradingError::FileNotFound(err.to_string()),
            io::ErrorKind::PermissionDenied => TradingError::FileRead(err.to_string()),
            _ => TradingError::Internal(format!("IO error: {}", err)),
        }
    }
}

impl From<BrokerError> for TradingError {
    fn from(err: BrokerError) -> Self {
        TradingError::Broker(err)
    }
}

impl From<ConfigError> for TradingError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::FileRead(msg) => TradingError::ConfigNotFound(msg),
            ConfigError::FileWrite(msg) => TradingError::FileWrite(msg),
            ConfigError::Parse(msg) => TradingError::ConfigParse(msg),
            ConfigError::Serialize(msg) => TradingError::ConfigParse(msg),
            ConfigError::Validation(msg) => TradingError::ConfigValidation(msg),
        }
    }
}

impl From<StoreError> for TradingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Read(msg) => TradingError::StateRead(msg),
            StoreError::Write(msg) => TradingError::StateWrite(msg),
            StoreError::Decode(msg) | StoreError::Encode(msg) => TradingError::StateDecode(msg),
        }
    }
}

impl From<serde_json::Error> for TradingError {
    fn from(err: serde_json::Error) -> Self {
        TradingError::StateDecode(format!("JSON error: {}", err))
    }
}

impl From<toml::de::Error> for TradingError {
    fn from(err: toml::de::Error) -> Self {
        TradingError::ConfigParse(format!("TOML parse error: {}", err))
    }
}

impl From<String> for TradingError {
    fn from(msg: String) -> Self {
        TradingError::Internal(msg)
    }
}

impl From<&str> for TradingError {
    fn from(msg: &str) -> Self {
        TradingError::Internal(msg.to_string())
    }
}

/// Result type alias using TradingError
pub type TradingResult<T> = Result<T, TradingError>;
