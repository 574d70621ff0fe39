use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::TradeStatus;

/// Main error type for the coordination engine
#[derive(Error, Debug)]
pub enum QuorumError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Market data errors
    #[error("Invalid market data: {0}")]
    InvalidMarketData(String),

    // Agent errors
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Strategy error: {0}")]
    Strategy(#[from] StrategyError),

    // Messaging errors
    #[error("Unknown recipient: {0}")]
    UnknownRecipient(String),

    #[error("Inbox full for {recipient} (capacity {capacity})")]
    InboxFull { recipient: String, capacity: usize },

    // Execution errors
    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Execution timeout after {elapsed_ms}ms")]
    ExecutionTimeout { elapsed_ms: u64 },

    // Portfolio errors
    #[error("Portfolio error: {0}")]
    Portfolio(#[from] PortfolioError),

    #[error("Trade record error: {0}")]
    TradeState(#[from] TradeStateError),

    // Risk errors
    #[error("Trading halted: {0}")]
    TradingHalted(String),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // Runtime errors
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for QuorumError
pub type Result<T> = std::result::Result<T, QuorumError>;

/// Errors raised by a strategy while evaluating market data
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StrategyError {
    #[error("Not enough data: have {have}, need {need}")]
    InsufficientData { have: usize, need: usize },

    #[error("Non-positive price for {symbol}: {price}")]
    InvalidPrice { symbol: String, price: Decimal },

    #[error("Degenerate statistics: {0}")]
    Degenerate(String),
}

/// Errors raised when a fill cannot be applied to the portfolio
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PortfolioError {
    #[error("Insufficient cash: available ${available}, required ${required}")]
    InsufficientCash { available: Decimal, required: Decimal },

    #[error("Insufficient position in {symbol}: held {held}, required {required}")]
    InsufficientPosition {
        symbol: String,
        held: Decimal,
        required: Decimal,
    },

    #[error("Invalid fill price for {symbol}: {price}")]
    InvalidPrice { symbol: String, price: Decimal },

    #[error("Invalid trade amount: {0}")]
    InvalidAmount(Decimal),

    #[error("HOLD cannot be applied as a fill")]
    NoAction,
}

/// Errors raised by illegal trade record transitions
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TradeStateError {
    #[error("Trade {id} already finalized as {status}")]
    AlreadyFinalized { id: String, status: TradeStatus },

    #[error("Trade {id} cannot transition to {status}")]
    NotTerminal { id: String, status: TradeStatus },
}
