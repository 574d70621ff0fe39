//! Portfolio state and trade history, owned by the orchestrator

pub mod history;
pub mod state;

pub use history::TradeHistory;
pub use state::{FillOutcome, PortfolioSnapshot, PortfolioState, PositionView};
