//! Trading agents
//!
//! Each agent wraps one strategy variant, keeps a rolling window per symbol
//! and a priority inbox, and is driven by the orchestrator: market data and
//! messages in, SIGNAL messages out. Evaluation ticks come from an abortable
//! ticker stream handed out by `Agent::start`.

pub mod agent;
pub mod config;
pub mod state;
pub mod strategies;
pub mod ticker;
pub mod traits;

pub use agent::Agent;
pub use config::{AgentConfig, StrategyConfig};
pub use state::{AgentHealth, AgentPerformance, AgentSnapshot, AgentState};
pub use strategies::Strategy;
pub use ticker::{agent_ticker, AgentTicker};
pub use traits::{EvaluationContext, SignalStrategy};
