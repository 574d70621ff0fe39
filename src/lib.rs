pub mod agents;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod error;
pub mod execution;
pub mod feed;
pub mod messaging;
pub mod orchestrator;
pub mod portfolio;
pub mod risk;

pub use agents::{Agent, AgentConfig, AgentHealth, AgentState, StrategyConfig};
pub use config::{AppConfig, LoggingConfig};
pub use coordinator::{Coordinator, CoordinatorConfig};
pub use domain::{Decision, MarketTick, Signal, TradeAction, TradeRecord, TradeStatus};
pub use error::{QuorumError, Result};
pub use execution::{ExecutionReceipt, ExecutionRequest, ExecutionVenue, PaperVenue, VenueKind};
pub use feed::{FeedConfig, SyntheticFeed};
pub use messaging::{Message, MessagePayload, Priority};
pub use orchestrator::{
    Orchestrator, OrchestratorConfig, OrchestratorHandle, SystemEvent, SystemHealth,
};
pub use portfolio::{PortfolioSnapshot, PortfolioState, TradeHistory};
pub use risk::{PolicyLimits, RiskAssessment, RiskGate, RiskLimits, RiskMetrics, RiskSnapshot};
