//! Commands sent to the orchestrator loop

use tokio::sync::oneshot;

use super::events::SystemHealth;
use crate::agents::{AgentConfig, AgentHealth, AgentSnapshot};
use crate::domain::{MarketTick, TradeRecord};
use crate::error::Result;
use crate::portfolio::PortfolioSnapshot;
use crate::risk::{PolicyLimits, RiskSnapshot};

/// Operator and data-feed requests. Queries reply with clones of the
/// owning loop's state.
#[derive(Debug)]
pub enum OrchestratorCommand {
    MarketData(MarketTick),
    EmergencyHalt {
        reason: String,
        reply: oneshot::Sender<bool>,
    },
    ResetEmergencyHalt(oneshot::Sender<bool>),
    UpdatePolicy {
        agent_id: String,
        limits: PolicyLimits,
        reply: oneshot::Sender<Result<()>>,
    },
    UpdateAgentConfig {
        config: AgentConfig,
        reply: oneshot::Sender<Result<()>>,
    },
    Portfolio(oneshot::Sender<PortfolioSnapshot>),
    Risk(oneshot::Sender<RiskSnapshot>),
    TradeHistory {
        limit: usize,
        reply: oneshot::Sender<Vec<TradeRecord>>,
    },
    AgentHealth(oneshot::Sender<Vec<AgentHealth>>),
    AgentSnapshots(oneshot::Sender<Vec<AgentSnapshot>>),
    SystemHealth(oneshot::Sender<SystemHealth>),
    /// Graceful shutdown; replied to once in-flight executions settled
    Stop(oneshot::Sender<()>),
}
