//! Cloneable operator handle

use tokio::sync::{broadcast, mpsc, oneshot};

use super::command::OrchestratorCommand;
use super::events::{SystemEvent, SystemHealth};
use crate::agents::{AgentConfig, AgentHealth, AgentSnapshot};
use crate::domain::{MarketTick, TradeRecord};
use crate::error::{QuorumError, Result};
use crate::portfolio::PortfolioSnapshot;
use crate::risk::{PolicyLimits, RiskMetrics, RiskSnapshot};

/// The only way into a running orchestrator. All reads return snapshots.
#[derive(Clone)]
pub struct OrchestratorHandle {
    cmd_tx: mpsc::Sender<OrchestratorCommand>,
    events: broadcast::Sender<SystemEvent>,
}

impl OrchestratorHandle {
    pub(crate) fn new(
        cmd_tx: mpsc::Sender<OrchestratorCommand>,
        events: broadcast::Sender<SystemEvent>,
    ) -> Self {
        Self { cmd_tx, events }
    }

    async fn send(&self, cmd: OrchestratorCommand) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| QuorumError::ChannelClosed("orchestrator command channel".into()))
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> OrchestratorCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.send(build(tx)).await?;
        rx.await
            .map_err(|_| QuorumError::ChannelClosed("orchestrator reply dropped".into()))
    }

    /// Push one market data event
    pub async fn publish_market_data(&self, tick: MarketTick) -> Result<()> {
        self.send(OrchestratorCommand::MarketData(tick)).await
    }

    /// Returns true if this call moved the system to HALTED
    pub async fn emergency_halt(&self, reason: &str) -> Result<bool> {
        let reason = reason.to_string();
        self.request(|reply| OrchestratorCommand::EmergencyHalt { reason, reply })
            .await
    }

    /// Returns true if a halt was cleared
    pub async fn reset_emergency_halt(&self) -> Result<bool> {
        self.request(OrchestratorCommand::ResetEmergencyHalt).await
    }

    /// Stage per-agent policy limits; they apply on the next risk cycle
    pub async fn update_policy(&self, agent_id: &str, limits: PolicyLimits) -> Result<()> {
        let agent_id = agent_id.to_string();
        self.request(|reply| OrchestratorCommand::UpdatePolicy {
            agent_id,
            limits,
            reply,
        })
        .await?
    }

    pub async fn update_agent_config(&self, config: AgentConfig) -> Result<()> {
        self.request(|reply| OrchestratorCommand::UpdateAgentConfig { config, reply })
            .await?
    }

    pub async fn portfolio(&self) -> Result<PortfolioSnapshot> {
        self.request(OrchestratorCommand::Portfolio).await
    }

    pub async fn risk(&self) -> Result<RiskSnapshot> {
        self.request(OrchestratorCommand::Risk).await
    }

    /// Metrics from the last risk cycle, if one has run
    pub async fn risk_metrics(&self) -> Result<Option<RiskMetrics>> {
        Ok(self.risk().await?.metrics)
    }

    /// Most recent terminal trade records, newest last
    pub async fn trade_history(&self, limit: usize) -> Result<Vec<TradeRecord>> {
        self.request(|reply| OrchestratorCommand::TradeHistory { limit, reply })
            .await
    }

    pub async fn agent_health(&self) -> Result<Vec<AgentHealth>> {
        self.request(OrchestratorCommand::AgentHealth).await
    }

    pub async fn agent_snapshots(&self) -> Result<Vec<AgentSnapshot>> {
        self.request(OrchestratorCommand::AgentSnapshots).await
    }

    pub async fn system_health(&self) -> Result<SystemHealth> {
        self.request(OrchestratorCommand::SystemHealth).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SystemEvent> {
        self.events.subscribe()
    }

    /// Stop agents, leave the loop and wait for in-flight executions
    pub async fn stop(&self) -> Result<()> {
        self.request(OrchestratorCommand::Stop).await
    }
}
