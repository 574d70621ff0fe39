//! Typed message envelope shared by agents, coordinator, risk gate and orchestrator

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{MarketTick, Signal, TradeAction};
use crate::risk::RiskMetrics;

pub const COORDINATOR_ID: &str = "coordinator";
pub const RISK_MANAGER_ID: &str = "risk-manager";
pub const ORCHESTRATOR_ID: &str = "orchestrator";
/// Recipient meaning "every agent"
pub const BROADCAST: &str = "*";

/// Delivery priority; declaration order gives `Low < Medium < High < Critical`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "LOW",
            Priority::Medium => "MEDIUM",
            Priority::High => "HIGH",
            Priority::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Signal,
    Coordination,
    RiskAlert,
    PositionUpdate,
    MarketUpdate,
}

/// Risk alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn priority(&self) -> Priority {
        match self {
            Severity::Medium => Priority::Medium,
            Severity::High => Priority::High,
            Severity::Critical => Priority::Critical,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Which limit an alert is about; alerts are throttled per kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreachKind {
    Drawdown,
    DrawdownWarning,
    DailyLoss,
    Leverage,
    Concentration,
    EmergencyHalt,
}

impl BreachKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreachKind::Drawdown => "drawdown",
            BreachKind::DrawdownWarning => "drawdown_warning",
            BreachKind::DailyLoss => "daily_loss",
            BreachKind::Leverage => "leverage",
            BreachKind::Concentration => "concentration",
            BreachKind::EmergencyHalt => "emergency_halt",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAlert {
    pub severity: Severity,
    pub kind: BreachKind,
    pub message: String,
    pub metrics: Option<RiskMetrics>,
}

/// Advisory instructions from the coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "directive", rename_all = "snake_case")]
pub enum CoordinationDirective {
    /// Move toward the configured allocation
    Rebalance { target: f64, effective: f64 },
    /// Emergency halt cleared; leave defensive mode
    ResumeTrading,
}

/// Broadcast after a fill is applied to the portfolio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub trade_id: String,
    pub symbol: String,
    pub action: TradeAction,
    pub amount: Decimal,
    pub quantity: Decimal,
    pub fill_price: Decimal,
    pub pnl: Option<Decimal>,
    pub position_quantity: Decimal,
    pub cash_balance: Decimal,
    pub total_value: Decimal,
    pub contributing_agents: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessagePayload {
    Signal(Signal),
    Coordination(CoordinationDirective),
    RiskAlert(RiskAlert),
    PositionUpdate(PositionUpdate),
    MarketUpdate(MarketTick),
}

impl MessagePayload {
    pub fn message_type(&self) -> MessageType {
        match self {
            MessagePayload::Signal(_) => MessageType::Signal,
            MessagePayload::Coordination(_) => MessageType::Coordination,
            MessagePayload::RiskAlert(_) => MessageType::RiskAlert,
            MessagePayload::PositionUpdate(_) => MessageType::PositionUpdate,
            MessagePayload::MarketUpdate(_) => MessageType::MarketUpdate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub from: String,
    pub to: String,
    pub priority: Priority,
    pub timestamp: DateTime<Utc>,
    pub payload: MessagePayload,
}

impl Message {
    pub fn new(
        from: &str,
        to: &str,
        priority: Priority,
        payload: MessagePayload,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            from: from.to_string(),
            to: to.to_string(),
            priority,
            timestamp,
            payload,
        }
    }

    /// Agent signal addressed to the coordinator
    pub fn signal(from: &str, signal: Signal) -> Self {
        let priority = if signal.confidence > 0.7 {
            Priority::High
        } else {
            Priority::Medium
        };
        let timestamp = signal.created_at;
        Self::new(
            from,
            COORDINATOR_ID,
            priority,
            MessagePayload::Signal(signal),
            timestamp,
        )
    }

    pub fn message_type(&self) -> MessageType {
        self.payload.message_type()
    }

    pub fn is_broadcast(&self) -> bool {
        self.to == BROADCAST
    }

    /// Copy of a broadcast addressed to one concrete recipient
    pub fn readdressed(&self, to: &str) -> Self {
        Self {
            to: to.to_string(),
            ..self.clone()
        }
    }
}

/// Order one delivery batch: highest priority first, arrival order within a
/// priority. `sort_by_key` is stable.
pub fn sort_batch(batch: &mut [Message]) {
    batch.sort_by_key(|m| std::cmp::Reverse(m.priority));
}
