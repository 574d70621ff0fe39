//! System events published to subscribers and the health summary

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::agents::AgentHealth;
use crate::coordinator::CoordinatorSnapshot;
use crate::domain::TradeRecord;
use crate::messaging::RiskAlert;
use crate::risk::RiskSnapshot;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SystemEvent {
    TradeExecuted(TradeRecord),
    TradeFailed(TradeRecord),
    DecisionRejected {
        symbol: String,
        reason: String,
    },
    DecisionDeferred {
        symbol: String,
        retry_in_ms: i64,
    },
    MessageDropped {
        from: String,
        to: String,
        reason: String,
    },
    RiskAlert(RiskAlert),
    Halted {
        reason: String,
    },
    HaltReset,
    HealthIssue {
        component: String,
        issue: String,
    },
}

/// Health summary across every owned component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemHealth {
    pub healthy: bool,
    pub issues: Vec<String>,
    pub agents: Vec<AgentHealth>,
    pub risk: RiskSnapshot,
    pub coordinator: CoordinatorSnapshot,
    pub total_value: Decimal,
    pub in_flight: usize,
    pub deferred: usize,
    pub checked_at: DateTime<Utc>,
}
