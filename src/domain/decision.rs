use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{TradeAction, HOLD_CONFIDENCE};

/// One agent's share in an aggregated decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub agent_id: String,
    /// Adjusted weight (static weight x confidence x performance multiplier)
    pub weight: f64,
    pub amount: Decimal,
}

/// The coordinator's single aggregated proposal for a symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub symbol: String,
    pub action: TradeAction,
    pub amount: Decimal,
    pub confidence: f64,
    pub reasoning: String,
    pub contributions: Vec<Contribution>,
    pub created_at: DateTime<Utc>,
}

impl Decision {
    pub fn hold(symbol: &str, reasoning: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.to_string(),
            action: TradeAction::Hold,
            amount: Decimal::ZERO,
            confidence: HOLD_CONFIDENCE,
            reasoning: reasoning.into(),
            contributions: Vec::new(),
            created_at,
        }
    }

    pub fn is_actionable(&self, min_confidence: f64) -> bool {
        !self.action.is_hold() && self.amount > Decimal::ZERO && self.confidence > min_confidence
    }

    pub fn contributing_agents(&self) -> Vec<String> {
        self.contributions.iter().map(|c| c.agent_id.clone()).collect()
    }

    /// Agent with the largest adjusted weight; recorded as the initiator
    pub fn initiating_agent(&self) -> Option<&str> {
        self.contributions
            .iter()
            .max_by(|a, b| {
                a.weight
                    .partial_cmp(&b.weight)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|c| c.agent_id.as_str())
    }

    pub fn with_amount(mut self, amount: Decimal) -> Self {
        self.amount = amount.max(Decimal::ZERO);
        self
    }
}
