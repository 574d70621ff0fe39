//! Per-agent policy limits supplied by an external policy source.
//!
//! Updates are staged and only take effect at the start of the next risk
//! cycle, so one cycle never sees two different policies.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyLimits {
    /// Cap on the notional this agent may contribute to one trade
    pub max_trade_notional: Option<Decimal>,
    /// Decisions backed by this agent need at least this confidence
    pub min_approval_confidence: f64,
    pub trading_enabled: bool,
}

impl Default for PolicyLimits {
    fn default() -> Self {
        Self {
            max_trade_notional: None,
            min_approval_confidence: 0.0,
            trading_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PolicyBook {
    active: HashMap<String, PolicyLimits>,
    staged: HashMap<String, PolicyLimits>,
}

impl PolicyBook {
    pub fn stage(&mut self, agent_id: &str, limits: PolicyLimits) {
        self.staged.insert(agent_id.to_string(), limits);
    }

    /// Promote staged updates; returns how many were applied
    pub fn apply_staged(&mut self) -> usize {
        let n = self.staged.len();
        for (agent_id, limits) in self.staged.drain() {
            info!(
                agent = %agent_id,
                trading_enabled = limits.trading_enabled,
                min_confidence = limits.min_approval_confidence,
                max_notional = ?limits.max_trade_notional,
                "policy limits applied"
            );
            self.active.insert(agent_id, limits);
        }
        n
    }

    pub fn get(&self, agent_id: &str) -> Option<&PolicyLimits> {
        self.active.get(agent_id)
    }

    pub fn pending(&self) -> usize {
        self.staged.len()
    }
}
