//! Effective allocation ledger and rebalance advice

use std::collections::{HashMap, VecDeque};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::numeric::dec_to_f64;
use crate::domain::Decision;

/// One agent's target versus what it actually drove through execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationDrift {
    pub agent_id: String,
    pub target: f64,
    pub effective: f64,
}

impl AllocationDrift {
    pub fn deviation(&self) -> f64 {
        (self.target - self.effective).abs()
    }
}

pub struct AllocationTracker {
    capacity: usize,
    /// (agent_id, executed notional) per contribution
    ledger: VecDeque<(String, Decimal)>,
    /// Set when the ledger changed since the last rebalance check
    dirty: bool,
}

impl AllocationTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            ledger: VecDeque::new(),
            dirty: false,
        }
    }

    pub fn record_execution(&mut self, decision: &Decision) {
        for c in &decision.contributions {
            self.ledger.push_back((c.agent_id.clone(), c.amount));
        }
        while self.ledger.len() > self.capacity {
            self.ledger.pop_front();
        }
        self.dirty = !decision.contributions.is_empty() || self.dirty;
    }

    pub fn effective(&self) -> HashMap<String, f64> {
        let total: Decimal = self.ledger.iter().map(|(_, a)| *a).sum();
        let mut shares = HashMap::new();
        if total <= Decimal::ZERO {
            return shares;
        }
        for (agent, amount) in &self.ledger {
            *shares.entry(agent.clone()).or_insert(0.0) += dec_to_f64(*amount / total);
        }
        shares
    }

    /// Agents that drifted past `tolerance`, if the aggregate drift exceeds
    /// `threshold`. Only reports once per ledger change.
    pub fn drift(
        &mut self,
        targets: &HashMap<String, f64>,
        threshold: f64,
        tolerance: f64,
    ) -> Vec<AllocationDrift> {
        if !self.dirty || self.ledger.is_empty() {
            return Vec::new();
        }
        self.dirty = false;

        let effective = self.effective();
        let mut drifts: Vec<AllocationDrift> = targets
            .iter()
            .map(|(agent_id, target)| AllocationDrift {
                agent_id: agent_id.clone(),
                target: *target,
                effective: effective.get(agent_id).copied().unwrap_or(0.0),
            })
            .collect();
        drifts.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));

        let aggregate: f64 = drifts.iter().map(AllocationDrift::deviation).sum();
        if aggregate <= threshold {
            return Vec::new();
        }
        drifts.retain(|d| d.deviation() > tolerance);
        drifts
    }

    pub fn len(&self) -> usize {
        self.ledger.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ledger.is_empty()
    }
}
