//! Per-agent acceptance history feeding the aggregation weight

use std::collections::{HashMap, VecDeque};

/// Rolling record of whether each agent's contributions were accepted
pub struct PerformanceTracker {
    window: usize,
    outcomes: HashMap<String, VecDeque<bool>>,
}

impl PerformanceTracker {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            outcomes: HashMap::new(),
        }
    }

    pub fn record(&mut self, agent_id: &str, accepted: bool) {
        let buffer = self.outcomes.entry(agent_id.to_string()).or_default();
        buffer.push_back(accepted);
        while buffer.len() > self.window {
            buffer.pop_front();
        }
    }

    pub fn acceptance_ratio(&self, agent_id: &str) -> Option<f64> {
        let buffer = self.outcomes.get(agent_id)?;
        if buffer.is_empty() {
            return None;
        }
        let accepted = buffer.iter().filter(|a| **a).count();
        Some(accepted as f64 / buffer.len() as f64)
    }

    /// 1.0 without history, otherwise 0.75 (never accepted) to 1.25 (always)
    pub fn multiplier(&self, agent_id: &str) -> f64 {
        self.acceptance_ratio(agent_id)
            .map_or(1.0, |ratio| 0.75 + 0.5 * ratio)
    }
}
