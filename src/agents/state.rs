use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::numeric::dec_to_f64;
use crate::domain::Signal;
use crate::messaging::QueueStats;

/// Outcome counters for trades an agent contributed to
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentPerformance {
    pub total_trades: u64,
    pub successful_trades: u64,
    pub total_pnl: Decimal,
    /// Mean realised return per closing trade
    pub average_return: f64,
    #[serde(skip)]
    closed_trades: u64,
}

impl AgentPerformance {
    /// Record one executed trade. `pnl` is present only for closing trades.
    pub fn record(&mut self, amount: Decimal, pnl: Option<Decimal>) {
        self.total_trades += 1;
        match pnl {
            Some(pnl) => {
                if pnl >= Decimal::ZERO {
                    self.successful_trades += 1;
                }
                self.total_pnl += pnl;
                if amount > Decimal::ZERO {
                    let ret = dec_to_f64(pnl) / dec_to_f64(amount);
                    self.closed_trades += 1;
                    let n = self.closed_trades as f64;
                    self.average_return += (ret - self.average_return) / n;
                }
            }
            None => self.successful_trades += 1,
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_trades == 0 {
            return 0.0;
        }
        self.successful_trades as f64 / self.total_trades as f64
    }
}

/// Mutable agent state. Only the owning agent writes it; callers get clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub is_active: bool,
    pub last_update: DateTime<Utc>,
    pub current_signal: Option<Signal>,
    pub performance: AgentPerformance,
}

impl AgentState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            is_active: false,
            last_update: now,
            current_signal: None,
            performance: AgentPerformance::default(),
        }
    }
}

/// Health report for one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentHealth {
    pub agent_id: String,
    pub healthy: bool,
    pub is_active: bool,
    pub inbox: QueueStats,
    pub ms_since_update: i64,
    pub defensive: bool,
    pub issues: Vec<String>,
}

/// Read-only view handed to operators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub agent_id: String,
    pub name: String,
    pub strategy: String,
    pub state: AgentState,
    pub allocation_bias: f64,
    pub defensive: bool,
    pub window_len: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_performance_record() {
        let mut perf = AgentPerformance::default();
        perf.record(dec!(100), None);
        perf.record(dec!(100), Some(dec!(10)));
        perf.record(dec!(50), Some(dec!(-5)));

        assert_eq!(perf.total_trades, 3);
        assert_eq!(perf.successful_trades, 2);
        assert_eq!(perf.total_pnl, dec!(5));
        // mean of 0.1 and -0.1
        assert!(perf.average_return.abs() < 1e-12);
    }
}
