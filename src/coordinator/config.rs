//! Coordinator Configuration

use serde::{Deserialize, Serialize};

/// Aggregation, regime and rebalancing parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Signals older than this are excluded from aggregation
    pub staleness_secs: u64,
    /// Signals below this confidence are ignored
    pub min_signal_confidence: f64,
    /// Winning score must exceed this to leave HOLD
    pub action_threshold: f64,

    // === Regime ===
    /// Samples kept per symbol for regime estimation
    pub regime_window: usize,
    /// Fractional change over the window that counts as a trend (0.05 = 5%)
    pub trend_threshold: f64,
    /// Return std-dev below this is LOW volatility
    pub low_volatility: f64,
    /// Return std-dev at or above this is HIGH volatility
    pub high_volatility: f64,
    pub trend_aligned_factor: f64,
    pub trend_opposed_factor: f64,
    pub high_volatility_factor: f64,

    // === Consensus ===
    /// Bonus per contributing agent on the winning side
    pub consensus_step: f64,
    pub consensus_cap: f64,

    /// Outcomes kept per agent for the performance multiplier
    pub performance_window: usize,

    // === Rebalancing ===
    /// Aggregate |target - effective| that triggers rebalance advice
    pub rebalance_threshold: f64,
    /// Per-agent deviation below which no advice is sent
    pub rebalance_tolerance: f64,
    /// Executed contributions kept for effective allocation
    pub allocation_ledger_size: usize,

    // === Risk scaling ===
    pub high_alert_scale: f64,
    pub medium_alert_scale: f64,
    /// How long a risk scale stays in force
    pub risk_scale_secs: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            staleness_secs: 30,
            min_signal_confidence: 0.3,
            action_threshold: 0.3,
            regime_window: 20,
            trend_threshold: 0.05,
            low_volatility: 0.01,
            high_volatility: 0.03,
            trend_aligned_factor: 1.1,
            trend_opposed_factor: 0.9,
            high_volatility_factor: 0.8,
            consensus_step: 0.05,
            consensus_cap: 0.15,
            performance_window: 20,
            rebalance_threshold: 0.10,
            rebalance_tolerance: 0.02,
            allocation_ledger_size: 50,
            high_alert_scale: 0.5,
            medium_alert_scale: 0.75,
            risk_scale_secs: 60,
        }
    }
}

impl CoordinatorConfig {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.staleness_secs == 0 {
            errors.push("coordinator.staleness_secs must be > 0".to_string());
        }
        for (name, v) in [
            ("min_signal_confidence", self.min_signal_confidence),
            ("action_threshold", self.action_threshold),
            ("consensus_cap", self.consensus_cap),
            ("high_alert_scale", self.high_alert_scale),
            ("medium_alert_scale", self.medium_alert_scale),
        ] {
            if !(0.0..=1.0).contains(&v) {
                errors.push(format!("coordinator.{name} must be within 0-1"));
            }
        }
        if self.regime_window < 2 {
            errors.push("coordinator.regime_window must be >= 2".to_string());
        }
        if self.low_volatility >= self.high_volatility {
            errors.push("coordinator.low_volatility must be below high_volatility".to_string());
        }
        if self.performance_window == 0 || self.allocation_ledger_size == 0 {
            errors.push("coordinator windows must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
