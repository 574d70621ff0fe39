//! Risk limits

use serde::{Deserialize, Serialize};

/// Portfolio-level limits enforced by the risk gate. Ratios are fractions
/// of total portfolio value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskLimits {
    /// Drawdown from the high-water mark that halts trading
    pub max_drawdown: f64,
    /// Fraction of `max_drawdown` that raises a MEDIUM warning
    pub drawdown_warning_ratio: f64,
    /// Largest single position, as a fraction of total value
    pub max_position_size_pct: f64,
    /// Loss since the start of the UTC day, as a fraction of that day's opening value
    pub max_daily_loss_pct: f64,
    /// Herfindahl index of position weights
    pub max_concentration: f64,
    /// Gross exposure / equity
    pub max_leverage: f64,
    /// Confidence level for historical VaR
    pub var_confidence: f64,
    /// Minimum gap between two alerts of the same kind
    pub alert_cooldown_secs: u64,
    /// Risk cycle period
    pub cycle_interval_ms: u64,
    /// Portfolio values kept for volatility / VaR / Sharpe
    pub value_history: usize,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_drawdown: 0.15,
            drawdown_warning_ratio: 0.8,
            max_position_size_pct: 0.25,
            max_daily_loss_pct: 0.05,
            max_concentration: 0.6,
            max_leverage: 1.0,
            var_confidence: 0.95,
            alert_cooldown_secs: 60,
            cycle_interval_ms: 5_000,
            value_history: 500,
        }
    }
}

impl RiskLimits {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        for (name, v) in [
            ("max_drawdown", self.max_drawdown),
            ("drawdown_warning_ratio", self.drawdown_warning_ratio),
            ("max_position_size_pct", self.max_position_size_pct),
            ("max_daily_loss_pct", self.max_daily_loss_pct),
            ("max_concentration", self.max_concentration),
        ] {
            if v <= 0.0 || v > 1.0 {
                errors.push(format!("risk.{name} must be within (0, 1]"));
            }
        }
        if self.max_leverage <= 0.0 {
            errors.push("risk.max_leverage must be positive".to_string());
        }
        if self.var_confidence <= 0.5 || self.var_confidence >= 1.0 {
            errors.push("risk.var_confidence must be within (0.5, 1)".to_string());
        }
        if self.cycle_interval_ms == 0 {
            errors.push("risk.cycle_interval_ms must be > 0".to_string());
        }
        if self.value_history < 2 {
            errors.push("risk.value_history must be >= 2".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
