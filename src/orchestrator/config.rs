//! Orchestrator configuration

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Starting cash balance of the paper portfolio
    #[serde(default = "default_initial_cash")]
    pub initial_cash: Decimal,

    /// Decisions at or below this confidence are not sent to the risk gate
    #[serde(default = "default_min_decision_confidence")]
    pub min_decision_confidence: f64,

    /// Minimum gap between two executions on one symbol
    #[serde(default = "default_min_trade_interval_secs")]
    pub min_trade_interval_secs: u64,

    /// Deferred decisions older than this are dropped instead of released
    #[serde(default = "default_max_deferral_secs")]
    pub max_deferral_secs: u64,

    #[serde(default = "default_execution_timeout_ms")]
    pub execution_timeout_ms: u64,

    /// Passed to the venue with every order
    #[serde(default = "default_max_slippage")]
    pub max_slippage: f64,

    /// Period of rebalance advice, stale-signal pruning and deferred release
    #[serde(default = "default_coordination_interval_ms")]
    pub coordination_interval_ms: u64,

    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,

    /// Terminal trade records kept in memory
    #[serde(default = "default_trade_history_size")]
    pub trade_history_size: usize,

    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,

    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_initial_cash() -> Decimal {
    Decimal::from(10_000)
}

fn default_min_decision_confidence() -> f64 {
    0.5
}

fn default_min_trade_interval_secs() -> u64 {
    30
}

fn default_max_deferral_secs() -> u64 {
    120
}

fn default_execution_timeout_ms() -> u64 {
    10_000
}

fn default_max_slippage() -> f64 {
    0.01
}

fn default_coordination_interval_ms() -> u64 {
    1_000
}

fn default_health_check_interval_ms() -> u64 {
    10_000
}

fn default_trade_history_size() -> usize {
    1_000
}

fn default_command_buffer() -> usize {
    256
}

fn default_event_buffer() -> usize {
    256
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            initial_cash: default_initial_cash(),
            min_decision_confidence: default_min_decision_confidence(),
            min_trade_interval_secs: default_min_trade_interval_secs(),
            max_deferral_secs: default_max_deferral_secs(),
            execution_timeout_ms: default_execution_timeout_ms(),
            max_slippage: default_max_slippage(),
            coordination_interval_ms: default_coordination_interval_ms(),
            health_check_interval_ms: default_health_check_interval_ms(),
            trade_history_size: default_trade_history_size(),
            command_buffer: default_command_buffer(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.initial_cash <= Decimal::ZERO {
            errors.push("orchestrator.initial_cash must be positive".to_string());
        }
        if !(0.0..1.0).contains(&self.min_decision_confidence) {
            errors.push("orchestrator.min_decision_confidence must be within [0, 1)".to_string());
        }
        if self.max_deferral_secs < self.min_trade_interval_secs {
            errors.push(
                "orchestrator.max_deferral_secs should be >= min_trade_interval_secs".to_string(),
            );
        }
        if self.execution_timeout_ms == 0 {
            errors.push("orchestrator.execution_timeout_ms must be > 0".to_string());
        }
        if !(0.0..0.5).contains(&self.max_slippage) {
            errors.push("orchestrator.max_slippage must be within [0, 0.5)".to_string());
        }
        for (name, v) in [
            ("coordination_interval_ms", self.coordination_interval_ms),
            ("health_check_interval_ms", self.health_check_interval_ms),
        ] {
            if v == 0 {
                errors.push(format!("orchestrator.{name} must be > 0"));
            }
        }
        if self.trade_history_size == 0 || self.command_buffer == 0 || self.event_buffer == 0 {
            errors.push("orchestrator buffer sizes must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
