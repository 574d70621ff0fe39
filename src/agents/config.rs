//! Agent configuration

use serde::{Deserialize, Serialize};

/// Strategy variant and its parameters, selected at construction time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    Momentum {
        /// Samples between the reference price and the latest price
        #[serde(default = "default_momentum_lookback")]
        lookback: usize,
        /// Fractional move that counts as momentum (0.02 = 2%)
        #[serde(default = "default_momentum_threshold")]
        threshold: f64,
    },
    MeanReversion {
        #[serde(default = "default_reversion_window")]
        window: usize,
        /// |z-score| needed to fade the move
        #[serde(default = "default_z_entry")]
        z_entry: f64,
    },
    Arbitrage {
        /// Minimum relative spread against the reference venue
        #[serde(default = "default_min_spread")]
        min_spread: f64,
    },
}

fn default_momentum_lookback() -> usize {
    10
}
fn default_momentum_threshold() -> f64 {
    0.02
}
fn default_reversion_window() -> usize {
    20
}
fn default_z_entry() -> f64 {
    2.0
}
fn default_min_spread() -> f64 {
    0.005
}

impl StrategyConfig {
    pub fn momentum() -> Self {
        StrategyConfig::Momentum {
            lookback: default_momentum_lookback(),
            threshold: default_momentum_threshold(),
        }
    }

    pub fn mean_reversion() -> Self {
        StrategyConfig::MeanReversion {
            window: default_reversion_window(),
            z_entry: default_z_entry(),
        }
    }

    pub fn arbitrage() -> Self {
        StrategyConfig::Arbitrage {
            min_spread: default_min_spread(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StrategyConfig::Momentum { .. } => "momentum",
            StrategyConfig::MeanReversion { .. } => "mean_reversion",
            StrategyConfig::Arbitrage { .. } => "arbitrage",
        }
    }

    fn validate(&self, errors: &mut Vec<String>, agent_id: &str) {
        match self {
            StrategyConfig::Momentum {
                lookback,
                threshold,
            } => {
                if *lookback == 0 {
                    errors.push(format!("{agent_id}: momentum lookback must be > 0"));
                }
                if *threshold <= 0.0 {
                    errors.push(format!("{agent_id}: momentum threshold must be positive"));
                }
            }
            StrategyConfig::MeanReversion { window, z_entry } => {
                if *window < 3 {
                    errors.push(format!("{agent_id}: mean reversion window must be >= 3"));
                }
                if *z_entry <= 0.0 {
                    errors.push(format!("{agent_id}: z_entry must be positive"));
                }
            }
            StrategyConfig::Arbitrage { min_spread } => {
                if *min_spread <= 0.0 {
                    errors.push(format!("{agent_id}: min_spread must be positive"));
                }
            }
        }
    }
}

/// Identity, sizing and scheduling for one agent.
///
/// Owned by its agent; only replaced through `Agent::update_config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub agent_id: String,
    pub name: String,
    pub strategy: StrategyConfig,
    /// Share of portfolio influence, in percent
    pub allocation_percent: f64,
    /// 0.0 (cautious) - 1.0 (aggressive)
    #[serde(default = "default_risk_tolerance")]
    pub risk_tolerance: f64,
    #[serde(default = "default_evaluation_interval")]
    pub evaluation_interval_ms: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Max signal notional as a percent of the capital base
    #[serde(default = "default_max_position_size_percent")]
    pub max_position_size_percent: f64,
    /// Rolling market window capacity
    #[serde(default = "default_window_capacity")]
    pub window_capacity: usize,
    /// Inbox length above which the agent reports unhealthy
    #[serde(default = "default_backlog_threshold")]
    pub backlog_threshold: usize,
    /// Coordinator weight override; defaults to allocation_percent / 100
    #[serde(default)]
    pub weight: Option<f64>,
}

fn default_risk_tolerance() -> f64 {
    0.5
}
fn default_evaluation_interval() -> u64 {
    5_000
}
fn default_enabled() -> bool {
    true
}
fn default_max_position_size_percent() -> f64 {
    10.0
}
fn default_window_capacity() -> usize {
    100
}
fn default_backlog_threshold() -> usize {
    50
}

impl AgentConfig {
    pub fn new(agent_id: &str, strategy: StrategyConfig, allocation_percent: f64) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            name: agent_id.to_string(),
            strategy,
            allocation_percent,
            risk_tolerance: default_risk_tolerance(),
            evaluation_interval_ms: default_evaluation_interval(),
            enabled: true,
            max_position_size_percent: default_max_position_size_percent(),
            window_capacity: default_window_capacity(),
            backlog_threshold: default_backlog_threshold(),
            weight: None,
        }
    }

    pub fn with_interval_ms(mut self, ms: u64) -> Self {
        self.evaluation_interval_ms = ms;
        self
    }

    pub fn with_max_position_size_percent(mut self, pct: f64) -> Self {
        self.max_position_size_percent = pct;
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    /// Static weight used by the coordinator
    pub fn static_weight(&self) -> f64 {
        self.weight.unwrap_or(self.allocation_percent / 100.0).max(0.0)
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let id = &self.agent_id;

        if id.trim().is_empty() {
            errors.push("agent_id must not be empty".to_string());
        }
        if !(0.0..=100.0).contains(&self.allocation_percent) {
            errors.push(format!("{id}: allocation_percent must be within 0-100"));
        }
        if !(0.0..=1.0).contains(&self.risk_tolerance) {
            errors.push(format!("{id}: risk_tolerance must be within 0-1"));
        }
        if self.evaluation_interval_ms == 0 {
            errors.push(format!("{id}: evaluation_interval_ms must be > 0"));
        }
        if self.max_position_size_percent <= 0.0 || self.max_position_size_percent > 100.0 {
            errors.push(format!("{id}: max_position_size_percent must be within (0, 100]"));
        }
        if self.window_capacity < 2 {
            errors.push(format!("{id}: window_capacity must be >= 2"));
        }
        if self.backlog_threshold == 0 {
            errors.push(format!("{id}: backlog_threshold must be > 0"));
        }
        if let Some(w) = self.weight {
            if w < 0.0 {
                errors.push(format!("{id}: weight must be non-negative"));
            }
        }
        self.strategy.validate(&mut errors, id);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
