use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::agents::{AgentConfig, StrategyConfig};
use crate::coordinator::CoordinatorConfig;
use crate::execution::PaperVenueConfig;
use crate::feed::FeedConfig;
use crate::orchestrator::OrchestratorConfig;
use crate::risk::RiskLimits;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub risk: RiskLimits,
    /// Trading agents, one strategy each
    #[serde(default = "default_agents")]
    pub agents: Vec<AgentConfig>,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub venue: PaperVenueConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error), overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for the daily rolling log file; console only when unset
    #[serde(default)]
    pub dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_agents() -> Vec<AgentConfig> {
    vec![
        AgentConfig::new("momentum-1", StrategyConfig::momentum(), 40.0),
        AgentConfig::new("mean-reversion-1", StrategyConfig::mean_reversion(), 40.0),
        AgentConfig::new("arbitrage-1", StrategyConfig::arbitrage(), 20.0),
    ]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            orchestrator: OrchestratorConfig::default(),
            coordinator: CoordinatorConfig::default(),
            risk: RiskLimits::default(),
            agents: default_agents(),
            feed: FeedConfig::default(),
            venue: PaperVenueConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("QUORUM_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (QUORUM__RISK__MAX_DRAWDOWN, etc.)
            .add_source(
                Environment::with_prefix("QUORUM")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values, collecting every problem
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        for result in [
            self.orchestrator.validate(),
            self.coordinator.validate(),
            self.risk.validate(),
            self.feed.validate(),
            self.venue.validate(),
        ] {
            if let Err(e) = result {
                errors.extend(e);
            }
        }

        if self.agents.is_empty() {
            errors.push("at least one agent must be configured".to_string());
        }
        let mut seen = std::collections::HashSet::new();
        for agent in &self.agents {
            if !seen.insert(agent.agent_id.as_str()) {
                errors.push(format!("duplicate agent id '{}'", agent.agent_id));
            }
            if let Err(e) = agent.validate() {
                errors.extend(e);
            }
        }

        let total_allocation: f64 = self
            .agents
            .iter()
            .filter(|a| a.enabled)
            .map(|a| a.allocation_percent)
            .sum();
        if total_allocation > 100.0 + 1e-9 {
            errors.push(format!(
                "enabled agent allocations sum to {total_allocation:.1}% (max 100%)"
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
