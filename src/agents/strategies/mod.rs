//! Strategy variants, selected from `StrategyConfig` when an agent is built

pub mod arbitrage;
pub mod mean_reversion;
pub mod momentum;

pub use arbitrage::Arbitrage;
pub use mean_reversion::MeanReversion;
pub use momentum::Momentum;

use super::config::StrategyConfig;
use super::traits::{EvaluationContext, SignalStrategy};
use crate::domain::{MarketTick, Signal};
use crate::error::StrategyError;
use crate::messaging::Message;

#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    Momentum(Momentum),
    MeanReversion(MeanReversion),
    Arbitrage(Arbitrage),
}

impl Strategy {
    pub fn from_config(config: &StrategyConfig) -> Self {
        match config {
            StrategyConfig::Momentum {
                lookback,
                threshold,
            } => Strategy::Momentum(Momentum {
                lookback: *lookback,
                threshold: *threshold,
            }),
            StrategyConfig::MeanReversion { window, z_entry } => {
                Strategy::MeanReversion(MeanReversion {
                    window: *window,
                    z_entry: *z_entry,
                })
            }
            StrategyConfig::Arbitrage { min_spread } => Strategy::Arbitrage(Arbitrage {
                min_spread: *min_spread,
            }),
        }
    }
}

impl SignalStrategy for Strategy {
    fn tag(&self) -> &'static str {
        match self {
            Strategy::Momentum(s) => s.tag(),
            Strategy::MeanReversion(s) => s.tag(),
            Strategy::Arbitrage(s) => s.tag(),
        }
    }

    fn evaluate(
        &self,
        tick: &MarketTick,
        ctx: &EvaluationContext<'_>,
    ) -> Result<Signal, StrategyError> {
        match self {
            Strategy::Momentum(s) => s.evaluate(tick, ctx),
            Strategy::MeanReversion(s) => s.evaluate(tick, ctx),
            Strategy::Arbitrage(s) => s.evaluate(tick, ctx),
        }
    }

    fn validate_signal(&self, signal: &Signal) -> bool {
        match self {
            Strategy::Momentum(s) => s.validate_signal(signal),
            Strategy::MeanReversion(s) => s.validate_signal(signal),
            Strategy::Arbitrage(s) => s.validate_signal(signal),
        }
    }

    fn on_message(&mut self, message: &Message) -> Result<(), StrategyError> {
        match self {
            Strategy::Momentum(s) => s.on_message(message),
            Strategy::MeanReversion(s) => s.on_message(message),
            Strategy::Arbitrage(s) => s.on_message(message),
        }
    }
}
