//! SignalStrategy trait - the capability set every strategy variant provides

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::numeric::{f64_to_dec, scale};
use crate::domain::{MarketTick, Signal};
use crate::error::StrategyError;
use crate::messaging::Message;

/// Everything a strategy may read during one evaluation
#[derive(Debug, Clone)]
pub struct EvaluationContext<'a> {
    pub agent_id: &'a str,
    /// Prices for the evaluated symbol, oldest first, latest tick included
    pub prices: &'a [f64],
    /// Capital base the agent sizes against
    pub capital: Decimal,
    /// Max notional per signal, percent of capital
    pub max_position_size_percent: f64,
    pub risk_tolerance: f64,
    /// Coordinator rebalance bias, 0.5 - 1.5
    pub allocation_bias: f64,
    pub now: DateTime<Utc>,
}

impl EvaluationContext<'_> {
    /// Requested notional for a signal with the given confidence
    pub fn size(&self, confidence: f64) -> Decimal {
        let cap = scale(self.capital, self.max_position_size_percent / 100.0);
        let factor = confidence.clamp(0.0, 1.0)
            * (0.5 + self.risk_tolerance.clamp(0.0, 1.0) / 2.0)
            * self.allocation_bias;
        (cap * f64_to_dec(factor)).round_dp(2)
    }

    pub fn require(&self, need: usize) -> Result<(), StrategyError> {
        if self.prices.len() < need {
            return Err(StrategyError::InsufficientData {
                have: self.prices.len(),
                need,
            });
        }
        Ok(())
    }
}

/// Strategy capability set: evaluate, accept/reject, react to messages.
///
/// Errors from `evaluate` and `on_message` are contained by the agent; they
/// degrade to a HOLD signal or a dropped message.
pub trait SignalStrategy {
    fn tag(&self) -> &'static str;

    fn evaluate(
        &self,
        tick: &MarketTick,
        ctx: &EvaluationContext<'_>,
    ) -> Result<Signal, StrategyError>;

    /// Acceptance predicate applied before a signal leaves the agent
    fn validate_signal(&self, signal: &Signal) -> bool;

    fn on_message(&mut self, _message: &Message) -> Result<(), StrategyError> {
        Ok(())
    }
}
