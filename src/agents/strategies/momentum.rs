use crate::agents::traits::{EvaluationContext, SignalStrategy};
use crate::domain::numeric::f64_to_dec;
use crate::domain::{MarketTick, Signal, TradeAction};
use crate::error::StrategyError;

pub const TAG: &str = "momentum";

/// Follows the move between the price `lookback` samples ago and now
#[derive(Debug, Clone, PartialEq)]
pub struct Momentum {
    pub lookback: usize,
    pub threshold: f64,
}

impl SignalStrategy for Momentum {
    fn tag(&self) -> &'static str {
        TAG
    }

    fn evaluate(
        &self,
        tick: &MarketTick,
        ctx: &EvaluationContext<'_>,
    ) -> Result<Signal, StrategyError> {
        ctx.require(self.lookback + 1)?;
        let last = ctx.prices[ctx.prices.len() - 1];
        let reference = ctx.prices[ctx.prices.len() - 1 - self.lookback];
        if reference <= 0.0 {
            return Err(StrategyError::InvalidPrice {
                symbol: tick.symbol.clone(),
                price: f64_to_dec(reference),
            });
        }

        let change = (last - reference) / reference;
        if change.abs() <= self.threshold {
            return Ok(Signal::hold(
                &tick.symbol,
                format!("no momentum ({:+.2}%)", change * 100.0),
                TAG,
                ctx.now,
            ));
        }

        let action = if change > 0.0 {
            TradeAction::Buy
        } else {
            TradeAction::Sell
        };
        let confidence = (0.5 + change.abs() / (self.threshold * 4.0)).min(0.95);
        Ok(Signal::new(
            &tick.symbol,
            action,
            confidence,
            ctx.size(confidence),
            format!(
                "momentum {:+.2}% over {} samples",
                change * 100.0,
                self.lookback
            ),
            TAG,
            ctx.now,
        ))
    }

    fn validate_signal(&self, signal: &Signal) -> bool {
        signal.confidence >= 0.6 && signal.reason.contains("momentum")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn ctx(prices: &[f64]) -> EvaluationContext<'_> {
        EvaluationContext {
            agent_id: "m",
            prices,
            capital: dec!(10000),
            max_position_size_percent: 10.0,
            risk_tolerance: 0.5,
            allocation_bias: 1.0,
            now: Utc::now(),
        }
    }

    #[test]
    fn test_breakout_buys() {
        let strategy = Momentum {
            lookback: 2,
            threshold: 0.02,
        };
        let prices = [100.0, 101.0, 104.0];
        let tick = MarketTick::new("BTC", dec!(104), Utc::now());
        let signal = strategy.evaluate(&tick, &ctx(&prices)).unwrap();
        assert_eq!(signal.action, TradeAction::Buy);
        // 0.5 + 0.04 / 0.08, capped
        assert!((signal.confidence - 0.95).abs() < 1e-9);
        assert!(strategy.validate_signal(&signal));
        assert!(signal.amount > dec!(0));
    }

    #[test]
    fn test_small_move_holds() {
        let strategy = Momentum {
            lookback: 2,
            threshold: 0.02,
        };
        let prices = [100.0, 100.5, 101.0];
        let tick = MarketTick::new("BTC", dec!(101), Utc::now());
        let signal = strategy.evaluate(&tick, &ctx(&prices)).unwrap();
        assert!(signal.is_hold());
        assert!(!strategy.validate_signal(&signal));
    }

    #[test]
    fn test_insufficient_data() {
        let strategy = Momentum {
            lookback: 5,
            threshold: 0.02,
        };
        let prices = [100.0, 101.0];
        let tick = MarketTick::new("BTC", dec!(101), Utc::now());
        let err = strategy.evaluate(&tick, &ctx(&prices)).unwrap_err();
        assert_eq!(err, StrategyError::InsufficientData { have: 2, need: 6 });
    }
}
