use crate::agents::traits::{EvaluationContext, SignalStrategy};
use crate::domain::numeric::{mean, std_dev};
use crate::domain::{MarketTick, Signal, TradeAction};
use crate::error::StrategyError;

pub const TAG: &str = "mean_reversion";

/// Fades prices that stretch more than `z_entry` deviations from the window mean
#[derive(Debug, Clone, PartialEq)]
pub struct MeanReversion {
    pub window: usize,
    pub z_entry: f64,
}

impl SignalStrategy for MeanReversion {
    fn tag(&self) -> &'static str {
        TAG
    }

    fn evaluate(
        &self,
        tick: &MarketTick,
        ctx: &EvaluationContext<'_>,
    ) -> Result<Signal, StrategyError> {
        ctx.require(self.window)?;
        let recent = &ctx.prices[ctx.prices.len() - self.window..];
        let m = mean(recent);
        let sd = std_dev(recent);
        if sd <= f64::EPSILON {
            return Ok(Signal::hold(&tick.symbol, "flat window", TAG, ctx.now));
        }

        let last = recent[recent.len() - 1];
        let z = (last - m) / sd;
        if !z.is_finite() {
            return Err(StrategyError::Degenerate(format!("z-score {z}")));
        }
        if z.abs() < self.z_entry {
            return Ok(Signal::hold(
                &tick.symbol,
                format!("within band (z={z:.2})"),
                TAG,
                ctx.now,
            ));
        }

        // stretched above the mean -> sell, below -> buy
        let action = if z > 0.0 {
            TradeAction::Sell
        } else {
            TradeAction::Buy
        };
        let confidence = (0.5 * z.abs() / self.z_entry).min(0.9);
        Ok(Signal::new(
            &tick.symbol,
            action,
            confidence,
            ctx.size(confidence),
            format!("mean reversion z={z:.2} mean={m:.4}"),
            TAG,
            ctx.now,
        ))
    }

    fn validate_signal(&self, signal: &Signal) -> bool {
        !signal.is_hold() && signal.confidence >= 0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn ctx(prices: &[f64]) -> EvaluationContext<'_> {
        EvaluationContext {
            agent_id: "mr",
            prices,
            capital: dec!(10000),
            max_position_size_percent: 10.0,
            risk_tolerance: 0.5,
            allocation_bias: 1.0,
            now: Utc::now(),
        }
    }

    #[test]
    fn test_spike_down_buys() {
        let strategy = MeanReversion {
            window: 10,
            z_entry: 2.0,
        };
        let mut prices = vec![100.0; 9];
        prices.push(90.0);
        let tick = MarketTick::new("ETH", dec!(90), Utc::now());
        let signal = strategy.evaluate(&tick, &ctx(&prices)).unwrap();
        // z = -3.0 for nine equal samples and one outlier
        assert_eq!(signal.action, TradeAction::Buy);
        assert!((signal.confidence - 0.75).abs() < 1e-9);
        assert!(strategy.validate_signal(&signal));
    }

    #[test]
    fn test_flat_window_holds() {
        let strategy = MeanReversion {
            window: 3,
            z_entry: 2.0,
        };
        let prices = [50.0, 50.0, 50.0];
        let tick = MarketTick::new("ETH", dec!(50), Utc::now());
        let signal = strategy.evaluate(&tick, &ctx(&prices)).unwrap();
        assert!(signal.is_hold());
    }
}
