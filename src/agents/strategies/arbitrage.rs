use crate::agents::traits::{EvaluationContext, SignalStrategy};
use crate::domain::numeric::dec_to_f64;
use crate::domain::{MarketTick, Signal, TradeAction};
use crate::error::StrategyError;

pub const TAG: &str = "arbitrage";

/// Trades the spread between the local price and a reference venue quote
#[derive(Debug, Clone, PartialEq)]
pub struct Arbitrage {
    pub min_spread: f64,
}

impl SignalStrategy for Arbitrage {
    fn tag(&self) -> &'static str {
        TAG
    }

    fn evaluate(
        &self,
        tick: &MarketTick,
        ctx: &EvaluationContext<'_>,
    ) -> Result<Signal, StrategyError> {
        let Some(reference) = tick.reference_price else {
            return Ok(Signal::hold(
                &tick.symbol,
                "no reference quote",
                TAG,
                ctx.now,
            ));
        };
        if tick.price <= rust_decimal::Decimal::ZERO {
            return Err(StrategyError::InvalidPrice {
                symbol: tick.symbol.clone(),
                price: tick.price,
            });
        }

        let local = dec_to_f64(tick.price);
        let spread = (dec_to_f64(reference) - local) / local;
        if spread.abs() <= self.min_spread {
            return Ok(Signal::hold(
                &tick.symbol,
                format!("spread {:.3}% inside band", spread * 100.0),
                TAG,
                ctx.now,
            ));
        }

        // reference above local -> local is cheap
        let action = if spread > 0.0 {
            TradeAction::Buy
        } else {
            TradeAction::Sell
        };
        let confidence = (0.4 + 0.1 * spread.abs() / self.min_spread).min(0.9);
        Ok(Signal::new(
            &tick.symbol,
            action,
            confidence,
            ctx.size(confidence),
            format!("arbitrage spread {:+.3}% vs reference", spread * 100.0),
            TAG,
            ctx.now,
        ))
    }

    fn validate_signal(&self, signal: &Signal) -> bool {
        signal.reason.contains("arbitrage") && signal.confidence >= 0.4
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn ctx() -> EvaluationContext<'static> {
        EvaluationContext {
            agent_id: "arb",
            prices: &[],
            capital: dec!(10000),
            max_position_size_percent: 10.0,
            risk_tolerance: 0.5,
            allocation_bias: 1.0,
            now: Utc::now(),
        }
    }

    #[test]
    fn test_cheap_local_buys() {
        let strategy = Arbitrage { min_spread: 0.005 };
        let tick =
            MarketTick::new("SOL", dec!(100), Utc::now()).with_reference_price(dec!(101));
        let signal = strategy.evaluate(&tick, &ctx()).unwrap();
        assert_eq!(signal.action, TradeAction::Buy);
        // 0.4 + 0.1 * 0.01 / 0.005
        assert!((signal.confidence - 0.6).abs() < 1e-9);
        assert!(strategy.validate_signal(&signal));
    }

    #[test]
    fn test_missing_reference_holds() {
        let strategy = Arbitrage { min_spread: 0.005 };
        let tick = MarketTick::new("SOL", dec!(100), Utc::now());
        let signal = strategy.evaluate(&tick, &ctx()).unwrap();
        assert!(signal.is_hold());
        assert!(!strategy.validate_signal(&signal));
    }
}
