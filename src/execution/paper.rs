//! Paper venue: fills at the reference price with bounded random slippage

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use super::traits::{ExecutionReceipt, ExecutionRequest, ExecutionVenue, VenueKind};
use crate::domain::numeric::f64_to_dec;
use crate::domain::TradeAction;
use crate::error::{QuorumError, Result};

const PRICE_DP: u32 = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperVenueConfig {
    /// Probability that an order is rejected
    pub failure_rate: f64,
    /// Simulated round trip
    pub latency_ms: u64,
    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for PaperVenueConfig {
    fn default() -> Self {
        Self {
            failure_rate: 0.0,
            latency_ms: 50,
            seed: None,
        }
    }
}

impl PaperVenueConfig {
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if !(0.0..=1.0).contains(&self.failure_rate) {
            errors.push("venue.failure_rate must be within [0, 1]".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

pub struct PaperVenue {
    config: PaperVenueConfig,
    rng: Mutex<StdRng>,
}

impl PaperVenue {
    pub fn new(config: PaperVenueConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            rng: Mutex::new(rng),
        }
    }

    /// Draw (reject?, slippage fraction) for one order
    fn draw(&self, max_slippage: f64) -> Result<(bool, f64)> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| QuorumError::Internal("paper venue rng poisoned".to_string()))?;
        let reject = rng.gen::<f64>() < self.config.failure_rate;
        let slippage = rng.gen_range(0.0..=max_slippage.max(0.0));
        Ok((reject, slippage))
    }
}

#[async_trait]
impl ExecutionVenue for PaperVenue {
    fn kind(&self) -> VenueKind {
        VenueKind::Paper
    }

    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionReceipt> {
        if request.reference_price <= Decimal::ZERO {
            return Err(QuorumError::Execution(format!(
                "no reference price for {}",
                request.symbol
            )));
        }
        if request.amount <= Decimal::ZERO {
            return Err(QuorumError::Execution(format!(
                "non-positive amount {}",
                request.amount
            )));
        }

        let (reject, slippage) = self.draw(request.max_slippage)?;
        if self.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
        }
        if reject {
            warn!(symbol = %request.symbol, action = %request.action, "paper order rejected");
            return Ok(ExecutionReceipt::rejected("simulated venue rejection"));
        }

        let factor = match request.action {
            TradeAction::Buy => Decimal::ONE + f64_to_dec(slippage),
            TradeAction::Sell => Decimal::ONE - f64_to_dec(slippage),
            TradeAction::Hold => {
                return Err(QuorumError::Execution("HOLD is not executable".to_string()))
            }
        };
        let filled_price = (request.reference_price * factor).round_dp(PRICE_DP);
        let quantity = (request.amount / filled_price).round_dp(PRICE_DP);
        let transaction_id = format!("paper-{}", Uuid::new_v4());

        debug!(
            symbol = %request.symbol,
            action = %request.action,
            amount = %request.amount,
            %filled_price,
            %quantity,
            tx = %transaction_id,
            "paper fill"
        );
        Ok(ExecutionReceipt::filled(filled_price, quantity, transaction_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request(action: TradeAction) -> ExecutionRequest {
        ExecutionRequest {
            action,
            symbol: "BTC".into(),
            amount: dec!(100),
            max_slippage: 0.01,
            reference_price: dec!(50),
        }
    }

    fn venue(failure_rate: f64) -> PaperVenue {
        PaperVenue::new(PaperVenueConfig {
            failure_rate,
            latency_ms: 0,
            seed: Some(7),
        })
    }

    #[tokio::test]
    async fn test_fill_within_slippage_bounds() {
        let venue = venue(0.0);
        let buy = venue.execute(request(TradeAction::Buy)).await.unwrap();
        assert!(buy.success);
        assert!(buy.filled_price >= dec!(50) && buy.filled_price <= dec!(50.5));

        let sell = venue.execute(request(TradeAction::Sell)).await.unwrap();
        assert!(sell.filled_price <= dec!(50) && sell.filled_price >= dec!(49.5));
        assert!(sell.transaction_id.starts_with("paper-"));
    }

    #[tokio::test]
    async fn test_failure_rate_one_always_rejects() {
        let venue = venue(1.0);
        let receipt = venue.execute(request(TradeAction::Buy)).await.unwrap();
        assert!(!receipt.success);
        assert!(receipt.failure_reason.is_some());
    }

    #[tokio::test]
    async fn test_missing_reference_price_is_error() {
        let venue = venue(0.0);
        let mut req = request(TradeAction::Buy);
        req.reference_price = Decimal::ZERO;
        assert!(venue.execute(req).await.is_err());
    }
}
