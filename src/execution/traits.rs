use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::TradeAction;
use crate::error::{QuorumError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueKind {
    Paper,
    External,
}

impl Default for VenueKind {
    fn default() -> Self {
        Self::Paper
    }
}

impl VenueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paper => "paper",
            Self::External => "external",
        }
    }
}

impl std::fmt::Display for VenueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for VenueKind {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "paper" | "sim" => Ok(Self::Paper),
            "external" => Ok(Self::External),
            _ => Err("invalid venue; expected paper|external"),
        }
    }
}

pub fn parse_venue_kind(raw: &str) -> Result<VenueKind> {
    VenueKind::from_str(raw).map_err(|e| QuorumError::Validation(e.to_string()))
}

/// Order sent to the execution venue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub action: TradeAction,
    pub symbol: String,
    /// Notional to trade
    pub amount: Decimal,
    /// Largest acceptable fill deviation from `reference_price`, as a fraction
    pub max_slippage: f64,
    /// Last mark the decision was made against
    pub reference_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReceipt {
    pub success: bool,
    pub filled_price: Decimal,
    pub quantity: Decimal,
    pub transaction_id: String,
    #[serde(default)]
    pub failure_reason: Option<String>,
}

impl ExecutionReceipt {
    pub fn filled(filled_price: Decimal, quantity: Decimal, transaction_id: String) -> Self {
        Self {
            success: true,
            filled_price,
            quantity,
            transaction_id,
            failure_reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            filled_price: Decimal::ZERO,
            quantity: Decimal::ZERO,
            transaction_id: String::new(),
            failure_reason: Some(reason.into()),
        }
    }
}

/// Wallet / exchange collaborator. Fallible: errors and `success == false`
/// receipts both end as a FAILED trade.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecutionVenue: Send + Sync {
    fn kind(&self) -> VenueKind;

    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionReceipt>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_venue_kind_accepts_aliases() {
        assert_eq!(parse_venue_kind("paper").unwrap(), VenueKind::Paper);
        assert_eq!(parse_venue_kind(" SIM ").unwrap(), VenueKind::Paper);
        assert!(parse_venue_kind("binance").is_err());
    }

    #[tokio::test]
    async fn mock_venue_reports_rejection() {
        let mut venue = MockExecutionVenue::new();
        venue.expect_kind().return_const(VenueKind::External);
        venue
            .expect_execute()
            .times(1)
            .returning(|_| Ok(ExecutionReceipt::rejected("no liquidity")));

        let receipt = venue
            .execute(ExecutionRequest {
                action: TradeAction::Buy,
                symbol: "BTC".into(),
                amount: Decimal::ONE_HUNDRED,
                max_slippage: 0.01,
                reference_price: Decimal::TEN,
            })
            .await
            .unwrap();
        assert!(!receipt.success);
        assert_eq!(receipt.failure_reason.as_deref(), Some("no liquidity"));
        assert_eq!(venue.kind(), VenueKind::External);
    }
}
