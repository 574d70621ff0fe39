use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{QuorumError, Result};

/// Direction of a proposed trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
}

impl TradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::Buy => "BUY",
            TradeAction::Sell => "SELL",
            TradeAction::Hold => "HOLD",
        }
    }

    pub fn is_hold(&self) -> bool {
        matches!(self, TradeAction::Hold)
    }
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One market-data event pushed by the feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketTick {
    pub symbol: String,
    pub price: Decimal,
    pub volume_24h: Decimal,
    pub timestamp: DateTime<Utc>,
    /// Quote for the same asset on a second venue, when the feed has one
    #[serde(default)]
    pub reference_price: Option<Decimal>,
}

impl MarketTick {
    pub fn new(symbol: &str, price: Decimal, timestamp: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.to_string(),
            price,
            volume_24h: Decimal::ZERO,
            timestamp,
            reference_price: None,
        }
    }

    pub fn with_volume(mut self, volume_24h: Decimal) -> Self {
        self.volume_24h = volume_24h;
        self
    }

    pub fn with_reference_price(mut self, reference_price: Decimal) -> Self {
        self.reference_price = Some(reference_price);
        self
    }

    /// Reject ticks the core cannot price against
    pub fn validate(&self) -> Result<()> {
        if self.symbol.trim().is_empty() {
            return Err(QuorumError::InvalidMarketData("empty symbol".into()));
        }
        if self.price <= Decimal::ZERO {
            return Err(QuorumError::InvalidMarketData(format!(
                "{}: non-positive price {}",
                self.symbol, self.price
            )));
        }
        if matches!(self.reference_price, Some(p) if p <= Decimal::ZERO) {
            return Err(QuorumError::InvalidMarketData(format!(
                "{}: non-positive reference price",
                self.symbol
            )));
        }
        Ok(())
    }
}
