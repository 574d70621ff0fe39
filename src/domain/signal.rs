use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::TradeAction;

/// Confidence carried by every HOLD signal
pub const HOLD_CONFIDENCE: f64 = 0.1;

/// A single agent's recommendation for one symbol.
///
/// Built through the constructors so the invariants hold: confidence is
/// clamped to [0, 1], amounts are non-negative, and HOLD always carries
/// confidence 0.1 with a zero amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub action: TradeAction,
    pub confidence: f64,
    pub amount: Decimal,
    pub reason: String,
    pub strategy_tag: String,
    pub created_at: DateTime<Utc>,
}

impl Signal {
    pub fn new(
        symbol: &str,
        action: TradeAction,
        confidence: f64,
        amount: Decimal,
        reason: impl Into<String>,
        strategy_tag: &str,
        created_at: DateTime<Utc>,
    ) -> Self {
        if action.is_hold() {
            return Self::hold(symbol, reason, strategy_tag, created_at);
        }
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            symbol: symbol.to_string(),
            action,
            confidence,
            amount: amount.max(Decimal::ZERO),
            reason: reason.into(),
            strategy_tag: strategy_tag.to_string(),
            created_at,
        }
    }

    pub fn hold(
        symbol: &str,
        reason: impl Into<String>,
        strategy_tag: &str,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            action: TradeAction::Hold,
            confidence: HOLD_CONFIDENCE,
            amount: Decimal::ZERO,
            reason: reason.into(),
            strategy_tag: strategy_tag.to_string(),
            created_at,
        }
    }

    pub fn is_hold(&self) -> bool {
        self.action.is_hold()
    }

    /// Same recommendation with a different notional (HOLD stays zero)
    pub fn with_amount(mut self, amount: Decimal) -> Self {
        if !self.is_hold() {
            self.amount = amount.max(Decimal::ZERO);
        }
        self
    }

    pub fn age_ms(&self, now: DateTime<Utc>) -> i64 {
        now.signed_duration_since(self.created_at).num_milliseconds()
    }
}
