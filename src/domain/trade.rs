use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Decision, TradeAction};
use crate::error::TradeStateError;

/// Trade lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    /// Proposed and risk-approved, waiting on the venue
    Pending,
    /// Filled and applied to the portfolio
    Executed,
    /// Venue failure or timeout; portfolio untouched
    Failed,
    /// Rejected before execution
    Cancelled,
}

impl TradeStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TradeStatus::Pending)
    }
}

impl std::fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeStatus::Pending => write!(f, "PENDING"),
            TradeStatus::Executed => write!(f, "EXECUTED"),
            TradeStatus::Failed => write!(f, "FAILED"),
            TradeStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Append-only record of a proposed trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub action: TradeAction,
    pub amount: Decimal,
    /// Fill price once executed, otherwise the mark at proposal time
    pub price: Decimal,
    pub initiating_agent_id: String,
    pub contributing_agents: Vec<String>,
    pub risk_approved: bool,
    pub status: TradeStatus,
    pub pnl: Option<Decimal>,
    pub transaction_id: Option<String>,
    pub failure_reason: Option<String>,
    pub finalized_at: Option<DateTime<Utc>>,
}

impl TradeRecord {
    /// Create a Pending record for a risk-approved decision
    pub fn proposed(decision: &Decision, mark: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: now,
            symbol: decision.symbol.clone(),
            action: decision.action,
            amount: decision.amount,
            price: mark,
            initiating_agent_id: decision
                .initiating_agent()
                .unwrap_or("coordinator")
                .to_string(),
            contributing_agents: decision.contributing_agents(),
            risk_approved: true,
            status: TradeStatus::Pending,
            pnl: None,
            transaction_id: None,
            failure_reason: None,
            finalized_at: None,
        }
    }

    /// Create a record for a decision the risk gate refused
    pub fn rejected(decision: &Decision, mark: Decimal, reason: &str, now: DateTime<Utc>) -> Self {
        let mut record = Self::proposed(decision, mark, now);
        record.risk_approved = false;
        record.status = TradeStatus::Cancelled;
        record.failure_reason = Some(reason.to_string());
        record.finalized_at = Some(now);
        record
    }

    pub fn mark_executed(
        &mut self,
        fill_price: Decimal,
        transaction_id: &str,
        pnl: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> Result<(), TradeStateError> {
        self.finalize(TradeStatus::Executed, now)?;
        self.price = fill_price;
        self.transaction_id = Some(transaction_id.to_string());
        self.pnl = pnl;
        Ok(())
    }

    pub fn mark_failed(&mut self, reason: &str, now: DateTime<Utc>) -> Result<(), TradeStateError> {
        self.finalize(TradeStatus::Failed, now)?;
        self.failure_reason = Some(reason.to_string());
        Ok(())
    }

    pub fn mark_cancelled(
        &mut self,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), TradeStateError> {
        self.finalize(TradeStatus::Cancelled, now)?;
        self.failure_reason = Some(reason.to_string());
        Ok(())
    }

    /// Pending -> terminal, exactly once
    fn finalize(&mut self, status: TradeStatus, now: DateTime<Utc>) -> Result<(), TradeStateError> {
        if self.status.is_terminal() {
            return Err(TradeStateError::AlreadyFinalized {
                id: self.id.clone(),
                status: self.status,
            });
        }
        if !status.is_terminal() {
            return Err(TradeStateError::NotTerminal {
                id: self.id.clone(),
                status,
            });
        }
        self.status = status;
        self.finalized_at = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Contribution;
    use rust_decimal_macros::dec;

    fn decision() -> Decision {
        Decision {
            symbol: "SOL".into(),
            action: TradeAction::Buy,
            amount: dec!(40),
            confidence: 0.7,
            reasoning: "test".into(),
            contributions: vec![Contribution {
                agent_id: "momentum-1".into(),
                weight: 0.3,
                amount: dec!(40),
            }],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_transitions_exactly_once() {
        let now = Utc::now();
        let mut record = TradeRecord::proposed(&decision(), dec!(20), now);
        assert_eq!(record.status, TradeStatus::Pending);
        assert_eq!(record.initiating_agent_id, "momentum-1");

        record
            .mark_executed(dec!(20.1), "tx-1", None, now)
            .expect("first transition succeeds");
        assert_eq!(record.status, TradeStatus::Executed);
        assert_eq!(record.price, dec!(20.1));

        let err = record.mark_failed("late", now).unwrap_err();
        assert!(matches!(err, TradeStateError::AlreadyFinalized { .. }));
        assert_eq!(record.status, TradeStatus::Executed);
    }

    #[test]
    fn test_rejected_record() {
        let record = TradeRecord::rejected(&decision(), dec!(20), "halted", Utc::now());
        assert!(!record.risk_approved);
        assert_eq!(record.status, TradeStatus::Cancelled);
        assert_eq!(record.failure_reason.as_deref(), Some("halted"));
    }
}
