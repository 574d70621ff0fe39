//! Portfolio state - cash, positions and marks
//!
//! Owned by the orchestrator. Everyone else sees `PortfolioSnapshot`s.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::TradeAction;
use crate::error::PortfolioError;

const QTY_DP: u32 = 8;

/// Result of applying one fill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillOutcome {
    pub quantity: Decimal,
    /// Realised P&L, SELL only
    pub realized_pnl: Option<Decimal>,
    pub position_quantity: Decimal,
    pub cash_balance: Decimal,
    pub total_value: Decimal,
}

#[derive(Debug, Clone)]
pub struct PortfolioState {
    cash_balance: Decimal,
    positions: HashMap<String, Decimal>,
    /// Average entry price per symbol
    cost_basis: HashMap<String, Decimal>,
    /// Last seen price per symbol
    marks: HashMap<String, Decimal>,
    realized_pnl: Decimal,
}

impl PortfolioState {
    pub fn new(initial_cash: Decimal) -> Self {
        Self {
            cash_balance: initial_cash,
            positions: HashMap::new(),
            cost_basis: HashMap::new(),
            marks: HashMap::new(),
            realized_pnl: Decimal::ZERO,
        }
    }

    pub fn cash_balance(&self) -> Decimal {
        self.cash_balance
    }

    pub fn position(&self, symbol: &str) -> Decimal {
        self.positions.get(symbol).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn mark(&self, symbol: &str) -> Option<Decimal> {
        self.marks.get(symbol).copied()
    }

    pub fn update_mark(&mut self, symbol: &str, price: Decimal) {
        if price > Decimal::ZERO {
            self.marks.insert(symbol.to_string(), price);
        }
    }

    /// Marked value of one position; falls back to cost basis without a mark
    pub fn position_value(&self, symbol: &str) -> Decimal {
        let qty = self.position(symbol);
        let price = self
            .mark(symbol)
            .or_else(|| self.cost_basis.get(symbol).copied())
            .unwrap_or(Decimal::ZERO);
        qty * price
    }

    /// Gross marked value of all positions
    pub fn gross_exposure(&self) -> Decimal {
        self.positions
            .keys()
            .map(|s| self.position_value(s).abs())
            .sum()
    }

    /// cash + sum(quantity x mark), recomputed on every call
    pub fn total_value(&self) -> Decimal {
        self.cash_balance
            + self
                .positions
                .keys()
                .map(|s| self.position_value(s))
                .sum::<Decimal>()
    }

    /// Check that a fill could be applied right now, without applying it
    pub fn check_fill(
        &self,
        action: TradeAction,
        symbol: &str,
        amount: Decimal,
        price: Decimal,
    ) -> Result<Decimal, PortfolioError> {
        if price <= Decimal::ZERO {
            return Err(PortfolioError::InvalidPrice {
                symbol: symbol.to_string(),
                price,
            });
        }
        if amount <= Decimal::ZERO {
            return Err(PortfolioError::InvalidAmount(amount));
        }
        let quantity = (amount / price).round_dp(QTY_DP);
        match action {
            TradeAction::Hold => Err(PortfolioError::NoAction),
            TradeAction::Buy => {
                if amount > self.cash_balance {
                    return Err(PortfolioError::InsufficientCash {
                        available: self.cash_balance,
                        required: amount,
                    });
                }
                Ok(quantity)
            }
            TradeAction::Sell => {
                let held = self.position(symbol);
                if quantity > held {
                    return Err(PortfolioError::InsufficientPosition {
                        symbol: symbol.to_string(),
                        held,
                        required: quantity,
                    });
                }
                Ok(quantity)
            }
        }
    }

    /// Apply a fill: BUY spends `amount` cash for `amount / price` units,
    /// SELL does the inverse and realises P&L against the average cost.
    pub fn apply_fill(
        &mut self,
        action: TradeAction,
        symbol: &str,
        amount: Decimal,
        price: Decimal,
    ) -> Result<FillOutcome, PortfolioError> {
        let quantity = self.check_fill(action, symbol, amount, price)?;
        let held = self.position(symbol);

        let realized_pnl = match action {
            TradeAction::Buy => {
                let new_qty = held + quantity;
                let old_cost = self.cost_basis.get(symbol).copied().unwrap_or(price);
                let avg = if new_qty > Decimal::ZERO {
                    ((old_cost * held) + (price * quantity)) / new_qty
                } else {
                    price
                };
                self.cash_balance -= amount;
                self.positions.insert(symbol.to_string(), new_qty);
                self.cost_basis.insert(symbol.to_string(), avg);
                None
            }
            TradeAction::Sell => {
                let cost = self.cost_basis.get(symbol).copied().unwrap_or(price);
                let pnl = ((price - cost) * quantity).round_dp(QTY_DP);
                let remaining = held - quantity;
                self.cash_balance += amount;
                if remaining.is_zero() {
                    self.positions.remove(symbol);
                    self.cost_basis.remove(symbol);
                } else {
                    self.positions.insert(symbol.to_string(), remaining);
                }
                self.realized_pnl += pnl;
                Some(pnl)
            }
            TradeAction::Hold => return Err(PortfolioError::NoAction),
        };
        self.update_mark(symbol, price);

        let outcome = FillOutcome {
            quantity,
            realized_pnl,
            position_quantity: self.position(symbol),
            cash_balance: self.cash_balance,
            total_value: self.total_value(),
        };
        debug!(
            symbol,
            action = %action,
            %amount,
            %price,
            quantity = %outcome.quantity,
            cash = %outcome.cash_balance,
            "fill applied"
        );
        Ok(outcome)
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> PortfolioSnapshot {
        let positions: BTreeMap<String, PositionView> = self
            .positions
            .iter()
            .map(|(symbol, qty)| {
                (
                    symbol.clone(),
                    PositionView {
                        quantity: *qty,
                        average_cost: self.cost_basis.get(symbol).copied(),
                        mark: self.mark(symbol),
                        value: self.position_value(symbol),
                    },
                )
            })
            .collect();
        PortfolioSnapshot {
            cash_balance: self.cash_balance,
            total_value: self.total_value(),
            gross_exposure: self.gross_exposure(),
            realized_pnl: self.realized_pnl,
            positions,
            taken_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionView {
    pub quantity: Decimal,
    pub average_cost: Option<Decimal>,
    pub mark: Option<Decimal>,
    pub value: Decimal,
}

/// Copy of the portfolio at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub cash_balance: Decimal,
    pub total_value: Decimal,
    pub gross_exposure: Decimal,
    pub realized_pnl: Decimal,
    pub positions: BTreeMap<String, PositionView>,
    pub taken_at: DateTime<Utc>,
}

impl PortfolioSnapshot {
    pub fn position(&self, symbol: &str) -> Decimal {
        self.positions
            .get(symbol)
            .map_or(Decimal::ZERO, |p| p.quantity)
    }

    pub fn position_value(&self, symbol: &str) -> Decimal {
        self.positions.get(symbol).map_or(Decimal::ZERO, |p| p.value)
    }

    pub fn mark(&self, symbol: &str) -> Option<Decimal> {
        self.positions.get(symbol).and_then(|p| p.mark)
    }
}
