//! Risk metrics recomputed every risk cycle

use std::collections::VecDeque;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::numeric::{dec_to_f64, mean, simple_returns, std_dev};
use crate::portfolio::PortfolioSnapshot;

const TRADING_DAYS: f64 = 252.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    /// (high-water mark - value) / high-water mark
    pub current_drawdown: f64,
    /// Value change since the first observation of the UTC day
    pub daily_pnl: Decimal,
    pub daily_pnl_pct: f64,
    /// Annualised std-dev of per-cycle returns
    pub portfolio_volatility: f64,
    /// Herfindahl index of position value weights
    pub concentration_risk: f64,
    /// Historical VaR as a fraction of value
    pub value_at_risk: f64,
    pub sharpe_ratio: f64,
    pub leverage: f64,
    pub high_water_mark: Decimal,
    pub total_value: Decimal,
    pub computed_at: DateTime<Utc>,
}

/// Loss at the `(1 - confidence)` percentile of returns, as a positive fraction
pub fn historical_var(returns: &[f64], confidence: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let mut sorted = returns.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let idx = (((1.0 - confidence) * sorted.len() as f64).floor() as usize).min(sorted.len() - 1);
    (-sorted[idx]).max(0.0)
}

/// Sum of squared position weights; 0 with no positions
pub fn herfindahl(snapshot: &PortfolioSnapshot) -> f64 {
    if snapshot.gross_exposure <= Decimal::ZERO {
        return 0.0;
    }
    let gross = dec_to_f64(snapshot.gross_exposure);
    snapshot
        .positions
        .values()
        .map(|p| {
            let w = dec_to_f64(p.value.abs()) / gross;
            w * w
        })
        .sum()
}

/// Rolling value history behind `RiskMetrics`
#[derive(Debug, Clone)]
pub struct MetricsTracker {
    values: VecDeque<f64>,
    capacity: usize,
    var_confidence: f64,
    high_water_mark: Decimal,
    day: Option<NaiveDate>,
    day_open: Decimal,
}

impl MetricsTracker {
    pub fn new(initial_value: Decimal, capacity: usize, var_confidence: f64) -> Self {
        Self {
            values: VecDeque::new(),
            capacity: capacity.max(2),
            var_confidence,
            high_water_mark: initial_value,
            day: None,
            day_open: initial_value,
        }
    }

    pub fn high_water_mark(&self) -> Decimal {
        self.high_water_mark
    }

    /// Reset the high-water mark, e.g. after an operator clears a halt
    pub fn rebase(&mut self, value: Decimal) {
        self.high_water_mark = value;
    }

    pub fn compute(&mut self, snapshot: &PortfolioSnapshot, now: DateTime<Utc>) -> RiskMetrics {
        let value = snapshot.total_value;

        self.values.push_back(dec_to_f64(value));
        while self.values.len() > self.capacity {
            self.values.pop_front();
        }
        if value > self.high_water_mark {
            self.high_water_mark = value;
        }
        let today = now.date_naive();
        if self.day != Some(today) {
            self.day = Some(today);
            self.day_open = value;
        }

        let current_drawdown = if self.high_water_mark > Decimal::ZERO {
            dec_to_f64((self.high_water_mark - value) / self.high_water_mark).max(0.0)
        } else {
            0.0
        };

        let daily_pnl = value - self.day_open;
        let daily_pnl_pct = if self.day_open > Decimal::ZERO {
            dec_to_f64(daily_pnl / self.day_open)
        } else {
            0.0
        };

        let series: Vec<f64> = self.values.iter().copied().collect();
        let returns = simple_returns(&series);
        let sd = std_dev(&returns);
        let portfolio_volatility = sd * TRADING_DAYS.sqrt();
        let sharpe_ratio = if sd > f64::EPSILON {
            mean(&returns) / sd * TRADING_DAYS.sqrt()
        } else {
            0.0
        };

        let leverage = if value > Decimal::ZERO {
            dec_to_f64(snapshot.gross_exposure / value)
        } else {
            0.0
        };

        RiskMetrics {
            current_drawdown,
            daily_pnl,
            daily_pnl_pct,
            portfolio_volatility,
            concentration_risk: herfindahl(snapshot),
            value_at_risk: historical_var(&returns, self.var_confidence),
            sharpe_ratio,
            leverage,
            high_water_mark: self.high_water_mark,
            total_value: value,
            computed_at: now,
        }
    }
}
