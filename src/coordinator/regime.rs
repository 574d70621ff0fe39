//! Market regime estimation from a rolling price window
//!
//! Trend comes from the % change across the window; volatility from the
//! standard deviation of simple returns between samples.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::config::CoordinatorConfig;
use crate::domain::numeric::{dec_to_f64, simple_returns, std_dev};
use crate::domain::{MarketTick, TradeAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Trend {
    Bull,
    Bear,
    Sideways,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Volatility {
    Low,
    Medium,
    High,
}

/// Point-in-time regime reading for one symbol
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketRegime {
    pub trend: Trend,
    pub volatility: Volatility,
    /// Fractional change from the oldest to the newest sample
    pub change: f64,
    pub return_std: f64,
    pub samples: usize,
}

impl MarketRegime {
    pub fn neutral() -> Self {
        Self {
            trend: Trend::Sideways,
            volatility: Volatility::Low,
            change: 0.0,
            return_std: 0.0,
            samples: 0,
        }
    }

    pub fn aligned_with(&self, action: TradeAction) -> bool {
        matches!(
            (self.trend, action),
            (Trend::Bull, TradeAction::Buy) | (Trend::Bear, TradeAction::Sell)
        )
    }

    pub fn opposes(&self, action: TradeAction) -> bool {
        matches!(
            (self.trend, action),
            (Trend::Bull, TradeAction::Sell) | (Trend::Bear, TradeAction::Buy)
        )
    }
}

impl std::fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}/{:?}", self.trend, self.volatility)
    }
}

pub struct RegimeDetector {
    window: usize,
    trend_threshold: f64,
    low_volatility: f64,
    high_volatility: f64,
    prices: HashMap<String, VecDeque<f64>>,
}

impl RegimeDetector {
    pub fn new(config: &CoordinatorConfig) -> Self {
        Self {
            window: config.regime_window,
            trend_threshold: config.trend_threshold,
            low_volatility: config.low_volatility,
            high_volatility: config.high_volatility,
            prices: HashMap::new(),
        }
    }

    pub fn observe(&mut self, tick: &MarketTick) {
        let buffer = self.prices.entry(tick.symbol.clone()).or_default();
        buffer.push_back(dec_to_f64(tick.price));
        while buffer.len() > self.window {
            buffer.pop_front();
        }
    }

    pub fn regime(&self, symbol: &str) -> MarketRegime {
        let Some(buffer) = self.prices.get(symbol) else {
            return MarketRegime::neutral();
        };
        if buffer.len() < 2 {
            return MarketRegime {
                samples: buffer.len(),
                ..MarketRegime::neutral()
            };
        }

        let samples: Vec<f64> = buffer.iter().copied().collect();
        let first = samples[0];
        let last = samples[samples.len() - 1];
        let change = if first > 0.0 { (last - first) / first } else { 0.0 };

        let trend = if change > self.trend_threshold {
            Trend::Bull
        } else if change < -self.trend_threshold {
            Trend::Bear
        } else {
            Trend::Sideways
        };

        let return_std = std_dev(&simple_returns(&samples));
        let volatility = if return_std < self.low_volatility {
            Volatility::Low
        } else if return_std < self.high_volatility {
            Volatility::Medium
        } else {
            Volatility::High
        };

        let regime = MarketRegime {
            trend,
            volatility,
            change,
            return_std,
            samples: samples.len(),
        };
        debug!(symbol, regime = %regime, change, return_std, "regime computed");
        regime
    }
}
