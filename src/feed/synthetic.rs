//! Random-walk market data source used by the binary

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::numeric::{dec_to_f64, f64_to_dec};
use crate::domain::MarketTick;

const PRICE_DP: u32 = 6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedSymbol {
    pub symbol: String,
    pub start_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub symbols: Vec<FeedSymbol>,
    pub interval_ms: u64,
    /// Per-step drift of log price
    pub drift: f64,
    /// Per-step std-dev of log price
    pub volatility: f64,
    /// Half-width of the uniform noise on the second-venue reference price.
    /// Zero disables reference prices.
    pub reference_spread: f64,
    pub seed: Option<u64>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            symbols: vec![
                FeedSymbol {
                    symbol: "BTC".to_string(),
                    start_price: Decimal::from(60_000),
                },
                FeedSymbol {
                    symbol: "ETH".to_string(),
                    start_price: Decimal::from(3_000),
                },
            ],
            interval_ms: 1_000,
            drift: 0.0,
            volatility: 0.004,
            reference_spread: 0.01,
            seed: None,
        }
    }
}

impl FeedConfig {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.symbols.is_empty() {
            errors.push("feed.symbols must not be empty".to_string());
        }
        for s in &self.symbols {
            if s.start_price <= Decimal::ZERO {
                errors.push(format!("feed.symbols.{}: start_price must be positive", s.symbol));
            }
        }
        if self.interval_ms == 0 {
            errors.push("feed.interval_ms must be > 0".to_string());
        }
        if self.volatility < 0.0 {
            errors.push("feed.volatility must be >= 0".to_string());
        }
        if !(0.0..1.0).contains(&self.reference_spread) {
            errors.push("feed.reference_spread must be within [0, 1)".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

pub struct SyntheticFeed {
    config: FeedConfig,
    prices: Vec<(String, f64)>,
    rng: StdRng,
}

impl SyntheticFeed {
    pub fn new(config: FeedConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let prices = config
            .symbols
            .iter()
            .map(|s| (s.symbol.clone(), dec_to_f64(s.start_price)))
            .collect();
        Self {
            config,
            prices,
            rng,
        }
    }

    pub fn interval_ms(&self) -> u64 {
        self.config.interval_ms
    }

    /// Box-Muller standard normal draw
    fn gaussian(&mut self) -> f64 {
        let u1: f64 = self.rng.gen_range(f64::EPSILON..1.0);
        let u2: f64 = self.rng.gen();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }

    /// Advance every symbol one step
    pub fn next_ticks(&mut self, now: DateTime<Utc>) -> Vec<MarketTick> {
        let mut ticks = Vec::with_capacity(self.prices.len());
        for i in 0..self.prices.len() {
            let z = self.gaussian();
            let step = self.config.drift + self.config.volatility * z;
            let price = self.prices[i].1 * step.exp();
            self.prices[i].1 = price;

            let symbol = self.prices[i].0.clone();
            let volume: f64 = self.rng.gen_range(1_000.0..50_000.0);
            let mut tick = MarketTick::new(&symbol, f64_to_dec(price).round_dp(PRICE_DP), now)
                .with_volume(f64_to_dec(volume).round_dp(2));

            if self.config.reference_spread > 0.0 {
                let spread = self
                    .rng
                    .gen_range(-self.config.reference_spread..=self.config.reference_spread);
                tick = tick.with_reference_price(f64_to_dec(price * (1.0 + spread)).round_dp(PRICE_DP));
            }
            debug!(symbol = %tick.symbol, price = %tick.price, "synthetic tick");
            ticks.push(tick);
        }
        ticks
    }
}
