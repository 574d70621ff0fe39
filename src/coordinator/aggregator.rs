//! Signal aggregation
//!
//! Keeps the latest signal per (agent, symbol) and folds the fresh ones into
//! a single weighted `Decision`:
//!
//! 1. eligible = fresh (within the staleness window), non-HOLD, confidence
//!    at or above the minimum, agent weight > 0
//! 2. adjusted weight = static weight x confidence x performance multiplier,
//!    summed per side
//! 3. the larger side wins if it also clears the action threshold
//! 4. confidence = winning score / sum of eligible static weights, then the
//!    regime factor, then the consensus bonus, clamped to [0, 1]
//! 5. amount = winning-side amounts x the active risk scale

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::allocation::{AllocationDrift, AllocationTracker};
use super::config::CoordinatorConfig;
use super::performance::PerformanceTracker;
use super::regime::{MarketRegime, RegimeDetector, Volatility};
use crate::domain::numeric::{add_secs, scale, secs_to_ms};
use crate::domain::{Contribution, Decision, MarketTick, Signal, TradeAction};
use crate::error::{QuorumError, Result};
use crate::messaging::{
    CoordinationDirective, Message, MessagePayload, Priority, RiskAlert, Severity,
    COORDINATOR_ID,
};

#[derive(Debug, Clone)]
struct Registration {
    weight: f64,
    target_allocation: f64,
}

/// Read-only coordinator view for operators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorSnapshot {
    pub tracked_signals: usize,
    pub risk_scale: f64,
    pub weights: HashMap<String, f64>,
    pub multipliers: HashMap<String, f64>,
}

pub struct Coordinator {
    config: CoordinatorConfig,
    agents: HashMap<String, Registration>,
    /// Latest signal keyed by (agent_id, symbol)
    signals: HashMap<(String, String), Signal>,
    regime: RegimeDetector,
    performance: PerformanceTracker,
    allocation: AllocationTracker,
    risk_scale: f64,
    risk_scale_until: Option<DateTime<Utc>>,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            regime: RegimeDetector::new(&config),
            performance: PerformanceTracker::new(config.performance_window),
            allocation: AllocationTracker::new(config.allocation_ledger_size),
            agents: HashMap::new(),
            signals: HashMap::new(),
            risk_scale: 1.0,
            risk_scale_until: None,
            config,
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Register (or re-register) an agent's static weight and target allocation
    pub fn register_agent(&mut self, agent_id: &str, weight: f64, target_allocation: f64) {
        self.agents.insert(
            agent_id.to_string(),
            Registration {
                weight: weight.max(0.0),
                target_allocation,
            },
        );
    }

    pub fn on_market_data(&mut self, tick: &MarketTick) {
        self.regime.observe(tick);
    }

    pub fn regime(&self, symbol: &str) -> MarketRegime {
        self.regime.regime(symbol)
    }

    /// Store an agent's latest signal for its symbol
    pub fn ingest_signal(&mut self, agent_id: &str, signal: Signal) -> Result<()> {
        if !self.agents.contains_key(agent_id) {
            return Err(QuorumError::UnknownAgent(agent_id.to_string()));
        }
        debug!(
            agent = agent_id,
            symbol = %signal.symbol,
            action = %signal.action,
            confidence = signal.confidence,
            "signal stored"
        );
        self.signals
            .insert((agent_id.to_string(), signal.symbol.clone()), signal);
        Ok(())
    }

    /// Handle a routed message. Returns the symbol to re-aggregate, if any.
    pub fn receive_message(&mut self, message: &Message, now: DateTime<Utc>) -> Result<Option<String>> {
        match &message.payload {
            MessagePayload::Signal(signal) => {
                let symbol = signal.symbol.clone();
                self.ingest_signal(&message.from, signal.clone())?;
                Ok(Some(symbol))
            }
            MessagePayload::RiskAlert(alert) => {
                self.apply_risk_alert(alert, now);
                Ok(None)
            }
            MessagePayload::MarketUpdate(tick) => {
                self.on_market_data(tick);
                Ok(None)
            }
            MessagePayload::Coordination(_) | MessagePayload::PositionUpdate(_) => Ok(None),
        }
    }

    /// Aggregate the fresh signals for `symbol`. Reads state only, so the
    /// same signals at the same `now` always give the same decision.
    pub fn aggregate(&self, symbol: &str, now: DateTime<Utc>) -> Decision {
        let staleness_ms = secs_to_ms(self.config.staleness_secs);

        let mut eligible: Vec<(&str, &Signal, f64)> = self
            .signals
            .iter()
            .filter(|((_, s), _)| s == symbol)
            .filter_map(|((agent_id, _), signal)| {
                let weight = self.agents.get(agent_id)?.weight;
                let fresh = signal.age_ms(now) <= staleness_ms;
                let usable = !signal.is_hold()
                    && signal.confidence >= self.config.min_signal_confidence
                    && weight > 0.0;
                (fresh && usable).then_some((agent_id.as_str(), signal, weight))
            })
            .collect();
        // HashMap order is arbitrary; fix it so sums and contributions are stable
        eligible.sort_by(|a, b| a.0.cmp(b.0));

        if eligible.is_empty() {
            return Decision::hold(symbol, "no fresh eligible signals", now);
        }

        let total_weight: f64 = eligible.iter().map(|(_, _, w)| *w).sum();
        if total_weight <= 0.0 {
            return Decision::hold(symbol, "zero total weight", now);
        }

        let mut buy_score = 0.0;
        let mut sell_score = 0.0;
        let mut buys = Vec::new();
        let mut sells = Vec::new();
        for (agent_id, signal, weight) in &eligible {
            let adjusted = weight * signal.confidence * self.performance.multiplier(agent_id);
            let contribution = Contribution {
                agent_id: agent_id.to_string(),
                weight: adjusted,
                amount: signal.amount,
            };
            match signal.action {
                TradeAction::Buy => {
                    buy_score += adjusted;
                    buys.push(contribution);
                }
                TradeAction::Sell => {
                    sell_score += adjusted;
                    sells.push(contribution);
                }
                TradeAction::Hold => {}
            }
        }

        let threshold = self.config.action_threshold;
        let (action, score, contributions) = if buy_score > sell_score && buy_score > threshold {
            (TradeAction::Buy, buy_score, buys)
        } else if sell_score > buy_score && sell_score > threshold {
            (TradeAction::Sell, sell_score, sells)
        } else {
            return Decision::hold(
                symbol,
                format!("no consensus (buy={buy_score:.3} sell={sell_score:.3})"),
                now,
            );
        };

        let regime = self.regime.regime(symbol);
        let mut confidence = score / total_weight;
        if regime.aligned_with(action) {
            confidence *= self.config.trend_aligned_factor;
        } else if regime.opposes(action) {
            confidence *= self.config.trend_opposed_factor;
        }
        if regime.volatility == Volatility::High {
            confidence *= self.config.high_volatility_factor;
        }
        let n = contributions.len();
        if n >= 2 {
            let bonus = (self.config.consensus_step * n as f64).min(self.config.consensus_cap);
            confidence *= 1.0 + bonus;
        }
        let confidence = confidence.clamp(0.0, 1.0);

        let requested: Decimal = contributions.iter().map(|c| c.amount).sum();
        let risk_scale = self.risk_scale(now);
        let amount = scale(requested, risk_scale);

        Decision {
            symbol: symbol.to_string(),
            action,
            amount,
            confidence,
            reasoning: format!(
                "{} from {} agent(s): buy={:.3} sell={:.3} total_weight={:.3} regime={} risk_scale={:.2}",
                action, n, buy_score, sell_score, total_weight, regime, risk_scale
            ),
            contributions,
            created_at: now,
        }
    }

    /// Feed back whether a decision was accepted (executed) or not
    pub fn record_outcome(&mut self, decision: &Decision, accepted: bool) {
        for c in &decision.contributions {
            self.performance.record(&c.agent_id, accepted);
        }
        if accepted {
            self.allocation.record_execution(decision);
        }
    }

    pub fn apply_risk_alert(&mut self, alert: &RiskAlert, now: DateTime<Utc>) {
        let scale = match alert.severity {
            Severity::Critical | Severity::High => self.config.high_alert_scale,
            Severity::Medium => self.config.medium_alert_scale,
        };
        let current = self.risk_scale(now);
        self.risk_scale = current.min(scale);
        self.risk_scale_until = Some(add_secs(now, self.config.risk_scale_secs));
        info!(
            severity = %alert.severity,
            kind = alert.kind.as_str(),
            risk_scale = self.risk_scale,
            "allocations scaled down after risk alert"
        );
    }

    pub fn risk_scale(&self, now: DateTime<Utc>) -> f64 {
        match self.risk_scale_until {
            Some(until) if now < until => self.risk_scale,
            _ => 1.0,
        }
    }

    /// COORDINATION messages for agents whose effective allocation drifted
    pub fn rebalance_messages(&mut self, now: DateTime<Utc>) -> Vec<Message> {
        let targets: HashMap<String, f64> = self
            .agents
            .iter()
            .map(|(id, r)| (id.clone(), r.target_allocation))
            .collect();
        let drifts = self.allocation.drift(
            &targets,
            self.config.rebalance_threshold,
            self.config.rebalance_tolerance,
        );
        if !drifts.is_empty() {
            warn!(agents = drifts.len(), "allocation drift, sending rebalance advice");
        }
        drifts
            .into_iter()
            .map(|AllocationDrift { agent_id, target, effective }| {
                Message::new(
                    COORDINATOR_ID,
                    &agent_id,
                    Priority::Medium,
                    MessagePayload::Coordination(CoordinationDirective::Rebalance {
                        target,
                        effective,
                    }),
                    now,
                )
            })
            .collect()
    }

    /// Drop signals that can no longer be aggregated
    pub fn prune_stale(&mut self, now: DateTime<Utc>) -> usize {
        let staleness_ms = secs_to_ms(self.config.staleness_secs);
        let before = self.signals.len();
        self.signals.retain(|_, s| s.age_ms(now) <= staleness_ms);
        before - self.signals.len()
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> CoordinatorSnapshot {
        CoordinatorSnapshot {
            tracked_signals: self.signals.len(),
            risk_scale: self.risk_scale(now),
            weights: self
                .agents
                .iter()
                .map(|(id, r)| (id.clone(), r.weight))
                .collect(),
            multipliers: self
                .agents
                .keys()
                .map(|id| (id.clone(), self.performance.multiplier(id)))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::Trend;
    use crate::messaging::BreachKind;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn coordinator() -> Coordinator {
        let mut c = Coordinator::new(CoordinatorConfig::default());
        c.register_agent("a1", 0.4, 0.4);
        c.register_agent("a2", 0.4, 0.4);
        c.register_agent("a3", 0.2, 0.2);
        c
    }

    fn signal(action: TradeAction, confidence: f64, amount: Decimal, at: DateTime<Utc>) -> Signal {
        Signal::new("BTC", action, confidence, amount, "test", "test", at)
    }

    fn load_scenario(c: &mut Coordinator, now: DateTime<Utc>) {
        c.ingest_signal("a1", signal(TradeAction::Buy, 0.8, dec!(100), now))
            .unwrap();
        c.ingest_signal("a2", signal(TradeAction::Buy, 0.6, dec!(50), now))
            .unwrap();
        c.ingest_signal("a3", signal(TradeAction::Sell, 0.4, dec!(30), now))
            .unwrap();
    }

    #[test]
    fn test_weighted_consensus_buy() {
        let now = Utc::now();
        let mut c = coordinator();
        load_scenario(&mut c, now);

        let d = c.aggregate("BTC", now);
        assert_eq!(d.action, TradeAction::Buy);
        // (0.32 + 0.24) / 1.0, x1.10 consensus bonus
        assert!((d.confidence - 0.616).abs() < 1e-9);
        assert_eq!(d.amount, dec!(150));
        assert_eq!(d.contributions.len(), 2);
        assert_eq!(d.initiating_agent(), Some("a1"));
    }

    #[test]
    fn test_aggregation_is_idempotent() {
        let now = Utc::now();
        let mut c = coordinator();
        load_scenario(&mut c, now);
        assert_eq!(c.aggregate("BTC", now), c.aggregate("BTC", now));
    }

    #[test]
    fn test_stale_and_weak_signals_excluded() {
        let now = Utc::now();
        let mut c = coordinator();
        let old = now - Duration::seconds(31);
        c.ingest_signal("a1", signal(TradeAction::Buy, 0.9, dec!(100), old))
            .unwrap();
        c.ingest_signal("a2", signal(TradeAction::Buy, 0.25, dec!(100), now))
            .unwrap();
        let d = c.aggregate("BTC", now);
        assert_eq!(d.action, TradeAction::Hold);
        assert_eq!(d.amount, Decimal::ZERO);
        assert_eq!(d.confidence, crate::domain::HOLD_CONFIDENCE);

        assert_eq!(c.prune_stale(now), 1);
    }

    #[test]
    fn test_below_threshold_holds() {
        let now = Utc::now();
        let mut c = coordinator();
        // 0.2 x 0.9 = 0.18 < 0.3
        c.ingest_signal("a3", signal(TradeAction::Sell, 0.9, dec!(30), now))
            .unwrap();
        assert_eq!(c.aggregate("BTC", now).action, TradeAction::Hold);
    }

    #[test]
    fn test_unknown_agent_rejected() {
        let mut c = coordinator();
        let err = c
            .ingest_signal("ghost", signal(TradeAction::Buy, 0.9, dec!(1), Utc::now()))
            .unwrap_err();
        assert!(matches!(err, QuorumError::UnknownAgent(_)));
    }

    #[test]
    fn test_risk_alert_scales_amount_until_expiry() {
        let now = Utc::now();
        let mut c = coordinator();
        load_scenario(&mut c, now);
        c.apply_risk_alert(
            &RiskAlert {
                severity: Severity::High,
                kind: BreachKind::DailyLoss,
                message: "daily loss".into(),
                metrics: None,
            },
            now,
        );
        assert_eq!(c.aggregate("BTC", now).amount, dec!(75));
        let later = now + Duration::seconds(61);
        assert_eq!(c.risk_scale(later), 1.0);
    }

    #[test]
    fn test_rejections_lower_the_multiplier() {
        let now = Utc::now();
        let mut c = coordinator();
        load_scenario(&mut c, now);
        let d = c.aggregate("BTC", now);
        c.record_outcome(&d, false);
        let again = c.aggregate("BTC", now);
        // both buyers now carry a 0.75 multiplier: 0.42 / 1.0 x 1.10
        assert!((again.confidence - 0.462).abs() < 1e-9);
    }

    #[test]
    fn test_rebalance_advice_after_skewed_execution() {
        let now = Utc::now();
        let mut c = coordinator();
        let d = Decision {
            symbol: "BTC".into(),
            action: TradeAction::Buy,
            amount: dec!(100),
            confidence: 0.8,
            reasoning: String::new(),
            contributions: vec![Contribution {
                agent_id: "a1".into(),
                weight: 0.32,
                amount: dec!(100),
            }],
            created_at: now,
        };
        c.record_outcome(&d, true);
        let msgs = c.rebalance_messages(now);
        let recipients: Vec<_> = msgs.iter().map(|m| m.to.as_str()).collect();
        assert_eq!(recipients, vec!["a1", "a2", "a3"]);
        assert!(c.rebalance_messages(now).is_empty());
    }

    fn feed_prices(c: &mut Coordinator, prices: &[Decimal], now: DateTime<Utc>) {
        for price in prices {
            c.on_market_data(&MarketTick::new("BTC", *price, now));
        }
    }

    /// a1 alone: 0.4 x 0.8 clears the threshold, base confidence 0.8
    fn lone_buyer(now: DateTime<Utc>) -> Coordinator {
        let mut c = coordinator();
        c.ingest_signal("a1", signal(TradeAction::Buy, 0.8, dec!(100), now))
            .unwrap();
        c
    }

    #[test]
    fn test_buy_aligned_with_bull_trend_is_boosted() {
        let now = Utc::now();
        let mut c = lone_buyer(now);
        feed_prices(
            &mut c,
            &[dec!(100), dec!(101), dec!(102), dec!(103), dec!(104), dec!(105), dec!(106)],
            now,
        );
        let regime = c.regime("BTC");
        assert_eq!(regime.trend, Trend::Bull);
        assert_eq!(regime.volatility, Volatility::Low);

        let d = c.aggregate("BTC", now);
        assert_eq!(d.action, TradeAction::Buy);
        assert!((d.confidence - 0.88).abs() < 1e-9);
    }

    #[test]
    fn test_buy_against_bear_trend_is_damped() {
        let now = Utc::now();
        let mut c = lone_buyer(now);
        feed_prices(
            &mut c,
            &[dec!(106), dec!(105), dec!(104), dec!(103), dec!(102), dec!(101), dec!(100)],
            now,
        );
        let regime = c.regime("BTC");
        assert_eq!(regime.trend, Trend::Bear);
        assert_eq!(regime.volatility, Volatility::Low);

        let d = c.aggregate("BTC", now);
        assert_eq!(d.action, TradeAction::Buy);
        assert!((d.confidence - 0.72).abs() < 1e-9);
    }

    #[test]
    fn test_whipsaw_market_damps_confidence() {
        let now = Utc::now();
        let mut c = lone_buyer(now);
        // flat end to end, ~10% swings between samples
        feed_prices(
            &mut c,
            &[dec!(100), dec!(110), dec!(100), dec!(110), dec!(100)],
            now,
        );
        let regime = c.regime("BTC");
        assert_eq!(regime.trend, Trend::Sideways);
        assert_eq!(regime.volatility, Volatility::High);

        let d = c.aggregate("BTC", now);
        assert!((d.confidence - 0.64).abs() < 1e-9);
    }

    #[test]
    fn test_consensus_bonus_is_capped() {
        let now = Utc::now();
        let mut c = Coordinator::new(CoordinatorConfig::default());
        for id in ["b1", "b2", "b3", "b4"] {
            c.register_agent(id, 0.25, 0.25);
            c.ingest_signal(id, signal(TradeAction::Buy, 0.6, dec!(10), now))
                .unwrap();
        }

        // four contributors would earn 0.20, the cap holds it at 0.15
        let d = c.aggregate("BTC", now);
        assert_eq!(d.contributions.len(), 4);
        assert!((d.confidence - 0.6 * 1.15).abs() < 1e-9);
        assert_eq!(d.amount, dec!(40));

        feed_prices(
            &mut c,
            &[dec!(100), dec!(101), dec!(102), dec!(103), dec!(104), dec!(105), dec!(106)],
            now,
        );
        let boosted = c.aggregate("BTC", now);
        assert!((boosted.confidence - 0.6 * 1.1 * 1.15).abs() < 1e-9);
    }
}
