//! Agent - one strategy wrapped with its window, inbox and ticker

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::AbortHandle;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use super::config::AgentConfig;
use super::state::{AgentHealth, AgentSnapshot, AgentState};
use super::strategies::Strategy;
use super::ticker::{agent_ticker, AgentTicker};
use super::traits::{EvaluationContext, SignalStrategy};
use crate::domain::numeric::{dec_to_f64, scaled_ms};
use crate::domain::{MarketTick, Signal, TradeAction};
use crate::error::{QuorumError, Result, StrategyError};
use crate::messaging::{
    CoordinationDirective, Message, MessagePayload, MessageQueue, Priority, Severity,
};

const INBOX_CAPACITY: usize = 256;
const MIN_BIAS: f64 = 0.5;
const MAX_BIAS: f64 = 1.5;

pub struct Agent {
    config: AgentConfig,
    strategy: Strategy,
    state: AgentState,
    /// Rolling window per symbol
    windows: HashMap<String, VecDeque<MarketTick>>,
    inbox: MessageQueue,
    ticker: Option<AbortHandle>,
    capital_base: Decimal,
    allocation_bias: f64,
    /// Set by a CRITICAL risk alert; BUY signals are downgraded to HOLD
    defensive: bool,
}

impl Agent {
    pub fn new(config: AgentConfig, capital_base: Decimal, now: DateTime<Utc>) -> Result<Self> {
        config
            .validate()
            .map_err(|errors| QuorumError::InvalidConfig(errors.join("; ")))?;
        let strategy = Strategy::from_config(&config.strategy);
        Ok(Self {
            config,
            strategy,
            state: AgentState::new(now),
            windows: HashMap::new(),
            inbox: MessageQueue::new(INBOX_CAPACITY),
            ticker: None,
            capital_base,
            allocation_bias: 1.0,
            defensive: false,
        })
    }

    pub fn id(&self) -> &str {
        &self.config.agent_id
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active
    }

    pub fn is_defensive(&self) -> bool {
        self.defensive
    }

    pub fn allocation_bias(&self) -> f64 {
        self.allocation_bias
    }

    pub fn window_len(&self, symbol: &str) -> usize {
        self.windows.get(symbol).map_or(0, VecDeque::len)
    }

    /// Activate and hand back the evaluation ticker. Returns `None` when the
    /// agent is already active or disabled.
    pub fn start(&mut self, now: DateTime<Utc>) -> Option<AgentTicker> {
        if self.state.is_active {
            warn!(agent = %self.id(), "start ignored: agent already active");
            return None;
        }
        if !self.config.enabled {
            warn!(agent = %self.id(), "start refused: agent disabled");
            return None;
        }

        let period = Duration::from_millis(self.config.evaluation_interval_ms);
        let (ticker, handle) = agent_ticker(&self.config.agent_id, period);
        self.ticker = Some(handle);
        self.state.is_active = true;
        self.state.last_update = now;
        info!(
            agent = %self.id(),
            strategy = self.strategy.tag(),
            interval_ms = self.config.evaluation_interval_ms,
            "agent started"
        );
        Some(ticker)
    }

    /// Deactivate and cancel the ticker. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if let Some(handle) = self.ticker.take() {
            handle.abort();
        }
        if !self.state.is_active {
            debug!(agent = %self.id(), "stop ignored: agent not active");
            return;
        }
        self.state.is_active = false;
        info!(agent = %self.id(), "agent stopped");
    }

    /// Append to the rolling window and, when active, evaluate the strategy.
    /// Returns the SIGNAL message if the strategy accepts its own signal.
    pub fn on_market_data(&mut self, tick: &MarketTick, now: DateTime<Utc>) -> Option<Message> {
        let capacity = self.config.window_capacity;
        let window = self.windows.entry(tick.symbol.clone()).or_default();
        window.push_back(tick.clone());
        while window.len() > capacity {
            window.pop_front();
        }

        if !self.state.is_active {
            return None;
        }
        self.evaluate_symbol(tick, now)
    }

    /// Periodic tick: drain the inbox in priority order, then re-evaluate the
    /// latest tick of every symbol in the window.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<Message> {
        if !self.state.is_active {
            return Vec::new();
        }
        for message in self.inbox.drain() {
            self.dispatch(message, now);
        }
        self.state.last_update = now;

        let mut latest: Vec<MarketTick> = self
            .windows
            .values()
            .filter_map(|w| w.back().cloned())
            .collect();
        latest.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        latest
            .iter()
            .filter_map(|tick| self.evaluate_symbol(tick, now))
            .collect()
    }

    /// CRITICAL messages are handled on arrival; everything else waits for
    /// the next tick.
    pub fn receive_message(&mut self, message: Message, now: DateTime<Utc>) {
        if message.priority == Priority::Critical {
            self.dispatch(message, now);
            return;
        }
        if let Err(e) = self.inbox.enqueue(message) {
            warn!(agent = %self.id(), error = %e, "message dropped");
        }
    }

    pub fn health(&self, now: DateTime<Utc>) -> AgentHealth {
        let ms_since_update = now
            .signed_duration_since(self.state.last_update)
            .num_milliseconds();
        let stale_after = scaled_ms(self.config.evaluation_interval_ms, 3);
        let mut issues = Vec::new();

        if !self.state.is_active {
            issues.push("inactive".to_string());
        }
        if ms_since_update > stale_after {
            issues.push(format!(
                "no update for {ms_since_update}ms (limit {stale_after}ms)"
            ));
        }
        let inbox = self.inbox.stats();
        if inbox.current_size > self.config.backlog_threshold {
            issues.push(format!(
                "inbox backlog over {}: {inbox}",
                self.config.backlog_threshold
            ));
        }

        AgentHealth {
            agent_id: self.config.agent_id.clone(),
            healthy: issues.is_empty(),
            is_active: self.state.is_active,
            inbox,
            ms_since_update,
            defensive: self.defensive,
            issues,
        }
    }

    /// Replace the config. Returns true when a running ticker must be
    /// rebuilt because the interval or enabled flag changed.
    pub fn update_config(&mut self, config: AgentConfig) -> Result<bool> {
        if config.agent_id != self.config.agent_id {
            return Err(QuorumError::InvalidConfig(format!(
                "agent id mismatch: {} != {}",
                config.agent_id, self.config.agent_id
            )));
        }
        config
            .validate()
            .map_err(|errors| QuorumError::InvalidConfig(errors.join("; ")))?;

        let reschedule = config.evaluation_interval_ms != self.config.evaluation_interval_ms
            || config.enabled != self.config.enabled;
        if config.strategy != self.config.strategy {
            self.strategy = Strategy::from_config(&config.strategy);
        }
        info!(
            agent = %self.id(),
            allocation = config.allocation_percent,
            interval_ms = config.evaluation_interval_ms,
            enabled = config.enabled,
            "agent config updated"
        );
        self.config = config;
        Ok(reschedule)
    }

    pub fn state(&self) -> AgentState {
        self.state.clone()
    }

    pub fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            agent_id: self.config.agent_id.clone(),
            name: self.config.name.clone(),
            strategy: self.strategy.tag().to_string(),
            state: self.state.clone(),
            allocation_bias: self.allocation_bias,
            defensive: self.defensive,
            window_len: self.windows.values().map(VecDeque::len).sum(),
        }
    }

    fn evaluate_symbol(&mut self, tick: &MarketTick, now: DateTime<Utc>) -> Option<Message> {
        let prices: Vec<f64> = self
            .windows
            .get(&tick.symbol)
            .map(|w| w.iter().map(|t| dec_to_f64(t.price)).collect())
            .unwrap_or_default();
        let ctx = EvaluationContext {
            agent_id: &self.config.agent_id,
            prices: &prices,
            capital: self.capital_base,
            max_position_size_percent: self.config.max_position_size_percent,
            risk_tolerance: self.config.risk_tolerance,
            allocation_bias: self.allocation_bias,
            now,
        };

        let mut signal = match self.strategy.evaluate(tick, &ctx) {
            Ok(signal) => signal,
            Err(e @ StrategyError::InsufficientData { .. }) => {
                debug!(agent = %self.config.agent_id, symbol = %tick.symbol, "{}", e);
                Signal::hold(&tick.symbol, e.to_string(), self.strategy.tag(), now)
            }
            Err(e) => {
                warn!(
                    agent = %self.config.agent_id,
                    symbol = %tick.symbol,
                    error = %e,
                    "strategy evaluation failed, holding"
                );
                Signal::hold(&tick.symbol, e.to_string(), self.strategy.tag(), now)
            }
        };

        if self.defensive && signal.action == TradeAction::Buy {
            debug!(agent = %self.config.agent_id, symbol = %tick.symbol, "defensive: BUY downgraded");
            signal = Signal::hold(
                &tick.symbol,
                "defensive mode after critical risk alert",
                self.strategy.tag(),
                now,
            );
        }

        self.state.current_signal = Some(signal.clone());
        self.state.last_update = now;

        if !self.strategy.validate_signal(&signal) {
            debug!(
                agent = %self.config.agent_id,
                symbol = %signal.symbol,
                action = %signal.action,
                confidence = signal.confidence,
                "signal not accepted by strategy"
            );
            return None;
        }

        debug!(
            agent = %self.config.agent_id,
            symbol = %signal.symbol,
            action = %signal.action,
            confidence = signal.confidence,
            amount = %signal.amount,
            "signal emitted"
        );
        Some(Message::signal(&self.config.agent_id, signal))
    }

    fn dispatch(&mut self, message: Message, now: DateTime<Utc>) {
        if let Err(e) = self.handle_message(&message, now) {
            warn!(
                agent = %self.config.agent_id,
                from = %message.from,
                kind = ?message.message_type(),
                error = %e,
                "message handler failed, message dropped"
            );
        }
    }

    fn handle_message(
        &mut self,
        message: &Message,
        _now: DateTime<Utc>,
    ) -> std::result::Result<(), StrategyError> {
        match &message.payload {
            MessagePayload::RiskAlert(alert) if alert.severity == Severity::Critical => {
                if !self.defensive {
                    warn!(
                        agent = %self.config.agent_id,
                        kind = alert.kind.as_str(),
                        "critical risk alert, entering defensive mode"
                    );
                }
                self.defensive = true;
            }
            MessagePayload::RiskAlert(alert) => {
                debug!(
                    agent = %self.config.agent_id,
                    severity = %alert.severity,
                    kind = alert.kind.as_str(),
                    "risk alert received"
                );
            }
            MessagePayload::Coordination(CoordinationDirective::Rebalance { target, effective }) => {
                let bias = if *effective > f64::EPSILON {
                    target / effective
                } else {
                    MAX_BIAS
                };
                self.allocation_bias = bias.clamp(MIN_BIAS, MAX_BIAS);
                info!(
                    agent = %self.config.agent_id,
                    target_allocation = *target,
                    effective_allocation = *effective,
                    bias = self.allocation_bias,
                    "rebalance advice applied"
                );
            }
            MessagePayload::Coordination(CoordinationDirective::ResumeTrading) => {
                if self.defensive {
                    info!(agent = %self.config.agent_id, "trading resumed, leaving defensive mode");
                }
                self.defensive = false;
            }
            MessagePayload::PositionUpdate(update) => {
                self.capital_base = update.total_value;
                if update.contributing_agents.contains(&self.config.agent_id) {
                    self.state.performance.record(update.amount, update.pnl);
                }
            }
            MessagePayload::Signal(_) | MessagePayload::MarketUpdate(_) => {}
        }
        self.strategy.on_message(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::config::StrategyConfig;
    use crate::messaging::{BreachKind, PositionUpdate, RiskAlert, BROADCAST, RISK_MANAGER_ID};
    use rust_decimal_macros::dec;

    fn momentum_agent(now: DateTime<Utc>) -> Agent {
        let config = AgentConfig::new(
            "mom-1",
            StrategyConfig::Momentum {
                lookback: 2,
                threshold: 0.02,
            },
            40.0,
        )
        .with_interval_ms(1_000);
        Agent::new(config, dec!(10000), now).unwrap()
    }

    fn tick(price: Decimal, now: DateTime<Utc>) -> MarketTick {
        MarketTick::new("BTC", price, now)
    }

    fn critical_alert(now: DateTime<Utc>) -> Message {
        Message::new(
            RISK_MANAGER_ID,
            BROADCAST,
            Priority::Critical,
            MessagePayload::RiskAlert(RiskAlert {
                severity: Severity::Critical,
                kind: BreachKind::Drawdown,
                message: "drawdown".into(),
                metrics: None,
            }),
            now,
        )
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let now = Utc::now();
        let mut agent = momentum_agent(now);
        assert!(agent.start(now).is_some());
        assert!(agent.start(now).is_none());
        assert!(agent.is_active());
        agent.stop();
        agent.stop();
        assert!(!agent.is_active());
    }

    #[tokio::test]
    async fn test_disabled_agent_refuses_to_start() {
        let now = Utc::now();
        let mut config = AgentConfig::new("off", StrategyConfig::momentum(), 10.0);
        config.enabled = false;
        let mut agent = Agent::new(config, dec!(1000), now).unwrap();
        assert!(agent.start(now).is_none());
        assert!(!agent.is_active());
    }

    #[tokio::test]
    async fn test_emits_signal_on_breakout() {
        let now = Utc::now();
        let mut agent = momentum_agent(now);
        let _ticker = agent.start(now);

        assert!(agent.on_market_data(&tick(dec!(100), now), now).is_none());
        assert!(agent.on_market_data(&tick(dec!(101), now), now).is_none());
        let msg = agent
            .on_market_data(&tick(dec!(104), now), now)
            .expect("breakout signal");
        assert_eq!(msg.to, crate::messaging::COORDINATOR_ID);
        assert_eq!(msg.priority, Priority::High);
        match msg.payload {
            MessagePayload::Signal(s) => assert_eq!(s.action, TradeAction::Buy),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stopped_agent_does_not_evaluate() {
        let now = Utc::now();
        let mut agent = momentum_agent(now);
        let _ticker = agent.start(now);
        agent.on_market_data(&tick(dec!(100), now), now);
        agent.stop();

        let before = agent.state();
        let later = now + chrono::Duration::seconds(5);
        assert!(agent.on_market_data(&tick(dec!(200), later), later).is_none());
        assert_eq!(agent.state(), before);
        assert!(agent.tick(later).is_empty());
        assert_eq!(agent.state(), before);
    }

    #[tokio::test]
    async fn test_critical_alert_is_immediate_and_defensive() {
        let now = Utc::now();
        let mut agent = momentum_agent(now);
        let _ticker = agent.start(now);

        agent.receive_message(critical_alert(now), now);
        assert!(agent.is_defensive());
        assert_eq!(agent.health(now).inbox.current_size, 0);

        agent.on_market_data(&tick(dec!(100), now), now);
        agent.on_market_data(&tick(dec!(101), now), now);
        assert!(agent.on_market_data(&tick(dec!(104), now), now).is_none());
        assert!(agent.state().current_signal.unwrap().is_hold());

        let resume = Message::new(
            crate::messaging::COORDINATOR_ID,
            "mom-1",
            Priority::High,
            MessagePayload::Coordination(CoordinationDirective::ResumeTrading),
            now,
        );
        agent.receive_message(resume, now);
        assert!(agent.is_defensive());
        agent.tick(now);
        assert!(!agent.is_defensive());
    }

    #[tokio::test]
    async fn test_rebalance_bias_is_clamped() {
        let now = Utc::now();
        let mut agent = momentum_agent(now);
        let _ticker = agent.start(now);
        let msg = Message::new(
            crate::messaging::COORDINATOR_ID,
            "mom-1",
            Priority::Medium,
            MessagePayload::Coordination(CoordinationDirective::Rebalance {
                target: 0.4,
                effective: 0.1,
            }),
            now,
        );
        agent.receive_message(msg, now);
        agent.tick(now);
        assert_eq!(agent.allocation_bias(), 1.5);
    }

    #[tokio::test]
    async fn test_position_update_counts_contributions() {
        let now = Utc::now();
        let mut agent = momentum_agent(now);
        let _ticker = agent.start(now);
        let update = PositionUpdate {
            trade_id: "t1".into(),
            symbol: "BTC".into(),
            action: TradeAction::Sell,
            amount: dec!(100),
            quantity: dec!(1),
            fill_price: dec!(100),
            pnl: Some(dec!(5)),
            position_quantity: dec!(0),
            cash_balance: dec!(9000),
            total_value: dec!(12000),
            contributing_agents: vec!["mom-1".into()],
        };
        let msg = Message::new(
            crate::messaging::ORCHESTRATOR_ID,
            BROADCAST,
            Priority::Medium,
            MessagePayload::PositionUpdate(update),
            now,
        );
        agent.receive_message(msg, now);
        agent.tick(now);
        let perf = agent.state().performance;
        assert_eq!(perf.total_trades, 1);
        assert_eq!(perf.total_pnl, dec!(5));
        assert_eq!(agent.capital_base, dec!(12000));
    }

    #[tokio::test]
    async fn test_health_flags_staleness_and_backlog() {
        let now = Utc::now();
        let mut config = AgentConfig::new("h", StrategyConfig::momentum(), 10.0).with_interval_ms(100);
        config.backlog_threshold = 1;
        let mut agent = Agent::new(config, dec!(1000), now).unwrap();
        assert!(!agent.health(now).healthy);

        let _ticker = agent.start(now);
        assert!(agent.health(now).healthy);

        let later = now + chrono::Duration::milliseconds(301);
        assert!(!agent.health(later).healthy);

        for _ in 0..2 {
            let msg = Message::new(
                "x",
                "h",
                Priority::Low,
                MessagePayload::Coordination(CoordinationDirective::ResumeTrading),
                now,
            );
            agent.receive_message(msg, now);
        }
        let health = agent.health(now);
        assert!(!health.healthy);
        assert_eq!(health.inbox.current_size, 2);
        assert_eq!(health.inbox.low_count, 2);
        assert_eq!(health.inbox.enqueued_total, 2);
    }

    #[tokio::test]
    async fn test_update_config_rejects_other_id() {
        let now = Utc::now();
        let mut agent = momentum_agent(now);
        let other = AgentConfig::new("someone-else", StrategyConfig::momentum(), 10.0);
        assert!(agent.update_config(other).is_err());

        let mut same = agent.config().clone();
        same.evaluation_interval_ms = 2_000;
        assert!(agent.update_config(same).unwrap());
    }

    #[test]
    fn test_health_with_huge_interval_does_not_overflow() {
        let now = Utc::now();
        for interval_ms in [i64::MAX as u64, u64::MAX] {
            let config = AgentConfig::new("slow", StrategyConfig::momentum(), 10.0)
                .with_interval_ms(interval_ms);
            assert!(config.validate().is_ok());
            let agent = Agent::new(config, dec!(10000), now).unwrap();

            let health = agent.health(now + chrono::Duration::days(365));
            assert_eq!(health.issues, vec!["inactive".to_string()]);
        }
    }
}
