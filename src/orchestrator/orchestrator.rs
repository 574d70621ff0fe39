//! Orchestrator - sole owner of agents, coordinator, risk gate and portfolio
//!
//! The `run()` loop uses `tokio::select!` to:
//!   - Handle operator / feed commands from `OrchestratorHandle`s
//!   - Fire agent evaluation ticks (abortable ticker streams)
//!   - Run the risk cycle, the coordination cycle and the health check
//!   - Apply execution outcomes coming back from spawned venue calls
//!
//! Every emitted message goes through `route`, which sorts each batch by
//! priority before delivery.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{SelectAll, StreamExt};
use rust_decimal::Decimal;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::command::OrchestratorCommand;
use super::config::OrchestratorConfig;
use super::events::{SystemEvent, SystemHealth};
use super::handle::OrchestratorHandle;
use crate::agents::{Agent, AgentConfig, AgentTicker};
use crate::coordinator::{Coordinator, CoordinatorConfig};
use crate::domain::numeric::secs_to_ms;
use crate::domain::{Decision, MarketTick, TradeAction, TradeRecord};
use crate::error::{QuorumError, Result};
use crate::execution::{ExecutionReceipt, ExecutionRequest, ExecutionVenue};
use crate::messaging::{
    sort_batch, CoordinationDirective, Message, MessagePayload, PositionUpdate, Priority,
    BROADCAST, COORDINATOR_ID, ORCHESTRATOR_ID, RISK_MANAGER_ID,
};
use crate::portfolio::{PortfolioState, TradeHistory};
use crate::risk::{PolicyLimits, RiskAssessment, RiskGate, RiskLimits};

const RESERVED_IDS: [&str; 4] = [COORDINATOR_ID, RISK_MANAGER_ID, ORCHESTRATOR_ID, BROADCAST];

/// Result of one venue call, sent back into the loop
#[derive(Debug)]
pub(crate) struct ExecutionOutcome {
    trade_id: String,
    result: Result<ExecutionReceipt>,
}

/// A dispatched trade waiting for its venue outcome
#[derive(Debug)]
struct InFlight {
    record: TradeRecord,
    decision: Decision,
}

#[derive(Debug, Clone)]
struct Deferred {
    decision: Decision,
    deferred_at: DateTime<Utc>,
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    /// Ordered by id so broadcasts and health reports are deterministic
    agents: BTreeMap<String, Agent>,
    tickers: SelectAll<AgentTicker>,
    coordinator: Coordinator,
    risk: RiskGate,
    portfolio: PortfolioState,
    history: TradeHistory,
    venue: Arc<dyn ExecutionVenue>,

    in_flight: HashMap<String, InFlight>,
    /// Symbol -> time of the last dispatched execution
    last_trade_at: HashMap<String, DateTime<Utc>>,
    deferred: HashMap<String, Deferred>,

    cmd_tx: Option<mpsc::Sender<OrchestratorCommand>>,
    cmd_rx: mpsc::Receiver<OrchestratorCommand>,
    outcome_tx: mpsc::Sender<ExecutionOutcome>,
    outcome_rx: mpsc::Receiver<ExecutionOutcome>,
    events: broadcast::Sender<SystemEvent>,
}

impl Orchestrator {
    /// Build every component in dependency order: agents, coordinator, risk
    /// gate, then wiring. Nothing runs until `run()`.
    pub fn new(
        config: OrchestratorConfig,
        coordinator_config: CoordinatorConfig,
        risk_limits: RiskLimits,
        agent_configs: Vec<AgentConfig>,
        venue: Arc<dyn ExecutionVenue>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|errors| QuorumError::InvalidConfig(errors.join("; ")))?;
        coordinator_config
            .validate()
            .map_err(|errors| QuorumError::InvalidConfig(errors.join("; ")))?;
        risk_limits
            .validate()
            .map_err(|errors| QuorumError::InvalidConfig(errors.join("; ")))?;

        let now = Utc::now();
        let mut agents = BTreeMap::new();
        for agent_config in agent_configs {
            let id = agent_config.agent_id.clone();
            if RESERVED_IDS.contains(&id.as_str()) {
                return Err(QuorumError::InvalidConfig(format!(
                    "agent id '{id}' is reserved"
                )));
            }
            if agents.contains_key(&id) {
                return Err(QuorumError::InvalidConfig(format!(
                    "duplicate agent id '{id}'"
                )));
            }
            let agent = Agent::new(agent_config, config.initial_cash, now)?;
            agents.insert(id, agent);
        }

        let mut coordinator = Coordinator::new(coordinator_config);
        for agent in agents.values() {
            let cfg = agent.config();
            coordinator.register_agent(
                &cfg.agent_id,
                cfg.static_weight(),
                cfg.allocation_percent / 100.0,
            );
        }

        let risk = RiskGate::new(risk_limits, config.initial_cash);
        let portfolio = PortfolioState::new(config.initial_cash);
        let history = TradeHistory::new(config.trade_history_size);

        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_buffer);
        let (outcome_tx, outcome_rx) = mpsc::channel(64);
        let (events, _) = broadcast::channel(config.event_buffer);

        info!(
            agents = agents.len(),
            initial_cash = %config.initial_cash,
            venue = %venue.kind(),
            "orchestrator created"
        );

        Ok(Self {
            config,
            agents,
            tickers: SelectAll::new(),
            coordinator,
            risk,
            portfolio,
            history,
            venue,
            in_flight: HashMap::new(),
            last_trade_at: HashMap::new(),
            deferred: HashMap::new(),
            cmd_tx: Some(cmd_tx),
            cmd_rx,
            outcome_tx,
            outcome_rx,
            events,
        })
    }

    /// Build from the application config
    pub fn from_app_config(
        app: &crate::config::AppConfig,
        venue: Arc<dyn ExecutionVenue>,
    ) -> Result<Self> {
        Self::new(
            app.orchestrator.clone(),
            app.coordinator.clone(),
            app.risk.clone(),
            app.agents.clone(),
            venue,
        )
    }

    /// Handles must be taken before `run()`; the loop ends once every
    /// handle is dropped or `stop()` is called.
    pub fn handle(&self) -> Result<OrchestratorHandle> {
        let tx = self
            .cmd_tx
            .as_ref()
            .ok_or_else(|| QuorumError::Internal("orchestrator already running".into()))?;
        Ok(OrchestratorHandle::new(tx.clone(), self.events.clone()))
    }

    /// Spawn the loop on the current runtime
    pub fn spawn(self) -> Result<(OrchestratorHandle, tokio::task::JoinHandle<()>)> {
        let handle = self.handle()?;
        Ok((handle, tokio::spawn(self.run())))
    }

    /// Main loop - returns after shutdown
    pub async fn run(mut self) {
        // Only handles keep the command channel open from here on
        self.cmd_tx = None;
        self.start_agents(Utc::now());

        let mut risk_tick = interval(self.risk.limits().cycle_interval_ms);
        let mut coordination_tick = interval(self.config.coordination_interval_ms);
        let mut health_tick = interval(self.config.health_check_interval_ms);

        info!(agents = self.agents.len(), "orchestrator starting main loop");

        let stop_reply = loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(OrchestratorCommand::Stop(reply)) => break Some(reply),
                        Some(cmd) => self.handle_command(cmd, Utc::now()),
                        None => {
                            info!("all orchestrator handles dropped");
                            break None;
                        }
                    }
                }

                Some(agent_id) = self.tickers.next(), if !self.tickers.is_empty() => {
                    self.on_agent_tick(&agent_id, Utc::now());
                }

                Some(outcome) = self.outcome_rx.recv() => {
                    self.apply_execution_outcome(outcome, Utc::now());
                }

                _ = risk_tick.tick() => {
                    self.run_risk_cycle(Utc::now());
                }

                _ = coordination_tick.tick() => {
                    self.run_coordination_cycle(Utc::now());
                }

                _ = health_tick.tick() => {
                    self.health_check(Utc::now());
                }
            }
        };

        self.shutdown().await;
        if let Some(reply) = stop_reply {
            let _ = reply.send(());
        }
        info!("orchestrator: main loop exited");
    }

    fn start_agents(&mut self, now: DateTime<Utc>) {
        for agent in self.agents.values_mut() {
            if let Some(ticker) = agent.start(now) {
                self.tickers.push(ticker);
            }
        }
    }

    /// Agents first so no further signals are produced, then settle whatever
    /// is still at the venue.
    async fn shutdown(&mut self) {
        for agent in self.agents.values_mut() {
            agent.stop();
        }
        let dropped = self.deferred.len();
        self.deferred.clear();
        if dropped > 0 {
            info!(dropped, "deferred decisions dropped on shutdown");
        }

        let grace = tokio::time::sleep(Duration::from_millis(
            self.config.execution_timeout_ms.saturating_add(100),
        ));
        tokio::pin!(grace);
        while !self.in_flight.is_empty() {
            tokio::select! {
                outcome = self.outcome_rx.recv() => match outcome {
                    Some(outcome) => self.apply_execution_outcome(outcome, Utc::now()),
                    None => break,
                },
                _ = &mut grace => break,
            }
        }

        let now = Utc::now();
        let orphaned: Vec<String> = self.in_flight.keys().cloned().collect();
        for trade_id in orphaned {
            if let Some(InFlight { mut record, .. }) = self.in_flight.remove(&trade_id) {
                if let Err(e) = record.mark_failed("shutdown before venue completion", now) {
                    error!(trade_id = %trade_id, error = %e, "trade record transition failed");
                }
                warn!(trade_id = %trade_id, symbol = %record.symbol, "in-flight trade abandoned");
                self.history.push(record);
            }
        }
        info!(
            trades = self.history.len(),
            total_value = %self.portfolio.total_value(),
            "orchestrator shut down"
        );
    }

    fn emit(&self, event: SystemEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn handle_command(&mut self, cmd: OrchestratorCommand, now: DateTime<Utc>) {
        match cmd {
            OrchestratorCommand::MarketData(tick) => self.on_market_data(tick, now),
            OrchestratorCommand::EmergencyHalt { reason, reply } => {
                let halted = self.emergency_halt(&reason, now);
                let _ = reply.send(halted);
            }
            OrchestratorCommand::ResetEmergencyHalt(reply) => {
                let reset = self.reset_emergency_halt(now);
                let _ = reply.send(reset);
            }
            OrchestratorCommand::UpdatePolicy {
                agent_id,
                limits,
                reply,
            } => {
                let _ = reply.send(self.update_policy(&agent_id, limits));
            }
            OrchestratorCommand::UpdateAgentConfig { config, reply } => {
                let _ = reply.send(self.update_agent_config(config, now));
            }
            OrchestratorCommand::Portfolio(reply) => {
                let _ = reply.send(self.portfolio.snapshot(now));
            }
            OrchestratorCommand::Risk(reply) => {
                let _ = reply.send(self.risk.snapshot());
            }
            OrchestratorCommand::TradeHistory { limit, reply } => {
                let _ = reply.send(self.history.recent(limit));
            }
            OrchestratorCommand::AgentHealth(reply) => {
                let _ = reply.send(self.agents.values().map(|a| a.health(now)).collect());
            }
            OrchestratorCommand::AgentSnapshots(reply) => {
                let _ = reply.send(self.agents.values().map(Agent::snapshot).collect());
            }
            OrchestratorCommand::SystemHealth(reply) => {
                let _ = reply.send(self.system_health(now));
            }
            OrchestratorCommand::Stop(reply) => {
                // handled by the loop
                let _ = reply.send(());
            }
        }
    }

    /// Fan one tick out to the portfolio marks, the coordinator and every agent
    fn on_market_data(&mut self, tick: MarketTick, now: DateTime<Utc>) {
        if let Err(e) = tick.validate() {
            warn!(symbol = %tick.symbol, error = %e, "market data dropped");
            return;
        }
        self.portfolio.update_mark(&tick.symbol, tick.price);
        self.coordinator.on_market_data(&tick);

        let signals: Vec<Message> = self
            .agents
            .values_mut()
            .filter_map(|agent| agent.on_market_data(&tick, now))
            .collect();
        self.route(signals, now);
    }

    fn on_agent_tick(&mut self, agent_id: &str, now: DateTime<Utc>) {
        let Some(agent) = self.agents.get_mut(agent_id) else {
            return;
        };
        let messages = agent.tick(now);
        self.route(messages, now);
    }

    /// Deliver one batch in priority order. Signals reaching the coordinator
    /// trigger aggregation for their symbol once the batch is delivered.
    fn route(&mut self, mut batch: Vec<Message>, now: DateTime<Utc>) {
        if batch.is_empty() {
            return;
        }
        sort_batch(&mut batch);

        let mut to_aggregate: Vec<String> = Vec::new();
        for message in batch {
            let to = message.to.clone();
            match to.as_str() {
                COORDINATOR_ID => match self.coordinator.receive_message(&message, now) {
                    Ok(Some(symbol)) => {
                        if !to_aggregate.contains(&symbol) {
                            to_aggregate.push(symbol);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => self.drop_message(&message, &e.to_string()),
                },
                BROADCAST => {
                    if let MessagePayload::RiskAlert(alert) = &message.payload {
                        self.coordinator.apply_risk_alert(alert, now);
                        self.emit(SystemEvent::RiskAlert(alert.clone()));
                    }
                    for (id, agent) in self.agents.iter_mut() {
                        agent.receive_message(message.readdressed(id), now);
                    }
                }
                ORCHESTRATOR_ID | RISK_MANAGER_ID => {
                    debug!(
                        from = %message.from,
                        to = %message.to,
                        kind = ?message.message_type(),
                        "message to loop-owned component ignored"
                    );
                }
                agent_id => match self.agents.get_mut(agent_id) {
                    Some(agent) => agent.receive_message(message, now),
                    None => self.drop_message(&message, "unknown recipient"),
                },
            }
        }

        for symbol in to_aggregate {
            let decision = self.coordinator.aggregate(&symbol, now);
            self.process_decision(decision, now);
        }
    }

    fn drop_message(&self, message: &Message, reason: &str) {
        warn!(
            from = %message.from,
            to = %message.to,
            kind = ?message.message_type(),
            priority = %message.priority,
            reason,
            "message dropped"
        );
        self.emit(SystemEvent::MessageDropped {
            from: message.from.clone(),
            to: message.to.clone(),
            reason: reason.to_string(),
        });
    }

    /// Risk gate first, then the inter-trade interval, then the venue
    fn process_decision(&mut self, decision: Decision, now: DateTime<Utc>) {
        if !decision.is_actionable(self.config.min_decision_confidence) {
            debug!(
                symbol = %decision.symbol,
                action = %decision.action,
                confidence = decision.confidence,
                "decision below action threshold"
            );
            return;
        }

        let snapshot = self.portfolio.snapshot(now);
        let approved = match self.risk.assess_and_adjust(&decision, &snapshot) {
            RiskAssessment::Approved(d) => d,
            RiskAssessment::Adjusted { decision: d, reasons } => {
                info!(
                    symbol = %d.symbol,
                    action = %d.action,
                    requested = %decision.amount,
                    approved = %d.amount,
                    reasons = %reasons.join("; "),
                    "decision down-sized by risk gate"
                );
                d
            }
            RiskAssessment::Rejected(reason) => {
                self.reject_decision(&decision, &reason.to_string(), now);
                return;
            }
        };

        if let Some(wait_ms) = self.trade_interval_remaining(&approved.symbol, now) {
            info!(
                symbol = %approved.symbol,
                action = %approved.action,
                retry_in_ms = wait_ms,
                "decision deferred by minimum trade interval"
            );
            self.emit(SystemEvent::DecisionDeferred {
                symbol: approved.symbol.clone(),
                retry_in_ms: wait_ms,
            });
            self.deferred.insert(
                approved.symbol.clone(),
                Deferred {
                    decision: approved,
                    deferred_at: now,
                },
            );
            return;
        }

        self.dispatch(approved, now);
    }

    fn reject_decision(&mut self, decision: &Decision, reason: &str, now: DateTime<Utc>) {
        let mark = self.portfolio.mark(&decision.symbol).unwrap_or(Decimal::ZERO);
        let record = TradeRecord::rejected(decision, mark, reason, now);
        info!(
            trade_id = %record.id,
            symbol = %decision.symbol,
            action = %decision.action,
            amount = %decision.amount,
            agents = ?record.contributing_agents,
            reason,
            "decision rejected by risk gate"
        );
        self.history.push(record);
        self.coordinator.record_outcome(decision, false);
        self.emit(SystemEvent::DecisionRejected {
            symbol: decision.symbol.clone(),
            reason: reason.to_string(),
        });
    }

    /// Milliseconds until `symbol` may trade again, or None if it may now
    fn trade_interval_remaining(&self, symbol: &str, now: DateTime<Utc>) -> Option<i64> {
        let interval_ms = secs_to_ms(self.config.min_trade_interval_secs);
        if self.in_flight.values().any(|f| f.record.symbol == symbol) {
            return Some(interval_ms);
        }
        let last = self.last_trade_at.get(symbol)?;
        let elapsed = now.signed_duration_since(*last).num_milliseconds();
        (elapsed < interval_ms).then_some(interval_ms - elapsed)
    }

    /// Create the PENDING record and call the venue on a spawned task
    fn dispatch(&mut self, decision: Decision, now: DateTime<Utc>) {
        let Some(mark) = self.portfolio.mark(&decision.symbol) else {
            self.reject_decision(&decision, "no market price", now);
            return;
        };
        let record = TradeRecord::proposed(&decision, mark, now);
        let trade_id = record.id.clone();
        let request = ExecutionRequest {
            action: decision.action,
            symbol: decision.symbol.clone(),
            amount: decision.amount,
            max_slippage: self.config.max_slippage,
            reference_price: mark,
        };

        info!(
            trade_id = %trade_id,
            symbol = %decision.symbol,
            action = %decision.action,
            amount = %decision.amount,
            confidence = decision.confidence,
            initiator = %record.initiating_agent_id,
            "executing decision"
        );

        self.last_trade_at.insert(decision.symbol.clone(), now);
        self.in_flight
            .insert(trade_id.clone(), InFlight { record, decision });

        let venue = Arc::clone(&self.venue);
        let tx = self.outcome_tx.clone();
        let timeout = Duration::from_millis(self.config.execution_timeout_ms);
        tokio::spawn(async move {
            let started = Instant::now();
            let result = match tokio::time::timeout(timeout, venue.execute(request)).await {
                Ok(result) => result,
                Err(_) => Err(QuorumError::ExecutionTimeout {
                    elapsed_ms: started.elapsed().as_millis() as u64,
                }),
            };
            if tx.send(ExecutionOutcome { trade_id, result }).await.is_err() {
                debug!("execution outcome dropped: orchestrator gone");
            }
        });
    }

    /// Re-validate against the current portfolio, then apply or fail
    fn apply_execution_outcome(&mut self, outcome: ExecutionOutcome, now: DateTime<Utc>) {
        let Some(InFlight {
            mut record,
            decision,
        }) = self.in_flight.remove(&outcome.trade_id)
        else {
            warn!(trade_id = %outcome.trade_id, "outcome for unknown trade ignored");
            return;
        };

        let receipt = match outcome.result {
            Ok(receipt) if receipt.success && receipt.filled_price > Decimal::ZERO => receipt,
            Ok(receipt) => {
                let reason = receipt
                    .failure_reason
                    .unwrap_or_else(|| "venue reported failure".to_string());
                self.fail_trade(record, &reason, now);
                return;
            }
            Err(e) => {
                self.fail_trade(record, &e.to_string(), now);
                return;
            }
        };

        let amount = self.applicable_amount(&decision, receipt.filled_price);
        if amount <= Decimal::ZERO {
            self.fail_trade(record, "no cash or position left at fill time", now);
            return;
        }

        let fill = match self.portfolio.apply_fill(
            decision.action,
            &decision.symbol,
            amount,
            receipt.filled_price,
        ) {
            Ok(fill) => fill,
            Err(e) => {
                self.fail_trade(record, &e.to_string(), now);
                return;
            }
        };

        record.amount = amount;
        if let Err(e) =
            record.mark_executed(receipt.filled_price, &receipt.transaction_id, fill.realized_pnl, now)
        {
            error!(trade_id = %record.id, error = %e, "trade record transition failed");
        }
        info!(
            trade_id = %record.id,
            symbol = %record.symbol,
            action = %record.action,
            %amount,
            price = %receipt.filled_price,
            quantity = %fill.quantity,
            pnl = ?fill.realized_pnl,
            cash = %fill.cash_balance,
            total_value = %fill.total_value,
            tx = %receipt.transaction_id,
            "trade executed"
        );

        let accepted = decision.clone().with_amount(amount);
        self.coordinator.record_outcome(&accepted, true);

        let update = Message::new(
            ORCHESTRATOR_ID,
            BROADCAST,
            Priority::Medium,
            MessagePayload::PositionUpdate(PositionUpdate {
                trade_id: record.id.clone(),
                symbol: record.symbol.clone(),
                action: record.action,
                amount,
                quantity: fill.quantity,
                fill_price: receipt.filled_price,
                pnl: fill.realized_pnl,
                position_quantity: fill.position_quantity,
                cash_balance: fill.cash_balance,
                total_value: fill.total_value,
                contributing_agents: record.contributing_agents.clone(),
            }),
            now,
        );
        self.history.push(record.clone());
        self.emit(SystemEvent::TradeExecuted(record));
        self.route(vec![update], now);
    }

    /// Amount that can still be applied: BUY capped at cash, SELL at the
    /// held quantity valued at the fill price
    fn applicable_amount(&self, decision: &Decision, fill_price: Decimal) -> Decimal {
        match decision.action {
            TradeAction::Buy => decision.amount.min(self.portfolio.cash_balance()),
            TradeAction::Sell => {
                let held_value = self.portfolio.position(&decision.symbol) * fill_price;
                decision.amount.min(held_value)
            }
            TradeAction::Hold => Decimal::ZERO,
        }
    }

    fn fail_trade(&mut self, mut record: TradeRecord, reason: &str, now: DateTime<Utc>) {
        if let Err(e) = record.mark_failed(reason, now) {
            error!(trade_id = %record.id, error = %e, "trade record transition failed");
        }
        warn!(
            trade_id = %record.id,
            symbol = %record.symbol,
            action = %record.action,
            amount = %record.amount,
            initiator = %record.initiating_agent_id,
            reason,
            "trade failed, portfolio unchanged"
        );
        self.history.push(record.clone());
        self.emit(SystemEvent::TradeFailed(record));
    }

    fn run_risk_cycle(&mut self, now: DateTime<Utc>) {
        let snapshot = self.portfolio.snapshot(now);
        let report = self.risk.evaluate_cycle(&snapshot, now);
        if report.halted_now {
            let reason = report
                .breaches
                .iter()
                .find(|b| b.severity == crate::messaging::Severity::Critical)
                .map(ToString::to_string)
                .unwrap_or_else(|| "critical breach".to_string());
            self.emit(SystemEvent::Halted { reason });
        }
        self.route(report.alerts, now);
    }

    fn run_coordination_cycle(&mut self, now: DateTime<Utc>) {
        let pruned = self.coordinator.prune_stale(now);
        if pruned > 0 {
            debug!(pruned, "stale signals pruned");
        }
        let advice = self.coordinator.rebalance_messages(now);
        self.route(advice, now);
        self.release_deferred(now);
    }

    /// Re-run deferred decisions whose interval has elapsed
    fn release_deferred(&mut self, now: DateTime<Utc>) {
        let max_age_ms = secs_to_ms(self.config.max_deferral_secs);
        let mut ready = Vec::new();
        let symbols: Vec<String> = self.deferred.keys().cloned().collect();
        for symbol in symbols {
            let age = self.deferred.get(&symbol).map(|d| {
                now.signed_duration_since(d.deferred_at).num_milliseconds()
            });
            if age.is_some_and(|age| age > max_age_ms) {
                self.deferred.remove(&symbol);
                info!(symbol = %symbol, "deferred decision expired");
                continue;
            }
            if self.trade_interval_remaining(&symbol, now).is_none() {
                if let Some(d) = self.deferred.remove(&symbol) {
                    ready.push(d.decision);
                }
            }
        }
        ready.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        for decision in ready {
            debug!(symbol = %decision.symbol, "releasing deferred decision");
            self.process_decision(decision, now);
        }
    }

    fn emergency_halt(&mut self, reason: &str, now: DateTime<Utc>) -> bool {
        let alerts = self.risk.emergency_halt(reason, now);
        if alerts.is_empty() {
            return false;
        }
        self.emit(SystemEvent::Halted {
            reason: reason.to_string(),
        });
        self.route(alerts, now);
        true
    }

    fn reset_emergency_halt(&mut self, now: DateTime<Utc>) -> bool {
        if !self.risk.reset_emergency_halt(self.portfolio.total_value(), now) {
            return false;
        }
        self.emit(SystemEvent::HaltReset);
        let resume = Message::new(
            ORCHESTRATOR_ID,
            BROADCAST,
            Priority::High,
            MessagePayload::Coordination(CoordinationDirective::ResumeTrading),
            now,
        );
        self.route(vec![resume], now);
        true
    }

    fn update_policy(&mut self, agent_id: &str, limits: PolicyLimits) -> Result<()> {
        if !self.agents.contains_key(agent_id) {
            return Err(QuorumError::UnknownAgent(agent_id.to_string()));
        }
        self.risk.stage_policy(agent_id, limits);
        Ok(())
    }

    fn update_agent_config(&mut self, config: AgentConfig, now: DateTime<Utc>) -> Result<()> {
        let agent = self
            .agents
            .get_mut(&config.agent_id)
            .ok_or_else(|| QuorumError::UnknownAgent(config.agent_id.clone()))?;
        let reschedule = agent.update_config(config)?;
        let cfg = agent.config().clone();
        if reschedule {
            agent.stop();
            if let Some(ticker) = agent.start(now) {
                self.tickers.push(ticker);
            }
        }
        self.coordinator.register_agent(
            &cfg.agent_id,
            cfg.static_weight(),
            cfg.allocation_percent / 100.0,
        );
        Ok(())
    }

    fn system_health(&self, now: DateTime<Utc>) -> SystemHealth {
        let agents: Vec<_> = self.agents.values().map(|a| a.health(now)).collect();
        let risk = self.risk.snapshot();
        let mut issues: Vec<String> = agents
            .iter()
            .flat_map(|h| h.issues.iter().map(move |i| format!("{}: {}", h.agent_id, i)))
            .collect();
        if self.risk.is_halted() {
            issues.push(format!(
                "trading halted: {}",
                risk.halt_reason.clone().unwrap_or_default()
            ));
        }
        SystemHealth {
            healthy: issues.is_empty(),
            issues,
            agents,
            risk,
            coordinator: self.coordinator.snapshot(now),
            total_value: self.portfolio.total_value(),
            in_flight: self.in_flight.len(),
            deferred: self.deferred.len(),
            checked_at: now,
        }
    }

    /// Log and publish every issue; no remediation
    fn health_check(&self, now: DateTime<Utc>) {
        let health = self.system_health(now);
        for agent in health.agents.iter().filter(|a| !a.healthy) {
            for issue in &agent.issues {
                warn!(agent = %agent.agent_id, issue = %issue, "agent unhealthy");
                self.emit(SystemEvent::HealthIssue {
                    component: agent.agent_id.clone(),
                    issue: issue.clone(),
                });
            }
        }
        if let Some(reason) = &health.risk.halt_reason {
            warn!(reason = %reason, "health: trading halted");
            self.emit(SystemEvent::HealthIssue {
                component: RISK_MANAGER_ID.to_string(),
                issue: format!("trading halted: {reason}"),
            });
        }
        debug!(
            healthy = health.healthy,
            in_flight = health.in_flight,
            deferred = health.deferred,
            total_value = %health.total_value,
            "health check"
        );
    }
}

fn interval(ms: u64) -> tokio::time::Interval {
    let mut tick = tokio::time::interval(Duration::from_millis(ms.max(1)));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tick
}

/// Test access to loop internals without spawning the loop
#[cfg(test)]
impl Orchestrator {
    pub(crate) fn deferred_count(&self) -> usize {
        self.deferred.len()
    }

    pub(crate) fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::StrategyConfig;
    use crate::domain::{Contribution, TradeStatus};
    use crate::execution::{MockExecutionVenue, VenueKind};
    use rust_decimal_macros::dec;

    fn agent_configs() -> Vec<AgentConfig> {
        vec![
            AgentConfig::new("a1", StrategyConfig::momentum(), 40.0),
            AgentConfig::new("a2", StrategyConfig::mean_reversion(), 40.0),
        ]
    }

    fn filling_venue() -> Arc<dyn ExecutionVenue> {
        let mut venue = MockExecutionVenue::new();
        venue.expect_kind().return_const(VenueKind::External);
        venue.expect_execute().returning(|req| {
            Ok(ExecutionReceipt::filled(
                req.reference_price,
                req.amount / req.reference_price,
                "tx-1".to_string(),
            ))
        });
        Arc::new(venue)
    }

    fn orchestrator(venue: Arc<dyn ExecutionVenue>) -> Orchestrator {
        Orchestrator::new(
            OrchestratorConfig::default(),
            CoordinatorConfig::default(),
            RiskLimits::default(),
            agent_configs(),
            venue,
        )
        .unwrap()
    }

    fn decision(action: TradeAction, amount: Decimal, at: DateTime<Utc>) -> Decision {
        Decision {
            symbol: "BTC".into(),
            action,
            amount,
            confidence: 0.8,
            reasoning: "test".into(),
            contributions: vec![Contribution {
                agent_id: "a1".into(),
                weight: 0.4,
                amount,
            }],
            created_at: at,
        }
    }

    fn seed_mark(o: &mut Orchestrator, price: Decimal, now: DateTime<Utc>) {
        o.on_market_data(MarketTick::new("BTC", price, now), now);
    }

    #[test]
    fn test_rejects_duplicate_and_reserved_ids() {
        let mut configs = agent_configs();
        configs.push(AgentConfig::new("a1", StrategyConfig::arbitrage(), 10.0));
        assert!(Orchestrator::new(
            OrchestratorConfig::default(),
            CoordinatorConfig::default(),
            RiskLimits::default(),
            configs,
            filling_venue(),
        )
        .is_err());

        let reserved = vec![AgentConfig::new(COORDINATOR_ID, StrategyConfig::momentum(), 10.0)];
        assert!(Orchestrator::new(
            OrchestratorConfig::default(),
            CoordinatorConfig::default(),
            RiskLimits::default(),
            reserved,
            filling_venue(),
        )
        .is_err());
    }

    #[tokio::test]
    async fn test_second_decision_within_interval_is_deferred() {
        let mut o = orchestrator(filling_venue());
        let now = Utc::now();
        seed_mark(&mut o, dec!(100), now);

        o.process_decision(decision(TradeAction::Buy, dec!(100), now), now);
        assert_eq!(o.in_flight_count(), 1);

        let later = now + chrono::Duration::seconds(5);
        o.process_decision(decision(TradeAction::Buy, dec!(50), later), later);
        assert_eq!(o.in_flight_count(), 1);
        assert_eq!(o.deferred_count(), 1);

        let outcome = o.outcome_rx.recv().await.unwrap();
        o.apply_execution_outcome(outcome, later);
        assert_eq!(o.history.count_by_status(TradeStatus::Executed), 1);

        // still inside the interval measured from dispatch
        o.release_deferred(now + chrono::Duration::seconds(10));
        assert_eq!(o.deferred_count(), 1);
        assert_eq!(o.in_flight_count(), 0);

        o.release_deferred(now + chrono::Duration::seconds(31));
        assert_eq!(o.deferred_count(), 0);
        assert_eq!(o.in_flight_count(), 1);
    }

    #[tokio::test]
    async fn test_executed_buy_updates_portfolio() {
        let mut o = orchestrator(filling_venue());
        let now = Utc::now();
        seed_mark(&mut o, dec!(50), now);

        o.process_decision(decision(TradeAction::Buy, dec!(500), now), now);
        let outcome = o.outcome_rx.recv().await.unwrap();
        o.apply_execution_outcome(outcome, now);

        assert_eq!(o.portfolio.cash_balance(), dec!(9500));
        assert_eq!(o.portfolio.position("BTC"), dec!(10));
        assert_eq!(o.portfolio.total_value(), dec!(10000));

        let records = o.history.all();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, TradeStatus::Executed);
        assert_eq!(records[0].transaction_id.as_deref(), Some("tx-1"));
        assert!(records[0].risk_approved);
    }

    #[tokio::test]
    async fn test_venue_error_marks_failed_and_keeps_portfolio() {
        let mut venue = MockExecutionVenue::new();
        venue.expect_kind().return_const(VenueKind::External);
        venue
            .expect_execute()
            .returning(|_| Err(QuorumError::Execution("venue down".into())));
        let mut o = orchestrator(Arc::new(venue));
        let now = Utc::now();
        seed_mark(&mut o, dec!(50), now);
        let before = o.portfolio.snapshot(now);

        o.process_decision(decision(TradeAction::Buy, dec!(500), now), now);
        let outcome = o.outcome_rx.recv().await.unwrap();
        o.apply_execution_outcome(outcome, now);

        assert_eq!(o.portfolio.snapshot(now), before);
        let records = o.history.all();
        assert_eq!(records[0].status, TradeStatus::Failed);
        assert!(records[0]
            .failure_reason
            .as_deref()
            .unwrap()
            .contains("venue down"));
    }

    #[tokio::test]
    async fn test_halt_rejects_buy_and_records_cancelled() {
        let mut o = orchestrator(filling_venue());
        let now = Utc::now();
        o.start_agents(now);
        seed_mark(&mut o, dec!(50), now);

        assert!(o.emergency_halt("operator", now));
        assert!(!o.emergency_halt("operator", now));
        assert!(o.agents.values().all(Agent::is_defensive));

        o.process_decision(decision(TradeAction::Buy, dec!(100), now), now);
        assert_eq!(o.in_flight_count(), 0);
        let records = o.history.all();
        assert_eq!(records[0].status, TradeStatus::Cancelled);
        assert!(!records[0].risk_approved);

        assert!(o.reset_emergency_halt(now));
        // ResumeTrading is HIGH priority, so it waits in the inbox for a tick
        for agent in o.agents.values_mut() {
            agent.tick(now);
        }
        assert!(o.agents.values().all(|a| !a.is_defensive()));
    }

    #[test]
    fn test_unknown_recipient_dropped() {
        let mut o = orchestrator(filling_venue());
        let mut events = o.events.subscribe();
        let now = Utc::now();
        let msg = Message::new(
            "a1",
            "nobody",
            Priority::Low,
            MessagePayload::Coordination(CoordinationDirective::ResumeTrading),
            now,
        );
        o.route(vec![msg], now);
        match events.try_recv().unwrap() {
            SystemEvent::MessageDropped { to, .. } => assert_eq!(to, "nobody"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_policy_for_unknown_agent_is_error() {
        let mut o = orchestrator(filling_venue());
        assert!(matches!(
            o.update_policy("ghost", PolicyLimits::default()),
            Err(QuorumError::UnknownAgent(_))
        ));
        assert!(o.update_policy("a1", PolicyLimits::default()).is_ok());
    }

    #[tokio::test]
    async fn test_huge_trade_interval_keeps_deferring() {
        let config = OrchestratorConfig {
            min_trade_interval_secs: u64::MAX,
            max_deferral_secs: u64::MAX,
            ..OrchestratorConfig::default()
        };
        let mut o = Orchestrator::new(
            config,
            CoordinatorConfig::default(),
            RiskLimits::default(),
            agent_configs(),
            filling_venue(),
        )
        .unwrap();
        let now = Utc::now();
        seed_mark(&mut o, dec!(100), now);

        o.process_decision(decision(TradeAction::Buy, dec!(100), now), now);
        let outcome = o.outcome_rx.recv().await.unwrap();
        o.apply_execution_outcome(outcome, now);

        let later = now + chrono::Duration::days(365);
        o.process_decision(decision(TradeAction::Buy, dec!(50), later), later);
        assert_eq!(o.deferred_count(), 1);

        o.release_deferred(later);
        assert_eq!(o.deferred_count(), 1);
        assert_eq!(o.in_flight_count(), 0);
    }
}
