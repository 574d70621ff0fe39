//! Risk Gate - metrics cycle, decision checks and the emergency halt
//!
//! State machine: NORMAL -> (critical breach or operator) -> HALTED ->
//! (explicit reset only) -> NORMAL. While HALTED every BUY is rejected;
//! SELLs still pass so positions can be reduced.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::alerts::AlertThrottle;
use super::config::RiskLimits;
use super::metrics::{MetricsTracker, RiskMetrics};
use super::policy::{PolicyBook, PolicyLimits};
use crate::domain::numeric::scale;
use crate::domain::{Decision, TradeAction};
use crate::messaging::{
    BreachKind, Message, MessagePayload, RiskAlert, Severity, BROADCAST, RISK_MANAGER_ID,
};
use crate::portfolio::PortfolioSnapshot;

const AMOUNT_DP: u32 = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskStatus {
    #[default]
    Normal,
    Halted,
}

/// One limit breach found during a cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breach {
    pub kind: BreachKind,
    pub severity: Severity,
    pub value: f64,
    pub limit: f64,
}

impl std::fmt::Display for Breach {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {:.4} over limit {:.4}",
            self.kind.as_str(),
            self.value,
            self.limit
        )
    }
}

#[derive(Debug, Clone)]
pub struct RiskCycleReport {
    pub metrics: RiskMetrics,
    pub breaches: Vec<Breach>,
    /// Alerts to route (already rate limited)
    pub alerts: Vec<Message>,
    /// True if this cycle moved the gate to HALTED
    pub halted_now: bool,
    pub policies_applied: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RejectReason {
    Halted { reason: String },
    DrawdownLimit { current: f64, limit: f64 },
    DailyLossLimit { current: f64, limit: f64 },
    PolicyDisabled { agent: String },
    PolicyConfidence { agent: String, required: f64, actual: f64 },
    NoPosition { symbol: String },
    NoCapacity { reason: String },
    NoAction,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::Halted { reason } => write!(f, "trading halted: {reason}"),
            RejectReason::DrawdownLimit { current, limit } => {
                write!(f, "drawdown {current:.4} over limit {limit:.4}")
            }
            RejectReason::DailyLossLimit { current, limit } => {
                write!(f, "daily loss {current:.4} over limit {limit:.4}")
            }
            RejectReason::PolicyDisabled { agent } => {
                write!(f, "policy disables trading for {agent}")
            }
            RejectReason::PolicyConfidence {
                agent,
                required,
                actual,
            } => write!(
                f,
                "policy for {agent} requires confidence {required:.2}, got {actual:.2}"
            ),
            RejectReason::NoPosition { symbol } => write!(f, "no {symbol} position to sell"),
            RejectReason::NoCapacity { reason } => write!(f, "no capacity: {reason}"),
            RejectReason::NoAction => write!(f, "HOLD is not tradable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RiskAssessment {
    Approved(Decision),
    Adjusted {
        decision: Decision,
        reasons: Vec<String>,
    },
    Rejected(RejectReason),
}

impl RiskAssessment {
    pub fn is_rejected(&self) -> bool {
        matches!(self, RiskAssessment::Rejected(_))
    }

    /// Decision to execute, if any
    pub fn decision(&self) -> Option<&Decision> {
        match self {
            RiskAssessment::Approved(d) => Some(d),
            RiskAssessment::Adjusted { decision, .. } => Some(decision),
            RiskAssessment::Rejected(_) => None,
        }
    }
}

/// Read-only gate view for operators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskSnapshot {
    pub status: RiskStatus,
    pub halt_reason: Option<String>,
    pub halted_at: Option<DateTime<Utc>>,
    pub sizing_factor: f64,
    pub metrics: Option<RiskMetrics>,
    pub limits: RiskLimits,
}

pub struct RiskGate {
    limits: RiskLimits,
    status: RiskStatus,
    halt_reason: Option<String>,
    halted_at: Option<DateTime<Utc>>,
    tracker: MetricsTracker,
    latest: Option<RiskMetrics>,
    throttle: AlertThrottle,
    policies: PolicyBook,
    /// Down-sizing applied to BUYs after HIGH/MEDIUM breaches
    sizing_factor: f64,
}

impl RiskGate {
    pub fn new(limits: RiskLimits, initial_value: Decimal) -> Self {
        Self {
            tracker: MetricsTracker::new(initial_value, limits.value_history, limits.var_confidence),
            throttle: AlertThrottle::new(limits.alert_cooldown_secs),
            limits,
            status: RiskStatus::Normal,
            halt_reason: None,
            halted_at: None,
            latest: None,
            policies: PolicyBook::default(),
            sizing_factor: 1.0,
        }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    pub fn status(&self) -> RiskStatus {
        self.status
    }

    pub fn is_halted(&self) -> bool {
        self.status == RiskStatus::Halted
    }

    pub fn sizing_factor(&self) -> f64 {
        self.sizing_factor
    }

    pub fn stage_policy(&mut self, agent_id: &str, limits: PolicyLimits) {
        debug!(agent = agent_id, "policy update staged");
        self.policies.stage(agent_id, limits);
    }

    pub fn policy(&self, agent_id: &str) -> Option<&PolicyLimits> {
        self.policies.get(agent_id)
    }

    /// One risk cycle: apply staged policies, recompute metrics, classify
    /// breaches, halt on CRITICAL, emit rate-limited alerts.
    pub fn evaluate_cycle(
        &mut self,
        snapshot: &PortfolioSnapshot,
        now: DateTime<Utc>,
    ) -> RiskCycleReport {
        let policies_applied = self.policies.apply_staged();
        let metrics = self.tracker.compute(snapshot, now);
        let breaches = self.classify(&metrics);

        self.sizing_factor = breaches
            .iter()
            .filter(|b| b.severity != Severity::Critical)
            .map(|b| match b.severity {
                Severity::High => 0.5,
                _ => 0.75,
            })
            .fold(1.0, f64::min);

        let mut alerts = Vec::new();
        let mut halted_now = false;
        for breach in &breaches {
            if breach.severity == Severity::Critical {
                if !self.is_halted() {
                    alerts.extend(self.halt(breach.kind, breach.to_string(), Some(&metrics), now));
                    halted_now = true;
                }
                continue;
            }
            if !self.throttle.allow(breach.kind, now) {
                continue;
            }
            warn!(
                kind = breach.kind.as_str(),
                severity = %breach.severity,
                value = breach.value,
                limit = breach.limit,
                "risk limit breached"
            );
            alerts.push(alert_message(
                breach.severity,
                breach.kind,
                breach.to_string(),
                Some(&metrics),
                now,
            ));
        }

        debug!(
            drawdown = metrics.current_drawdown,
            daily_pnl = %metrics.daily_pnl,
            volatility = metrics.portfolio_volatility,
            var = metrics.value_at_risk,
            concentration = metrics.concentration_risk,
            leverage = metrics.leverage,
            breaches = breaches.len(),
            "risk cycle complete"
        );
        self.latest = Some(metrics.clone());

        RiskCycleReport {
            metrics,
            breaches,
            alerts,
            halted_now,
            policies_applied,
        }
    }

    fn classify(&self, m: &RiskMetrics) -> Vec<Breach> {
        let l = &self.limits;
        let mut breaches = Vec::new();

        if m.current_drawdown > l.max_drawdown {
            breaches.push(Breach {
                kind: BreachKind::Drawdown,
                severity: Severity::Critical,
                value: m.current_drawdown,
                limit: l.max_drawdown,
            });
        } else if m.current_drawdown > l.max_drawdown * l.drawdown_warning_ratio {
            breaches.push(Breach {
                kind: BreachKind::DrawdownWarning,
                severity: Severity::Medium,
                value: m.current_drawdown,
                limit: l.max_drawdown * l.drawdown_warning_ratio,
            });
        }
        if -m.daily_pnl_pct > l.max_daily_loss_pct {
            breaches.push(Breach {
                kind: BreachKind::DailyLoss,
                severity: Severity::High,
                value: -m.daily_pnl_pct,
                limit: l.max_daily_loss_pct,
            });
        }
        if m.leverage > l.max_leverage {
            breaches.push(Breach {
                kind: BreachKind::Leverage,
                severity: Severity::High,
                value: m.leverage,
                limit: l.max_leverage,
            });
        }
        if m.concentration_risk > l.max_concentration {
            breaches.push(Breach {
                kind: BreachKind::Concentration,
                severity: Severity::Medium,
                value: m.concentration_risk,
                limit: l.max_concentration,
            });
        }
        breaches
    }

    /// Operator or critical-breach halt. Idempotent: a second call while
    /// halted returns no messages.
    pub fn emergency_halt(&mut self, reason: &str, now: DateTime<Utc>) -> Vec<Message> {
        if self.is_halted() {
            debug!(reason, "emergency halt ignored: already halted");
            return Vec::new();
        }
        let metrics = self.latest.clone();
        self.halt(BreachKind::EmergencyHalt, reason.to_string(), metrics.as_ref(), now)
    }

    fn halt(
        &mut self,
        kind: BreachKind,
        reason: String,
        metrics: Option<&RiskMetrics>,
        now: DateTime<Utc>,
    ) -> Vec<Message> {
        self.status = RiskStatus::Halted;
        self.halt_reason = Some(reason.clone());
        self.halted_at = Some(now);
        error!(kind = kind.as_str(), %reason, "EMERGENCY HALT: BUY decisions blocked until reset");
        vec![alert_message(Severity::Critical, kind, reason, metrics, now)]
    }

    /// Clear a halt. The high-water mark is re-based to `current_value` so
    /// the drawdown that caused the halt does not trip it again at once.
    pub fn reset_emergency_halt(&mut self, current_value: Decimal, now: DateTime<Utc>) -> bool {
        if !self.is_halted() {
            debug!("reset ignored: not halted");
            return false;
        }
        let halted_for = self
            .halted_at
            .map(|t| now.signed_duration_since(t).num_seconds())
            .unwrap_or(0);
        info!(
            reason = ?self.halt_reason,
            halted_for_secs = halted_for,
            new_high_water_mark = %current_value,
            "emergency halt reset"
        );
        self.status = RiskStatus::Normal;
        self.halt_reason = None;
        self.halted_at = None;
        self.tracker.rebase(current_value);
        self.throttle.clear();
        true
    }

    /// Validate and, if needed, down-size a proposed decision against the
    /// current portfolio.
    pub fn assess_and_adjust(
        &self,
        decision: &Decision,
        portfolio: &PortfolioSnapshot,
    ) -> RiskAssessment {
        match decision.action {
            TradeAction::Hold => RiskAssessment::Rejected(RejectReason::NoAction),
            TradeAction::Sell => self.assess_sell(decision, portfolio),
            TradeAction::Buy => self.assess_buy(decision, portfolio),
        }
    }

    pub fn validate_decision(&self, decision: &Decision, portfolio: &PortfolioSnapshot) -> bool {
        !self.assess_and_adjust(decision, portfolio).is_rejected()
    }

    fn assess_sell(&self, decision: &Decision, portfolio: &PortfolioSnapshot) -> RiskAssessment {
        let held_value = portfolio.position_value(&decision.symbol);
        if portfolio.position(&decision.symbol) <= Decimal::ZERO || held_value <= Decimal::ZERO {
            return RiskAssessment::Rejected(RejectReason::NoPosition {
                symbol: decision.symbol.clone(),
            });
        }
        if decision.amount > held_value {
            return RiskAssessment::Adjusted {
                decision: decision.clone().with_amount(held_value),
                reasons: vec![format!(
                    "sell capped at position value {}",
                    held_value.round_dp(2)
                )],
            };
        }
        RiskAssessment::Approved(decision.clone())
    }

    fn assess_buy(&self, decision: &Decision, portfolio: &PortfolioSnapshot) -> RiskAssessment {
        if self.is_halted() {
            return RiskAssessment::Rejected(RejectReason::Halted {
                reason: self.halt_reason.clone().unwrap_or_default(),
            });
        }
        if let Some(m) = &self.latest {
            if m.current_drawdown > self.limits.max_drawdown {
                return RiskAssessment::Rejected(RejectReason::DrawdownLimit {
                    current: m.current_drawdown,
                    limit: self.limits.max_drawdown,
                });
            }
            if -m.daily_pnl_pct > self.limits.max_daily_loss_pct {
                return RiskAssessment::Rejected(RejectReason::DailyLossLimit {
                    current: -m.daily_pnl_pct,
                    limit: self.limits.max_daily_loss_pct,
                });
            }
        }

        for c in &decision.contributions {
            if let Some(policy) = self.policies.get(&c.agent_id) {
                if !policy.trading_enabled {
                    return RiskAssessment::Rejected(RejectReason::PolicyDisabled {
                        agent: c.agent_id.clone(),
                    });
                }
                if decision.confidence < policy.min_approval_confidence {
                    return RiskAssessment::Rejected(RejectReason::PolicyConfidence {
                        agent: c.agent_id.clone(),
                        required: policy.min_approval_confidence,
                        actual: decision.confidence,
                    });
                }
            }
        }

        let mut amount = decision.amount;
        let mut reasons = Vec::new();
        let mut cap = |limit: Decimal, label: &str, amount: &mut Decimal| {
            let limit = limit.max(Decimal::ZERO);
            if *amount > limit {
                *amount = limit;
                reasons.push(format!("{label} cap {}", limit.round_dp(2)));
            }
        };

        if let Some(policy_cap) = self.policy_cap(decision) {
            cap(policy_cap, "policy notional", &mut amount);
        }

        let total = portfolio.total_value;
        let position_limit = scale(total, self.limits.max_position_size_pct)
            - portfolio.position_value(&decision.symbol);
        cap(position_limit, "position size", &mut amount);

        let leverage_room = scale(total, self.limits.max_leverage) - portfolio.gross_exposure;
        cap(leverage_room, "leverage", &mut amount);

        cap(portfolio.cash_balance, "cash", &mut amount);

        if self.sizing_factor < 1.0 {
            amount = scale(amount, self.sizing_factor);
            reasons.push(format!("risk sizing x{:.2}", self.sizing_factor));
        }
        let amount = amount.round_dp(AMOUNT_DP);

        if amount <= Decimal::ZERO {
            return RiskAssessment::Rejected(RejectReason::NoCapacity {
                reason: if reasons.is_empty() {
                    "zero amount".to_string()
                } else {
                    reasons.join(", ")
                },
            });
        }
        if reasons.is_empty() {
            return RiskAssessment::Approved(decision.clone());
        }
        RiskAssessment::Adjusted {
            decision: decision.clone().with_amount(amount),
            reasons,
        }
    }

    /// Sum of per-agent policy caps, scaled to the decision amount. None if
    /// no contributor has a notional cap.
    fn policy_cap(&self, decision: &Decision) -> Option<Decimal> {
        let requested: Decimal = decision.contributions.iter().map(|c| c.amount).sum();
        if requested <= Decimal::ZERO {
            return None;
        }
        let mut any = false;
        let allowed: Decimal = decision
            .contributions
            .iter()
            .map(|c| {
                match self
                    .policies
                    .get(&c.agent_id)
                    .and_then(|p| p.max_trade_notional)
                {
                    Some(limit) => {
                        any = true;
                        c.amount.min(limit)
                    }
                    None => c.amount,
                }
            })
            .sum();
        any.then(|| allowed * decision.amount / requested)
    }

    pub fn snapshot(&self) -> RiskSnapshot {
        RiskSnapshot {
            status: self.status,
            halt_reason: self.halt_reason.clone(),
            halted_at: self.halted_at,
            sizing_factor: self.sizing_factor,
            metrics: self.latest.clone(),
            limits: self.limits.clone(),
        }
    }
}

fn alert_message(
    severity: Severity,
    kind: BreachKind,
    message: String,
    metrics: Option<&RiskMetrics>,
    now: DateTime<Utc>,
) -> Message {
    Message::new(
        RISK_MANAGER_ID,
        BROADCAST,
        severity.priority(),
        MessagePayload::RiskAlert(RiskAlert {
            severity,
            kind,
            message,
            metrics: metrics.cloned(),
        }),
        now,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Contribution;
    use crate::messaging::Priority;
    use crate::portfolio::PortfolioState;
    use rust_decimal_macros::dec;

    fn buy(amount: Decimal) -> Decision {
        Decision {
            symbol: "BTC".into(),
            action: TradeAction::Buy,
            amount,
            confidence: 0.7,
            reasoning: String::new(),
            contributions: vec![Contribution {
                agent_id: "a1".into(),
                weight: 0.3,
                amount,
            }],
            created_at: Utc::now(),
        }
    }

    fn sell(amount: Decimal) -> Decision {
        Decision {
            action: TradeAction::Sell,
            ..buy(amount)
        }
    }

    /// 10k start, 2k of BTC bought at 100 then marked down to 20 -> 0.16 drawdown
    fn drawn_down() -> PortfolioState {
        let mut p = PortfolioState::new(dec!(10000));
        p.apply_fill(TradeAction::Buy, "BTC", dec!(2000), dec!(100))
            .unwrap();
        p.update_mark("BTC", dec!(20));
        p
    }

    #[test]
    fn test_critical_drawdown_halts_and_blocks_buys() {
        let now = Utc::now();
        let p = drawn_down();
        let mut gate = RiskGate::new(RiskLimits::default(), dec!(10000));

        let report = gate.evaluate_cycle(&p.snapshot(now), now);
        assert!(report.halted_now);
        assert!(gate.is_halted());
        let critical: Vec<_> = report
            .alerts
            .iter()
            .filter(|m| m.priority == Priority::Critical)
            .collect();
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].to, BROADCAST);

        let assessment = gate.assess_and_adjust(&buy(dec!(10)), &p.snapshot(now));
        assert!(matches!(
            assessment,
            RiskAssessment::Rejected(RejectReason::Halted { .. })
        ));

        // selling is still allowed while halted
        assert!(gate.validate_decision(&sell(dec!(100)), &p.snapshot(now)));

        // a second cycle does not re-broadcast the halt
        let again = gate.evaluate_cycle(&p.snapshot(now), now);
        assert!(!again.halted_now);
        assert!(again
            .alerts
            .iter()
            .all(|m| m.priority != Priority::Critical));
    }

    #[test]
    fn test_halt_holds_until_reset() {
        let now = Utc::now();
        let p = PortfolioState::new(dec!(10000));
        let mut gate = RiskGate::new(RiskLimits::default(), dec!(10000));
        assert_eq!(gate.status(), RiskStatus::default());

        assert_eq!(gate.emergency_halt("operator", now).len(), 1);
        assert!(gate.emergency_halt("operator again", now).is_empty());

        for _ in 0..3 {
            gate.evaluate_cycle(&p.snapshot(now), now);
            assert!(!gate.validate_decision(&buy(dec!(10)), &p.snapshot(now)));
        }

        assert!(gate.reset_emergency_halt(dec!(10000), now));
        assert!(!gate.reset_emergency_halt(dec!(10000), now));
        assert!(gate.validate_decision(&buy(dec!(10)), &p.snapshot(now)));
    }

    #[test]
    fn test_reset_rebases_high_water_mark() {
        let now = Utc::now();
        let p = drawn_down();
        let mut gate = RiskGate::new(RiskLimits::default(), dec!(10000));
        gate.evaluate_cycle(&p.snapshot(now), now);
        assert!(gate.is_halted());

        gate.reset_emergency_halt(p.total_value(), now);
        let report = gate.evaluate_cycle(&p.snapshot(now), now);
        assert!(!report.halted_now);
        assert!(!gate.is_halted());
        assert!(report.metrics.current_drawdown.abs() < 1e-12);
    }

    #[test]
    fn test_buy_capped_by_position_size() {
        let now = Utc::now();
        let p = PortfolioState::new(dec!(1000));
        let gate = RiskGate::new(RiskLimits::default(), dec!(1000));
        match gate.assess_and_adjust(&buy(dec!(400)), &p.snapshot(now)) {
            RiskAssessment::Adjusted { decision, reasons } => {
                assert_eq!(decision.amount, dec!(250));
                assert!(reasons[0].contains("position size"));
            }
            other => panic!("expected adjustment, got {other:?}"),
        }
    }

    #[test]
    fn test_sell_without_position_rejected_and_capped_otherwise() {
        let now = Utc::now();
        let mut p = PortfolioState::new(dec!(1000));
        let gate = RiskGate::new(RiskLimits::default(), dec!(1000));
        assert!(matches!(
            gate.assess_and_adjust(&sell(dec!(10)), &p.snapshot(now)),
            RiskAssessment::Rejected(RejectReason::NoPosition { .. })
        ));

        p.apply_fill(TradeAction::Buy, "BTC", dec!(100), dec!(10))
            .unwrap();
        match gate.assess_and_adjust(&sell(dec!(500)), &p.snapshot(now)) {
            RiskAssessment::Adjusted { decision, .. } => assert_eq!(decision.amount, dec!(100)),
            other => panic!("expected adjustment, got {other:?}"),
        }
    }

    #[test]
    fn test_policy_applies_on_next_cycle() {
        let now = Utc::now();
        let p = PortfolioState::new(dec!(10000));
        let mut gate = RiskGate::new(RiskLimits::default(), dec!(10000));
        gate.stage_policy(
            "a1",
            PolicyLimits {
                trading_enabled: false,
                ..PolicyLimits::default()
            },
        );
        assert!(gate.validate_decision(&buy(dec!(10)), &p.snapshot(now)));

        let report = gate.evaluate_cycle(&p.snapshot(now), now);
        assert_eq!(report.policies_applied, 1);
        assert!(matches!(
            gate.assess_and_adjust(&buy(dec!(10)), &p.snapshot(now)),
            RiskAssessment::Rejected(RejectReason::PolicyDisabled { .. })
        ));
    }

    #[test]
    fn test_policy_notional_cap() {
        let now = Utc::now();
        let p = PortfolioState::new(dec!(10000));
        let mut gate = RiskGate::new(RiskLimits::default(), dec!(10000));
        gate.stage_policy(
            "a1",
            PolicyLimits {
                max_trade_notional: Some(dec!(40)),
                ..PolicyLimits::default()
            },
        );
        gate.evaluate_cycle(&p.snapshot(now), now);
        let adjusted = gate.assess_and_adjust(&buy(dec!(100)), &p.snapshot(now));
        assert_eq!(adjusted.decision().unwrap().amount, dec!(40));
    }

    #[test]
    fn test_daily_loss_alert_is_rate_limited_and_downsizes() {
        let now = Utc::now();
        let limits = RiskLimits {
            max_daily_loss_pct: 0.01,
            max_concentration: 1.0,
            ..RiskLimits::default()
        };
        let mut gate = RiskGate::new(limits, dec!(10000));
        let mut p = PortfolioState::new(dec!(10000));
        gate.evaluate_cycle(&p.snapshot(now), now);

        p.apply_fill(TradeAction::Buy, "BTC", dec!(1000), dec!(100))
            .unwrap();
        p.update_mark("BTC", dec!(80));
        // value 9800: -2% on the day, 2% drawdown
        let first = gate.evaluate_cycle(&p.snapshot(now), now);
        assert_eq!(first.alerts.len(), 1);
        assert_eq!(gate.sizing_factor(), 0.5);

        let second = gate.evaluate_cycle(&p.snapshot(now), now + chrono::Duration::seconds(10));
        assert!(second.alerts.is_empty());
        assert_eq!(second.breaches.len(), 1);

        assert!(matches!(
            gate.assess_and_adjust(&buy(dec!(10)), &p.snapshot(now)),
            RiskAssessment::Rejected(RejectReason::DailyLossLimit { .. })
        ));
    }
}
