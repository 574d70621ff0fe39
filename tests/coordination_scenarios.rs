use chrono::{Duration, Utc};
use quorum::agents::{Agent, AgentConfig, StrategyConfig};
use quorum::coordinator::{Coordinator, CoordinatorConfig};
use quorum::domain::{Contribution, Decision, MarketTick, Signal, TradeAction};
use quorum::messaging::{
    sort_batch, BreachKind, CoordinationDirective, Message, MessagePayload, MessageQueue,
    Priority, Severity,
};
use quorum::portfolio::PortfolioState;
use quorum::risk::{RejectReason, RiskAssessment, RiskGate, RiskLimits, RiskStatus};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn buy_decision(amount: Decimal) -> Decision {
    Decision {
        symbol: "BTC".into(),
        action: TradeAction::Buy,
        amount,
        confidence: 0.8,
        reasoning: "test".into(),
        contributions: vec![Contribution {
            agent_id: "a1".into(),
            weight: 0.4,
            amount,
        }],
        created_at: Utc::now(),
    }
}

#[test]
fn consensus_of_two_buyers_outvotes_one_seller() {
    let now = Utc::now();
    let mut coordinator = Coordinator::new(CoordinatorConfig::default());
    coordinator.register_agent("a1", 0.4, 0.4);
    coordinator.register_agent("a2", 0.4, 0.4);
    coordinator.register_agent("a3", 0.2, 0.2);

    let signals = [
        ("a1", TradeAction::Buy, 0.8, dec!(100)),
        ("a2", TradeAction::Buy, 0.6, dec!(50)),
        ("a3", TradeAction::Sell, 0.4, dec!(30)),
    ];
    for (agent, action, confidence, amount) in signals {
        let signal = Signal::new("BTC", action, confidence, amount, "test", "test", now);
        coordinator.ingest_signal(agent, signal).unwrap();
    }

    let decision = coordinator.aggregate("BTC", now);
    assert_eq!(decision.action, TradeAction::Buy);
    // buy score 0.56 over total weight 1.0, plus the two-agent consensus bonus
    assert!(decision.confidence > 0.5);
    assert!((decision.confidence - 0.616).abs() < 1e-9);
    assert_eq!(decision.amount, dec!(150));
    assert_eq!(decision.contributing_agents(), vec!["a1", "a2"]);

    // aggregation reads state only
    assert_eq!(coordinator.aggregate("BTC", now), decision);
}

#[test]
fn stale_and_unknown_signals_do_not_count() {
    let now = Utc::now();
    let mut coordinator = Coordinator::new(CoordinatorConfig::default());
    coordinator.register_agent("a1", 0.5, 0.5);

    let old = now - Duration::seconds(120);
    let signal = Signal::new("BTC", TradeAction::Buy, 0.9, dec!(100), "old", "test", old);
    coordinator.ingest_signal("a1", signal).unwrap();
    assert_eq!(coordinator.aggregate("BTC", now).action, TradeAction::Hold);
    assert_eq!(coordinator.prune_stale(now), 1);

    let signal = Signal::new("BTC", TradeAction::Buy, 0.9, dec!(100), "x", "test", now);
    assert!(coordinator.ingest_signal("ghost", signal).is_err());
}

#[test]
fn critical_drawdown_halts_and_rejects_pending_buy() {
    let now = Utc::now();
    let mut portfolio = PortfolioState::new(dec!(10000));
    portfolio
        .apply_fill(TradeAction::Buy, "BTC", dec!(10000), dec!(100))
        .unwrap();
    portfolio.update_mark("BTC", dec!(84));
    assert_eq!(portfolio.total_value(), dec!(8400));

    let mut gate = RiskGate::new(RiskLimits::default(), dec!(10000));
    let report = gate.evaluate_cycle(&portfolio.snapshot(now), now);

    assert!((report.metrics.current_drawdown - 0.16).abs() < 1e-9);
    assert!(report.halted_now);
    assert_eq!(gate.status(), RiskStatus::Halted);
    let critical = report
        .alerts
        .iter()
        .find_map(|m| match &m.payload {
            MessagePayload::RiskAlert(a) if a.severity == Severity::Critical => Some(a),
            _ => None,
        })
        .expect("critical alert");
    assert_eq!(critical.kind, BreachKind::Drawdown);

    let assessment = gate.assess_and_adjust(&buy_decision(dec!(100)), &portfolio.snapshot(now));
    assert!(matches!(
        assessment,
        RiskAssessment::Rejected(RejectReason::Halted { .. })
    ));

    // the coordinator scales allocations down when it sees the alert
    let mut coordinator = Coordinator::new(CoordinatorConfig::default());
    coordinator.apply_risk_alert(critical, now);
    assert!(coordinator.risk_scale(now) < 1.0);
}

#[test]
fn halt_is_monotonic_until_reset() {
    let now = Utc::now();
    let portfolio = PortfolioState::new(dec!(10000));
    let mut gate = RiskGate::new(RiskLimits::default(), dec!(10000));

    let alerts = gate.emergency_halt("operator", now);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].priority, Priority::Critical);
    assert!(gate.emergency_halt("again", now).is_empty());

    // a clean cycle does not clear the halt
    for i in 1..=3 {
        let at = now + Duration::seconds(i * 5);
        let report = gate.evaluate_cycle(&portfolio.snapshot(at), at);
        assert!(report.breaches.is_empty());
        assert!(gate.is_halted());
    }

    assert!(gate.reset_emergency_halt(portfolio.total_value(), now));
    assert!(!gate.reset_emergency_halt(portfolio.total_value(), now));
    assert!(!gate.is_halted());
}

#[tokio::test]
async fn stopped_agent_ignores_market_data() {
    let now = Utc::now();
    let config = AgentConfig::new(
        "m1",
        StrategyConfig::Momentum {
            lookback: 2,
            threshold: 0.02,
        },
        50.0,
    );
    let mut agent = Agent::new(config, dec!(10000), now).unwrap();
    assert!(agent.start(now).is_some());
    agent.stop();
    assert!(!agent.is_active());

    let before = agent.state();
    for (i, price) in [dec!(100), dec!(101), dec!(104)].into_iter().enumerate() {
        let at = now + Duration::seconds(i as i64 + 1);
        assert!(agent.on_market_data(&MarketTick::new("BTC", price, at), at).is_none());
    }
    assert!(agent.tick(now + Duration::seconds(10)).is_empty());
    assert_eq!(agent.state(), before);

    // stop is idempotent
    agent.stop();
    assert_eq!(agent.state(), before);
}

#[tokio::test]
async fn running_agent_signals_on_breakout() {
    let now = Utc::now();
    let config = AgentConfig::new(
        "m1",
        StrategyConfig::Momentum {
            lookback: 2,
            threshold: 0.02,
        },
        50.0,
    );
    let mut agent = Agent::new(config, dec!(10000), now).unwrap();
    let _ticker = agent.start(now).unwrap();

    let mut emitted = None;
    for price in [dec!(100), dec!(101), dec!(104)] {
        emitted = agent.on_market_data(&MarketTick::new("BTC", price, now), now);
    }
    let message = emitted.expect("signal on breakout");
    assert_eq!(message.to, quorum::messaging::COORDINATOR_ID);
    match message.payload {
        MessagePayload::Signal(signal) => {
            assert_eq!(signal.action, TradeAction::Buy);
            assert!(signal.amount > Decimal::ZERO);
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

#[test]
fn inbox_delivers_by_priority_then_arrival() {
    let now = Utc::now();
    let message = |tag: &str, priority| {
        Message::new(
            tag,
            "a1",
            priority,
            MessagePayload::Coordination(CoordinationDirective::ResumeTrading),
            now,
        )
    };

    let mut queue = MessageQueue::new(16);
    queue.enqueue(message("low", Priority::Low)).unwrap();
    queue.enqueue(message("med-1", Priority::Medium)).unwrap();
    queue.enqueue(message("crit", Priority::Critical)).unwrap();
    queue.enqueue(message("med-2", Priority::Medium)).unwrap();
    queue.enqueue(message("high", Priority::High)).unwrap();

    let order: Vec<String> = queue.drain().into_iter().map(|m| m.from).collect();
    assert_eq!(order, vec!["crit", "high", "med-1", "med-2", "low"]);

    let mut batch = vec![
        message("m", Priority::Medium),
        message("c", Priority::Critical),
        message("l", Priority::Low),
    ];
    sort_batch(&mut batch);
    let order: Vec<&str> = batch.iter().map(|m| m.from.as_str()).collect();
    assert_eq!(order, vec!["c", "m", "l"]);
}

#[test]
fn portfolio_value_stays_consistent_through_round_trip() {
    let now = Utc::now();
    let mut portfolio = PortfolioState::new(dec!(10000));

    portfolio
        .apply_fill(TradeAction::Buy, "BTC", dec!(1000), dec!(100))
        .unwrap();
    portfolio
        .apply_fill(TradeAction::Buy, "ETH", dec!(500), dec!(50))
        .unwrap();
    portfolio.update_mark("BTC", dec!(110));

    let snapshot = portfolio.snapshot(now);
    let positions: Decimal = snapshot.positions.values().map(|p| p.value).sum();
    assert_eq!(snapshot.total_value, snapshot.cash_balance + positions);
    assert_eq!(snapshot.total_value, dec!(10100));

    let fill = portfolio
        .apply_fill(TradeAction::Sell, "BTC", dec!(1100), dec!(110))
        .unwrap();
    assert_eq!(fill.realized_pnl, Some(dec!(100)));
    assert_eq!(portfolio.position("BTC"), Decimal::ZERO);
    assert_eq!(portfolio.cash_balance(), dec!(9600));

    // overselling is refused and leaves state untouched
    assert!(portfolio
        .apply_fill(TradeAction::Sell, "ETH", dec!(1000), dec!(50))
        .is_err());
    assert_eq!(portfolio.position("ETH"), dec!(10));
    assert_eq!(portfolio.total_value(), dec!(10100));
}
