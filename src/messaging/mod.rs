//! Messaging
//!
//! Typed envelopes and the priority inbox used between components. The
//! orchestrator is the only router; components never hold references to
//! each other.

pub mod message;
pub mod queue;

pub use message::{
    sort_batch, BreachKind, CoordinationDirective, Message, MessagePayload, MessageType,
    PositionUpdate, Priority, RiskAlert, Severity, BROADCAST, COORDINATOR_ID, ORCHESTRATOR_ID,
    RISK_MANAGER_ID,
};
pub use queue::{MessageQueue, QueueStats};
