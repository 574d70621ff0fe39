//! Risk management: portfolio metrics, limit breaches, the emergency halt
//! and per-decision checks.

pub mod alerts;
pub mod config;
pub mod gate;
pub mod metrics;
pub mod policy;

pub use alerts::AlertThrottle;
pub use config::RiskLimits;
pub use gate::{
    Breach, RejectReason, RiskAssessment, RiskCycleReport, RiskGate, RiskSnapshot, RiskStatus,
};
pub use metrics::{historical_var, herfindahl, MetricsTracker, RiskMetrics};
pub use policy::{PolicyBook, PolicyLimits};
