//! Signal Coordinator
//!
//! Collects agent signals, tracks a per-symbol market regime and per-agent
//! acceptance history, and turns fresh signals into one weighted decision.
//! Also issues advisory rebalance directives when executed flow drifts away
//! from the configured allocations.

pub mod aggregator;
pub mod allocation;
pub mod config;
pub mod performance;
pub mod regime;

pub use aggregator::{Coordinator, CoordinatorSnapshot};
pub use allocation::{AllocationDrift, AllocationTracker};
pub use config::CoordinatorConfig;
pub use performance::PerformanceTracker;
pub use regime::{MarketRegime, RegimeDetector, Trend, Volatility};
