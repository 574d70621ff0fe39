//! Orchestrator
//!
//! Owns the agents, the coordinator, the risk gate, the portfolio and the
//! trade history inside one event loop. Operators and the data feed reach it
//! through a cloneable `OrchestratorHandle`.

pub mod command;
pub mod config;
pub mod events;
pub mod handle;
#[allow(clippy::module_inception)]
pub mod orchestrator;

pub use command::OrchestratorCommand;
pub use config::OrchestratorConfig;
pub use events::{SystemEvent, SystemHealth};
pub use handle::OrchestratorHandle;
pub use orchestrator::Orchestrator;
