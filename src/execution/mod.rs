//! Execution collaborator: the venue trait and the bundled paper venue

pub mod paper;
pub mod traits;

pub use paper::{PaperVenue, PaperVenueConfig};
pub use traits::{parse_venue_kind, ExecutionReceipt, ExecutionRequest, ExecutionVenue, VenueKind};

#[cfg(test)]
pub use traits::MockExecutionVenue;
