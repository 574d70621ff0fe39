pub mod decision;
pub mod market;
pub mod numeric;
pub mod signal;
pub mod trade;

pub use decision::*;
pub use market::*;
pub use signal::*;
pub use trade::*;
