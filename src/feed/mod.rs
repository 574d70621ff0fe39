//! Market data collaborator

pub mod synthetic;

pub use synthetic::{FeedConfig, FeedSymbol, SyntheticFeed};
