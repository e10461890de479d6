//! Configuration for harvest runs.

pub mod builder;
pub mod getters;
pub mod types;

pub use builder::{HarvestConfigBuilder, WithOutput};
pub use types::HarvestConfig;
