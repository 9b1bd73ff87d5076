pub mod executor;
pub mod file_types;
pub mod harvest;
pub mod identity;
pub mod model;
pub mod parser;
pub mod queue;
pub mod remote;
pub mod store;
pub mod traits;

// Re-export common types for convenience
pub use executor::*;
pub use harvest::{ConfigError, HarvestConfig, HarvestReport, Harvester, RunSummary};
pub use model::*;
pub use traits::*;
