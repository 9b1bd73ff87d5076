//! Harvest module - orchestration of a metadata harvesting run.
//!
//! This module provides:
//! - **Config**: [`HarvestConfig`] and the fatal [`ConfigError`]
//! - **Registry**: static mapping from file type to [`MetadataExtractor`](crate::traits::MetadataExtractor)s
//! - **Formats**: the built-in image and PDF extractors
//! - **Pipeline**: the [`Harvester`] orchestrator
//! - **Report**: aggregation into [`HarvestReport`]

pub mod config;
pub mod formats;
pub mod pipeline;
pub mod registry;
pub mod report;

// Re-export commonly used types
pub use config::{ConfigError, HarvestConfig};
pub use formats::{ImageExtractor, PdfExtractor};
pub use pipeline::{HarvestStats, Harvester, PipelineError, RunSummary, StagingDir};
pub use registry::{DispatchError, DispatchPolicy, ExtractorRegistry};
pub use report::HarvestReport;
