//! Campaign Harvester - concurrent listing discovery and record extraction
//!
//! Discovers item URLs from a paginated listing, then extracts a fixed
//! schema of fields from every item with a pool of document-session workers.

// Module declarations
pub mod crawling;
pub mod domain;
pub mod infrastructure;

// Re-exports for the binary and integration tests
pub use crawling::{HarvestPipeline, PipelineError};
pub use domain::{FieldSpec, FieldValue, ItemReference, Record, RecordSet};
pub use infrastructure::{AppConfig, ConfigManager};
