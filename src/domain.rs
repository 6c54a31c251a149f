//! Domain module - item references, record schema and records
//!
//! Pure data types with no I/O beyond reading the persisted URL list.
//! - Each module is its own file in the domain/ directory
//! - Public exports are defined here for convenience

use thiserror::Error;

pub mod item;
pub mod record;
pub mod schema;

pub use item::{ItemReference, load_url_list, parse_url_list, references_from_urls, render_url_list};
pub use record::{Record, RecordSet, TaskFailure, TaskFailurePolicy, TaskFailureReason, WorkerId};
pub use schema::{FieldKind, FieldSpec, FieldValue, validate_schema};

/// Validation and input errors for domain data
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid URL '{url}' (line {line:?})")]
    InvalidUrl { url: String, line: Option<usize> },

    #[error("Invalid field spec '{field}': {reason}")]
    InvalidFieldSpec { field: String, reason: String },

    #[error("Schema must contain at least one field")]
    EmptySchema,

    #[error("Failed to read {path}: {message}")]
    Io { path: String, message: String },
}
