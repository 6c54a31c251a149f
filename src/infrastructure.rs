//! Infrastructure layer for document sessions, persistence and ambient services
//!
//! This module provides the document-session capability and its two
//! implementations (HTTP and in-memory fixtures), selector queries over
//! markup, the atomic output writer, configuration and logging.

pub mod config; // Configuration file, validation and defaults
pub mod fixture_session; // In-memory sessions for offline replay and tests
pub mod html_document;
pub mod http_session;
pub mod logging; // Logging infrastructure
pub mod output_writer;
pub mod session; // Document session capability traits

// Re-export commonly used items
pub use config::{AppConfig, ConfigError, ConfigManager, HarvestConfig, LoggingConfig};
pub use fixture_session::{
    FixtureDocumentSession, FixtureSessionFactory, FixtureSessionStats, FixtureSite,
};
pub use html_document::HtmlDocument;
pub use http_session::{HttpDocumentSession, HttpSessionConfig, HttpSessionFactory};
pub use logging::{get_log_directory, init_logging, init_logging_with_config};
pub use output_writer::{OutputError, render_records, write_records, write_url_list};
pub use session::{DocumentQuery, DocumentSession, SessionError, SessionFactory};
