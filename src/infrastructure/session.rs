//! Document session capability
//!
//! A document session is one loaded, rendered page that can be queried by
//! selector. The rendering engine behind it is an external collaborator;
//! the crawler only talks to these traits.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::WorkerId;

/// Session-level failures reported by a document session implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session initialization failed: {0}")]
    Init(String),

    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Timed out after {timeout_ms}ms: {operation}")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Invalid CSS selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Element query failed for '{selector}': {message}")]
    Query { selector: String, message: String },

    #[error("No document loaded")]
    NoDocument,

    #[error("Session already closed")]
    Closed,
}

impl SessionError {
    pub fn navigation(url: &str, message: impl Into<String>) -> Self {
        Self::Navigation {
            url: url.to_string(),
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, timeout: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Read-only selector queries against the currently loaded document
pub trait DocumentQuery {
    /// Text of the first element matching `selector`
    ///
    /// `Ok(None)` when nothing matches; `Err` when the selector is invalid
    /// or the element could not be read.
    fn select_text(&self, selector: &str) -> Result<Option<String>, SessionError>;

    /// Attribute value of the first element matching `selector`
    fn select_attribute(
        &self,
        selector: &str,
        attribute: &str,
    ) -> Result<Option<String>, SessionError>;

    /// Attribute values of every element matching `selector`, in document order
    fn select_all_attributes(
        &self,
        selector: &str,
        attribute: &str,
    ) -> Result<Vec<String>, SessionError>;

    /// Like [`select_all_attributes`](Self::select_all_attributes), with each
    /// value resolved against the URL of the page it was rendered from
    ///
    /// Values that cannot be resolved are skipped. The default returns the
    /// raw values for documents that do not track page URLs.
    fn select_all_links(
        &self,
        selector: &str,
        attribute: &str,
    ) -> Result<Vec<String>, SessionError> {
        self.select_all_attributes(selector, attribute)
    }
}

/// A live rendering session, exclusively owned by one worker
#[async_trait]
pub trait DocumentSession: DocumentQuery + Send + 'static {
    /// Navigate to `url`, replacing the current document
    async fn load(&mut self, url: &str) -> Result<(), SessionError>;

    /// Trigger the listing's pagination action (scroll-to-footer or load-more)
    ///
    /// Newly rendered content is appended to the current document. Returns
    /// `false` when the trigger element is not present.
    async fn paginate(&mut self, trigger_selector: &str) -> Result<bool, SessionError>;

    /// Tear down the underlying engine resources
    async fn close(&mut self) -> Result<(), SessionError>;
}

/// Creates document sessions; creation is the expensive step
#[async_trait]
pub trait SessionFactory: Send + Sync + 'static {
    type Session: DocumentSession;

    async fn create(&self, worker_id: WorkerId) -> Result<Self::Session, SessionError>;
}
