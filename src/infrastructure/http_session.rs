//! HTTP-backed document session
//!
//! Loads documents with `reqwest` and queries them with `scraper`. Pagination
//! follows the `href` of the trigger element (a next-page / load-more link)
//! and appends the fetched markup, which is how a server-rendered listing
//! behaves under infinite scroll.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::html_document::HtmlDocument;
use super::session::{DocumentQuery, DocumentSession, SessionError, SessionFactory};
use crate::domain::WorkerId;

/// Configuration for HTTP sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSessionConfig {
    /// User agent string
    pub user_agent: String,

    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,

    /// Accept invalid TLS certificates (testing against local mirrors only)
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl Default for HttpSessionConfig {
    fn default() -> Self {
        use crate::infrastructure::config::defaults;
        Self {
            user_agent: defaults::USER_AGENT.to_string(),
            request_timeout_ms: defaults::LOAD_TIMEOUT_MS,
            accept_invalid_certs: false,
        }
    }
}

/// Factory producing one [`HttpDocumentSession`] per worker
#[derive(Debug, Clone, Default)]
pub struct HttpSessionFactory {
    config: HttpSessionConfig,
}

impl HttpSessionFactory {
    pub const fn new(config: HttpSessionConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SessionFactory for HttpSessionFactory {
    type Session = HttpDocumentSession;

    async fn create(&self, worker_id: WorkerId) -> Result<Self::Session, SessionError> {
        let client = Client::builder()
            .user_agent(&self.config.user_agent)
            .timeout(Duration::from_millis(self.config.request_timeout_ms))
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .danger_accept_invalid_certs(self.config.accept_invalid_certs)
            .build()
            .map_err(|e| SessionError::Init(e.to_string()))?;

        info!(%worker_id, "Created HTTP document session");
        Ok(HttpDocumentSession {
            worker_id,
            client: Some(client),
            request_timeout: Duration::from_millis(self.config.request_timeout_ms),
            document: HtmlDocument::default(),
            fetched_pages: HashSet::new(),
        })
    }
}

/// Document session that fetches markup over HTTP
#[derive(Debug)]
pub struct HttpDocumentSession {
    worker_id: WorkerId,
    client: Option<Client>,
    request_timeout: Duration,
    document: HtmlDocument,
    fetched_pages: HashSet<String>,
}

impl HttpDocumentSession {
    async fn fetch(&mut self, url: &str) -> Result<String, SessionError> {
        let client = self.client.as_ref().ok_or(SessionError::Closed)?;
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_request_error(url, &e, self.request_timeout))?;

        let response = response
            .error_for_status()
            .map_err(|e| SessionError::navigation(url, e.to_string()))?;

        response
            .text()
            .await
            .map_err(|e| classify_request_error(url, &e, self.request_timeout))
    }
}

fn classify_request_error(url: &str, error: &reqwest::Error, timeout: Duration) -> SessionError {
    if error.is_timeout() {
        SessionError::timeout(format!("GET {url}"), timeout)
    } else {
        SessionError::navigation(url, error.to_string())
    }
}

impl DocumentQuery for HttpDocumentSession {
    fn select_text(&self, selector: &str) -> Result<Option<String>, SessionError> {
        self.document.select_text(selector)
    }

    fn select_attribute(
        &self,
        selector: &str,
        attribute: &str,
    ) -> Result<Option<String>, SessionError> {
        self.document.select_attribute(selector, attribute)
    }

    fn select_all_attributes(
        &self,
        selector: &str,
        attribute: &str,
    ) -> Result<Vec<String>, SessionError> {
        self.document.select_all_attributes(selector, attribute)
    }

    fn select_all_links(
        &self,
        selector: &str,
        attribute: &str,
    ) -> Result<Vec<String>, SessionError> {
        self.document.select_all_links(selector, attribute)
    }
}

#[async_trait]
impl DocumentSession for HttpDocumentSession {
    async fn load(&mut self, url: &str) -> Result<(), SessionError> {
        debug!(worker_id = %self.worker_id, url, "Loading document");
        let markup = self.fetch(url).await?;
        self.document = HtmlDocument::loaded(url, &markup);
        self.fetched_pages.clear();
        self.fetched_pages.insert(url.to_string());
        Ok(())
    }

    async fn paginate(&mut self, trigger_selector: &str) -> Result<bool, SessionError> {
        // The most recently appended trigger points at the next page.
        let Some(next_url) = self
            .document
            .select_all_links(trigger_selector, "href")?
            .pop()
        else {
            return Ok(false);
        };

        if !self.fetched_pages.insert(next_url.clone()) {
            debug!(worker_id = %self.worker_id, next_url = %next_url, "Pagination link already followed");
            return Ok(true);
        }

        let markup = self.fetch(&next_url).await?;
        self.document.append(&next_url, &markup);
        debug!(
            worker_id = %self.worker_id,
            next_url = %next_url,
            fragments = self.document.fragment_count(),
            "Appended paginated content"
        );
        Ok(true)
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        if self.client.take().is_none() {
            return Err(SessionError::Closed);
        }
        self.document = HtmlDocument::default();
        self.fetched_pages.clear();
        info!(worker_id = %self.worker_id, "Closed HTTP document session");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_factory_creates_session() {
        let factory = HttpSessionFactory::default();
        let session = factory.create(WorkerId(0)).await;
        assert!(session.is_ok());
    }

    #[tokio::test]
    async fn test_close_is_exactly_once() {
        let factory = HttpSessionFactory::default();
        let mut session = factory.create(WorkerId(0)).await.unwrap();

        assert!(session.close().await.is_ok());
        assert_eq!(session.close().await, Err(SessionError::Closed));
        assert_eq!(session.load("https://example.com/").await, Err(SessionError::Closed));
    }

    #[tokio::test]
    async fn test_queries_before_load_report_no_document() {
        let factory = HttpSessionFactory::default();
        let mut session = factory.create(WorkerId(0)).await.unwrap();

        assert_eq!(session.select_text("h1"), Err(SessionError::NoDocument));
        assert_eq!(session.paginate("a.next").await, Err(SessionError::NoDocument));
    }
}
