//! In-memory document sessions for offline replay
//!
//! A [`FixtureSite`] maps URLs to pre-rendered markup. A listing URL may hold
//! several fragments; each pagination trigger reveals the next one, the same
//! way an infinite-scroll listing grows. Load failures, load delays and
//! per-worker start-up failures can be injected, and the factory keeps
//! session lifecycle counters.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::html_document::HtmlDocument;
use super::session::{DocumentQuery, DocumentSession, SessionError, SessionFactory};
use crate::domain::WorkerId;

/// One pre-rendered fragment and the URL it is served from
#[derive(Debug, Clone)]
struct FixturePage {
    url: String,
    markup: String,
}

/// Pre-rendered markup keyed by URL
#[derive(Debug, Clone, Default)]
pub struct FixtureSite {
    pages: HashMap<String, Vec<FixturePage>>,
    load_failures: HashSet<String>,
    load_delays: HashMap<String, Duration>,
    pagination_delay: Option<Duration>,
}

impl FixtureSite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-fragment document
    #[must_use]
    pub fn with_page(self, url: &str, markup: &str) -> Self {
        self.with_paged_listing(url, &[markup])
    }

    /// Listing whose fragments are revealed one per pagination trigger
    ///
    /// Every fragment is served from the listing URL itself.
    #[must_use]
    pub fn with_paged_listing<S: AsRef<str>>(self, url: &str, fragments: &[S]) -> Self {
        let pages: Vec<_> = fragments.iter().map(|markup| (url, markup.as_ref())).collect();
        self.with_listing_pages(url, &pages)
    }

    /// Listing whose pagination fragments are served from their own URLs
    ///
    /// The first entry is what loading `url` renders.
    #[must_use]
    pub fn with_listing_pages(mut self, url: &str, pages: &[(&str, &str)]) -> Self {
        self.pages.insert(
            url.to_string(),
            pages
                .iter()
                .map(|(page_url, markup)| FixturePage {
                    url: (*page_url).to_string(),
                    markup: (*markup).to_string(),
                })
                .collect(),
        );
        self
    }

    /// Loading `url` fails with a navigation error
    #[must_use]
    pub fn with_load_failure(mut self, url: &str) -> Self {
        self.load_failures.insert(url.to_string());
        self
    }

    /// Loading `url` takes `delay`
    #[must_use]
    pub fn with_load_delay(mut self, url: &str, delay: Duration) -> Self {
        self.load_delays.insert(url.to_string(), delay);
        self
    }

    /// Every pagination trigger takes `delay`
    #[must_use]
    pub const fn with_pagination_delay(mut self, delay: Duration) -> Self {
        self.pagination_delay = Some(delay);
        self
    }
}

/// Lifecycle counters shared by a factory and its sessions
#[derive(Debug, Default)]
struct FixtureCounters {
    created: AtomicUsize,
    closed: AtomicUsize,
    live: AtomicUsize,
    peak_live: AtomicUsize,
    loads: AtomicUsize,
}

/// Snapshot of [`FixtureSessionFactory`] counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixtureSessionStats {
    pub created: usize,
    pub closed: usize,
    pub live: usize,
    pub peak_live: usize,
    pub loads: usize,
}

/// Factory for [`FixtureDocumentSession`]s
#[derive(Debug, Clone)]
pub struct FixtureSessionFactory {
    site: Arc<FixtureSite>,
    failing_workers: HashSet<WorkerId>,
    startup_delay: Option<Duration>,
    counters: Arc<FixtureCounters>,
}

impl FixtureSessionFactory {
    pub fn new(site: FixtureSite) -> Self {
        Self {
            site: Arc::new(site),
            failing_workers: HashSet::new(),
            startup_delay: None,
            counters: Arc::new(FixtureCounters::default()),
        }
    }

    /// Session start-up fails for `worker_id`
    #[must_use]
    pub fn with_failing_worker(mut self, worker_id: WorkerId) -> Self {
        self.failing_workers.insert(worker_id);
        self
    }

    /// Every session start-up takes `delay`
    #[must_use]
    pub const fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn stats(&self) -> FixtureSessionStats {
        FixtureSessionStats {
            created: self.counters.created.load(Ordering::SeqCst),
            closed: self.counters.closed.load(Ordering::SeqCst),
            live: self.counters.live.load(Ordering::SeqCst),
            peak_live: self.counters.peak_live.load(Ordering::SeqCst),
            loads: self.counters.loads.load(Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl SessionFactory for FixtureSessionFactory {
    type Session = FixtureDocumentSession;

    async fn create(&self, worker_id: WorkerId) -> Result<Self::Session, SessionError> {
        if let Some(delay) = self.startup_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_workers.contains(&worker_id) {
            return Err(SessionError::Init(format!(
                "fixture engine refused to start for {worker_id}"
            )));
        }

        self.counters.created.fetch_add(1, Ordering::SeqCst);
        let live = self.counters.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak_live.fetch_max(live, Ordering::SeqCst);
        debug!(%worker_id, live, "Created fixture document session");

        Ok(FixtureDocumentSession {
            worker_id,
            site: Arc::clone(&self.site),
            counters: Arc::clone(&self.counters),
            document: HtmlDocument::default(),
            revealed: 0,
            closed: false,
        })
    }
}

/// Document session replaying a [`FixtureSite`]
#[derive(Debug)]
pub struct FixtureDocumentSession {
    worker_id: WorkerId,
    site: Arc<FixtureSite>,
    counters: Arc<FixtureCounters>,
    document: HtmlDocument,
    revealed: usize,
    closed: bool,
}

impl FixtureDocumentSession {
    const fn ensure_open(&self) -> Result<(), SessionError> {
        if self.closed {
            Err(SessionError::Closed)
        } else {
            Ok(())
        }
    }
}

impl DocumentQuery for FixtureDocumentSession {
    fn select_text(&self, selector: &str) -> Result<Option<String>, SessionError> {
        self.ensure_open()?;
        self.document.select_text(selector)
    }

    fn select_attribute(
        &self,
        selector: &str,
        attribute: &str,
    ) -> Result<Option<String>, SessionError> {
        self.ensure_open()?;
        self.document.select_attribute(selector, attribute)
    }

    fn select_all_attributes(
        &self,
        selector: &str,
        attribute: &str,
    ) -> Result<Vec<String>, SessionError> {
        self.ensure_open()?;
        self.document.select_all_attributes(selector, attribute)
    }

    fn select_all_links(
        &self,
        selector: &str,
        attribute: &str,
    ) -> Result<Vec<String>, SessionError> {
        self.ensure_open()?;
        self.document.select_all_links(selector, attribute)
    }
}

#[async_trait]
impl DocumentSession for FixtureDocumentSession {
    async fn load(&mut self, url: &str) -> Result<(), SessionError> {
        self.ensure_open()?;
        if let Some(delay) = self.site.load_delays.get(url) {
            tokio::time::sleep(*delay).await;
        }
        self.counters.loads.fetch_add(1, Ordering::SeqCst);

        if self.site.load_failures.contains(url) {
            return Err(SessionError::navigation(url, "injected load failure"));
        }
        let first = self
            .site
            .pages
            .get(url)
            .and_then(|fragments| fragments.first())
            .ok_or_else(|| SessionError::navigation(url, "no fixture for URL"))?;

        self.document = HtmlDocument::loaded(url, &first.markup);
        self.revealed = 1;
        Ok(())
    }

    async fn paginate(&mut self, trigger_selector: &str) -> Result<bool, SessionError> {
        self.ensure_open()?;
        if self.document.select_text(trigger_selector)?.is_none() {
            return Ok(false);
        }
        if let Some(delay) = self.site.pagination_delay {
            tokio::time::sleep(delay).await;
        }

        let next = self
            .document
            .url()
            .and_then(|url| self.site.pages.get(url))
            .and_then(|fragments| fragments.get(self.revealed))
            .cloned();
        if let Some(page) = next {
            self.document.append(&page.url, &page.markup);
            self.revealed += 1;
        }
        Ok(true)
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.closed = true;
        self.counters.live.fetch_sub(1, Ordering::SeqCst);
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        debug!(worker_id = %self.worker_id, "Closed fixture document session");
        Ok(())
    }
}
