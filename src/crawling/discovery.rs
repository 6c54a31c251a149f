//! # Discovery Driver
//!
//! Drives a paginated listing until enough unique item URLs have rendered.
//!
//! ```text
//! Loading -> Scanning -> Paginating -> Scanning -> ... -> Done
//! ```
//!
//! `Done` is reached when the target count is met, or when the listing stops
//! producing new URLs (`max_idle_cycles` consecutive triggers without growth,
//! a missing pagination trigger, or the `max_cycles` safety bound).

use std::collections::HashSet;
use std::time::Duration;

use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use url::Url;

use crate::domain::{DomainError, ItemReference, WorkerId};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::session::{DocumentSession, SessionError, SessionFactory};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error("Invalid listing URL '{0}'")]
    InvalidListingUrl(String),

    #[error("Discovery timed out after {timeout_ms}ms while {operation}")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Listing session failed: {0}")]
    Session(#[from] SessionError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Listing selectors and pacing
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub item_link_selector: String,
    pub link_attribute: String,
    pub pagination_selector: String,
    pub settle_interval: Duration,
    pub load_timeout: Duration,
    pub max_idle_cycles: u32,
    pub max_cycles: u32,
}

impl DiscoveryConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            item_link_selector: config.discovery.item_link_selector.clone(),
            link_attribute: config.discovery.link_attribute.clone(),
            pagination_selector: config.discovery.pagination_selector.clone(),
            settle_interval: config.harvest.settle_interval(),
            load_timeout: config.harvest.load_timeout(),
            max_idle_cycles: config.discovery.max_idle_cycles,
            max_cycles: config.discovery.max_cycles,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self::from_app_config(&AppConfig::default())
    }
}

/// How discovery reached `Done`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    CountReached,
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryReport {
    pub items: Vec<ItemReference>,
    pub outcome: DiscoveryOutcome,
    /// Pagination triggers fired
    pub cycles: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DiscoveryState {
    Loading,
    Scanning,
    Paginating,
    Done(DiscoveryOutcome),
}

/// Accumulated unique URLs in first-seen order
#[derive(Debug, Default)]
struct UrlAccumulator {
    seen: HashSet<String>,
    urls: Vec<String>,
}

impl UrlAccumulator {
    /// Add every resolvable link, returning how many were new
    fn absorb(&mut self, base: &Url, links: Vec<String>) -> usize {
        let before = self.urls.len();
        for link in links {
            let Some(url) = resolve_item_link(base, &link) else {
                debug!(link = %link, "Skipping unresolvable item link");
                continue;
            };
            if self.seen.insert(url.clone()) {
                self.urls.push(url);
            }
        }
        self.urls.len() - before
    }
}

/// Resolve a listing link to an absolute http(s) URL
///
/// Sessions that track page URLs hand over absolute links already; `base`
/// only matters for raw attribute values.
fn resolve_item_link(base: &Url, link: &str) -> Option<String> {
    let link = link.trim();
    if link.is_empty() {
        return None;
    }
    let url = base.join(link).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

fn timeout_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

pub struct DiscoveryDriver {
    config: DiscoveryConfig,
}

impl DiscoveryDriver {
    pub const fn new(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    pub const fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Discover up to `target_count` item references from `listing_url`
    pub async fn discover<S: DocumentSession + ?Sized>(
        &self,
        session: &mut S,
        listing_url: &str,
        target_count: usize,
    ) -> Result<Vec<ItemReference>, DiscoveryError> {
        Ok(self.run(session, listing_url, target_count).await?.items)
    }

    /// Start a dedicated session from `factory`, discover, and close the session
    ///
    /// The session is closed on every exit path, including failures.
    pub async fn discover_with<F: SessionFactory>(
        &self,
        factory: &F,
        listing_url: &str,
        target_count: usize,
    ) -> Result<DiscoveryReport, DiscoveryError> {
        let mut session = factory.create(WorkerId::DISCOVERY).await?;
        let result = self.run(&mut session, listing_url, target_count).await;
        if let Err(e) = session.close().await {
            warn!(error = %e, "Failed to close discovery session");
        }
        result
    }

    /// Run the discovery state machine on an open session
    pub async fn run<S: DocumentSession + ?Sized>(
        &self,
        session: &mut S,
        listing_url: &str,
        target_count: usize,
    ) -> Result<DiscoveryReport, DiscoveryError> {
        let base = Url::parse(listing_url)
            .map_err(|_| DiscoveryError::InvalidListingUrl(listing_url.to_string()))?;

        let mut accumulator = UrlAccumulator::default();
        let mut cycles = 0u32;
        let mut idle_cycles = 0u32;
        let mut state = DiscoveryState::Loading;

        info!(listing_url, target_count, "Starting discovery");

        let outcome = loop {
            state = match state {
                DiscoveryState::Loading => {
                    timeout(self.config.load_timeout, session.load(listing_url))
                        .await
                        .map_err(|_| DiscoveryError::Timeout {
                            operation: format!("loading {listing_url}"),
                            timeout_ms: timeout_ms(self.config.load_timeout),
                        })??;
                    DiscoveryState::Scanning
                }
                DiscoveryState::Scanning => {
                    let links = session.select_all_links(
                        &self.config.item_link_selector,
                        &self.config.link_attribute,
                    )?;
                    let added = accumulator.absorb(&base, links);
                    if cycles > 0 {
                        idle_cycles = if added == 0 { idle_cycles + 1 } else { 0 };
                    }
                    debug!(cycles, added, total = accumulator.urls.len(), idle_cycles, "Scanned listing");

                    if accumulator.urls.len() >= target_count {
                        DiscoveryState::Done(DiscoveryOutcome::CountReached)
                    } else if idle_cycles >= self.config.max_idle_cycles {
                        info!(idle_cycles, "Listing stopped producing new items");
                        DiscoveryState::Done(DiscoveryOutcome::Exhausted)
                    } else if cycles >= self.config.max_cycles {
                        warn!(cycles, "Pagination cycle limit reached");
                        DiscoveryState::Done(DiscoveryOutcome::Exhausted)
                    } else {
                        DiscoveryState::Paginating
                    }
                }
                DiscoveryState::Paginating => {
                    cycles += 1;
                    let triggered = timeout(
                        self.config.load_timeout,
                        session.paginate(&self.config.pagination_selector),
                    )
                    .await
                    .map_err(|_| DiscoveryError::Timeout {
                        operation: format!("pagination cycle {cycles}"),
                        timeout_ms: timeout_ms(self.config.load_timeout),
                    })??;

                    if triggered {
                        tokio::time::sleep(self.config.settle_interval).await;
                        DiscoveryState::Scanning
                    } else {
                        info!(cycles, "Pagination trigger not found");
                        DiscoveryState::Done(DiscoveryOutcome::Exhausted)
                    }
                }
                DiscoveryState::Done(outcome) => break outcome,
            };
        };

        let mut urls = accumulator.urls;
        urls.truncate(target_count);
        let items = urls
            .iter()
            .enumerate()
            .map(|(index, url)| ItemReference::new(index, url))
            .collect::<Result<Vec<_>, _>>()?;

        info!(items = items.len(), cycles, ?outcome, "Discovery finished");
        Ok(DiscoveryReport {
            items,
            outcome,
            cycles,
        })
    }
}

impl Default for DiscoveryDriver {
    fn default() -> Self {
        Self::new(DiscoveryConfig::default())
    }
}
