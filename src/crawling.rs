//! # Harvest Pipeline
//!
//! Discovery -> URL list -> dispatcher fan-out -> ordered record set -> artifact.
//!
//! - Explicit module layout (no mod.rs)
//! - The document-session engine is injected through [`SessionFactory`]

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

pub mod discovery;
pub mod dispatcher;
pub mod field_extractor;
pub mod record_assembler;
pub mod session_pool;
pub mod tasks;

pub use discovery::{DiscoveryConfig, DiscoveryDriver, DiscoveryError, DiscoveryOutcome, DiscoveryReport};
pub use dispatcher::{DispatchConfig, DispatchError, DispatchReport, WorkDispatcher};
pub use field_extractor::{FieldMiss, extract, try_extract};
pub use record_assembler::{DocumentLoadError, RecordAssembler};
pub use session_pool::{SessionHandle, SessionInitError, SessionPool, SessionPoolStats};
pub use tasks::{WorkEntry, WorkerExit, WorkerReport, WorkerSummary};

use crate::domain::{DomainError, ItemReference, RecordSet, load_url_list};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::output_writer::{OutputError, write_records, write_url_list};
use crate::infrastructure::session::SessionFactory;

/// Run-level failures
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Extraction failed: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Invalid URL list: {0}")]
    Input(#[from] DomainError),

    #[error(transparent)]
    Output(#[from] OutputError),

    #[error("File task aborted: {0}")]
    FileTask(#[from] tokio::task::JoinError),
}

/// Run blocking file work on the blocking thread pool
async fn run_blocking<T, E>(
    task: impl FnOnce() -> Result<T, E> + Send + 'static,
) -> Result<T, PipelineError>
where
    T: Send + 'static,
    E: Send + 'static,
    PipelineError: From<E>,
{
    Ok(tokio::task::spawn_blocking(task).await??)
}

/// Wires configuration, a session factory and the crawling stages together
pub struct HarvestPipeline<F: SessionFactory> {
    factory: Arc<F>,
    config: AppConfig,
}

impl<F: SessionFactory> HarvestPipeline<F> {
    pub const fn new(factory: Arc<F>, config: AppConfig) -> Self {
        Self { factory, config }
    }

    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Discover item URLs and persist them to the configured URL list
    pub async fn discover(&self) -> Result<DiscoveryReport, PipelineError> {
        let harvest = &self.config.harvest;
        let driver = DiscoveryDriver::new(DiscoveryConfig::from_app_config(&self.config));
        let report = driver
            .discover_with(self.factory.as_ref(), &harvest.listing_url, harvest.target_count)
            .await?;

        if report.outcome == DiscoveryOutcome::Exhausted {
            info!(
                found = report.items.len(),
                target = harvest.target_count,
                "Listing exhausted before target count"
            );
        }
        let path = harvest.url_list_path.clone();
        run_blocking(move || write_url_list(&report.items, &path).map(|()| report)).await
    }

    /// Extract records for `items` and write the artifact
    pub async fn extract(&self, items: Vec<ItemReference>) -> Result<RecordSet, PipelineError> {
        let harvest = &self.config.harvest;
        let assembler = RecordAssembler::new(self.config.schema.clone(), harvest.load_timeout());
        let dispatcher = WorkDispatcher::new(
            Arc::clone(&self.factory),
            assembler,
            DispatchConfig {
                queue_capacity: harvest.queue_capacity,
                failure_policy: harvest.failure_policy,
            },
        );

        let records = dispatcher.run(items, harvest.worker_count).await?;
        let path = harvest.output_path.clone();
        run_blocking(move || write_records(&records, &path).map(|()| records)).await
    }

    /// Extract records for the URL list stored at `path`
    pub async fn extract_from_file(&self, path: &Path) -> Result<RecordSet, PipelineError> {
        let owned = path.to_path_buf();
        let items = run_blocking(move || load_url_list(&owned)).await?;
        info!(path = %path.display(), urls = items.len(), "Loaded URL list");
        self.extract(items).await
    }

    /// Discover, then extract everything discovered
    pub async fn run(&self) -> Result<RecordSet, PipelineError> {
        let report = self.discover().await?;
        self.extract(report.items).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FieldSpec;
    use crate::infrastructure::fixture_session::{FixtureSessionFactory, FixtureSite};

    const LISTING: &str = "https://example.com/explore";

    fn config(dir: &Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.harvest.listing_url = LISTING.to_string();
        config.harvest.target_count = 3;
        config.harvest.worker_count = 2;
        config.harvest.settle_interval_ms = 1;
        config.harvest.url_list_path = dir.join("project_urls.txt");
        config.harvest.output_path = dir.join("output/data.json");
        config.discovery.item_link_selector = "a.card".to_string();
        config.discovery.pagination_selector = "div.footer".to_string();
        config.schema = vec![FieldSpec::text("Title", "h1", "Unknown")];
        config
    }

    fn site() -> FixtureSite {
        FixtureSite::new()
            .with_paged_listing(
                LISTING,
                &[
                    r#"<a class="card" href="/p/1">1</a><a class="card" href="/p/2">2</a><div class="footer"></div>"#,
                    r#"<a class="card" href="/p/3">3</a><a class="card" href="/p/4">4</a>"#,
                ],
            )
            .with_page("https://example.com/p/1", "<h1>One</h1>")
            .with_page("https://example.com/p/2", "<h1>Two</h1>")
            .with_page("https://example.com/p/3", "<h1>Three</h1>")
    }

    #[tokio::test]
    async fn test_run_writes_url_list_and_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(FixtureSessionFactory::new(site()));
        let pipeline = HarvestPipeline::new(Arc::clone(&factory), config(dir.path()));

        let records = pipeline.run().await.unwrap();
        assert_eq!(records.len(), 3);

        let url_list = std::fs::read_to_string(dir.path().join("project_urls.txt")).unwrap();
        assert_eq!(url_list.lines().count(), 3);

        let artifact: serde_json::Value =
            serde_json::from_slice(&std::fs::read(dir.path().join("output/data.json")).unwrap())
                .unwrap();
        assert_eq!(artifact["records"]["record"][2]["Title"], "Three");
        // One discovery session plus one per worker, all closed.
        assert_eq!(factory.stats().created, 3);
        assert_eq!(factory.stats().live, 0);
    }

    #[tokio::test]
    async fn test_extract_from_missing_file_is_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(FixtureSessionFactory::new(site()));
        let pipeline = HarvestPipeline::new(factory, config(dir.path()));

        let err = pipeline
            .extract_from_file(&dir.path().join("missing.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Input(DomainError::Io { .. })));
    }

    #[tokio::test]
    async fn test_failed_artifact_write_is_fatal_and_keeps_previous_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(FixtureSessionFactory::new(site()));
        let items = crate::domain::references_from_urls(["https://example.com/p/1"]).unwrap();

        let pipeline = HarvestPipeline::new(Arc::clone(&factory), config(dir.path()));
        pipeline.extract(items.clone()).await.unwrap();
        let artifact = dir.path().join("output/data.json");
        let previous = std::fs::read(&artifact).unwrap();

        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();
        let mut broken = config(dir.path());
        broken.harvest.output_path = blocker.join("data.json");
        let err = HarvestPipeline::new(factory, broken)
            .extract(items)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Output(OutputError::Io { .. })));
        assert_eq!(std::fs::read(&artifact).unwrap(), previous);
    }
}
