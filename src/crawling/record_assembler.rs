//! # Record Assembler
//!
//! Loads one item document and runs the whole schema against it.

use std::time::Duration;

use thiserror::Error;
use tokio::time::timeout;
use tracing::debug;

use super::field_extractor;
use crate::domain::{FieldSpec, ItemReference, Record};
use crate::infrastructure::session::{DocumentSession, SessionError};

/// The item document could not be loaded; a task-level failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentLoadError {
    #[error("Loading {url} timed out after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("Loading {url} failed: {source}")]
    Session {
        url: String,
        #[source]
        source: SessionError,
    },
}

/// Builds complete records from loaded documents
#[derive(Debug, Clone)]
pub struct RecordAssembler {
    schema: Vec<FieldSpec>,
    load_timeout: Duration,
}

impl RecordAssembler {
    pub fn new(schema: Vec<FieldSpec>, load_timeout: Duration) -> Self {
        Self {
            schema,
            load_timeout,
        }
    }

    pub fn schema(&self) -> &[FieldSpec] {
        &self.schema
    }

    /// Load `item` into `session` and extract every field in schema order
    ///
    /// The load is attempted once. Field misses never fail the record.
    pub async fn assemble<S: DocumentSession + ?Sized>(
        &self,
        item: &ItemReference,
        session: &mut S,
    ) -> Result<Record, DocumentLoadError> {
        match timeout(self.load_timeout, session.load(&item.url)).await {
            Ok(Ok(())) => {}
            Ok(Err(source)) => {
                return Err(DocumentLoadError::Session {
                    url: item.url.clone(),
                    source,
                });
            }
            Err(_) => {
                return Err(DocumentLoadError::Timeout {
                    url: item.url.clone(),
                    timeout_ms: u64::try_from(self.load_timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
        }

        let values = self
            .schema
            .iter()
            .map(|spec| field_extractor::extract(&*session, spec))
            .collect::<Vec<_>>();

        let fallbacks = values
            .iter()
            .zip(&self.schema)
            .filter(|(value, spec)| **value == spec.fallback)
            .count();
        debug!(
            sequence_index = item.sequence_index,
            url = %item.url,
            fallbacks,
            "Assembled record"
        );

        Ok(Record::from_values(item, &self.schema, values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FieldValue, WorkerId};
    use crate::infrastructure::fixture_session::{FixtureSessionFactory, FixtureSite};
    use crate::infrastructure::session::SessionFactory;

    const ITEM_URL: &str = "https://example.com/projects/neo";

    fn schema() -> Vec<FieldSpec> {
        vec![
            FieldSpec::text("Title", "h1.title", "Unknown"),
            FieldSpec::text("Creators", ".creator", "Unknown"),
            FieldSpec::integer("DollarsPledged", ".raised"),
            FieldSpec::integer("DollarsGoal", ".goal").with_after("of "),
            FieldSpec::boolean("FlexibleGoal", ".goal-type", "flexible", false),
        ]
    }

    fn item() -> ItemReference {
        ItemReference::new(4, ITEM_URL).unwrap()
    }

    #[tokio::test]
    async fn test_record_covers_schema_with_partial_matches() {
        let site = FixtureSite::new().with_page(
            ITEM_URL,
            r#"<h1 class="title"> Neo  PS1 </h1><span class="raised">$12,345 raised</span>"#,
        );
        let factory = FixtureSessionFactory::new(site);
        let mut session = factory.create(WorkerId(0)).await.unwrap();
        let assembler = RecordAssembler::new(schema(), Duration::from_secs(1));

        let record = assembler.assemble(&item(), &mut session).await.unwrap();

        let keys: Vec<_> = record.keys().collect();
        assert_eq!(
            keys,
            ["id", "url", "Title", "Creators", "DollarsPledged", "DollarsGoal", "FlexibleGoal"]
        );
        assert_eq!(record.id(), "5");
        assert_eq!(record.get("Title"), Some(&FieldValue::from("Neo PS1")));
        assert_eq!(record.get("Creators"), Some(&FieldValue::from("Unknown")));
        assert_eq!(record.get("DollarsPledged"), Some(&FieldValue::Integer(12345)));
        assert_eq!(record.get("DollarsGoal"), Some(&FieldValue::Null));
        assert_eq!(record.get("FlexibleGoal"), Some(&FieldValue::Boolean(false)));
    }

    #[tokio::test]
    async fn test_load_failure_is_reported_not_folded() {
        let site = FixtureSite::new().with_load_failure(ITEM_URL);
        let factory = FixtureSessionFactory::new(site);
        let mut session = factory.create(WorkerId(0)).await.unwrap();
        let assembler = RecordAssembler::new(schema(), Duration::from_secs(1));

        let err = assembler.assemble(&item(), &mut session).await.unwrap_err();
        assert!(matches!(err, DocumentLoadError::Session { .. }));
        assert_eq!(factory.stats().loads, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_load_times_out() {
        let site = FixtureSite::new()
            .with_page(ITEM_URL, "<h1 class=\"title\">Neo</h1>")
            .with_load_delay(ITEM_URL, Duration::from_secs(60));
        let factory = FixtureSessionFactory::new(site);
        let mut session = factory.create(WorkerId(0)).await.unwrap();
        let assembler = RecordAssembler::new(schema(), Duration::from_secs(5));

        let err = assembler.assemble(&item(), &mut session).await.unwrap_err();
        assert_eq!(
            err,
            DocumentLoadError::Timeout {
                url: ITEM_URL.to_string(),
                timeout_ms: 5_000,
            }
        );
    }
}
