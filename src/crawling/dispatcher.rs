//! # Work Dispatcher
//!
//! Fans item references out to a fixed pool of workers and collects their
//! records.
//!
//! - Task queue: bounded `mpsc` channel holding every item followed by
//!   exactly `worker_count` [`WorkEntry::Stop`] markers. Its receiver is
//!   shared by the workers only.
//! - Result channel: each worker pushes one [`WorkerReport`] per task.
//! - Each worker owns one session from the [`SessionPool`], acquired on its
//!   first task and released on every exit path.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tracing::{error, info, warn};

use super::record_assembler::RecordAssembler;
use super::session_pool::{SessionPool, SessionPoolStats};
use super::tasks::{WorkEntry, WorkerExit, WorkerReport, WorkerSummary};
use crate::domain::{
    ItemReference, Record, RecordSet, TaskFailure, TaskFailurePolicy, TaskFailureReason, WorkerId,
};
use crate::infrastructure::session::SessionFactory;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Worker count must be positive")]
    InvalidWorkerCount,

    #[error("All {workers} workers failed to start a document session: {reason}")]
    AllWorkersFailed { workers: usize, reason: String },
}

/// Queue sizing and task-failure policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    pub queue_capacity: usize,
    pub failure_policy: TaskFailurePolicy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: crate::infrastructure::config::defaults::QUEUE_CAPACITY,
            failure_policy: TaskFailurePolicy::default(),
        }
    }
}

/// Everything a dispatch run produced
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub records: RecordSet,
    pub workers: Vec<WorkerSummary>,
    pub sessions: SessionPoolStats,
}

pub struct WorkDispatcher<F: SessionFactory> {
    pool: Arc<SessionPool<F>>,
    assembler: Arc<RecordAssembler>,
    config: DispatchConfig,
}

impl<F: SessionFactory> WorkDispatcher<F> {
    pub fn new(factory: Arc<F>, assembler: RecordAssembler, config: DispatchConfig) -> Self {
        Self {
            pool: Arc::new(SessionPool::new(factory)),
            assembler: Arc::new(assembler),
            config,
        }
    }

    /// Extract every item with `worker_count` workers
    ///
    /// The returned set is ordered by ascending sequence index. Task-level
    /// failures are kept as diagnostics and handled per the failure policy.
    ///
    /// # Errors
    /// [`DispatchError::AllWorkersFailed`] when there was work but no worker
    /// could start a session.
    pub async fn run(
        &self,
        items: Vec<ItemReference>,
        worker_count: usize,
    ) -> Result<RecordSet, DispatchError> {
        Ok(self.run_with_report(items, worker_count).await?.records)
    }

    pub async fn run_with_report(
        &self,
        items: Vec<ItemReference>,
        worker_count: usize,
    ) -> Result<DispatchReport, DispatchError> {
        if worker_count == 0 {
            return Err(DispatchError::InvalidWorkerCount);
        }
        let item_count = items.len();
        info!(items = item_count, workers = worker_count, "Starting extraction");

        let (task_tx, task_rx) = mpsc::channel::<WorkEntry>(self.config.queue_capacity.max(1));
        let task_rx = Arc::new(Mutex::new(task_rx));
        let (report_tx, mut report_rx) = mpsc::channel::<WorkerReport>(worker_count * 2);

        let workers: Vec<_> = (0..worker_count)
            .map(|id| {
                tokio::spawn(run_worker(
                    WorkerId(id),
                    Arc::clone(&task_rx),
                    report_tx.clone(),
                    Arc::clone(&self.pool),
                    Arc::clone(&self.assembler),
                ))
            })
            .collect();
        // Workers hold the only remaining receiver and report senders.
        drop(task_rx);
        drop(report_tx);

        let producer = tokio::spawn(async move {
            let stops = std::iter::repeat_with(|| WorkEntry::Stop).take(worker_count);
            for entry in items.into_iter().map(WorkEntry::Task).chain(stops) {
                if task_tx.send(entry).await.is_err() {
                    warn!("Task queue closed before all entries were queued");
                    break;
                }
            }
        });

        let mut records = Vec::with_capacity(item_count);
        let mut failures = Vec::new();
        while let Some(report) = report_rx.recv().await {
            match report {
                WorkerReport::Completed(record) => records.push(record),
                WorkerReport::Failed(failure) => {
                    warn!(
                        sequence_index = failure.sequence_index,
                        url = %failure.url,
                        worker_id = %failure.worker_id,
                        reason = %failure.reason,
                        "Task failed"
                    );
                    if self.config.failure_policy == TaskFailurePolicy::Fallback {
                        records.push(self.fallback_record(&failure));
                    }
                    failures.push(failure);
                }
            }
        }

        let mut summaries = Vec::with_capacity(worker_count);
        for handle in workers {
            match handle.await {
                Ok(summary) => summaries.push(summary),
                Err(e) => error!(error = %e, "Worker task aborted"),
            }
        }
        if let Err(e) = producer.await {
            error!(error = %e, "Task producer aborted");
        }
        let leftovers = self.pool.release_all().await;
        if leftovers > 0 {
            warn!(leftovers, "Released sessions of aborted workers");
        }

        let sessions = self.pool.stats();
        if item_count > 0 && sessions.created == 0 {
            let reason = failures
                .iter()
                .find_map(|failure| match &failure.reason {
                    TaskFailureReason::SessionInit(message) => Some(message.clone()),
                    TaskFailureReason::DocumentLoad(_) => None,
                })
                .unwrap_or_else(|| "no worker reported a session".to_string());
            error!(workers = worker_count, %reason, "No worker could start a session");
            return Err(DispatchError::AllWorkersFailed {
                workers: worker_count,
                reason,
            });
        }

        let records = RecordSet::new(records, failures);
        info!(
            records = records.len(),
            failures = records.failures().len(),
            sessions_created = sessions.created,
            peak_live_sessions = sessions.peak_live,
            "Extraction finished"
        );
        Ok(DispatchReport {
            records,
            workers: summaries,
            sessions,
        })
    }

    fn fallback_record(&self, failure: &TaskFailure) -> Record {
        let item = ItemReference {
            sequence_index: failure.sequence_index,
            url: failure.url.clone(),
        };
        Record::all_fallback(&item, self.assembler.schema())
    }
}

/// One worker: pull, extract, report, until a stop marker arrives
async fn run_worker<F: SessionFactory>(
    worker_id: WorkerId,
    tasks: Arc<Mutex<mpsc::Receiver<WorkEntry>>>,
    reports: mpsc::Sender<WorkerReport>,
    pool: Arc<SessionPool<F>>,
    assembler: Arc<RecordAssembler>,
) -> WorkerSummary {
    let mut summary = WorkerSummary::new(worker_id);

    loop {
        let entry = tasks.lock().await.recv().await;
        let item = match entry {
            Some(WorkEntry::Task(item)) => item,
            Some(WorkEntry::Stop) => {
                summary.exit = WorkerExit::Stopped;
                break;
            }
            None => {
                summary.exit = WorkerExit::QueueClosed;
                break;
            }
        };

        let handle = match pool.acquire(worker_id).await {
            Ok(handle) => {
                summary.session_started = true;
                handle
            }
            Err(e) => {
                summary.failed += 1;
                summary.exit = WorkerExit::SessionInitFailed;
                let failure = TaskFailure {
                    sequence_index: item.sequence_index,
                    url: item.url,
                    worker_id,
                    reason: TaskFailureReason::SessionInit(e.source.to_string()),
                };
                // A closed result channel means the dispatcher is gone.
                let _ = reports.send(WorkerReport::Failed(failure)).await;
                break;
            }
        };

        let outcome = {
            let mut session = handle.lock().await;
            assembler.assemble(&item, &mut *session).await
        };
        let report = match outcome {
            Ok(record) => {
                summary.processed += 1;
                WorkerReport::Completed(record)
            }
            Err(e) => {
                summary.failed += 1;
                WorkerReport::Failed(TaskFailure {
                    sequence_index: item.sequence_index,
                    url: item.url,
                    worker_id,
                    reason: TaskFailureReason::DocumentLoad(e.to_string()),
                })
            }
        };
        if reports.send(report).await.is_err() {
            warn!(%worker_id, "Result channel closed");
            break;
        }
    }

    pool.release(worker_id).await;
    info!(
        %worker_id,
        processed = summary.processed,
        failed = summary.failed,
        exit = ?summary.exit,
        "Worker exited"
    );
    summary
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::domain::{FieldSpec, FieldValue, references_from_urls};
    use crate::infrastructure::fixture_session::{FixtureSessionFactory, FixtureSite};

    fn urls(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("https://example.com/projects/{i}")).collect()
    }

    fn site(n: usize) -> FixtureSite {
        urls(n).iter().enumerate().fold(FixtureSite::new(), |site, (i, url)| {
            site.with_page(url, &format!(r#"<h1 class="title">Project {i}</h1>"#))
        })
    }

    fn dispatcher(
        factory: &Arc<FixtureSessionFactory>,
        policy: TaskFailurePolicy,
    ) -> WorkDispatcher<FixtureSessionFactory> {
        let schema = vec![
            FieldSpec::text("Title", "h1.title", "Unknown"),
            FieldSpec::integer("NumBackers", ".backers"),
        ];
        WorkDispatcher::new(
            Arc::clone(factory),
            RecordAssembler::new(schema, Duration::from_secs(1)),
            DispatchConfig {
                queue_capacity: 2,
                failure_policy: policy,
            },
        )
    }

    #[tokio::test]
    async fn test_three_items_two_workers() {
        let factory = Arc::new(FixtureSessionFactory::new(site(3)));
        let dispatcher = dispatcher(&factory, TaskFailurePolicy::Fallback);
        let items = references_from_urls(urls(3)).unwrap();

        let report = dispatcher.run_with_report(items, 2).await.unwrap();

        assert_eq!(report.records.len(), 3);
        assert_eq!(factory.stats().created, 2);
        assert_eq!(factory.stats().live, 0);
        assert_eq!(report.sessions.released, 2);
        assert!(report.workers.iter().all(|w| w.exit == WorkerExit::Stopped));
        let ids: Vec<_> = report.records.records().iter().map(Record::id).collect();
        assert_eq!(ids, ["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_empty_input_creates_no_sessions() {
        let factory = Arc::new(FixtureSessionFactory::new(FixtureSite::new()));
        let records = dispatcher(&factory, TaskFailurePolicy::Fallback)
            .run(Vec::new(), 3)
            .await
            .unwrap();

        assert!(records.is_empty());
        assert_eq!(factory.stats().created, 0);
    }

    #[tokio::test]
    async fn test_zero_workers_rejected() {
        let factory = Arc::new(FixtureSessionFactory::new(FixtureSite::new()));
        let err = dispatcher(&factory, TaskFailurePolicy::Fallback)
            .run(Vec::new(), 0)
            .await
            .unwrap_err();
        assert_eq!(err, DispatchError::InvalidWorkerCount);
    }

    #[tokio::test]
    async fn test_failed_load_uses_fallback_record() {
        let all = urls(3);
        let factory = Arc::new(FixtureSessionFactory::new(site(3).with_load_failure(&all[1])));
        let records = dispatcher(&factory, TaskFailurePolicy::Fallback)
            .run(references_from_urls(&all).unwrap(), 2)
            .await
            .unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records.failures().len(), 1);
        assert_eq!(records.failures()[0].sequence_index, 1);
        assert_eq!(records.records()[1].get("Title"), Some(&FieldValue::from("Unknown")));
        assert_eq!(records.records()[1].get("NumBackers"), Some(&FieldValue::Null));
    }

    #[tokio::test]
    async fn test_failed_load_is_omitted() {
        let all = urls(3);
        let factory = Arc::new(FixtureSessionFactory::new(site(3).with_load_failure(&all[1])));
        let records = dispatcher(&factory, TaskFailurePolicy::Omit)
            .run(references_from_urls(&all).unwrap(), 2)
            .await
            .unwrap();

        let ids: Vec<_> = records.records().iter().map(Record::id).collect();
        assert_eq!(ids, ["1", "3"]);
        assert_eq!(records.failures().len(), 1);
    }

    #[tokio::test]
    async fn test_all_workers_failing_aborts_run() {
        let factory = Arc::new(
            FixtureSessionFactory::new(site(2))
                .with_failing_worker(WorkerId(0))
                .with_failing_worker(WorkerId(1)),
        );
        let err = dispatcher(&factory, TaskFailurePolicy::Fallback)
            .run(references_from_urls(urls(2)).unwrap(), 2)
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::AllWorkersFailed { workers: 2, .. }));
    }
}
