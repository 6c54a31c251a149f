//! # Session Pool
//!
//! Owns one document session per worker. A session is created lazily on the
//! first `acquire` for a worker and reused for every later task of that
//! worker; `release` tears it down exactly once.
//!
//! Each worker has its own slot, so creation runs outside the registry lock
//! and a slow engine start for one worker never blocks another.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

use crate::domain::WorkerId;
use crate::infrastructure::session::{DocumentSession, SessionError, SessionFactory};

/// Exclusive handle to one worker's session; only the owning worker locks it
pub type SessionHandle<S> = Arc<Mutex<S>>;

type SessionSlot<S> = Arc<OnceCell<SessionHandle<S>>>;

/// The underlying session for a worker could not be started
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Session start failed for {worker_id}: {source}")]
pub struct SessionInitError {
    pub worker_id: WorkerId,
    #[source]
    pub source: SessionError,
}

/// Snapshot of pool lifecycle counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionPoolStats {
    pub created: usize,
    pub released: usize,
    pub live: usize,
    pub peak_live: usize,
}

/// Registry of per-worker sessions backed by a [`SessionFactory`]
pub struct SessionPool<F: SessionFactory> {
    factory: Arc<F>,
    slots: Mutex<HashMap<WorkerId, SessionSlot<F::Session>>>,
    created: AtomicUsize,
    released: AtomicUsize,
    live: AtomicUsize,
    peak_live: AtomicUsize,
}

impl<F: SessionFactory> SessionPool<F> {
    pub fn new(factory: Arc<F>) -> Self {
        Self {
            factory,
            slots: Mutex::new(HashMap::new()),
            created: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
            live: AtomicUsize::new(0),
            peak_live: AtomicUsize::new(0),
        }
    }

    /// Return the live session for `worker_id`, creating it on first use
    ///
    /// # Errors
    /// Returns [`SessionInitError`] when the factory cannot start a session.
    /// The slot stays empty, so the failure only concerns this worker.
    pub async fn acquire(
        &self,
        worker_id: WorkerId,
    ) -> Result<SessionHandle<F::Session>, SessionInitError> {
        let slot = {
            let mut slots = self.slots.lock().await;
            Arc::clone(slots.entry(worker_id).or_default())
        };

        let handle = slot
            .get_or_try_init(|| async {
                let session = self
                    .factory
                    .create(worker_id)
                    .await
                    .map_err(|source| SessionInitError { worker_id, source })?;

                self.created.fetch_add(1, Ordering::SeqCst);
                let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak_live.fetch_max(live, Ordering::SeqCst);
                info!(%worker_id, live, "Document session started");
                Ok::<_, SessionInitError>(Arc::new(Mutex::new(session)))
            })
            .await
            .inspect_err(|e| warn!(%worker_id, error = %e, "Document session failed to start"))?;

        Ok(Arc::clone(handle))
    }

    /// Tear down the session bound to `worker_id`
    ///
    /// Returns `false` when no live session was bound; a second release is a no-op.
    pub async fn release(&self, worker_id: WorkerId) -> bool {
        let slot = self.slots.lock().await.remove(&worker_id);
        match slot.as_ref().and_then(|slot| slot.get()) {
            Some(handle) => {
                self.close(worker_id, handle).await;
                true
            }
            None => false,
        }
    }

    /// Tear down every session still bound, returning how many were closed
    pub async fn release_all(&self) -> usize {
        let slots: Vec<_> = self.slots.lock().await.drain().collect();
        let mut closed = 0;
        for (worker_id, slot) in slots {
            if let Some(handle) = slot.get() {
                warn!(%worker_id, "Releasing session left behind by worker");
                self.close(worker_id, handle).await;
                closed += 1;
            }
        }
        closed
    }

    async fn close(&self, worker_id: WorkerId, handle: &SessionHandle<F::Session>) {
        let result = handle.lock().await.close().await;
        self.released.fetch_add(1, Ordering::SeqCst);
        let live = self.live.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        match result {
            Ok(()) => debug!(%worker_id, live, "Document session released"),
            Err(e) => warn!(%worker_id, error = %e, "Document session close reported an error"),
        }
    }

    #[must_use]
    pub fn stats(&self) -> SessionPoolStats {
        SessionPoolStats {
            created: self.created.load(Ordering::SeqCst),
            released: self.released.load(Ordering::SeqCst),
            live: self.live.load(Ordering::SeqCst),
            peak_live: self.peak_live.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::fixture_session::{FixtureSessionFactory, FixtureSite};

    fn pool() -> (Arc<FixtureSessionFactory>, SessionPool<FixtureSessionFactory>) {
        let factory = Arc::new(FixtureSessionFactory::new(FixtureSite::new()));
        let pool = SessionPool::new(Arc::clone(&factory));
        (factory, pool)
    }

    #[tokio::test]
    async fn test_acquire_is_idempotent_per_worker() {
        let (factory, pool) = pool();

        let first = pool.acquire(WorkerId(0)).await.unwrap();
        let second = pool.acquire(WorkerId(0)).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(factory.stats().created, 1);
        assert_eq!(pool.stats().live, 1);
    }

    #[tokio::test]
    async fn test_release_closes_exactly_once() {
        let (factory, pool) = pool();
        pool.acquire(WorkerId(0)).await.unwrap();

        assert!(pool.release(WorkerId(0)).await);
        assert!(!pool.release(WorkerId(0)).await);

        assert_eq!(factory.stats().closed, 1);
        let stats = pool.stats();
        assert_eq!(stats.released, 1);
        assert_eq!(stats.live, 0);
    }

    #[tokio::test]
    async fn test_init_failure_is_isolated_to_worker() {
        let factory = Arc::new(
            FixtureSessionFactory::new(FixtureSite::new()).with_failing_worker(WorkerId(1)),
        );
        let pool = SessionPool::new(Arc::clone(&factory));

        let err = pool.acquire(WorkerId(1)).await.unwrap_err();
        assert_eq!(err.worker_id, WorkerId(1));
        assert!(matches!(err.source, SessionError::Init(_)));

        assert!(pool.acquire(WorkerId(0)).await.is_ok());
        assert_eq!(pool.stats().created, 1);
        assert!(!pool.release(WorkerId(1)).await);
    }

    #[tokio::test]
    async fn test_release_all_tears_down_leftovers() {
        let (factory, pool) = pool();
        for id in 0..3 {
            pool.acquire(WorkerId(id)).await.unwrap();
        }
        pool.release(WorkerId(0)).await;

        assert_eq!(pool.release_all().await, 2);
        assert_eq!(factory.stats().live, 0);
        assert_eq!(pool.stats().peak_live, 3);
    }
}
