//! The generic reconciliation framework (spec.md §4.1): list -> enqueue ->
//! worker-pool execute -> backoff, kind-agnostic over any [`Entity`].
//!
//! One [`Controller`] is constructed per resource kind, parameterised by a
//! [`Storage`] implementation and a [`Reconciler`] that knows that kind's
//! handler logic. Scheduling (producer, queue, worker pool, backoff,
//! resync) lives here exactly once; the teacher's per-kind ticker loops
//! (`deployment::controller`, `project::controller`, `ecr::controller`)
//! are the grounding for what a *handler* does once invoked, not for how
//! it gets invoked.

pub mod queue;

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::entities::{Entity, HasPhase, Resource};
use crate::storage::{Error as StorageError, ListOptions, Storage};
use queue::{backoff_for_attempt, WorkQueue};

/// Default periodic full-list interval (spec.md §4.1 `T_resync`).
pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(30);
/// Default worker pool size (spec.md §4.1 `W`).
pub const DEFAULT_WORKERS: usize = 5;

/// Per-kind handler logic. `reconcile` is called with the freshly-fetched
/// current row and returns the new status to persist.
///
/// Per spec.md §7 propagation policy: an `Err` return means a transient
/// failure (the framework re-enqueues with backoff and does NOT write
/// status); a validation/business-rule failure is instead expressed by
/// returning `Ok` with a status whose phase is the kind's `Failed` value —
/// the framework persists that status and relies on resync to notice if
/// the underlying condition changes.
#[async_trait]
pub trait Reconciler<E: Entity>: Send + Sync {
    async fn reconcile(&self, obj: &Resource<E>) -> anyhow::Result<E::Status>;
}

struct Attempts {
    counts: std::sync::Mutex<std::collections::HashMap<Uuid, u32>>,
}

impl Attempts {
    fn new() -> Self {
        Self {
            counts: std::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }

    fn next(&self, id: Uuid) -> u32 {
        let mut counts = self.counts.lock().unwrap();
        let entry = counts.entry(id).or_insert(0);
        let n = *entry;
        *entry += 1;
        n
    }

    fn reset(&self, id: Uuid) {
        self.counts.lock().unwrap().remove(&id);
    }
}

pub struct Controller<E, S, R>
where
    E: Entity,
    S: Storage<E> + 'static,
    R: Reconciler<E> + 'static,
{
    storage: Arc<S>,
    reconciler: Arc<R>,
    queue: Arc<WorkQueue<Uuid>>,
    attempts: Arc<Attempts>,
    workers: usize,
    resync_interval: Duration,
    running: AtomicBool,
    _marker: std::marker::PhantomData<E>,
}

impl<E, S, R> Controller<E, S, R>
where
    E: Entity,
    S: Storage<E> + 'static,
    R: Reconciler<E> + 'static,
{
    pub fn new(storage: Arc<S>, reconciler: Arc<R>) -> Self {
        Self::with_config(storage, reconciler, DEFAULT_WORKERS, DEFAULT_RESYNC_INTERVAL)
    }

    pub fn with_config(
        storage: Arc<S>,
        reconciler: Arc<R>,
        workers: usize,
        resync_interval: Duration,
    ) -> Self {
        Self {
            storage,
            reconciler,
            queue: Arc::new(WorkQueue::new()),
            attempts: Arc::new(Attempts::new()),
            workers: workers.max(1),
            resync_interval,
            running: AtomicBool::new(false),
            _marker: std::marker::PhantomData,
        }
    }

    /// Run the controller until `shutdown` resolves. Spawns the producer
    /// and the worker pool, and returns once every task has exited
    /// (graceful drain, spec.md §5 Cancellation).
    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        self.running.store(true, Ordering::SeqCst);
        info!(kind = E::KIND, "reconciliation controller starting");

        let mut handles = Vec::new();

        let producer_self = Arc::clone(&self);
        let mut producer_shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            producer_self.producer_loop(&mut producer_shutdown).await;
        }));

        for worker_id in 0..self.workers {
            let worker_self = Arc::clone(&self);
            handles.push(tokio::spawn(async move {
                worker_self.worker_loop(worker_id).await;
            }));
        }

        let _ = shutdown.changed().await;
        self.queue.shutdown();

        for handle in handles {
            let _ = handle.await;
        }
        info!(kind = E::KIND, "reconciliation controller stopped");
    }

    async fn producer_loop(&self, shutdown: &mut tokio::sync::watch::Receiver<bool>) {
        // Enqueue immediately on startup, then every `resync_interval`.
        loop {
            if let Err(e) = self.list_and_enqueue().await {
                error!(kind = E::KIND, error = %e, "resync list failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.resync_interval) => {}
                _ = shutdown.changed() => {
                    debug!(kind = E::KIND, "producer loop shutting down");
                    return;
                }
            }
        }
    }

    async fn list_and_enqueue(&self) -> Result<(), StorageError> {
        let objects = self.storage.list(&ListOptions::new()).await?;
        debug!(kind = E::KIND, count = objects.len(), "resync listed objects");
        for obj in objects {
            self.queue.add(obj.id);
        }
        Ok(())
    }

    async fn worker_loop(&self, worker_id: usize) {
        while let Some(id) = self.queue.get().await {
            self.process_one(id).await;
            self.queue.done(&id);
        }
        debug!(kind = E::KIND, worker_id, "worker exiting");
    }

    async fn process_one(&self, id: Uuid) {
        let obj = match self.storage.get(id).await {
            Ok(obj) => obj,
            Err(StorageError::NotFound) => {
                // Row is gone (hard-deleted elsewhere); nothing to do.
                self.attempts.reset(id);
                return;
            }
            Err(e) => {
                warn!(kind = E::KIND, %id, error = %e, "failed to fetch object for reconcile");
                self.requeue_with_backoff(id);
                return;
            }
        };

        let key = obj.metadata.key();
        match self.reconciler.reconcile(&obj).await {
            Ok(status) => {
                let new_phase = status.phase().to_string();
                if let Err(e) = self.storage.update_status(id, &status, None).await {
                    warn!(
                        kind = E::KIND,
                        workspace = %key.0, name = %key.1,
                        error = %e,
                        "status write failed, will retry"
                    );
                    self.requeue_with_backoff(id);
                    return;
                }
                if new_phase != obj.status.phase() {
                    info!(
                        kind = E::KIND,
                        workspace = %key.0, name = %key.1,
                        from = obj.status.phase(), to = %new_phase,
                        "phase transition"
                    );
                }
                self.attempts.reset(id);
            }
            Err(e) => {
                warn!(
                    kind = E::KIND,
                    workspace = %key.0, name = %key.1,
                    error = %e,
                    "reconcile failed, will retry with backoff"
                );
                self.requeue_with_backoff(id);
            }
        }
    }

    fn requeue_with_backoff(&self, id: Uuid) {
        let attempt = self.attempts.next(id);
        let delay = backoff_for_attempt(attempt);
        self.queue.add_after(id, delay);
    }
}

/// Convenience alias: a reconciler wrapped in a mutex for handlers that need
/// interior mutability (most don't — `Reconciler` impls are typically
/// `Send + Sync` stateless dispatchers over `Arc<Storage>` fields).
pub type SharedReconciler<E> = Arc<Mutex<dyn Reconciler<E>>>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::image_registry::{
        ImageRegistry, ImageRegistryPhase, ImageRegistrySpec, ImageRegistryStatus,
    };
    use crate::entities::Metadata;
    use crate::storage::memory::MemoryStorage;
    use std::sync::atomic::AtomicUsize;

    struct CountingReconciler {
        calls: AtomicUsize,
        fail_first: AtomicBool,
    }

    #[async_trait]
    impl Reconciler<ImageRegistry> for CountingReconciler {
        async fn reconcile(
            &self,
            obj: &Resource<ImageRegistry>,
        ) -> anyhow::Result<ImageRegistryStatus> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_first.swap(false, Ordering::SeqCst) {
                anyhow::bail!("simulated transient failure");
            }
            let mut status = obj.status.clone();
            status.phase = ImageRegistryPhase::Connected;
            Ok(status)
        }
    }

    #[tokio::test]
    async fn reconciles_seeded_object_to_connected() {
        let storage = Arc::new(MemoryStorage::<ImageRegistry>::new());
        let id = Uuid::new_v4();
        storage.seed(Resource::new(
            id,
            Metadata::new("prod", "reg"),
            ImageRegistrySpec {
                url: "https://example".into(),
                repository: "r".into(),
                auth: Default::default(),
                ca: None,
            },
        ));

        let reconciler = Arc::new(CountingReconciler {
            calls: AtomicUsize::new(0),
            fail_first: AtomicBool::new(false),
        });

        let controller = Arc::new(Controller::with_config(
            Arc::clone(&storage),
            Arc::clone(&reconciler),
            1,
            Duration::from_millis(20),
        ));

        let (tx, rx) = tokio::sync::watch::channel(false);
        let handle = tokio::spawn(Arc::clone(&controller).run(rx));

        tokio::time::sleep(Duration::from_millis(60)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        let obj = storage.get(id).await.unwrap();
        assert_eq!(obj.status.phase.as_str(), "Connected");
        assert!(reconciler.calls.load(Ordering::SeqCst) >= 1);
    }
}
