//! Worker pool.
//!
//! A fixed set of slots, each owning at most one [`WorkerProcess`], pulls
//! work items from one shared queue. Whichever slot is idle takes the next
//! item, so dispatch follows availability and no ordering holds across
//! items.
//!
//! Every submitted item resolves exactly once: with the worker's outcome,
//! with [`SolveOutcome::WorkerFailure`] when its worker misbehaves, or with
//! [`Error::Cancelled`] when the pool shuts down first. A failed worker is
//! killed and replaced before its slot takes more work.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::{Mutex as AsyncMutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout, timeout_at};
use tracing::{debug, error, info, warn};

use crate::config::PoolConfig;
use crate::error::{Error, Result};
use crate::identifiers::{JobId, WorkerId};
use crate::protocol::WorkerRequest;
use crate::shutdown::{self, stopped};
use crate::solver::SolveOutcome;

use super::process::WorkerProcess;

// ============================================================================
// Constants
// ============================================================================

/// Grace period used by [`WorkerPool::shutdown`].
pub const DEFAULT_POOL_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

// ============================================================================
// Types
// ============================================================================

/// One unit of solver work with its single-assignment result slot.
struct WorkItem {
    request: WorkerRequest,
    result: oneshot::Sender<SolveOutcome>,
}

/// State shared between the pool handle and its slots.
struct Shared {
    config: PoolConfig,
    queue: AsyncMutex<mpsc::UnboundedReceiver<WorkItem>>,
    /// Items submitted but not yet taken by a slot.
    queued: AtomicUsize,
    /// Live process per slot.
    pids: Mutex<FxHashMap<WorkerId, u32>>,
}

struct PoolInner {
    shared: Arc<Shared>,
    /// `None` after shutdown.
    sender: Mutex<Option<mpsc::UnboundedSender<WorkItem>>>,
    shutdown_tx: watch::Sender<bool>,
    slots: Mutex<Vec<JoinHandle<()>>>,
}

// ============================================================================
// SolveHandle
// ============================================================================

/// Pending result of one submission.
///
/// Dropping the handle (or calling [`cancel`](Self::cancel)) makes the
/// result unobservable: a queued item is skipped, a running one is
/// discarded when it finishes.
#[derive(Debug)]
pub struct SolveHandle {
    job_id: JobId,
    rx: oneshot::Receiver<SolveOutcome>,
}

impl SolveHandle {
    /// Returns the job ID of this submission.
    #[inline]
    #[must_use]
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Waits for the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if the pool dropped the item, which
    /// happens on shutdown.
    pub async fn outcome(self) -> Result<SolveOutcome> {
        self.rx.await.map_err(|_| Error::Cancelled)
    }

    /// Gives up on the result.
    pub fn cancel(mut self) {
        self.rx.close();
        debug!(job_id = %self.job_id, "Submission cancelled");
    }
}

// ============================================================================
// WorkerPool
// ============================================================================

/// Pool of worker processes.
///
/// Cheap to clone; all clones share one pool.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("worker_count", &self.worker_count())
            .field("queued", &self.queued())
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    /// Starts the pool and its worker processes.
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the configuration is invalid
    /// - [`Error::WorkerSpawn`] if an initial worker cannot be launched
    pub fn start(config: PoolConfig) -> Result<Self> {
        config.validate()?;

        let mut processes = Vec::with_capacity(config.worker_count());
        for slot in 0..config.worker_count() {
            processes.push(WorkerProcess::spawn(
                WorkerId::new(slot),
                config.worker_command(),
            )?);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = shutdown::channel();

        let shared = Arc::new(Shared {
            config,
            queue: AsyncMutex::new(rx),
            queued: AtomicUsize::new(0),
            pids: Mutex::new(FxHashMap::default()),
        });

        let slots = processes
            .into_iter()
            .map(|process| {
                let worker_id = process.worker_id();
                shared.pids.lock().insert(worker_id, process.pid());
                tokio::spawn(run_slot(
                    worker_id,
                    Arc::clone(&shared),
                    Some(process),
                    shutdown_rx.clone(),
                ))
            })
            .collect();

        info!(
            workers = shared.config.worker_count(),
            max_depth = shared.config.max_depth(),
            queue_capacity = ?shared.config.queue_capacity(),
            "Worker pool started"
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                shared,
                sender: Mutex::new(Some(tx)),
                shutdown_tx,
                slots: Mutex::new(slots),
            }),
        })
    }

    /// Submits a scramble without waiting for it to be solved.
    ///
    /// The pool's depth bound is attached to the item.
    ///
    /// # Errors
    ///
    /// - [`Error::PoolShutdown`] after [`shutdown`](Self::shutdown)
    /// - [`Error::PoolSaturated`] if the bounded queue is full
    pub fn submit(&self, scramble: impl Into<String>) -> Result<SolveHandle> {
        let guard = self.inner.sender.lock();
        let sender = guard.as_ref().ok_or(Error::PoolShutdown)?;

        let shared = &self.inner.shared;
        match shared.config.queue_capacity() {
            Some(capacity) => {
                shared
                    .queued
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                        (n < capacity).then_some(n + 1)
                    })
                    .map_err(|_| Error::pool_saturated(capacity))?;
            }
            None => {
                shared.queued.fetch_add(1, Ordering::AcqRel);
            }
        }

        let job_id = JobId::next();
        let (result, rx) = oneshot::channel();
        let item = WorkItem {
            request: WorkerRequest {
                id: job_id,
                scramble: scramble.into(),
                max_depth: shared.config.max_depth(),
            },
            result,
        };

        if sender.send(item).is_err() {
            shared.queued.fetch_sub(1, Ordering::AcqRel);
            return Err(Error::PoolShutdown);
        }

        debug!(%job_id, "Work item submitted");
        Ok(SolveHandle { job_id, rx })
    }

    /// Shuts down with [`DEFAULT_POOL_SHUTDOWN_GRACE`].
    pub async fn shutdown(&self) {
        self.shutdown_with_grace(DEFAULT_POOL_SHUTDOWN_GRACE).await;
    }

    /// Stops accepting work, cancels queued and running items and
    /// terminates every worker process.
    ///
    /// Slots that do not stop within `grace` are aborted; their processes
    /// are killed on drop.
    pub async fn shutdown_with_grace(&self, grace: Duration) {
        if self.inner.sender.lock().take().is_none() {
            return;
        }
        info!("Shutting down worker pool");
        self.inner.shutdown_tx.send_replace(true);

        let deadline = Instant::now() + grace;
        let slots = std::mem::take(&mut *self.inner.slots.lock());
        for mut slot in slots {
            if timeout_at(deadline, &mut slot).await.is_err() {
                warn!("Worker slot did not stop in time, aborting");
                slot.abort();
            }
        }

        // Dropping queued items resolves their handles as cancelled.
        let shared = &self.inner.shared;
        let mut queue = shared.queue.lock().await;
        queue.close();
        let mut dropped = 0usize;
        while queue.try_recv().is_ok() {
            dropped += 1;
        }
        shared.queued.store(0, Ordering::Release);
        shared.pids.lock().clear();

        info!(dropped, "Worker pool stopped");
    }

    /// Number of worker slots.
    #[inline]
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.inner.shared.config.worker_count()
    }

    /// Search depth bound applied to every item.
    #[inline]
    #[must_use]
    pub fn max_depth(&self) -> u8 {
        self.inner.shared.config.max_depth()
    }

    /// Items waiting for a free slot.
    #[inline]
    #[must_use]
    pub fn queued(&self) -> usize {
        self.inner.shared.queued.load(Ordering::Acquire)
    }

    /// PIDs of live worker processes, ordered by slot.
    #[must_use]
    pub fn worker_pids(&self) -> Vec<u32> {
        let pids = self.inner.shared.pids.lock();
        let mut entries: Vec<_> = pids.iter().map(|(id, pid)| (*id, *pid)).collect();
        entries.sort_unstable();
        entries.into_iter().map(|(_, pid)| pid).collect()
    }

    /// Returns `true` once shutdown has started.
    #[inline]
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.inner.sender.lock().is_none()
    }
}

// ============================================================================
// Slot Loop
// ============================================================================

/// Runs one slot until shutdown.
async fn run_slot(
    worker_id: WorkerId,
    shared: Arc<Shared>,
    mut process: Option<WorkerProcess>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    debug!(%worker_id, "Worker slot started");

    loop {
        let next = tokio::select! {
            biased;
            () = stopped(&mut shutdown_rx) => None,
            item = async { shared.queue.lock().await.recv().await } => item,
        };
        let Some(item) = next else { break };
        shared.queued.fetch_sub(1, Ordering::AcqRel);

        let job_id = item.request.id;
        if item.result.is_closed() {
            debug!(%worker_id, %job_id, "Skipping cancelled item");
            continue;
        }

        let worker = match ensure_process(worker_id, &shared, &mut process) {
            Ok(worker) => worker,
            Err(e) => {
                error!(%worker_id, %job_id, error = %e, "No worker process available");
                let _ = item.result.send(SolveOutcome::worker_failure(e.to_string()));
                tokio::select! {
                    () = stopped(&mut shutdown_rx) => break,
                    () = sleep(shared.config.respawn_backoff()) => {}
                }
                continue;
            }
        };

        let result = tokio::select! {
            biased;
            () = stopped(&mut shutdown_rx) => {
                debug!(%worker_id, %job_id, "Cancelling in-flight item");
                break;
            }
            result = solve_item(worker_id, worker, &item.request, shared.config.solve_timeout()) => result,
        };

        let outcome = match result {
            Ok(outcome) => {
                log_outcome(worker_id, job_id, &outcome);
                outcome
            }
            Err(e) => {
                error!(%worker_id, %job_id, error = %e, "Worker failed, replacing it");
                retire(worker_id, &shared, &mut process).await;
                if let Err(e) = ensure_process(worker_id, &shared, &mut process) {
                    warn!(%worker_id, error = %e, "Respawn failed, retrying on next item");
                }
                SolveOutcome::worker_failure(e.to_string())
            }
        };

        if item.result.send(outcome).is_err() {
            debug!(%worker_id, %job_id, "Caller gone, result discarded");
        }
    }

    retire(worker_id, &shared, &mut process).await;
    debug!(%worker_id, "Worker slot stopped");
}

/// Returns the slot's live process, spawning one if needed.
fn ensure_process<'a>(
    worker_id: WorkerId,
    shared: &Shared,
    process: &'a mut Option<WorkerProcess>,
) -> Result<&'a mut WorkerProcess> {
    if process.as_mut().is_some_and(WorkerProcess::has_exited) {
        warn!(%worker_id, "Idle worker process exited, replacing it");
        shared.pids.lock().remove(&worker_id);
        *process = None;
    }

    if process.is_none() {
        let spawned = WorkerProcess::spawn(worker_id, shared.config.worker_command())?;
        shared.pids.lock().insert(worker_id, spawned.pid());
        info!(%worker_id, pid = spawned.pid(), "Worker process replaced");
        *process = Some(spawned);
    }

    process
        .as_mut()
        .ok_or_else(|| Error::worker_spawn("worker slot has no process"))
}

/// Kills and forgets the slot's process.
async fn retire(worker_id: WorkerId, shared: &Shared, process: &mut Option<WorkerProcess>) {
    if let Some(mut worker) = process.take() {
        worker.kill().await;
    }
    shared.pids.lock().remove(&worker_id);
}

/// Runs one exchange, bounded by the optional deadline.
async fn solve_item(
    worker_id: WorkerId,
    worker: &mut WorkerProcess,
    request: &WorkerRequest,
    deadline: Option<Duration>,
) -> Result<SolveOutcome> {
    match deadline {
        Some(limit) => timeout(limit, worker.solve(request))
            .await
            .map_err(|_| Error::worker_timeout(worker_id, limit))?,
        None => worker.solve(request).await,
    }
}

fn log_outcome(worker_id: WorkerId, job_id: JobId, outcome: &SolveOutcome) {
    match outcome {
        SolveOutcome::Solved {
            solution,
            elapsed_seconds,
        } => {
            debug!(%worker_id, %job_id, elapsed = elapsed_seconds, moves = solution.split_whitespace().count(), "Scramble solved");
        }
        SolveOutcome::Invalid { reason } => {
            info!(%worker_id, %job_id, reason = %reason, "Invalid scramble");
        }
        SolveOutcome::WorkerFailure { reason } => {
            error!(%worker_id, %job_id, reason = %reason, "Worker reported a failure");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    use crate::config::WorkerCommand;

    /// Replies `invalid` to every request, echoing its id.
    const ECHO_INVALID: &str = r#"while IFS= read -r line; do id=$(echo "$line" | sed 's/^{"id":\([0-9]*\).*/\1/'); printf '{"id":%s,"outcome":{"status":"invalid","reason":"scripted"}}\n' "$id"; done"#;

    fn sh(script: &str) -> WorkerCommand {
        WorkerCommand::new("/bin/sh").arg("-c").arg(script)
    }

    fn config(script: &str, workers: usize) -> PoolConfig {
        PoolConfig::new(sh(script))
            .with_worker_count(workers)
            .with_respawn_backoff(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_submit_and_resolve() {
        let pool = WorkerPool::start(config(ECHO_INVALID, 2)).unwrap();
        assert_eq!(pool.worker_count(), 2);
        assert_eq!(pool.worker_pids().len(), 2);

        let handle = pool.submit("R U").unwrap();
        assert!(handle.outcome().await.unwrap().is_invalid());

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_more_items_than_workers_all_resolve() {
        let pool = WorkerPool::start(config(ECHO_INVALID, 2)).unwrap();

        let handles: Vec<_> = (0..10).map(|_| pool.submit("R").unwrap()).collect();
        for handle in handles {
            assert!(handle.outcome().await.unwrap().is_invalid());
        }
        assert_eq!(pool.queued(), 0);

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_crash_mid_item_is_contained() {
        // Dies on its first request, then a healthy replacement serves.
        let marker = tempfile::NamedTempFile::new().unwrap();
        let path = marker.path().display().to_string();
        std::fs::remove_file(&path).unwrap();
        let script = format!(
            "if [ ! -e {path} ]; then touch {path}; read -r line; exit 1; fi; {ECHO_INVALID}"
        );

        let pool = WorkerPool::start(config(&script, 1)).unwrap();
        let first_pid = pool.worker_pids()[0];

        let failed = pool.submit("R").unwrap().outcome().await.unwrap();
        assert!(failed.is_worker_failure());

        let recovered = pool.submit("R").unwrap().outcome().await.unwrap();
        assert!(recovered.is_invalid());
        assert_eq!(pool.worker_pids().len(), 1);
        assert_ne!(pool.worker_pids()[0], first_pid);

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_solve_timeout_replaces_worker() {
        let pool = WorkerPool::start(
            config("read -r line; sleep 30", 1).with_solve_timeout(Duration::from_millis(100)),
        )
        .unwrap();

        let outcome = pool.submit("R").unwrap().outcome().await.unwrap();
        assert!(outcome.is_worker_failure());

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_bounded_queue_saturates() {
        let pool = WorkerPool::start(config("sleep 30", 1).with_queue_capacity(2)).unwrap();

        let _first = pool.submit("R").unwrap();
        let _second = pool.submit("U").unwrap();
        let err = pool.submit("F").unwrap_err();
        assert!(matches!(err, Error::PoolSaturated { capacity: 2 }));

        pool.shutdown_with_grace(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_shutdown_cancels_pending_items() {
        let pool = WorkerPool::start(config("sleep 30", 1)).unwrap();

        let running = pool.submit("R").unwrap();
        let queued = pool.submit("U").unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        pool.shutdown_with_grace(Duration::from_secs(2)).await;

        assert!(matches!(running.outcome().await, Err(Error::Cancelled)));
        assert!(matches!(queued.outcome().await, Err(Error::Cancelled)));
        assert!(pool.worker_pids().is_empty());
        assert!(matches!(pool.submit("R"), Err(Error::PoolShutdown)));
    }

    #[tokio::test]
    async fn test_cancelled_item_is_skipped() {
        let pool = WorkerPool::start(config(ECHO_INVALID, 1)).unwrap();

        pool.submit("R").unwrap().cancel();
        let kept = pool.submit("U").unwrap();
        assert!(kept.outcome().await.unwrap().is_invalid());

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_fails_for_missing_worker_binary() {
        let result = WorkerPool::start(PoolConfig::new(WorkerCommand::new(
            "/nonexistent/rubiks-worker",
        )));
        assert!(matches!(result, Err(Error::WorkerSpawn { .. })));
    }
}
