//! # Task management
//!
//! The engine never spawns threads itself. It submits work to a
//! [`TaskManager`], which forwards jobs to an [`Executor`] and tracks them
//! in [`TaskGroup`]s that fire completion callbacks.
//!
//! | Executor | Description |
//! |----------|-------------|
//! | [`InlineExecutor`] | Runs each job on the submitting thread, in order |
//! | [`RayonExecutor`] | Runs jobs on a rayon thread pool |
//!
//! Every job body is gated on [`TaskManager::is_alive`]: once the manager is
//! cancelled, queued jobs are skipped and their group reports failure.

use std::ops::Range;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

/// A unit of work handed to an executor.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Default number of items per range job.
pub const DEFAULT_BATCH_SIZE: usize = 256;

// ============================================================================
// Executors
// ============================================================================

/// Where jobs actually run.
pub trait Executor: Send + Sync {
    fn execute(&self, job: Job);
}

/// Runs jobs immediately on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn execute(&self, job: Job) {
        job();
    }
}

/// Runs jobs on a rayon pool (the global one unless a pool is supplied).
#[derive(Default, Clone)]
pub struct RayonExecutor {
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl RayonExecutor {
    pub fn with_pool(pool: Arc<rayon::ThreadPool>) -> Self {
        Self { pool: Some(pool) }
    }
}

impl Executor for RayonExecutor {
    fn execute(&self, job: Job) {
        match &self.pool {
            Some(pool) => pool.spawn(job),
            None => rayon::spawn(job),
        }
    }
}

// ============================================================================
// TaskGroup
// ============================================================================

type Callback = Box<dyn FnOnce(bool) + Send + 'static>;

struct GroupState {
    done: bool,
    callbacks: Vec<Callback>,
}

/// A batch of jobs that completes once all of them have finished.
pub struct TaskGroup {
    name: &'static str,
    pending: AtomicUsize,
    failed: AtomicBool,
    state: Mutex<GroupState>,
    finished: Condvar,
}

impl TaskGroup {
    fn new(name: &'static str, jobs: usize) -> Self {
        Self {
            name,
            pending: AtomicUsize::new(jobs),
            failed: AtomicBool::new(false),
            state: Mutex::new(GroupState { done: jobs == 0, callbacks: Vec::new() }),
            finished: Condvar::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_done(&self) -> bool {
        self.state.lock().done
    }

    /// True once done and every job reported success.
    pub fn succeeded(&self) -> bool {
        self.is_done() && !self.failed.load(Ordering::Acquire)
    }

    /// Register a continuation. Runs immediately if the group already finished.
    pub fn on_complete(&self, callback: impl FnOnce(bool) + Send + 'static) {
        let mut state = self.state.lock();
        if state.done {
            drop(state);
            callback(!self.failed.load(Ordering::Acquire));
        } else {
            state.callbacks.push(Box::new(callback));
        }
    }

    /// Block the current thread until the group completes.
    ///
    /// Only meant for drivers that have nothing else to interleave.
    pub fn wait(&self) {
        let mut state = self.state.lock();
        while !state.done {
            self.finished.wait(&mut state);
        }
    }

    fn complete_one(&self, ok: bool) {
        if !ok {
            self.failed.store(true, Ordering::Release);
        }
        if self.pending.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }
        let callbacks = {
            let mut state = self.state.lock();
            state.done = true;
            std::mem::take(&mut state.callbacks)
        };
        self.finished.notify_all();
        let success = !self.failed.load(Ordering::Acquire);
        for callback in callbacks {
            callback(success);
        }
    }
}

impl std::fmt::Debug for TaskGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGroup")
            .field("name", &self.name)
            .field("pending", &self.pending.load(Ordering::Relaxed))
            .field("failed", &self.failed.load(Ordering::Relaxed))
            .finish()
    }
}

// ============================================================================
// TaskManager
// ============================================================================

struct ManagerInner {
    executor: Arc<dyn Executor>,
    alive: AtomicBool,
    in_flight: AtomicUsize,
}

/// Cheap-to-clone handle used to submit work.
#[derive(Clone)]
pub struct TaskManager {
    inner: Arc<ManagerInner>,
}

impl TaskManager {
    pub fn new(executor: impl Executor + 'static) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                executor: Arc::new(executor),
                alive: AtomicBool::new(true),
                in_flight: AtomicUsize::new(0),
            }),
        }
    }

    /// Single-threaded, deterministic manager.
    pub fn inline() -> Self {
        Self::new(InlineExecutor)
    }

    /// Manager backed by the global rayon pool.
    pub fn rayon() -> Self {
        Self::new(RayonExecutor::default())
    }

    /// Liveness checkpoint. Task bodies and commits must not touch shared
    /// state once this returns false.
    pub fn is_alive(&self) -> bool {
        self.inner.alive.load(Ordering::Acquire)
    }

    /// Abandon all pending and future work.
    pub fn cancel(&self) {
        self.inner.alive.store(false, Ordering::Release);
    }

    /// No job submitted through this manager is still running.
    pub fn is_idle(&self) -> bool {
        self.inner.in_flight.load(Ordering::Acquire) == 0
    }

    /// Run one job.
    pub fn start(
        &self,
        name: &'static str,
        body: impl FnOnce() -> bool + Send + 'static,
    ) -> Arc<TaskGroup> {
        let group = Arc::new(TaskGroup::new(name, 1));
        self.submit(&group, body);
        group
    }

    /// Split `0..total` into `batch_size` ranges and run `body` on each.
    ///
    /// With `total == 0` the returned group is already complete.
    pub fn start_ranges(
        &self,
        name: &'static str,
        total: usize,
        batch_size: usize,
        body: impl Fn(Range<usize>) -> bool + Send + Sync + 'static,
    ) -> Arc<TaskGroup> {
        let batch_size = batch_size.max(1);
        let batches = total.div_ceil(batch_size);
        let group = Arc::new(TaskGroup::new(name, batches));
        let body = Arc::new(body);

        for batch in 0..batches {
            let start = batch * batch_size;
            let range = start..(start + batch_size).min(total);
            let body = Arc::clone(&body);
            self.submit(&group, move || body(range));
        }

        group
    }

    fn submit(&self, group: &Arc<TaskGroup>, body: impl FnOnce() -> bool + Send + 'static) {
        let inner = Arc::clone(&self.inner);
        let group = Arc::clone(group);
        inner.in_flight.fetch_add(1, Ordering::AcqRel);

        let job_inner = Arc::clone(&inner);
        inner.executor.execute(Box::new(move || {
            let ok = if job_inner.alive.load(Ordering::Acquire) {
                match catch_unwind(AssertUnwindSafe(body)) {
                    Ok(ok) => ok,
                    Err(_) => {
                        tracing::error!(task = group.name(), "task panicked");
                        false
                    }
                }
            } else {
                tracing::trace!(task = group.name(), "task skipped, manager no longer alive");
                false
            };
            job_inner.in_flight.fetch_sub(1, Ordering::AcqRel);
            group.complete_one(ok);
        }));
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::rayon()
    }
}

impl std::fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskManager")
            .field("alive", &self.is_alive())
            .field("in_flight", &self.inner.in_flight.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranges_cover_total() {
        let manager = TaskManager::inline();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let group = manager.start_ranges("cover", 10, 3, move |r| {
            sink.lock().push(r);
            true
        });
        assert!(group.succeeded());
        assert_eq!(*seen.lock(), vec![0..3, 3..6, 6..9, 9..10]);
    }

    #[test]
    fn test_empty_range_group_is_done() {
        let manager = TaskManager::inline();
        let group = manager.start_ranges("empty", 0, 8, |_| true);
        assert!(group.is_done());
        assert!(group.succeeded());
    }

    #[test]
    fn test_on_complete_after_done_runs_immediately() {
        let manager = TaskManager::inline();
        let group = manager.start("one", || true);
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        group.on_complete(move |ok| flag.store(ok, Ordering::SeqCst));
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_failure_propagates() {
        let manager = TaskManager::inline();
        let group = manager.start_ranges("fail", 4, 1, |r| r.start != 2);
        assert!(group.is_done());
        assert!(!group.succeeded());
    }

    #[test]
    fn test_cancelled_manager_skips_bodies() {
        let manager = TaskManager::inline();
        manager.cancel();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let group = manager.start("skipped", move || {
            flag.store(true, Ordering::SeqCst);
            true
        });
        assert!(!ran.load(Ordering::SeqCst));
        assert!(group.is_done());
        assert!(!group.succeeded());
    }

    #[test]
    fn test_panicking_task_reports_failure() {
        let manager = TaskManager::inline();
        let group = manager.start("boom", || panic!("boom"));
        assert!(!group.succeeded());
        assert!(manager.is_idle());
    }

    #[test]
    fn test_rayon_group_waits() {
        let manager = TaskManager::rayon();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        let group = manager.start_ranges("count", 1000, 7, move |r| {
            c.fetch_add(r.len(), Ordering::SeqCst);
            true
        });
        group.wait();
        assert!(group.succeeded());
        assert_eq!(counter.load(Ordering::SeqCst), 1000);
    }

    #[test]
    fn test_dedicated_pool_runs_jobs() {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap();
        let manager = TaskManager::new(RayonExecutor::with_pool(Arc::new(pool)));
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        let group = manager.start_ranges("pooled", 100, 9, move |r| {
            c.fetch_add(r.len(), Ordering::SeqCst);
            true
        });
        group.wait();
        assert!(group.succeeded());
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }
}
