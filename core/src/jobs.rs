//! Job system for parallel frame construction.
//!
//! A [`JobSystem`] owns no threads between frames. Calling
//! [`JobSystem::scope`] spins up scoped worker threads that live for the
//! duration of the closure, which lets jobs borrow frame data (render path
//! state, scene, command queues) without reference counting.
//!
//! Work is grouped by [`JobContext`]: every job is executed against a
//! context, the context counts outstanding jobs, and [`JobScope::wait`]
//! blocks until that count drops to zero. Contexts are cheap and are meant
//! to be created once per frame (or per independent batch) and dropped
//! afterwards.
//!
//! # Example
//!
//! ```
//! use lumen_core::jobs::{JobContext, JobSystem};
//! use std::sync::atomic::{AtomicU32, Ordering};
//!
//! let jobs = JobSystem::new(2);
//! let sum = AtomicU32::new(0);
//!
//! jobs.scope(|scope| {
//!     let ctx = JobContext::new();
//!     scope.dispatch(&ctx, 100, 16, |args| {
//!         sum.fetch_add(args.job_index, Ordering::Relaxed);
//!     });
//!     scope.wait(&ctx);
//! });
//!
//! assert_eq!(sum.load(Ordering::Relaxed), (0..100).sum::<u32>());
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Arguments passed to every job invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobArgs {
    /// Index of this invocation across the whole dispatch.
    pub job_index: u32,
    /// Index of the group this invocation belongs to.
    pub group_id: u32,
    /// Index of this invocation inside its group.
    pub group_index: u32,
}

type Job<'env> = Box<dyn FnOnce() + Send + 'env>;

struct QueueState<'env> {
    jobs: VecDeque<Job<'env>>,
    shutdown: bool,
}

struct Shared<'env> {
    queue: Mutex<QueueState<'env>>,
    job_available: Condvar,
}

impl<'env> Shared<'env> {
    fn new() -> Self {
        Self {
            queue: Mutex::new(QueueState {
                jobs: VecDeque::new(),
                shutdown: false,
            }),
            job_available: Condvar::new(),
        }
    }

    fn push(&self, job: Job<'env>) {
        self.queue.lock().jobs.push_back(job);
        self.job_available.notify_one();
    }

    fn try_pop(&self) -> Option<Job<'env>> {
        self.queue.lock().jobs.pop_front()
    }

    fn shutdown(&self) {
        self.queue.lock().shutdown = true;
        self.job_available.notify_all();
    }

    fn worker_loop(&self) {
        crate::set_thread_name!("jobs: worker");
        loop {
            let job = {
                let mut state = self.queue.lock();
                loop {
                    if let Some(job) = state.jobs.pop_front() {
                        break Some(job);
                    }
                    if state.shutdown {
                        break None;
                    }
                    self.job_available.wait(&mut state);
                }
            };
            match job {
                Some(job) => job(),
                None => return,
            }
        }
    }
}

#[derive(Debug, Default)]
struct ContextState {
    pending: AtomicUsize,
    lock: Mutex<()>,
    done: Condvar,
}

impl ContextState {
    fn finish_one(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            let _guard = self.lock.lock();
            self.done.notify_all();
        }
    }
}

/// Stops the workers of a scope when dropped, including during unwinding.
struct ShutdownOnDrop<'a, 'env>(&'a Shared<'env>);

impl Drop for ShutdownOnDrop<'_, '_> {
    fn drop(&mut self) {
        self.0.shutdown();
    }
}

/// Decrements the owning context when dropped, even if the job panicked.
struct PendingGuard(Arc<ContextState>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.finish_one();
    }
}

/// Counter of outstanding jobs for one batch of work.
///
/// Not reused across frames; create a fresh context for each frame.
#[derive(Debug, Default)]
pub struct JobContext {
    state: Arc<ContextState>,
}

impl JobContext {
    /// Create an idle context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs scheduled against this context that have not finished.
    pub fn pending(&self) -> usize {
        self.state.pending.load(Ordering::Acquire)
    }

    /// Whether any job of this context is still queued or running.
    pub fn is_busy(&self) -> bool {
        self.pending() > 0
    }

    fn begin(&self, count: usize) -> PendingGuard {
        self.state.pending.fetch_add(count, Ordering::AcqRel);
        PendingGuard(Arc::clone(&self.state))
    }
}

/// Thread-pool configuration.
///
/// Worker threads only exist inside [`scope`](Self::scope).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSystem {
    num_threads: usize,
}

impl JobSystem {
    /// Create a job system with the given number of worker threads.
    ///
    /// Zero workers is valid: jobs then run on the thread calling
    /// [`JobScope::wait`].
    pub fn new(num_threads: usize) -> Self {
        Self { num_threads }
    }

    /// Create a job system using available parallelism minus the calling thread.
    pub fn with_default_threads() -> Self {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2);
        Self::new(threads.saturating_sub(1).max(1))
    }

    /// Configured worker thread count.
    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Run `f` with a live pool of scoped workers.
    ///
    /// Jobs still queued when `f` returns are drained on the calling thread
    /// before the workers are joined, so every scheduled job runs exactly once.
    ///
    /// # Panics
    ///
    /// A panic in `f` or in any job is propagated once the workers are joined.
    pub fn scope<'env, F, R>(&self, f: F) -> R
    where
        F: FnOnce(&JobScope<'_, 'env>) -> R,
    {
        crate::profile_scope!("jobs: scope");

        let shared = Shared::new();
        std::thread::scope(|s| {
            let mut spawned = 0usize;
            for i in 0..self.num_threads {
                let shared_ref = &shared;
                let builder = std::thread::Builder::new().name(format!("lumen-job-{i}"));
                match builder.spawn_scoped(s, move || shared_ref.worker_loop()) {
                    Ok(_) => spawned += 1,
                    Err(err) => {
                        log::error!("JobSystem: failed to spawn worker {i}: {err}");
                    }
                }
            }
            log::trace!("JobSystem: scope started with {spawned} workers");

            // Workers must be released even when `f` unwinds, or the join below never returns.
            let _shutdown = ShutdownOnDrop(&shared);
            let scope = JobScope { shared: &shared };
            let result = f(&scope);

            while let Some(job) = shared.try_pop() {
                job();
            }
            result
        })
    }
}

impl Default for JobSystem {
    fn default() -> Self {
        Self::with_default_threads()
    }
}

/// Handle to the worker pool inside [`JobSystem::scope`].
pub struct JobScope<'a, 'env> {
    shared: &'a Shared<'env>,
}

impl<'env> JobScope<'_, 'env> {
    /// Schedule a single job against `ctx`.
    pub fn execute<F>(&self, ctx: &JobContext, job: F)
    where
        F: FnOnce(JobArgs) + Send + 'env,
    {
        let guard = ctx.begin(1);
        self.shared.push(Box::new(move || {
            let _guard = guard;
            job(JobArgs {
                job_index: 0,
                group_id: 0,
                group_index: 0,
            });
        }));
    }

    /// Schedule `job_count` invocations of `job`, split into groups of
    /// `group_size` that each run as one job.
    pub fn dispatch<F>(&self, ctx: &JobContext, job_count: u32, group_size: u32, job: F)
    where
        F: Fn(JobArgs) + Send + Sync + 'env,
    {
        if job_count == 0 || group_size == 0 {
            return;
        }
        let job = Arc::new(job);
        let group_count = job_count.div_ceil(group_size);
        for group_id in 0..group_count {
            let guard = ctx.begin(1);
            let job = Arc::clone(&job);
            self.shared.push(Box::new(move || {
                let _guard = guard;
                let start = group_id * group_size;
                let end = (start + group_size).min(job_count);
                for job_index in start..end {
                    job(JobArgs {
                        job_index,
                        group_id,
                        group_index: job_index - start,
                    });
                }
            }));
        }
    }

    /// Block until every job scheduled against `ctx` has finished.
    ///
    /// The calling thread executes queued jobs while it waits.
    pub fn wait(&self, ctx: &JobContext) {
        crate::profile_scope!("jobs: wait");
        while ctx.is_busy() {
            if let Some(job) = self.shared.try_pop() {
                job();
                continue;
            }
            let mut guard = ctx.state.lock.lock();
            if ctx.is_busy() {
                ctx.state
                    .done
                    .wait_for(&mut guard, Duration::from_millis(1));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::mpsc;

    /// Run `f` on its own thread and report whether it panicked, failing
    /// the test if it does not finish in time.
    fn panics_within_timeout(f: impl FnOnce() + Send + std::panic::UnwindSafe + 'static) -> bool {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let result = std::panic::catch_unwind(f);
            let _ = tx.send(result.is_err());
        });
        rx.recv_timeout(Duration::from_secs(5))
            .expect("scope did not return")
    }

    #[test]
    fn test_execute_runs_every_job() {
        let jobs = JobSystem::new(4);
        let counter = AtomicU32::new(0);

        jobs.scope(|scope| {
            let ctx = JobContext::new();
            for _ in 0..64 {
                scope.execute(&ctx, |_| {
                    counter.fetch_add(1, Ordering::Relaxed);
                });
            }
            scope.wait(&ctx);
            assert!(!ctx.is_busy());
        });

        assert_eq!(counter.load(Ordering::Relaxed), 64);
    }

    #[test]
    fn test_zero_workers_runs_on_wait() {
        let jobs = JobSystem::new(0);
        let counter = AtomicU32::new(0);

        jobs.scope(|scope| {
            let ctx = JobContext::new();
            scope.execute(&ctx, |_| {
                counter.fetch_add(1, Ordering::Relaxed);
            });
            assert_eq!(ctx.pending(), 1);
            scope.wait(&ctx);
        });

        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_dispatch_covers_every_index_once() {
        let jobs = JobSystem::new(3);
        let hits: Vec<AtomicU32> = (0..37).map(|_| AtomicU32::new(0)).collect();

        jobs.scope(|scope| {
            let ctx = JobContext::new();
            scope.dispatch(&ctx, 37, 8, |args| {
                hits[args.job_index as usize].fetch_add(1, Ordering::Relaxed);
                assert_eq!(args.job_index, args.group_id * 8 + args.group_index);
            });
            scope.wait(&ctx);
        });

        assert!(hits.iter().all(|h| h.load(Ordering::Relaxed) == 1));
    }

    #[test]
    fn test_dispatch_with_empty_range_is_noop() {
        let jobs = JobSystem::new(1);
        jobs.scope(|scope| {
            let ctx = JobContext::new();
            scope.dispatch(&ctx, 0, 8, |_| panic!("must not run"));
            scope.dispatch(&ctx, 8, 0, |_| panic!("must not run"));
            assert!(!ctx.is_busy());
        });
    }

    #[test]
    fn test_contexts_are_independent() {
        let jobs = JobSystem::new(0);
        jobs.scope(|scope| {
            let a = JobContext::new();
            let b = JobContext::new();
            scope.execute(&a, |_| {});
            scope.execute(&b, |_| {});
            scope.execute(&b, |_| {});
            assert_eq!(a.pending(), 1);
            assert_eq!(b.pending(), 2);
            scope.wait(&b);
            assert!(!b.is_busy());
        });
    }

    #[test]
    fn test_leftover_jobs_run_before_scope_ends() {
        let jobs = JobSystem::new(0);
        let counter = AtomicU32::new(0);
        jobs.scope(|scope| {
            let ctx = JobContext::new();
            scope.execute(&ctx, |_| {
                counter.fetch_add(1, Ordering::Relaxed);
            });
        });
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_jobs_may_borrow_frame_data() {
        let frame_data = vec![1u32, 2, 3, 4];
        let total = AtomicU32::new(0);
        JobSystem::new(2).scope(|scope| {
            let ctx = JobContext::new();
            for value in &frame_data {
                let total = &total;
                scope.execute(&ctx, move |_| {
                    total.fetch_add(*value, Ordering::Relaxed);
                });
            }
            scope.wait(&ctx);
        });
        assert_eq!(total.load(Ordering::Relaxed), 10);
    }

    #[test]
    fn test_job_panic_propagates_out_of_scope() {
        for workers in [0, 1, 4] {
            let panicked = panics_within_timeout(move || {
                JobSystem::new(workers).scope(|scope| {
                    let ctx = JobContext::new();
                    scope.execute(&ctx, |_| panic!("job failed"));
                    scope.wait(&ctx);
                });
            });
            assert!(panicked, "{workers} workers");
        }
    }

    fn fail_frame(_: &JobScope<'_, '_>) {
        panic!("frame construction failed");
    }

    #[test]
    fn test_scope_body_panic_releases_workers() {
        for workers in [0, 2] {
            let panicked = panics_within_timeout(move || JobSystem::new(workers).scope(fail_frame));
            assert!(panicked, "{workers} workers");
        }
    }

    #[test]
    fn test_panicking_job_still_finishes_its_context() {
        let panicked = panics_within_timeout(|| {
            JobSystem::new(2).scope(|scope| {
                let ctx = JobContext::new();
                scope.execute(&ctx, |_| panic!("job failed"));
                scope.execute(&ctx, |_| {});
                scope.wait(&ctx);
                assert!(!ctx.is_busy());
            });
        });
        assert!(panicked);
    }
}
