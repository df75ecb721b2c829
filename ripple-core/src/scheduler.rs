//! Job Scheduler
//!
//! The scheduler batches effect re-runs that should not happen inside the
//! write that caused them: component updates and pre/post watchers.
//!
//! # Algorithm
//!
//! 1. `queue` adds a job unless a job with the same id is already queued,
//!    marks a flush as pending and wakes the driver (if one is running).
//! 2. `flush` repeatedly takes the whole queue, sorts it by job order
//!    (jobs without an order last, ties keep queue order) and runs every job
//!    that is still active. Jobs queued while running go into the next round.
//! 3. When the queue is empty the post-flush jobs run, and the loop repeats
//!    while anything new was queued.
//!
//! Several triggers of the same job within one tick therefore run it once.
//! A job that keeps re-queueing itself is counted per flush; past the
//! configured limit the flush is aborted with
//! [`SchedulerError::RecursiveUpdate`].

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::futures::Notified;
use tokio::sync::Notify;

use crate::error::SchedulerError;

pub use crate::reactive::JobId;

struct JobInner {
    id: JobId,
    order: Option<u64>,
    run: Box<dyn Fn() + Send + Sync>,
    active: AtomicBool,
}

/// A unit of deferred work.
///
/// Cloning shares the job: all clones have the same id and liveness flag.
#[derive(Clone)]
pub struct Job {
    inner: Arc<JobInner>,
}

impl Job {
    /// A job without an order. It runs after every ordered job of a round.
    pub fn new<F>(run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::build(None, run)
    }

    /// A job that runs before jobs with a larger `order`.
    pub fn with_order<F>(order: u64, run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::build(Some(order), run)
    }

    fn build<F>(order: Option<u64>, run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(JobInner {
                id: JobId::new(),
                order,
                run: Box::new(run),
                active: AtomicBool::new(true),
            }),
        }
    }

    pub fn id(&self) -> JobId {
        self.inner.id
    }

    pub fn order(&self) -> Option<u64> {
        self.inner.order
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Skip this job from now on, including queued runs.
    pub fn deactivate(&self) {
        self.inner.active.store(false, Ordering::Release);
    }

    /// Run the job now, unless it was deactivated.
    pub fn run(&self) {
        if self.is_active() {
            (self.inner.run)();
        }
    }

    fn sort_key(&self) -> u64 {
        self.inner.order.unwrap_or(u64::MAX)
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.inner.id)
            .field("order", &self.inner.order)
            .field("active", &self.is_active())
            .finish()
    }
}

#[derive(Default)]
struct QueueState {
    queue: Vec<Job>,
    post: Vec<Job>,
    flushing: bool,
    pending: bool,
}

/// The job queue of one runtime.
pub(crate) struct Scheduler {
    state: Mutex<QueueState>,
    notify: Notify,
    recursion_limit: usize,
}

/// Clears the flushing flag when a flush ends. Jobs of the current round
/// that never ran (a job panicked) go back to the front of their queue.
struct FlushGuard<'a> {
    scheduler: &'a Scheduler,
    remaining: VecDeque<Job>,
    post: bool,
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.scheduler.state.lock();
        state.flushing = false;
        if self.remaining.is_empty() {
            return;
        }

        let mut restored: Vec<Job> = self.remaining.drain(..).collect();
        let queue = if self.post {
            &mut state.post
        } else {
            &mut state.queue
        };
        for job in queue.drain(..) {
            if !restored.iter().any(|kept| kept.id() == job.id()) {
                restored.push(job);
            }
        }
        tracing::warn!(jobs = restored.len(), post = self.post, "flush interrupted, jobs requeued");
        *queue = restored;
        state.pending = true;
        drop(state);
        self.scheduler.notify.notify_one();
    }
}

impl Scheduler {
    pub(crate) fn new(recursion_limit: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            recursion_limit,
        }
    }

    pub(crate) fn queue(&self, job: &Job) {
        {
            let mut state = self.state.lock();
            if !state.queue.iter().any(|queued| queued.id() == job.id()) {
                state.queue.push(job.clone());
            }
            state.pending = true;
        }
        tracing::trace!(job = job.id().raw(), "job queued");
        self.notify.notify_one();
    }

    pub(crate) fn queue_post(&self, job: &Job) {
        {
            let mut state = self.state.lock();
            if !state.post.iter().any(|queued| queued.id() == job.id()) {
                state.post.push(job.clone());
            }
            state.pending = true;
        }
        self.notify.notify_one();
    }

    pub(crate) fn invalidate(&self, job: &Job) {
        self.state.lock().queue.retain(|queued| queued.id() != job.id());
    }

    pub(crate) fn has_pending(&self) -> bool {
        let state = self.state.lock();
        !state.queue.is_empty() || !state.post.is_empty()
    }

    pub(crate) fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }

    /// Run queued jobs until nothing is left. A nested call is a no-op: the
    /// outer flush picks up whatever the inner caller queued.
    pub(crate) fn flush(&self) -> Result<(), SchedulerError> {
        {
            let mut state = self.state.lock();
            if state.flushing {
                return Ok(());
            }
            state.flushing = true;
            state.pending = false;
        }
        let mut guard = FlushGuard {
            scheduler: self,
            remaining: VecDeque::new(),
            post: false,
        };

        let mut runs: HashMap<JobId, usize> = HashMap::new();
        let mut round = 0usize;
        loop {
            let mut jobs = std::mem::take(&mut self.state.lock().queue);
            let post = jobs.is_empty();
            if post {
                jobs = std::mem::take(&mut self.state.lock().post);
                if jobs.is_empty() {
                    break;
                }
            }

            round += 1;
            jobs.sort_by_key(Job::sort_key);
            tracing::debug!(round, jobs = jobs.len(), post, "flushing jobs");
            guard.post = post;
            guard.remaining = jobs.into();

            while let Some(job) = guard.remaining.pop_front() {
                if !job.is_active() {
                    continue;
                }
                let count = runs.entry(job.id()).or_insert(0);
                *count += 1;
                if *count > self.recursion_limit {
                    let err = SchedulerError::RecursiveUpdate {
                        job: job.id(),
                        limit: self.recursion_limit,
                    };
                    tracing::error!(job = job.id().raw(), limit = self.recursion_limit, "{err}");
                    guard.remaining.clear();
                    let discarded = {
                        let mut state = self.state.lock();
                        state.pending = false;
                        (std::mem::take(&mut state.queue), std::mem::take(&mut state.post))
                    };
                    drop(discarded);
                    return Err(err);
                }
                job.run();
            }
        }

        self.state.lock().pending = false;
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn duplicate_jobs_run_once() {
        let scheduler = Scheduler::new(100);
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let job = Job::new(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });

        scheduler.queue(&job);
        scheduler.queue(&job);
        scheduler.queue(&job);
        scheduler.flush().unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!scheduler.has_pending());
    }

    #[test]
    fn jobs_run_in_order_with_unordered_last() {
        let scheduler = Scheduler::new(100);
        let log = Arc::new(Mutex::new(Vec::new()));

        let push = |name: &'static str| {
            let log = log.clone();
            move || log.lock().push(name)
        };
        let unordered = Job::new(push("none"));
        let late = Job::with_order(5, push("five"));
        let early = Job::with_order(1, push("one"));

        scheduler.queue(&unordered);
        scheduler.queue(&late);
        scheduler.queue(&early);
        scheduler.flush().unwrap();

        assert_eq!(*log.lock(), vec!["one", "five", "none"]);
    }

    #[test]
    fn post_jobs_run_after_queue() {
        let scheduler = Arc::new(Scheduler::new(100));
        let log = Arc::new(Mutex::new(Vec::new()));

        let log_post = log.clone();
        let post = Job::new(move || log_post.lock().push("post"));
        let (log_pre, scheduler_clone, post_clone) = (log.clone(), scheduler.clone(), post.clone());
        let pre = Job::new(move || {
            log_pre.lock().push("pre");
            scheduler_clone.queue_post(&post_clone);
        });

        scheduler.queue(&pre);
        scheduler.flush().unwrap();
        assert_eq!(*log.lock(), vec!["pre", "post"]);
    }

    #[test]
    fn deactivated_and_invalidated_jobs_are_skipped() {
        let scheduler = Scheduler::new(100);
        let runs = Arc::new(AtomicI32::new(0));

        let make = || {
            let runs = runs.clone();
            Job::new(move || {
                runs.fetch_add(1, Ordering::SeqCst);
            })
        };
        let stopped = make();
        let invalidated = make();

        scheduler.queue(&stopped);
        scheduler.queue(&invalidated);
        stopped.deactivate();
        scheduler.invalidate(&invalidated);
        scheduler.flush().unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn self_requeueing_job_hits_recursion_limit() {
        let scheduler = Arc::new(Scheduler::new(10));
        let runs = Arc::new(AtomicI32::new(0));

        let slot: Arc<Mutex<Option<Job>>> = Arc::new(Mutex::new(None));
        let (scheduler_clone, slot_clone, runs_clone) = (scheduler.clone(), slot.clone(), runs.clone());
        let job = Job::new(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            let job = slot_clone.lock().clone();
            if let Some(job) = job {
                scheduler_clone.queue(&job);
            }
        });
        *slot.lock() = Some(job.clone());

        scheduler.queue(&job);
        let err = scheduler.flush().unwrap_err();

        assert!(matches!(err, SchedulerError::RecursiveUpdate { limit: 10, .. }));
        assert_eq!(runs.load(Ordering::SeqCst), 10);
        assert!(!scheduler.has_pending());

        // The scheduler is usable again after the abort.
        slot.lock().take();
        scheduler.queue(&job);
        scheduler.flush().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn panicking_job_keeps_later_jobs_queued() {
        let scheduler = Scheduler::new(100);
        let log = Arc::new(Mutex::new(Vec::new()));

        let failing = Job::with_order(1, || panic!("job failed"));
        let log_next = log.clone();
        let next = Job::with_order(2, move || log_next.lock().push("next"));

        scheduler.queue(&next);
        scheduler.queue(&failing);
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| scheduler.flush()));

        assert!(outcome.is_err());
        assert!(log.lock().is_empty());
        assert!(scheduler.has_pending());

        scheduler.flush().unwrap();
        assert_eq!(*log.lock(), vec!["next"]);
        assert!(!scheduler.has_pending());
    }
}
