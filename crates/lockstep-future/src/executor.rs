// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Where continuations registered with `Future::then_on` run.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// A unit of deferred work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Accepts jobs and runs them at some point.
pub trait Executor: Send + Sync {
    fn add(&self, job: Job);

    /// Jobs accepted but not yet run, if the executor tracks them.
    fn pending(&self) -> usize {
        0
    }
}

/// Runs each job immediately on the submitting thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn add(&self, job: Job) {
        job();
    }
}

/// Queues jobs until a caller drains them.
///
/// Useful for tests that need to observe a continuation before it runs, and
/// for event loops that pump work at a point of their choosing.
#[derive(Default)]
pub struct ManualExecutor {
    queue: Mutex<VecDeque<Job>>,
    added: Condvar,
}

impl ManualExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs one queued job. Returns false if the queue was empty.
    pub fn run_one(&self) -> bool {
        // Pop under the lock, run outside it: jobs may enqueue more jobs.
        let job = self.queue.lock().pop_front();
        match job {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }

    /// Runs jobs until the queue is empty, including jobs added while
    /// draining. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while self.run_one() {
            ran += 1;
        }
        if ran > 0 {
            tracing::debug!(ran, "manual executor drained");
        }
        ran
    }

    /// Blocks until at least one job is queued or `timeout` elapses.
    /// Returns whether a job is queued.
    pub fn wait_for_job(&self, timeout: Duration) -> bool {
        let mut queue = self.queue.lock();
        if queue.is_empty() {
            let _ = self.added.wait_for(&mut queue, timeout);
        }
        !queue.is_empty()
    }
}

impl Executor for ManualExecutor {
    fn add(&self, job: Job) {
        self.queue.lock().push_back(job);
        self.added.notify_all();
    }

    fn pending(&self) -> usize {
        self.queue.lock().len()
    }
}

impl fmt::Debug for ManualExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualExecutor")
            .field("pending", &self.pending())
            .finish()
    }
}
