//! Single-slot retry timer for matchmaking passes
//!
//! The timer lives inside the queue state, so arming and cancelling always
//! happen under the queue lock. At most one timer task exists at a time.
//! Cancelling bumps the generation instead of aborting the task: a task that
//! wakes up with a stale generation exits without running a pass, and a task
//! that is already publishing the results of a pass finishes that work.

use std::future::Future;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Default)]
pub struct RetryTimer {
    handle: Option<JoinHandle<()>>,
    generation: u64,
}

impl RetryTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether a task armed with `generation` should keep running
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation && self.handle.is_some()
    }

    /// Spawn the task built by `task` unless one is already pending.
    /// The closure receives the generation the task must check in with.
    pub fn arm<F, Fut>(&mut self, task: F) -> bool
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.is_pending() {
            return false;
        }
        self.generation += 1;
        self.handle = Some(tokio::spawn(task(self.generation)));
        debug!("Armed matchmaking timer (generation {})", self.generation);
        true
    }

    /// Called by the timer task itself when it stops re-arming
    pub fn finish(&mut self, generation: u64) {
        if self.generation == generation {
            self.handle = None;
        }
    }

    /// Invalidate the pending task, if any
    pub fn cancel(&mut self) -> bool {
        self.generation += 1;
        let cancelled = self.handle.take().is_some();
        if cancelled {
            debug!("Cancelled matchmaking timer");
        }
        cancelled
    }
}
