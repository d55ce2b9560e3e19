//! Per-revision arrival deadlines.
//!
//! Each revision that still waits for segments owns at most one
//! [`DeadlineHandle`]. The timer task only carries the deadline id back into
//! the engine; [`evaluate`] then checks that id against the revision's
//! current handle, so a superseded timer that fires anyway is a no-op.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

use super::model::{DeadlineState, PlaylistRevision};

/// Handle to one armed timer
#[derive(Debug)]
pub struct DeadlineHandle {
    id: u64,
    due_in: Duration,
    abort: AbortHandle,
}

impl DeadlineHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn due_in(&self) -> Duration {
        self.due_in
    }

    /// Abort the timer task. Safe to call after it already fired.
    pub fn cancel(self) {
        debug!("Cancelling deadline #{}", self.id);
        self.abort.abort();
    }
}

/// Spawns and tracks deadline timers
#[derive(Debug)]
pub struct DeadlineScheduler {
    next_id: AtomicU64,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl DeadlineScheduler {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Arm a timer that calls `on_expiry(deadline_id)` after `delay`.
    ///
    /// Returns `None` once the scheduler has been shut down. Must be called
    /// from within a tokio runtime.
    pub fn arm<F>(&self, delay: Duration, on_expiry: F) -> Option<DeadlineHandle>
    where
        F: FnOnce(u64) + Send + 'static,
    {
        if self.shutdown.is_cancelled() {
            return None;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancelled = self.shutdown.clone();
        let task = self.tracker.spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {
                    debug!("Deadline #{} dropped at shutdown", id);
                }
                _ = tokio::time::sleep(delay) => on_expiry(id),
            }
        });

        debug!("Armed deadline #{} in {}ms", id, delay.as_millis());
        Some(DeadlineHandle {
            id,
            due_in: delay,
            abort: task.abort_handle(),
        })
    }

    /// Timer tasks that have not finished yet
    pub fn outstanding(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Cancel every outstanding timer and wait for the tasks to exit
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

impl Default for DeadlineScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// What a fired deadline did to its revision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    /// Superseded, cancelled, or already resolved; nothing changed
    Stale,
    /// Every segment had arrived by the time the evaluation ran
    Completed,
    /// `missing` segments were marked timed out
    TimedOut { missing: usize },
}

/// Run the timeout procedure for `deadline_id` against `revision`.
pub fn evaluate(revision: &mut PlaylistRevision, deadline_id: u64) -> Evaluation {
    if revision.pending_deadline_id() != Some(deadline_id)
        || revision.deadline_state != DeadlineState::Armed
    {
        return Evaluation::Stale;
    }

    // The task is finishing on its own; no abort needed
    revision.deadline = None;
    revision.deadline_state = DeadlineState::Evaluating;

    if revision.all_segments_received {
        revision.deadline_state = DeadlineState::Completed;
        return Evaluation::Stale;
    }

    let mut missing = 0;
    for segment in revision.segments.iter_mut().filter(|s| !s.received) {
        segment.timed_out = true;
        missing += 1;
        revision.timeout_event_count += 1;
        revision.consecutive_timeout_streak += 1;
        if revision.consecutive_timeout_streak > revision.max_consecutive_timeout_streak {
            revision.max_consecutive_timeout_streak = revision.consecutive_timeout_streak;
        }
    }

    if missing == 0 {
        revision.all_segments_received = true;
        revision.consecutive_timeout_streak = 0;
        revision.deadline_state = DeadlineState::Completed;
        Evaluation::Completed
    } else {
        revision.deadline_state = DeadlineState::TimedOut;
        Evaluation::TimedOut { missing }
    }
}
