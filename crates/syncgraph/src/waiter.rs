//! Async-Completion Waiter: poll resources until they leave a pending state.
//!
//! The waiter blocks the calling thread between polls. It never retries a
//! failed remote job and never waits past its deadline by more than one
//! status round.

use crate::context::ProgressCallback;
use std::thread;
use std::time::{Duration, Instant};

/// Statuses that mean "still in progress".
pub const PENDING_STATUSES: &[&str] = &["new", "pending", "waiting", "running"];

/// Statuses that mean "finished successfully". Manual projects report `ok`.
pub const SUCCESS_STATUSES: &[&str] = &["successful", "ok"];

/// State of a tracked resource, or of the whole wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
    Pending,
    Succeeded,
    /// Finished with a non-success status (failed, error, canceled, ...)
    Failed,
    TimedOut,
}

impl WaitState {
    /// Classify a status string.
    pub fn from_status(status: &str) -> Self {
        if PENDING_STATUSES.contains(&status) {
            Self::Pending
        } else if SUCCESS_STATUSES.contains(&status) {
            Self::Succeeded
        } else {
            Self::Failed
        }
    }
}

/// Outcome of a wait.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WaitReport {
    pub succeeded: Vec<u64>,
    /// Ids with the terminal status (or poll error) they ended with
    pub failed: Vec<(u64, String)>,
    /// Ids still pending when the deadline elapsed
    pub pending: Vec<u64>,
    pub elapsed: Duration,
}

impl WaitReport {
    /// Overall state: TimedOut if anything is still pending, Failed if
    /// anything failed, Succeeded otherwise.
    pub fn state(&self) -> WaitState {
        if !self.pending.is_empty() {
            WaitState::TimedOut
        } else if !self.failed.is_empty() {
            WaitState::Failed
        } else {
            WaitState::Succeeded
        }
    }
}

/// Polls a set of ids until none is pending or the deadline elapses.
#[derive(Debug, Clone)]
pub struct Waiter {
    deadline: Duration,
    interval: Duration,
}

impl Waiter {
    /// Create a waiter.
    pub fn new(deadline: Duration, interval: Duration) -> Self {
        Self { deadline, interval }
    }

    /// Wait for `ids`, reading each one's status through `status`.
    ///
    /// A status read that errors is terminal for that id.
    pub fn wait<F, P>(&self, ids: &[u64], mut status: F, progress: &mut P) -> WaitReport
    where
        F: FnMut(u64) -> towerkit::Result<String>,
        P: ProgressCallback,
    {
        let start = Instant::now();
        let mut report = WaitReport::default();

        let mut tracked: Vec<u64> = Vec::with_capacity(ids.len());
        for id in ids {
            if !tracked.contains(id) {
                tracked.push(*id);
            }
        }

        progress.on_wait_start(tracked.len());

        while !tracked.is_empty() {
            tracked.retain(|id| match status(*id) {
                Ok(s) => match WaitState::from_status(&s) {
                    WaitState::Pending => true,
                    WaitState::Succeeded => {
                        log::debug!("id {id} finished: {s}");
                        report.succeeded.push(*id);
                        false
                    }
                    _ => {
                        log::warn!("id {id} finished with status '{s}'");
                        report.failed.push((*id, s));
                        false
                    }
                },
                Err(e) => {
                    log::warn!("id {id}: status poll failed: {e}");
                    report.failed.push((*id, e.to_string()));
                    false
                }
            });

            progress.on_wait_tick(tracked.len());
            if tracked.is_empty() {
                break;
            }

            let elapsed = start.elapsed();
            if elapsed >= self.deadline {
                log::warn!(
                    "gave up after {}s with {} still pending",
                    elapsed.as_secs(),
                    tracked.len()
                );
                report.pending = std::mem::take(&mut tracked);
                break;
            }

            thread::sleep(self.interval.min(self.deadline - elapsed));
        }

        report.elapsed = start.elapsed();
        progress.on_wait_complete(&report);
        report
    }
}
