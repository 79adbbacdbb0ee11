//! Progress and confirmation callbacks
//!
//! These traits keep the engines free of any particular terminal UI.

use crate::kind::ResourceKind;
use crate::types::{ApplyResult, SyncReport};
use crate::waiter::WaitReport;
use anyhow::Result;

/// Progress callback for sync operations
///
/// Implement this trait to receive progress updates during a run.
pub trait ProgressCallback {
    /// Called when starting to process a kind
    fn on_kind_start(&mut self, kind: ResourceKind, count: usize);

    /// Called when starting to process a single resource
    fn on_resource_start(&mut self, kind: ResourceKind, key: &str);

    /// Called when a resource completes
    fn on_resource_complete(&mut self, kind: ResourceKind, key: &str, result: &ApplyResult);

    /// Called when a kind completes
    fn on_kind_complete(&mut self, kind: ResourceKind);

    /// Called before the first status poll
    fn on_wait_start(&mut self, _count: usize) {}

    /// Called after each polling round with the number still pending
    fn on_wait_tick(&mut self, _pending: usize) {}

    /// Called when waiting ends
    fn on_wait_complete(&mut self, _report: &WaitReport) {}
}

/// Confirmation callback for user interaction
pub trait ConfirmCallback {
    /// Ask the user to confirm an action
    ///
    /// # Returns
    /// `true` if the user confirmed, `false` otherwise
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_kind_start(&mut self, _kind: ResourceKind, _count: usize) {}
    fn on_resource_start(&mut self, _kind: ResourceKind, _key: &str) {}
    fn on_resource_complete(&mut self, _kind: ResourceKind, _key: &str, _result: &ApplyResult) {}
    fn on_kind_complete(&mut self, _kind: ResourceKind) {}
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}

/// Runs per-instance operations, isolating failures and recording results.
pub(crate) struct Tally<'r, P: ProgressCallback> {
    pub report: &'r mut SyncReport,
    pub progress: &'r mut P,
}

impl<'r, P: ProgressCallback> Tally<'r, P> {
    pub fn new(report: &'r mut SyncReport, progress: &'r mut P) -> Self {
        Self { report, progress }
    }

    /// Run one operation. An error becomes `Failed` and never propagates.
    pub fn apply<F>(&mut self, kind: ResourceKind, key: &str, op: F) -> ApplyResult
    where
        F: FnOnce() -> crate::error::Result<ApplyResult>,
    {
        self.progress.on_resource_start(kind, key);
        let result = match op() {
            Ok(result) => result,
            Err(e) => {
                log::warn!("{kind} '{key}': {e}");
                ApplyResult::failed(e)
            }
        };
        if let ApplyResult::Skipped { reason } = &result {
            log::info!("{kind} '{key}' skipped: {reason}");
        }
        self.progress.on_resource_complete(kind, key, &result);
        self.report.record(kind, &result);
        result
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Progress callback that records every event.
    #[derive(Debug, Default)]
    pub struct RecordingProgress {
        pub kinds: Vec<ResourceKind>,
        pub completed: Vec<(ResourceKind, String, ApplyResult)>,
        pub ticks: Vec<usize>,
    }

    impl ProgressCallback for RecordingProgress {
        fn on_kind_start(&mut self, kind: ResourceKind, _count: usize) {
            self.kinds.push(kind);
        }
        fn on_resource_start(&mut self, _kind: ResourceKind, _key: &str) {}
        fn on_resource_complete(&mut self, kind: ResourceKind, key: &str, result: &ApplyResult) {
            self.completed.push((kind, key.to_string(), result.clone()));
        }
        fn on_kind_complete(&mut self, _kind: ResourceKind) {}
        fn on_wait_tick(&mut self, pending: usize) {
            self.ticks.push(pending);
        }
    }
}
