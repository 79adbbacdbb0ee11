//! Outcome types shared by the provisioner, decommissioner and collector.

use crate::kind::ResourceKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Result of syncing a single resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyResult {
    /// Already present; nothing was sent
    NoChange,
    /// Resource, membership or edge was created
    Created,
    /// Resource was deleted or unlinked
    Removed,
    /// Resource was downloaded
    Fetched,
    /// Operation failed for this resource only
    Failed { error: String },
    /// Operation was skipped (absent, protected, unresolved edge)
    Skipped { reason: String },
}

impl ApplyResult {
    /// Create a failure from any error.
    pub fn failed(error: impl std::fmt::Display) -> Self {
        Self::Failed {
            error: error.to_string(),
        }
    }

    /// Create a skip with a reason.
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }
}

/// Counts of results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub created: usize,
    pub no_change: usize,
    pub removed: usize,
    pub fetched: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl SyncSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.removed
    }

    /// Check if execution was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Total number of resources processed
    pub fn total(&self) -> usize {
        self.created + self.no_change + self.removed + self.fetched + self.skipped + self.failed
    }

    /// Merge another summary into this one
    pub fn merge(&mut self, other: &SyncSummary) {
        self.created += other.created;
        self.no_change += other.no_change;
        self.removed += other.removed;
        self.fetched += other.fetched;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, result: &ApplyResult) {
        match result {
            ApplyResult::NoChange => self.no_change += 1,
            ApplyResult::Created => self.created += 1,
            ApplyResult::Removed => self.removed += 1,
            ApplyResult::Fetched => self.fetched += 1,
            ApplyResult::Failed { .. } => self.failed += 1,
            ApplyResult::Skipped { .. } => self.skipped += 1,
        }
    }
}

/// Per-kind summaries in processing order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncReport {
    kinds: Vec<(ResourceKind, SyncSummary)>,
}

impl SyncReport {
    /// Create an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure a kind appears in the report, even with no results.
    pub fn touch(&mut self, kind: ResourceKind) -> &mut SyncSummary {
        let index = match self.kinds.iter().position(|(k, _)| *k == kind) {
            Some(index) => index,
            None => {
                self.kinds.push((kind, SyncSummary::default()));
                self.kinds.len() - 1
            }
        };
        &mut self.kinds[index].1
    }

    /// Record one result for a kind.
    pub fn record(&mut self, kind: ResourceKind, result: &ApplyResult) {
        self.touch(kind).add_result(result);
    }

    /// Summary of one kind.
    pub fn summary(&self, kind: ResourceKind) -> SyncSummary {
        self.kinds
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, s)| *s)
            .unwrap_or_default()
    }

    /// Kinds in the order they were processed.
    pub fn kinds(&self) -> impl Iterator<Item = &(ResourceKind, SyncSummary)> {
        self.kinds.iter()
    }

    /// Totals across all kinds.
    pub fn total(&self) -> SyncSummary {
        let mut total = SyncSummary::default();
        for (_, summary) in &self.kinds {
            total.merge(summary);
        }
        total
    }
}

/// Options for a provisioning run
#[derive(Debug, Clone)]
pub struct ProvisionOptions {
    /// Wait for project syncs before creating job templates
    pub wait_for_projects: bool,
    /// Give up waiting after this long
    pub sync_deadline: Duration,
    /// Delay between status polls
    pub poll_interval: Duration,
}

impl Default for ProvisionOptions {
    fn default() -> Self {
        Self {
            wait_for_projects: true,
            sync_deadline: Duration::from_secs(120),
            poll_interval: Duration::from_secs(3),
        }
    }
}
