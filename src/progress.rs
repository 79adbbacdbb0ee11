//! Terminal progress and confirmation for the sync engines.

use anyhow::Result;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use syncgraph::{ApplyResult, ConfirmCallback, ProgressCallback, ResourceKind, WaitReport};

const BAR_TEMPLATE: &str = "{spinner:.green} {prefix:<24} [{bar:30.cyan/blue}] {pos}/{len} {msg}";
const SPINNER_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] {msg}";

/// Symbol shown next to a finished resource.
pub fn symbol(result: &ApplyResult) -> &'static str {
    match result {
        ApplyResult::NoChange => "○",
        ApplyResult::Created | ApplyResult::Removed | ApplyResult::Fetched => "✓",
        ApplyResult::Failed { .. } => "✗",
        ApplyResult::Skipped { .. } => "⊘",
    }
}

/// Per-kind progress bars and a spinner while waiting for project syncs.
///
/// Failures are always printed; other outcomes only with `-v`.
pub struct TerminalProgress {
    current: Option<(ResourceKind, ProgressBar)>,
    spinner: Option<ProgressBar>,
    verbose: bool,
    quiet: bool,
}

impl TerminalProgress {
    pub fn new(verbose: u8, quiet: bool) -> Self {
        Self {
            current: None,
            spinner: None,
            verbose: verbose > 0,
            quiet,
        }
    }

    fn bar(&self, kind: ResourceKind, count: usize) -> ProgressBar {
        if self.quiet {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(count as u64);
        if let Ok(style) = ProgressStyle::default_bar().template(BAR_TEMPLATE) {
            pb.set_style(style.progress_chars("=>-"));
        }
        pb.set_prefix(kind.to_string());
        pb
    }

    fn print(&self, line: String) {
        match &self.current {
            Some((_, pb)) => pb.suspend(|| println!("{line}")),
            None => println!("{line}"),
        }
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_kind_start(&mut self, kind: ResourceKind, count: usize) {
        if count > 0 {
            self.current = Some((kind, self.bar(kind, count)));
        }
    }

    fn on_resource_start(&mut self, _kind: ResourceKind, key: &str) {
        if let Some((_, pb)) = &self.current {
            pb.set_message(key.to_string());
        }
    }

    fn on_resource_complete(&mut self, kind: ResourceKind, key: &str, result: &ApplyResult) {
        match result {
            ApplyResult::Failed { error } => {
                self.print(format!("  {} {kind} '{key}': {}", "✗".red(), error));
            }
            ApplyResult::Skipped { reason } if self.verbose => {
                self.print(format!("  {} {kind} '{key}' ({})", "⊘".yellow(), reason.dimmed()));
            }
            other if self.verbose && !self.quiet => {
                self.print(format!("  {} {kind} '{key}'", symbol(other)));
            }
            _ => {}
        }

        if let Some((current, pb)) = &self.current
            && *current == kind
        {
            pb.inc(1);
        }
    }

    fn on_kind_complete(&mut self, _kind: ResourceKind) {
        if let Some((_, pb)) = self.current.take() {
            pb.finish_and_clear();
        }
    }

    fn on_wait_start(&mut self, count: usize) {
        if self.quiet {
            return;
        }
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template(SPINNER_TEMPLATE) {
            pb.set_style(style);
        }
        pb.enable_steady_tick(Duration::from_millis(120));
        pb.set_message(format!("Waiting for {count} project sync(s)..."));
        self.spinner = Some(pb);
    }

    fn on_wait_tick(&mut self, pending: usize) {
        if let Some(pb) = &self.spinner {
            pb.set_message(format!("{pending} project sync(s) still running..."));
        }
    }

    fn on_wait_complete(&mut self, _report: &WaitReport) {
        if let Some(pb) = self.spinner.take() {
            pb.finish_and_clear();
        }
    }
}

/// Prompts with `dialoguer`, or confirms everything when `--yes` was given.
pub struct PromptConfirm {
    yes: bool,
}

impl PromptConfirm {
    pub fn new(yes: bool) -> Self {
        Self { yes }
    }
}

impl ConfirmCallback for PromptConfirm {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        if self.yes {
            return Ok(true);
        }

        let confirmed = dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()?;

        Ok(confirmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbols() {
        assert_eq!(symbol(&ApplyResult::Created), "✓");
        assert_eq!(symbol(&ApplyResult::NoChange), "○");
        assert_eq!(symbol(&ApplyResult::failed("boom")), "✗");
        assert_eq!(symbol(&ApplyResult::skipped("absent")), "⊘");
    }

    #[test]
    fn test_yes_skips_prompt() {
        let mut confirm = PromptConfirm::new(true);
        assert!(confirm.confirm("Delete everything?").unwrap());
    }

    #[test]
    fn test_quiet_progress_tracks_kind() {
        let mut progress = TerminalProgress::new(0, true);
        progress.on_kind_start(ResourceKind::Project, 2);
        progress.on_resource_start(ResourceKind::Project, "Demo");
        progress.on_resource_complete(ResourceKind::Project, "Demo", &ApplyResult::Created);
        let position = progress.current.as_ref().map(|(_, pb)| pb.position());
        assert_eq!(position, Some(1));
        progress.on_kind_complete(ResourceKind::Project);
        assert!(progress.current.is_none());
    }
}
