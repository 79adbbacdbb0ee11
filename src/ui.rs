use colored::Colorize;
use syncgraph::{SyncReport, SyncSummary, WaitReport, WaitState};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Reports
// ============================================================================

/// Non-zero counts of a summary, e.g. `3 created, 1 failed`.
pub fn summary_line(summary: &SyncSummary) -> String {
    let parts: Vec<String> = [
        (summary.created, "created"),
        (summary.no_change, "unchanged"),
        (summary.removed, "removed"),
        (summary.fetched, "fetched"),
        (summary.skipped, "skipped"),
        (summary.failed, "failed"),
    ]
    .into_iter()
    .filter(|(count, _)| *count > 0)
    .map(|(count, label)| format!("{count} {label}"))
    .collect();

    if parts.is_empty() {
        "nothing to do".to_string()
    } else {
        parts.join(", ")
    }
}

/// Per-kind table followed by totals.
pub fn print_report(title: &str, report: &SyncReport) {
    header(title);
    for (kind, summary) in report.kinds() {
        let symbol = if summary.failed > 0 {
            "✗".red()
        } else if summary.total_changes() > 0 || summary.fetched > 0 {
            "✓".green()
        } else {
            "○".dimmed()
        };
        println!("  {} {:<24} {}", symbol, kind.to_string(), summary_line(summary));
    }

    let total = report.total();
    println!();
    if total.is_success() {
        println!("  {} {}", "✓".green().bold(), summary_line(&total));
    } else {
        println!("  {} {}", "⚠".yellow().bold(), summary_line(&total));
    }
}

/// Lines describing a project-sync wait, each tagged with the state it reports.
///
/// Finished, failed and still-running syncs are all listed whatever the
/// overall outcome.
pub fn wait_lines(report: &WaitReport) -> Vec<(WaitState, String)> {
    let secs = report.elapsed.as_secs();
    let mut lines = Vec::new();
    if !report.succeeded.is_empty() || report.state() == WaitState::Succeeded {
        lines.push((
            WaitState::Succeeded,
            format!("{} project sync(s) finished in {secs}s", report.succeeded.len()),
        ));
    }
    for (id, status) in &report.failed {
        lines.push((
            WaitState::Failed,
            format!("project {id} sync ended with status '{status}'"),
        ));
    }
    if !report.pending.is_empty() {
        lines.push((
            WaitState::TimedOut,
            format!(
                "gave up after {secs}s with {} project sync(s) still running",
                report.pending.len()
            ),
        ));
    }
    lines
}

/// Outcome of a project-sync wait.
pub fn print_wait(report: &WaitReport) {
    for (state, line) in wait_lines(report) {
        if state == WaitState::Succeeded {
            success(&line);
        } else {
            warn(&line);
        }
    }
}
