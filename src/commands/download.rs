//! `aapsync download`

use anyhow::{Context as AnyhowContext, Result};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use syncgraph::{Collector, DirectorySink, ResourceKind, SyncReport};

use crate::Context;
use crate::cli::DownloadArgs;
use crate::paths;
use crate::progress::TerminalProgress;
use crate::ui;

/// File written to the output root after a download.
pub const SUMMARY_FILE: &str = "_summary.json";

/// Contents of [`SUMMARY_FILE`].
#[derive(Debug, Serialize)]
pub struct DownloadSummary {
    pub timestamp: String,
    pub controller: String,
    pub roots: Vec<String>,
    /// Fetched documents per kind directory
    pub counts: BTreeMap<String, usize>,
    pub failed: usize,
    /// Distinct resources reached from the roots
    pub resources: usize,
    pub files: usize,
}

impl DownloadSummary {
    pub fn new(controller: &str, roots: Vec<String>, report: &SyncReport, resources: usize, files: usize) -> Self {
        let counts = report
            .kinds()
            .filter(|(_, summary)| summary.fetched > 0)
            .map(|(kind, summary)| (kind.dir_name().to_string(), summary.fetched))
            .collect();
        Self {
            timestamp: Utc::now().to_rfc3339(),
            controller: controller.to_string(),
            roots,
            counts,
            failed: report.total().failed,
            resources,
            files,
        }
    }

    pub fn write(&self, root: &Path) -> Result<()> {
        fs::create_dir_all(root)?;
        let path = root.join(SUMMARY_FILE);
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content + "\n")
            .with_context(|| format!("Could not write {}", path.display()))?;
        Ok(())
    }
}

/// Explicit roots from flags.
fn roots(args: &DownloadArgs) -> Vec<(ResourceKind, u64)> {
    args.workflows
        .iter()
        .map(|id| (ResourceKind::WorkflowJobTemplate, *id))
        .chain(
            args.job_templates
                .iter()
                .map(|id| (ResourceKind::JobTemplate, *id)),
        )
        .collect()
}

pub fn run(ctx: &Context, args: DownloadArgs) -> Result<()> {
    let settings = super::settings(ctx)?;
    let client = super::connect(ctx, &settings)?;
    let output = paths::expand(&args.output);
    fs::create_dir_all(&output)
        .with_context(|| format!("Could not create {}", output.display()))?;

    let mut sink = DirectorySink::new(&output);
    let mut progress = TerminalProgress::new(ctx.verbose, ctx.quiet);

    let (report, root_labels, resources) = {
        let mut collector = Collector::new(&client, &mut sink);
        let labels = if args.has_roots() {
            let roots = roots(&args);
            collector.collect_roots(&roots, &mut progress);
            roots.iter().map(|(kind, id)| format!("{kind} {id}")).collect()
        } else {
            let count = collector
                .collect_all_workflows(&mut progress)
                .context("Could not list workflow job templates")?;
            vec![format!("all {count} workflow job templates")]
        };
        let resources = collector.visited().len();
        (collector.into_report(), labels, resources)
    };

    let summary = DownloadSummary::new(
        &settings.controller.host,
        root_labels,
        &report,
        resources,
        sink.written(),
    );
    summary.write(&output)?;

    ui::print_report("Download", &report);
    ui::kv("Output", &output.display().to_string());
    ui::kv("Resources", &resources.to_string());
    ui::kv("Files", &sink.written().to_string());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncgraph::ApplyResult;
    use tempfile::TempDir;

    #[test]
    fn test_roots_keep_flag_order() {
        let args = DownloadArgs {
            output: "out".to_string(),
            workflows: vec![4],
            job_templates: vec![7, 8],
        };
        assert_eq!(
            roots(&args),
            vec![
                (ResourceKind::WorkflowJobTemplate, 4),
                (ResourceKind::JobTemplate, 7),
                (ResourceKind::JobTemplate, 8),
            ]
        );
    }

    #[test]
    fn test_summary_file() {
        let temp = TempDir::new().unwrap();
        let mut report = SyncReport::new();
        report.record(ResourceKind::JobTemplate, &ApplyResult::Fetched);
        report.record(ResourceKind::JobTemplate, &ApplyResult::Fetched);
        report.record(ResourceKind::Project, &ApplyResult::failed("HTTP 500"));

        let summary = DownloadSummary::new("http://awx", vec!["all 1 workflow job templates".into()], &report, 3, 5);
        summary.write(temp.path()).unwrap();

        let content = fs::read_to_string(temp.path().join(SUMMARY_FILE)).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed["counts"]["job_templates"], 2);
        assert!(parsed["counts"].get("projects").is_none());
        assert_eq!(parsed["failed"], 1);
        assert_eq!(parsed["resources"], 3);
        assert_eq!(parsed["files"], 5);
        assert!(parsed["timestamp"].as_str().is_some());
    }
}
