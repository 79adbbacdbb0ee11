//! Dependency-Closure Collector: download resources and everything they
//! reference, each exactly once.
//!
//! Traversal is depth-first. A single per-kind extractor table says which
//! fields of a fetched document point at other resources; the visited set is
//! checked before every fetch and is the only cycle guard.

use crate::context::ProgressCallback;
use crate::error::{Result, SyncError};
use crate::kind::ResourceKind;
use crate::sink::AssetSink;
use crate::types::{ApplyResult, SyncReport};
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use towerkit::Client;

/// Placeholder written in place of secret values.
pub const REDACTED: &str = "$redacted$";

/// Remote ids already fetched, per kind.
#[derive(Debug, Default)]
pub struct VisitedSet {
    seen: HashMap<ResourceKind, HashSet<u64>>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `(kind, id)` visited. Returns `false` if it already was.
    pub fn insert(&mut self, kind: ResourceKind, id: u64) -> bool {
        self.seen.entry(kind).or_default().insert(id)
    }

    pub fn len(&self) -> usize {
        self.seen.values().map(HashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Replace every value of a credential's `inputs` with [`REDACTED`].
pub fn redact(document: &mut Value) {
    if let Some(inputs) = document.get_mut("inputs").and_then(Value::as_object_mut) {
        for value in inputs.values_mut() {
            *value = json!(REDACTED);
        }
    }
}

/// References held by a fetched document.
fn references(kind: ResourceKind, document: &Value) -> Vec<(ResourceKind, u64)> {
    let field = |name: &str| document.get(name).and_then(Value::as_u64);
    let candidates: Vec<(ResourceKind, Option<u64>)> = match kind {
        ResourceKind::Organization => vec![(ResourceKind::ExecutionEnvironment, field("default_environment"))],
        ResourceKind::Team => vec![(ResourceKind::Organization, field("organization"))],
        ResourceKind::Credential => vec![
            (ResourceKind::Organization, field("organization")),
            (ResourceKind::CredentialType, field("credential_type")),
        ],
        ResourceKind::ExecutionEnvironment => vec![
            (ResourceKind::Organization, field("organization")),
            (ResourceKind::Credential, field("credential")),
        ],
        ResourceKind::Project => vec![
            (ResourceKind::Organization, field("organization")),
            (
                ResourceKind::Credential,
                field("credential").or_else(|| {
                    document
                        .pointer("/summary_fields/credential/id")
                        .and_then(Value::as_u64)
                }),
            ),
        ],
        ResourceKind::Inventory => vec![(ResourceKind::Organization, field("organization"))],
        ResourceKind::JobTemplate => {
            let mut refs = vec![
                (ResourceKind::Organization, field("organization")),
                (ResourceKind::Project, field("project")),
                (ResourceKind::Inventory, field("inventory")),
                (ResourceKind::ExecutionEnvironment, field("execution_environment")),
            ];
            let credentials = document
                .pointer("/summary_fields/credentials")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .map(|c| (ResourceKind::Credential, c.get("id").and_then(Value::as_u64)));
            refs.extend(credentials);
            refs
        }
        ResourceKind::WorkflowJobTemplate => vec![(ResourceKind::Organization, field("organization"))],
        _ => Vec::new(),
    };

    candidates
        .into_iter()
        .filter_map(|(kind, id)| id.map(|id| (kind, id)))
        .collect()
}

/// Job template run by a workflow node, if the node runs one.
fn node_job_template(node: &Value) -> Option<u64> {
    if let Some(url) = node
        .pointer("/related/unified_job_template")
        .and_then(Value::as_str)
        && url.contains("/job_templates/")
    {
        return url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .and_then(|id| id.parse().ok());
    }

    let summary = node.pointer("/summary_fields/unified_job_template")?;
    if summary.get("unified_job_type").and_then(Value::as_str) == Some("job") {
        summary.get("id").and_then(Value::as_u64)
    } else {
        None
    }
}

/// How an attachment is read and when it counts as empty.
#[derive(Debug, Clone, Copy)]
enum Attachment {
    /// Paginated sub-list; empty when it has no items
    List(&'static str),
    /// Survey spec; empty when it has no questions
    Survey,
}

fn attachments(kind: ResourceKind) -> &'static [(&'static str, Attachment)] {
    match kind {
        ResourceKind::WorkflowJobTemplate => &[
            ("nodes", Attachment::List("workflow_nodes/")),
            ("survey", Attachment::Survey),
        ],
        ResourceKind::JobTemplate => &[("survey", Attachment::Survey)],
        ResourceKind::Inventory => &[("sources", Attachment::List("inventory_sources/"))],
        _ => &[],
    }
}

/// Walks the reference graph from a set of roots into an [`AssetSink`].
pub struct Collector<'a, S: AssetSink> {
    client: &'a Client,
    sink: &'a mut S,
    visited: VisitedSet,
    report: SyncReport,
}

impl<'a, S: AssetSink> Collector<'a, S> {
    pub fn new(client: &'a Client, sink: &'a mut S) -> Self {
        Self {
            client,
            sink,
            visited: VisitedSet::new(),
            report: SyncReport::new(),
        }
    }

    /// Collect one root and its closure.
    pub fn collect<P: ProgressCallback>(&mut self, kind: ResourceKind, id: u64, progress: &mut P) {
        self.visit(kind, id, progress);
    }

    /// Collect several roots, sharing one visited set.
    pub fn collect_roots<P: ProgressCallback>(&mut self, roots: &[(ResourceKind, u64)], progress: &mut P) {
        for (kind, id) in roots {
            self.visit(*kind, *id, progress);
        }
    }

    /// Collect every workflow job template on the controller.
    ///
    /// # Errors
    ///
    /// Fails only if the workflow list itself cannot be read.
    pub fn collect_all_workflows<P: ProgressCallback>(&mut self, progress: &mut P) -> Result<usize> {
        let kind = ResourceKind::WorkflowJobTemplate;
        let workflows = self
            .client
            .list_all("workflow_job_templates/", &[])
            .map_err(|e| SyncError::remote(kind, "*", e))?;
        let ids: Vec<u64> = workflows.iter().filter_map(crate::upsert::id_of).collect();

        progress.on_kind_start(kind, ids.len());
        for id in &ids {
            self.visit(kind, *id, progress);
        }
        progress.on_kind_complete(kind);
        Ok(ids.len())
    }

    /// Everything visited so far.
    pub fn visited(&self) -> &VisitedSet {
        &self.visited
    }

    pub fn into_report(self) -> SyncReport {
        self.report
    }

    fn visit<P: ProgressCallback>(&mut self, kind: ResourceKind, id: u64, progress: &mut P) {
        if !self.visited.insert(kind, id) {
            log::trace!("{kind} {id} already collected");
            return;
        }

        let key = id.to_string();
        progress.on_resource_start(kind, &key);
        let (result, refs) = match self.fetch(kind, id) {
            Ok(refs) => (ApplyResult::Fetched, refs),
            Err(e) => {
                log::warn!("{kind} {id}: {e}; its dependencies are not collected");
                (ApplyResult::failed(e), Vec::new())
            }
        };
        progress.on_resource_complete(kind, &key, &result);
        self.report.record(kind, &result);

        for (dep_kind, dep_id) in refs {
            self.visit(dep_kind, dep_id, progress);
        }
    }

    /// Fetch and persist one document with its attachments; return its references.
    fn fetch(&mut self, kind: ResourceKind, id: u64) -> Result<Vec<(ResourceKind, u64)>> {
        let endpoint = kind
            .endpoint()
            .ok_or_else(|| SyncError::InvalidReference(format!("{kind} cannot be downloaded")))?;
        let path = format!("{endpoint}{id}/");

        let mut document = self
            .client
            .get_json(&path, &[])
            .map_err(|e| SyncError::remote(kind, id, e))?;
        if kind == ResourceKind::Credential {
            redact(&mut document);
        }

        let mut refs = references(kind, &document);
        self.sink.write(kind, &document, None)?;
        log::debug!("collected {kind} {id}");

        let name = document.get("name").cloned().unwrap_or(Value::Null);
        for (label, attachment) in attachments(kind) {
            let Some(content) = self.attachment(&path, *attachment) else {
                continue;
            };
            if *label == "nodes" {
                refs.extend(
                    content
                        .as_array()
                        .into_iter()
                        .flatten()
                        .filter_map(node_job_template)
                        .map(|jt| (ResourceKind::JobTemplate, jt)),
                );
            }
            let mut wrapped = json!({"id": id, "name": name});
            wrapped[*label] = content;
            self.sink.write(kind, &wrapped, Some(*label))?;
        }

        Ok(refs)
    }

    /// Read an attachment best-effort. `None` when absent, empty or unreadable.
    fn attachment(&self, owner: &str, attachment: Attachment) -> Option<Value> {
        let read = match attachment {
            Attachment::List(sub) => self
                .client
                .list_all(&format!("{owner}{sub}"), &[])
                .map(|items| (!items.is_empty()).then(|| Value::Array(items))),
            Attachment::Survey => self
                .client
                .get_json(&format!("{owner}survey_spec/"), &[])
                .map(|survey| {
                    let has_questions = survey
                        .get("spec")
                        .and_then(Value::as_array)
                        .is_some_and(|q| !q.is_empty());
                    has_questions.then_some(survey)
                }),
        };

        match read {
            Ok(content) => content,
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                log::warn!("{owner}: attachment not collected: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NoProgress;
    use crate::sink::{DirectorySink, MemorySink};
    use std::fs;
    use tempfile::TempDir;
    use towerkit::{Method, MockTransport};

    fn client(mock: &MockTransport) -> Client {
        Client::new(Box::new(mock.clone()))
    }

    /// Organization and execution environment point at each other; two
    /// job templates share a project, an inventory and a credential.
    fn graph() -> MockTransport {
        let mock = MockTransport::new();
        let org = mock.insert("organizations", json!({"name": "Org", "default_environment": 1}));
        let ee = mock.insert("execution_environments", json!({"name": "EE", "organization": org}));
        let ct = mock.insert("credential_types", json!({"name": "Machine"}));
        let cred = mock.insert(
            "credentials",
            json!({
                "name": "Machine Cred",
                "organization": org,
                "credential_type": ct,
                "inputs": {"username": "admin", "password": "s3cret"},
            }),
        );
        let project = mock.insert(
            "projects",
            json!({"name": "Playbooks", "organization": org, "credential": cred, "status": "successful"}),
        );
        let inv = mock.insert("inventories", json!({"name": "Lab", "organization": org}));
        let build = mock.insert(
            "job_templates",
            json!({"name": "Build", "organization": org, "project": project, "inventory": inv, "execution_environment": ee}),
        );
        let deploy = mock.insert(
            "job_templates",
            json!({"name": "Deploy", "organization": org, "project": project, "inventory": inv}),
        );
        mock.link("job_templates", build, "credentials", cred);
        mock.link("job_templates", deploy, "credentials", cred);

        let wf = mock.insert("workflow_job_templates", json!({"name": "Pipeline", "organization": org}));
        mock.insert(
            "workflow_job_template_nodes",
            json!({"workflow_job_template": wf, "unified_job_template": build, "identifier": "build"}),
        );
        mock.insert(
            "workflow_job_template_nodes",
            json!({"workflow_job_template": wf, "unified_job_template": deploy, "identifier": "deploy"}),
        );
        mock
    }

    #[test]
    fn test_closure_visits_each_resource_once() {
        let mock = graph();
        let client = client(&mock);
        let mut sink = MemorySink::new();
        let mut collector = Collector::new(&client, &mut sink);

        collector.collect(ResourceKind::WorkflowJobTemplate, 1, &mut NoProgress);
        assert_eq!(collector.visited().len(), 9);
        let report = collector.into_report();

        assert_eq!(report.total().fetched, 9);
        assert_eq!(report.total().failed, 0);
        for kind in [
            ResourceKind::Organization,
            ResourceKind::ExecutionEnvironment,
            ResourceKind::CredentialType,
            ResourceKind::Credential,
            ResourceKind::Project,
            ResourceKind::Inventory,
            ResourceKind::WorkflowJobTemplate,
        ] {
            assert_eq!(sink.of_kind(kind).len(), 1, "{kind}");
        }
        assert_eq!(sink.of_kind(ResourceKind::JobTemplate).len(), 2);

        let org_fetches = mock
            .requests()
            .iter()
            .filter(|(m, p)| *m == Method::Get && p == "organizations/1/")
            .count();
        assert_eq!(org_fetches, 1);
    }

    #[test]
    fn test_credentials_are_redacted() {
        let mock = graph();
        let client = client(&mock);
        let mut sink = MemorySink::new();
        Collector::new(&client, &mut sink).collect(ResourceKind::Credential, 1, &mut NoProgress);

        let credential = sink.of_kind(ResourceKind::Credential)[0];
        assert_eq!(credential["inputs"]["password"], REDACTED);
        assert_eq!(credential["inputs"]["username"], REDACTED);
        assert!(!credential.to_string().contains("s3cret"));
    }

    #[test]
    fn test_failed_dependency_does_not_stop_siblings() {
        let mock = MockTransport::new();
        let org = mock.insert("organizations", json!({"name": "Org"}));
        let project = mock.insert("projects", json!({"name": "P", "organization": org}));
        mock.insert(
            "job_templates",
            json!({"name": "JT", "organization": org, "project": project, "inventory": 42}),
        );
        let client = client(&mock);
        let mut sink = MemorySink::new();
        let mut collector = Collector::new(&client, &mut sink);

        collector.collect(ResourceKind::JobTemplate, 1, &mut NoProgress);
        let report = collector.into_report();

        assert_eq!(report.summary(ResourceKind::Inventory).failed, 1);
        assert_eq!(report.summary(ResourceKind::Project).fetched, 1);
        assert_eq!(report.summary(ResourceKind::Organization).fetched, 1);
        assert_eq!(sink.of_kind(ResourceKind::Project).len(), 1);
    }

    #[test]
    fn test_workflow_nodes_attachment_and_empty_attachments_skipped() {
        let mock = graph();
        mock.insert("inventory_sources", json!({"name": "cloud", "inventory": 1}));
        let client = client(&mock);
        let mut sink = MemorySink::new();
        Collector::new(&client, &mut sink).collect(ResourceKind::WorkflowJobTemplate, 1, &mut NoProgress);

        let nodes = sink.attachment(ResourceKind::WorkflowJobTemplate, 1, "nodes").unwrap();
        assert_eq!(nodes["nodes"].as_array().unwrap().len(), 2);
        assert!(sink.attachment(ResourceKind::Inventory, 1, "sources").is_some());
        assert!(sink.attachment(ResourceKind::JobTemplate, 1, "survey").is_none());
    }

    #[test]
    fn test_node_job_template_detection() {
        let by_url = json!({"related": {"unified_job_template": "/api/v2/job_templates/12/"}});
        assert_eq!(node_job_template(&by_url), Some(12));

        let by_summary = json!({"summary_fields": {"unified_job_template": {"id": 4, "unified_job_type": "job"}}});
        assert_eq!(node_job_template(&by_summary), Some(4));

        let approval = json!({
            "related": {"unified_job_template": "/api/v2/workflow_approval_templates/3/"},
            "summary_fields": {"unified_job_template": {"id": 3, "unified_job_type": "workflow_approval"}},
        });
        assert_eq!(node_job_template(&approval), None);
    }

    #[test]
    fn test_collect_all_workflows_shares_visited_set() {
        let mock = graph();
        let wf = mock.insert("workflow_job_templates", json!({"name": "Second", "organization": 1}));
        mock.insert(
            "workflow_job_template_nodes",
            json!({"workflow_job_template": wf, "unified_job_template": 1}),
        );
        let client = client(&mock);
        let mut sink = MemorySink::new();
        let mut collector = Collector::new(&client, &mut sink);

        let roots = collector.collect_all_workflows(&mut NoProgress).unwrap();
        assert_eq!(roots, 2);
        drop(collector);
        assert_eq!(sink.of_kind(ResourceKind::JobTemplate).len(), 2);
        assert_eq!(sink.of_kind(ResourceKind::WorkflowJobTemplate).len(), 2);
    }

    #[test]
    fn test_directory_output() {
        let mock = graph();
        let temp = TempDir::new().unwrap();
        let client = client(&mock);
        let mut sink = DirectorySink::new(temp.path());
        Collector::new(&client, &mut sink).collect(ResourceKind::WorkflowJobTemplate, 1, &mut NoProgress);

        let wf_dir = temp.path().join("workflow_job_templates");
        assert!(wf_dir.join("001_Pipeline.json").exists());
        assert!(wf_dir.join("001_Pipeline_nodes.json").exists());

        let credential = fs::read_to_string(temp.path().join("credentials/001_Machine Cred.json")).unwrap();
        assert!(credential.contains(REDACTED));
        assert!(!credential.contains("s3cret"));
    }
}
