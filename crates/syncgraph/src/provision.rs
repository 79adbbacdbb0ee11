//! Ordered Provisioner: create a declared resource graph on a controller.
//!
//! Kinds are processed in [`PROVISION_ORDER`]; every instance goes through
//! the idempotent upsert, so a re-run against a populated controller
//! creates nothing. A failing instance is recorded and the run continues.
//! Workflows are built in two phases: every node first, then every edge.

use crate::cache::{Cache, ResourceKey};
use crate::context::{ProgressCallback, Tally};
use crate::error::{Result, SyncError};
use crate::kind::{PROVISION_ORDER, ResourceKind};
use crate::manifest::{
    CredentialSpec, CredentialTypeSpec, EdgeSpec, ExecutionEnvironmentSpec, GroupSpec, HostSpec,
    InventorySpec, JobTemplateSpec, Manifest, OrganizationSpec, ProjectSpec, RoleAssignmentSpec,
    TeamSpec, UserSpec, WorkflowNodeSpec, WorkflowSpec, table_to_json, variables_string,
};
use crate::types::{ApplyResult, ProvisionOptions, SyncReport};
use crate::upsert::{Resolver, id_of};
use crate::waiter::{WaitReport, Waiter};
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use towerkit::{Client, ResponseClass};

/// Outcome of a provisioning run.
#[derive(Debug, Clone, Default)]
pub struct ProvisionReport {
    pub report: SyncReport,
    /// Project sync wait, when one happened
    pub wait: Option<WaitReport>,
}

/// Node ids keyed by (workflow name, node identifier).
#[derive(Debug, Default)]
struct NodeTable {
    ids: HashMap<(String, String), u64>,
}

impl NodeTable {
    fn insert(&mut self, workflow: &str, identifier: &str, id: u64) {
        self.ids
            .insert((workflow.to_string(), identifier.to_string()), id);
    }

    fn get(&self, workflow: &str, identifier: &str) -> Option<u64> {
        self.ids
            .get(&(workflow.to_string(), identifier.to_string()))
            .copied()
    }
}

/// Provisions a [`Manifest`] in dependency order.
pub struct Provisioner<'a, C: Cache> {
    resolver: Resolver<'a, C>,
    options: ProvisionOptions,
    nodes: NodeTable,
    projects: Vec<u64>,
}

impl<'a, C: Cache> Provisioner<'a, C> {
    /// Create a provisioner over a client and a run-scoped cache.
    pub fn new(client: &'a Client, cache: &'a mut C, options: ProvisionOptions) -> Self {
        Self {
            resolver: Resolver::new(client, cache),
            options,
            nodes: NodeTable::default(),
            projects: Vec::new(),
        }
    }

    /// Provision every declared resource.
    ///
    /// Never fails as a whole: per-instance errors end up in the report.
    pub fn run<P: ProgressCallback>(&mut self, manifest: &Manifest, progress: &mut P) -> ProvisionReport {
        let mut outcome = ProvisionReport::default();

        for kind in PROVISION_ORDER {
            progress.on_kind_start(kind, manifest.count(kind));
            outcome.report.touch(kind);
            {
                let mut tally = Tally::new(&mut outcome.report, progress);
                self.provision_kind(kind, manifest, &mut tally);
            }
            progress.on_kind_complete(kind);

            if kind == ResourceKind::Project && self.options.wait_for_projects && !self.projects.is_empty() {
                outcome.wait = Some(self.wait_for_projects(progress));
            }
        }

        outcome
    }

    fn provision_kind<P: ProgressCallback>(
        &mut self,
        kind: ResourceKind,
        manifest: &Manifest,
        tally: &mut Tally<'_, P>,
    ) {
        match kind {
            ResourceKind::Organization => {
                for spec in &manifest.organizations {
                    tally.apply(kind, &spec.name, || self.organization(spec));
                }
            }
            ResourceKind::Team => {
                for spec in &manifest.teams {
                    let key = format!("{}/{}", spec.organization, spec.name);
                    tally.apply(kind, &key, || self.team(spec));
                }
            }
            ResourceKind::User => {
                for spec in &manifest.users {
                    tally.apply(kind, &spec.username, || self.user(spec));
                }
            }
            ResourceKind::CredentialType => {
                for spec in &manifest.credential_types {
                    tally.apply(kind, &spec.name, || self.credential_type(spec));
                }
            }
            ResourceKind::Credential => {
                for spec in &manifest.credentials {
                    tally.apply(kind, &spec.name, || self.credential(spec));
                }
            }
            ResourceKind::ExecutionEnvironment => {
                for spec in &manifest.execution_environments {
                    tally.apply(kind, &spec.name, || self.execution_environment(spec));
                }
            }
            ResourceKind::Project => {
                for spec in &manifest.projects {
                    tally.apply(kind, &spec.name, || self.project(spec));
                }
            }
            ResourceKind::Inventory => {
                for spec in &manifest.inventories {
                    tally.apply(kind, &spec.name, || self.inventory(spec));
                }
            }
            ResourceKind::Host => {
                for inventory in &manifest.inventories {
                    for spec in &inventory.hosts {
                        let key = format!("{}/{}", inventory.name, spec.name);
                        tally.apply(kind, &key, || self.host(inventory, spec));
                    }
                }
            }
            ResourceKind::Group => {
                for inventory in &manifest.inventories {
                    for spec in &inventory.groups {
                        let key = format!("{}/{}", inventory.name, spec.name);
                        tally.apply(kind, &key, || self.group(inventory, spec));
                    }
                }
            }
            ResourceKind::JobTemplate => {
                for spec in &manifest.job_templates {
                    tally.apply(kind, &spec.name, || self.job_template(spec));
                }
            }
            ResourceKind::WorkflowJobTemplate => {
                for spec in &manifest.workflow_job_templates {
                    tally.apply(kind, &spec.name, || self.workflow(spec));
                }
            }
            ResourceKind::WorkflowEdge => {
                for workflow in &manifest.workflow_job_templates {
                    for edge in workflow.edges() {
                        tally.apply(kind, &edge.key(), || self.edge(&edge));
                    }
                }
            }
            ResourceKind::RoleAssignment => {
                for spec in &manifest.role_assignments {
                    tally.apply(kind, &spec.key(), || self.role_assignment(spec));
                }
            }
        }
    }

    fn client(&self) -> &'a Client {
        self.resolver.client()
    }

    fn wait_for_projects<P: ProgressCallback>(&self, progress: &mut P) -> WaitReport {
        log::info!("waiting for {} project sync(s)", self.projects.len());
        let client = self.client();
        let waiter = Waiter::new(self.options.sync_deadline, self.options.poll_interval);
        waiter.wait(
            &self.projects,
            |id| {
                let project = client.get_json(&format!("projects/{id}/"), &[])?;
                Ok(project
                    .get("status")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string())
            },
            progress,
        )
    }

    fn upsert_named(&mut self, kind: ResourceKind, name: &str, payload: &Value) -> Result<(u64, ApplyResult)> {
        let key = ResourceKey::named(name);
        let lookup = self.resolver.lookup_for(kind, &key)?;
        let upserted = self.resolver.upsert(kind, &key, &lookup, payload)?;
        Ok((upserted.id, upserted.result))
    }

    fn organization(&mut self, spec: &OrganizationSpec) -> Result<ApplyResult> {
        let payload = json!({"name": spec.name, "description": spec.description});
        let (_, result) = self.upsert_named(ResourceKind::Organization, &spec.name, &payload)?;
        Ok(result)
    }

    fn team(&mut self, spec: &TeamSpec) -> Result<ApplyResult> {
        let key = ResourceKey::scoped(&spec.organization, &spec.name);
        let lookup = self.resolver.lookup_for(ResourceKind::Team, &key)?;
        let org = self
            .resolver
            .resolve(ResourceKind::Organization, &ResourceKey::named(&spec.organization))?;
        let payload = json!({
            "name": spec.name,
            "description": spec.description,
            "organization": org,
        });
        Ok(self.resolver.upsert(ResourceKind::Team, &key, &lookup, &payload)?.result)
    }

    fn user(&mut self, spec: &UserSpec) -> Result<ApplyResult> {
        let payload = json!({
            "username": spec.username,
            "password": spec.password,
            "first_name": spec.first_name,
            "last_name": spec.last_name,
            "email": spec.email,
            "is_superuser": spec.is_superuser,
        });
        let (id, mut result) = self.upsert_named(ResourceKind::User, &spec.username, &payload)?;

        if let Some(org) = &spec.organization {
            let org_id = self
                .resolver
                .resolve(ResourceKind::Organization, &ResourceKey::named(org))?;
            let path = format!("organizations/{org_id}/users/");
            result = changed(result, self.ensure_linked(ResourceKind::User, &spec.username, &path, id)?);
        }

        for team in &spec.teams {
            let team_id = self.resolver.resolve_team(spec.organization.as_deref(), team)?;
            let path = format!("teams/{team_id}/users/");
            result = changed(result, self.ensure_linked(ResourceKind::User, &spec.username, &path, id)?);
        }

        Ok(result)
    }

    fn credential_type(&mut self, spec: &CredentialTypeSpec) -> Result<ApplyResult> {
        let payload = json!({
            "name": spec.name,
            "description": spec.description,
            "kind": spec.kind,
            "inputs": table_to_json(&spec.inputs),
            "injectors": table_to_json(&spec.injectors),
        });
        let (_, result) = self.upsert_named(ResourceKind::CredentialType, &spec.name, &payload)?;
        Ok(result)
    }

    fn credential(&mut self, spec: &CredentialSpec) -> Result<ApplyResult> {
        let credential_type = self
            .resolver
            .resolve(ResourceKind::CredentialType, &ResourceKey::named(&spec.credential_type))?;
        let organization = self
            .resolver
            .resolve_opt(ResourceKind::Organization, spec.organization.as_deref())?;
        let payload = json!({
            "name": spec.name,
            "description": spec.description,
            "credential_type": credential_type,
            "organization": organization,
            "inputs": table_to_json(&spec.inputs),
        });
        let (_, result) = self.upsert_named(ResourceKind::Credential, &spec.name, &payload)?;
        Ok(result)
    }

    fn execution_environment(&mut self, spec: &ExecutionEnvironmentSpec) -> Result<ApplyResult> {
        let organization = self
            .resolver
            .resolve_opt(ResourceKind::Organization, spec.organization.as_deref())?;
        let credential = self
            .resolver
            .resolve_opt(ResourceKind::Credential, spec.credential.as_deref())?;
        let payload = json!({
            "name": spec.name,
            "description": spec.description,
            "image": spec.image,
            "pull": spec.pull,
            "organization": organization,
            "credential": credential,
        });
        let (_, result) = self.upsert_named(ResourceKind::ExecutionEnvironment, &spec.name, &payload)?;
        Ok(result)
    }

    fn project(&mut self, spec: &ProjectSpec) -> Result<ApplyResult> {
        let organization = self
            .resolver
            .resolve(ResourceKind::Organization, &ResourceKey::named(&spec.organization))?;
        let credential = self
            .resolver
            .resolve_opt(ResourceKind::Credential, spec.credential.as_deref())?;
        let payload = json!({
            "name": spec.name,
            "description": spec.description,
            "organization": organization,
            "scm_type": spec.scm_type,
            "scm_url": spec.scm_url,
            "scm_branch": spec.scm_branch,
            "scm_update_on_launch": spec.scm_update_on_launch,
            "credential": credential,
        });
        let (id, result) = self.upsert_named(ResourceKind::Project, &spec.name, &payload)?;
        self.projects.push(id);
        Ok(result)
    }

    fn inventory(&mut self, spec: &InventorySpec) -> Result<ApplyResult> {
        let organization = self
            .resolver
            .resolve(ResourceKind::Organization, &ResourceKey::named(&spec.organization))?;
        let payload = json!({
            "name": spec.name,
            "description": spec.description,
            "organization": organization,
            "variables": variables_string(&spec.variables),
        });
        let (_, result) = self.upsert_named(ResourceKind::Inventory, &spec.name, &payload)?;
        Ok(result)
    }

    fn host(&mut self, inventory: &InventorySpec, spec: &HostSpec) -> Result<ApplyResult> {
        let key = ResourceKey::scoped(&inventory.name, &spec.name);
        let lookup = self.resolver.lookup_for(ResourceKind::Host, &key)?;
        let payload = json!({
            "name": spec.name,
            "description": spec.description,
            "variables": variables_string(&spec.variables),
        });
        Ok(self.resolver.upsert(ResourceKind::Host, &key, &lookup, &payload)?.result)
    }

    fn group(&mut self, inventory: &InventorySpec, spec: &GroupSpec) -> Result<ApplyResult> {
        let key = ResourceKey::scoped(&inventory.name, &spec.name);
        let lookup = self.resolver.lookup_for(ResourceKind::Group, &key)?;
        let payload = json!({
            "name": spec.name,
            "description": spec.description,
            "variables": variables_string(&spec.variables),
        });
        let upserted = self.resolver.upsert(ResourceKind::Group, &key, &lookup, &payload)?;
        let mut result = upserted.result;

        let path = format!("groups/{}/hosts/", upserted.id);
        for host in &spec.hosts {
            let host_id = self
                .resolver
                .resolve(ResourceKind::Host, &ResourceKey::scoped(&inventory.name, host))?;
            result = changed(result, self.ensure_linked(ResourceKind::Group, &key.to_string(), &path, host_id)?);
        }
        Ok(result)
    }

    fn job_template(&mut self, spec: &JobTemplateSpec) -> Result<ApplyResult> {
        let project = self
            .resolver
            .resolve(ResourceKind::Project, &ResourceKey::named(&spec.project))?;
        let inventory = self
            .resolver
            .resolve(ResourceKind::Inventory, &ResourceKey::named(&spec.inventory))?;
        let organization = self
            .resolver
            .resolve_opt(ResourceKind::Organization, spec.organization.as_deref())?;
        let execution_environment = self
            .resolver
            .resolve_opt(ResourceKind::ExecutionEnvironment, spec.execution_environment.as_deref())?;

        let mut credentials = Vec::with_capacity(spec.credentials.len());
        for name in &spec.credentials {
            credentials.push(self.resolver.resolve(ResourceKind::Credential, &ResourceKey::named(name))?);
        }

        let payload = json!({
            "name": spec.name,
            "description": spec.description,
            "job_type": spec.job_type,
            "project": project,
            "inventory": inventory,
            "organization": organization,
            "execution_environment": execution_environment,
            "playbook": spec.playbook,
            "verbosity": spec.verbosity,
            "extra_vars": variables_string(&spec.extra_vars),
            "limit": spec.limit,
            "job_tags": spec.job_tags,
            "ask_variables_on_launch": spec.ask_variables_on_launch,
        });
        let (id, mut result) = self.upsert_named(ResourceKind::JobTemplate, &spec.name, &payload)?;

        let path = format!("job_templates/{id}/credentials/");
        for credential in credentials {
            result = changed(result, self.ensure_linked(ResourceKind::JobTemplate, &spec.name, &path, credential)?);
        }
        Ok(result)
    }

    /// Phase one of a workflow: the template and every node.
    fn workflow(&mut self, spec: &WorkflowSpec) -> Result<ApplyResult> {
        let organization = self
            .resolver
            .resolve_opt(ResourceKind::Organization, spec.organization.as_deref())?;
        let payload = json!({
            "name": spec.name,
            "description": spec.description,
            "organization": organization,
            "extra_vars": variables_string(&spec.extra_vars),
        });
        let (id, result) = self.upsert_named(ResourceKind::WorkflowJobTemplate, &spec.name, &payload)?;

        let path = format!("workflow_job_templates/{id}/workflow_nodes/");
        let existing = self
            .client()
            .list_all(&path, &[])
            .map_err(|e| SyncError::remote(ResourceKind::WorkflowJobTemplate, &spec.name, e))?;

        let mut claimed = HashSet::new();
        let mut first_error = None;
        for node in &spec.nodes {
            match self.node(&path, &existing, &mut claimed, node) {
                Ok(node_id) => self.nodes.insert(&spec.name, &node.identifier, node_id),
                Err(e) => {
                    log::warn!("workflow '{}' node '{}': {e}", spec.name, node.identifier);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(result),
        }
    }

    /// Find a node by identifier, then by an unclaimed node running the same
    /// job template, and create it otherwise.
    fn node(
        &mut self,
        path: &str,
        existing: &[Value],
        claimed: &mut HashSet<u64>,
        spec: &WorkflowNodeSpec,
    ) -> Result<u64> {
        let template = self
            .resolver
            .resolve(ResourceKind::JobTemplate, &ResourceKey::named(&spec.job_template))?;

        let unclaimed = |node: &&Value| id_of(node).is_some_and(|id| !claimed.contains(&id));
        let by_identifier = existing
            .iter()
            .filter(unclaimed)
            .find(|n| n.get("identifier").and_then(Value::as_str) == Some(spec.identifier.as_str()));
        let by_template = || {
            existing
                .iter()
                .filter(unclaimed)
                .find(|n| n.get("unified_job_template").and_then(Value::as_u64) == Some(template))
        };

        if let Some(id) = by_identifier.or_else(by_template).and_then(id_of) {
            claimed.insert(id);
            return Ok(id);
        }

        let created = self
            .client()
            .create(path, &json!({"identifier": spec.identifier, "unified_job_template": template}))
            .map_err(|e| SyncError::remote(ResourceKind::WorkflowJobTemplate, &spec.identifier, e))?;
        let id = id_of(&created).ok_or_else(|| {
            SyncError::remote(
                ResourceKind::WorkflowJobTemplate,
                &spec.identifier,
                towerkit::Error::InvalidResponse("node without an id".to_string()),
            )
        })?;
        log::info!("created workflow node '{}' (id {id})", spec.identifier);
        claimed.insert(id);
        Ok(id)
    }

    /// Phase two of a workflow: link two resolved nodes.
    fn edge(&self, edge: &EdgeSpec<'_>) -> Result<ApplyResult> {
        let from = self.nodes.get(edge.workflow, edge.from);
        let to = self.nodes.get(edge.workflow, edge.to);
        let (Some(from), Some(to)) = (from, to) else {
            let missing = if from.is_none() { edge.from } else { edge.to };
            return Ok(ApplyResult::skipped(format!("node '{missing}' was not provisioned")));
        };

        let path = format!("workflow_job_template_nodes/{from}/{}/", edge.outcome.relation());
        self.ensure_linked(ResourceKind::WorkflowEdge, &edge.key(), &path, to)
    }

    fn role_assignment(&mut self, spec: &RoleAssignmentSpec) -> Result<ApplyResult> {
        let kind = ResourceKind::from_endpoint(&spec.object_type)
            .filter(ResourceKind::has_roles)
            .ok_or_else(|| {
                SyncError::InvalidReference(format!("'{}' objects carry no roles", spec.object_type))
            })?;

        let team = self.resolver.resolve_team(spec.organization.as_deref(), &spec.team)?;
        let object = self.resolver.resolve_object(kind, &spec.object_name)?;
        let role = role_id(self.client(), kind, object, &spec.object_name, &spec.role)?;

        self.ensure_linked(ResourceKind::RoleAssignment, &spec.key(), &role_teams_path(role), team)
    }

    /// Associate `id` with the list at `path` unless it is already there.
    fn ensure_linked(&self, kind: ResourceKind, key: &str, path: &str, id: u64) -> Result<ApplyResult> {
        let client = self.client();
        let linked = is_linked(client, path, id).map_err(|e| SyncError::remote(kind, key, e))?;
        if linked {
            return Ok(ApplyResult::NoChange);
        }

        let class = client
            .associate(path, id)
            .map_err(|e| SyncError::remote(kind, key, e))?;
        Ok(match class {
            ResponseClass::Success => {
                log::debug!("{kind} '{key}': linked {id} at {path}");
                ApplyResult::Created
            }
            _ => ApplyResult::NoChange,
        })
    }
}

/// `Created` if either side created something.
fn changed(current: ApplyResult, link: ApplyResult) -> ApplyResult {
    if link == ApplyResult::Created {
        ApplyResult::Created
    } else {
        current
    }
}

pub(crate) fn role_teams_path(role: u64) -> String {
    format!("roles/{role}/teams/")
}

/// Whether `id` is already in the association list at `path`.
pub(crate) fn is_linked(client: &Client, path: &str, id: u64) -> towerkit::Result<bool> {
    Ok(client
        .list_all(path, &[])?
        .iter()
        .any(|item| id_of(item) == Some(id)))
}

/// Id of the named role on an object, from `summary_fields.object_roles`.
pub(crate) fn role_id(client: &Client, kind: ResourceKind, id: u64, name: &str, role: &str) -> Result<u64> {
    let endpoint = kind.endpoint().unwrap_or_default();
    let object = client
        .get_json(&format!("{endpoint}{id}/"), &[])
        .map_err(|e| SyncError::remote(kind, name, e))?;
    object
        .pointer(&format!("/summary_fields/object_roles/{role}/id"))
        .and_then(Value::as_u64)
        .ok_or_else(|| SyncError::MissingRole {
            object: format!("{kind} '{name}'"),
            role: role.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::RefCache;
    use crate::context::NoProgress;
    use crate::context::testing::RecordingProgress;
    use crate::types::SyncSummary;
    use crate::waiter::WaitState;
    use std::time::Duration;
    use towerkit::{EMPTY_PAGE, Method, MockTransport};

    fn client(mock: &MockTransport) -> Client {
        Client::new(Box::new(mock.clone()))
    }

    fn fast_options() -> ProvisionOptions {
        ProvisionOptions {
            wait_for_projects: true,
            sync_deadline: Duration::from_millis(200),
            poll_interval: Duration::from_millis(10),
        }
    }

    fn seed_builtin_types(mock: &MockTransport) {
        for (name, kind) in [("Machine", "ssh"), ("Source Control", "scm"), ("Vault", "vault")] {
            mock.insert("credential_types", json!({"name": name, "kind": kind, "managed": true}));
        }
    }

    fn provision(mock: &MockTransport, manifest: &Manifest) -> ProvisionReport {
        let client = client(mock);
        let mut cache = RefCache::new();
        Provisioner::new(&client, &mut cache, fast_options()).run(manifest, &mut NoProgress)
    }

    fn manifest(toml: &str) -> Manifest {
        Manifest::from_toml_str(toml).unwrap()
    }

    /// Records the order of first cache insertion.
    #[derive(Default)]
    struct RecordingCache {
        inner: RefCache,
        order: Vec<ResourceKind>,
    }

    impl Cache for RecordingCache {
        fn get(&self, kind: ResourceKind, key: &ResourceKey) -> Option<u64> {
            self.inner.get(kind, key)
        }

        fn put(&mut self, kind: ResourceKind, key: ResourceKey, id: u64) {
            if !self.order.contains(&kind) {
                self.order.push(kind);
            }
            self.inner.put(kind, key, id);
        }

        fn find_by_name(&self, kind: ResourceKind, name: &str) -> Vec<(ResourceKey, u64)> {
            self.inner.find_by_name(kind, name)
        }
    }

    #[test]
    fn test_org_and_team_are_created_once() {
        let mock = MockTransport::new();
        let m = manifest(
            r#"
            [[organizations]]
            name = "Org-A"

            [[teams]]
            name = "T1"
            organization = "Org-A"
            "#,
        );

        let first = provision(&mock, &m);
        assert_eq!(first.report.summary(ResourceKind::Organization).created, 1);
        assert_eq!(first.report.summary(ResourceKind::Team).created, 1);
        assert_eq!(mock.object("teams", 1).unwrap()["organization"], 1);

        let second = provision(&mock, &m);
        assert_eq!(second.report.summary(ResourceKind::Organization).no_change, 1);
        assert_eq!(second.report.summary(ResourceKind::Team).no_change, 1);
        assert_eq!(mock.count("organizations"), 1);
        assert_eq!(mock.count("teams"), 1);
    }

    #[test]
    fn test_deleted_team_is_recreated_under_existing_org() {
        let mock = MockTransport::new();
        let m = manifest(
            r#"
            [[organizations]]
            name = "Org-A"

            [[teams]]
            name = "T1"
            organization = "Org-A"
            "#,
        );

        provision(&mock, &m);
        let deleted = client(&mock).delete("teams/1/").unwrap();
        assert!(deleted.is_success());
        assert_eq!(mock.count("teams"), 0);

        let again = provision(&mock, &m).report;
        assert_eq!(again.summary(ResourceKind::Organization).no_change, 1);
        assert_eq!(again.summary(ResourceKind::Team).created, 1);
        assert_eq!(mock.count("organizations"), 1);
        assert_eq!(mock.object("organizations", 1).unwrap()["name"], "Org-A");
        assert_eq!(mock.count("teams"), 1);
        assert_eq!(mock.object("teams", 2).unwrap()["organization"], 1);
    }

    #[test]
    fn test_same_team_name_in_two_orgs() {
        let mock = MockTransport::new();
        let m = manifest(
            r#"
            [[organizations]]
            name = "A"
            [[organizations]]
            name = "B"

            [[teams]]
            name = "Ops"
            organization = "A"
            [[teams]]
            name = "Ops"
            organization = "B"
            "#,
        );

        let report = provision(&mock, &m).report;
        assert_eq!(report.summary(ResourceKind::Team).created, 2);
        assert_eq!(mock.count("teams"), 2);
    }

    #[test]
    fn test_workflow_edge_links_nodes() {
        let mock = MockTransport::new();
        let org = mock.insert("organizations", json!({"name": "Org"}));
        mock.insert("job_templates", json!({"name": "Build", "organization": org}));
        mock.insert("job_templates", json!({"name": "Test", "organization": org}));
        let m = manifest(
            r#"
            [[workflow_job_templates]]
            name = "WF"

            [[workflow_job_templates.nodes]]
            identifier = "N1"
            job_template = "Build"
            success_nodes = ["N2"]

            [[workflow_job_templates.nodes]]
            identifier = "N2"
            job_template = "Test"
            "#,
        );

        let report = provision(&mock, &m).report;
        assert_eq!(report.summary(ResourceKind::WorkflowEdge).created, 1);

        let n1 = mock.find_by("workflow_job_template_nodes", "identifier", "N1").unwrap();
        let n2 = mock.find_by("workflow_job_template_nodes", "identifier", "N2").unwrap();
        let n1 = n1["id"].as_u64().unwrap();
        let n2 = n2["id"].as_u64().unwrap();
        assert_eq!(mock.linked("workflow_job_template_nodes", n1, "success_nodes"), vec![n2]);

        let again = provision(&mock, &m).report;
        assert_eq!(again.summary(ResourceKind::WorkflowEdge).no_change, 1);
        assert_eq!(mock.count("workflow_job_template_nodes"), 2);
    }

    #[test]
    fn test_existing_node_without_identifier_is_adopted() {
        let mock = MockTransport::new();
        let jt = mock.insert("job_templates", json!({"name": "Build"}));
        let wf = mock.insert("workflow_job_templates", json!({"name": "WF"}));
        mock.insert(
            "workflow_job_template_nodes",
            json!({"workflow_job_template": wf, "unified_job_template": jt}),
        );
        let m = manifest(
            r#"
            [[workflow_job_templates]]
            name = "WF"
            [[workflow_job_templates.nodes]]
            identifier = "build"
            job_template = "Build"
            "#,
        );

        let report = provision(&mock, &m).report;
        assert_eq!(report.summary(ResourceKind::WorkflowJobTemplate).no_change, 1);
        assert_eq!(mock.count("workflow_job_template_nodes"), 1);
    }

    #[test]
    fn test_edge_to_unprovisioned_node_is_skipped() {
        let mock = MockTransport::new();
        mock.insert("job_templates", json!({"name": "Build"}));
        let m = manifest(
            r#"
            [[workflow_job_templates]]
            name = "WF"

            [[workflow_job_templates.nodes]]
            identifier = "N1"
            job_template = "Build"
            failure_nodes = ["N2"]

            [[workflow_job_templates.nodes]]
            identifier = "N2"
            job_template = "Missing"
            "#,
        );

        let report = provision(&mock, &m).report;
        assert_eq!(report.summary(ResourceKind::WorkflowJobTemplate).failed, 1);
        assert_eq!(report.summary(ResourceKind::WorkflowEdge).skipped, 1);
        assert_eq!(mock.count("workflow_job_template_nodes"), 1);
    }

    #[test]
    fn test_unresolved_reference_fails_only_that_instance() {
        let mock = MockTransport::new();
        let m = manifest(
            r#"
            [[organizations]]
            name = "Org"

            [[inventories]]
            name = "Orphan"
            organization = "Nowhere"

            [[inventories]]
            name = "Good"
            organization = "Org"
            "#,
        );

        let report = provision(&mock, &m).report;
        let inventories = report.summary(ResourceKind::Inventory);
        assert_eq!(inventories.failed, 1);
        assert_eq!(inventories.created, 1);
        assert!(mock.find_by("inventories", "name", "Good").is_some());
    }

    #[test]
    fn test_remote_failure_is_isolated() {
        let mock = MockTransport::new();
        mock.fail(Method::Post, "teams/", 500, "boom");
        let m = manifest(
            r#"
            [[organizations]]
            name = "Org"
            [[teams]]
            name = "T"
            organization = "Org"
            [[users]]
            username = "u"
            organization = "Org"
            "#,
        );

        let report = provision(&mock, &m).report;
        assert_eq!(report.summary(ResourceKind::Team).failed, 1);
        assert_eq!(report.summary(ResourceKind::User).created, 1);
        assert_eq!(mock.linked("organizations", 1, "users"), vec![1]);
    }

    #[test]
    fn test_user_memberships_are_idempotent() {
        let mock = MockTransport::new();
        mock.set_duplicate_link_conflicts(true);
        let m = manifest(
            r#"
            [[organizations]]
            name = "Org"
            [[teams]]
            name = "Dev"
            organization = "Org"
            [[users]]
            username = "alice"
            organization = "Org"
            teams = ["Dev"]
            "#,
        );

        provision(&mock, &m);
        let again = provision(&mock, &m).report;
        assert_eq!(again.summary(ResourceKind::User), SyncSummary { no_change: 1, ..Default::default() });
        assert_eq!(mock.linked("teams", 1, "users"), vec![1]);
    }

    #[test]
    fn test_membership_conflict_after_missed_listing_is_no_change() {
        let mock = MockTransport::new();
        let m = manifest(
            r#"
            [[organizations]]
            name = "Org"
            [[teams]]
            name = "Dev"
            organization = "Org"
            [[users]]
            username = "alice"
            organization = "Org"
            teams = ["Dev"]
            "#,
        );

        provision(&mock, &m);
        mock.set_duplicate_link_conflicts(true);
        mock.fail_once(Method::Get, "teams/1/users/", 200, EMPTY_PAGE);
        mock.clear_requests();

        let again = provision(&mock, &m).report;
        assert_eq!(again.summary(ResourceKind::User), SyncSummary { no_change: 1, ..Default::default() });
        assert!(mock.requests().contains(&(Method::Post, "teams/1/users/".to_string())));
        assert_eq!(mock.linked("teams", 1, "users"), vec![1]);
    }

    #[test]
    fn test_role_assignment_uses_object_roles() {
        let mock = MockTransport::new();
        let org = mock.insert("organizations", json!({"name": "Org"}));
        let team = mock.insert("teams", json!({"name": "Dev", "organization": org}));
        let jt = mock.insert("job_templates", json!({"name": "Deploy"}));
        let m = manifest(
            r#"
            [[role_assignments]]
            team = "Dev"
            object_type = "job_templates"
            object_name = "Deploy"
            role = "execute_role"

            [[role_assignments]]
            team = "Dev"
            object_type = "job_templates"
            object_name = "Deploy"
            role = "nonexistent_role"

            [[role_assignments]]
            team = "Dev"
            object_type = "hosts"
            object_name = "web"
            role = "admin_role"
            "#,
        );

        let report = provision(&mock, &m).report;
        let roles = report.summary(ResourceKind::RoleAssignment);
        assert_eq!(roles.created, 1);
        assert_eq!(roles.failed, 2);

        let role = mock.object("job_templates", jt).unwrap()["summary_fields"]["object_roles"]["execute_role"]["id"]
            .as_u64()
            .unwrap();
        assert_eq!(mock.linked("roles", role, "teams"), vec![team]);

        let again = provision(&mock, &m).report;
        assert_eq!(again.summary(ResourceKind::RoleAssignment).no_change, 1);
    }

    #[test]
    fn test_project_wait_timeout_does_not_abort() {
        let mock = MockTransport::new();
        mock.set_project_sync(None, "successful");
        let m = manifest(
            r#"
            [[organizations]]
            name = "Org"
            [[projects]]
            name = "P"
            organization = "Org"
            scm_url = "https://example.com/p.git"
            [[inventories]]
            name = "Inv"
            organization = "Org"
            [[job_templates]]
            name = "JT"
            project = "P"
            inventory = "Inv"
            playbook = "site.yml"
            "#,
        );

        let outcome = provision(&mock, &m);
        let wait = outcome.wait.unwrap();
        assert_eq!(wait.state(), WaitState::TimedOut);
        assert_eq!(wait.pending, vec![1]);
        assert_eq!(outcome.report.summary(ResourceKind::JobTemplate).created, 1);
    }

    #[test]
    fn test_no_wait_skips_polling() {
        let mock = MockTransport::new();
        let m = manifest(
            r#"
            [[organizations]]
            name = "Org"
            [[projects]]
            name = "P"
            organization = "Org"
            "#,
        );
        let client = client(&mock);
        let mut cache = RefCache::new();
        let options = ProvisionOptions {
            wait_for_projects: false,
            ..fast_options()
        };

        let outcome = Provisioner::new(&client, &mut cache, options).run(&m, &mut NoProgress);
        assert!(outcome.wait.is_none());
        assert!(!mock.requests().iter().any(|(_, p)| p.starts_with("projects/1")));
    }

    #[test]
    fn test_sample_manifest_provisions_fully_and_idempotently() {
        let mock = MockTransport::new();
        seed_builtin_types(&mock);
        let m = Manifest::sample().unwrap();

        let mut progress = RecordingProgress::default();
        let client = client(&mock);
        let mut cache = RecordingCache::default();
        let first = Provisioner::new(&client, &mut cache, fast_options()).run(&m, &mut progress);

        assert!(first.report.total().is_success(), "{:?}", progress.completed);
        assert_eq!(progress.kinds, PROVISION_ORDER.to_vec());
        assert_eq!(first.wait.unwrap().state(), WaitState::Succeeded);
        assert_eq!(mock.count("organizations"), 2);
        assert_eq!(mock.count("teams"), 6);
        assert_eq!(mock.count("users"), 10);
        assert_eq!(mock.count("job_templates"), 5);
        assert_eq!(mock.count("workflow_job_template_nodes"), 3);
        assert_eq!(first.report.summary(ResourceKind::WorkflowEdge).created, 2);

        // Dependencies reach the cache before their dependents.
        for kind in &cache.order {
            let position = cache.order.iter().position(|k| k == kind).unwrap();
            for dep in kind.dependencies() {
                if let Some(dep_position) = cache.order.iter().position(|k| k == dep) {
                    assert!(dep_position <= position, "{dep} after {kind}");
                }
            }
        }

        let before = mock.requests().iter().filter(|(m, _)| *m == Method::Post).count();
        let second = provision(&mock, &m);
        let total = second.report.total();
        assert_eq!(total.created, 0);
        assert_eq!(total.failed, 0);
        assert_eq!(mock.count("teams"), 6);
        assert_eq!(mock.count("workflow_job_template_nodes"), 3);
        let after = mock.requests().iter().filter(|(m, _)| *m == Method::Post).count();
        assert_eq!(after, before);
    }
}
