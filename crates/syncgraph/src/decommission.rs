//! Ordered Decommissioner: remove what the provisioner could have created.
//!
//! Declared mode walks the kinds in reverse provisioning order and deletes
//! each declared resource found by exact-name lookup. Sweep mode lists the
//! controller and deletes everything that is neither protected nor managed.
//! Protected names are checked before any lookup.

use crate::cache::{Cache, ResourceKey};
use crate::context::{ConfirmCallback, ProgressCallback, Tally};
use crate::error::{Result, SyncError};
use crate::kind::{ResourceKind, decommission_order};
use crate::manifest::{EdgeSpec, Manifest, RoleAssignmentSpec};
use crate::provision::{is_linked, role_id, role_teams_path};
use crate::types::{ApplyResult, SyncReport};
use crate::upsert::{Resolver, id_of};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use towerkit::{Client, ResponseClass};

/// Kinds removed by a sweep, in deletion order.
pub const SWEEP_KINDS: [ResourceKind; 7] = [
    ResourceKind::WorkflowJobTemplate,
    ResourceKind::JobTemplate,
    ResourceKind::Inventory,
    ResourceKind::Project,
    ResourceKind::Credential,
    ResourceKind::ExecutionEnvironment,
    ResourceKind::Organization,
];

/// Names that are never deleted, per kind.
#[derive(Debug, Clone)]
pub struct ProtectedNames {
    names: HashMap<ResourceKind, BTreeSet<String>>,
}

impl Default for ProtectedNames {
    /// Platform defaults and system execution environments.
    fn default() -> Self {
        let mut protected = Self::none();
        protected.extend(ResourceKind::Organization, ["Default"]);
        protected.extend(ResourceKind::Project, ["Demo Project"]);
        protected.extend(ResourceKind::Inventory, ["Demo Inventory"]);
        protected.extend(ResourceKind::Credential, ["Demo Credential"]);
        protected.extend(
            ResourceKind::ExecutionEnvironment,
            [
                "Control Plane Execution Environment",
                "Default execution environment",
                "Ansible Engine 2.9 Execution Environment",
                "Minimal execution environment",
            ],
        );
        protected
    }
}

impl ProtectedNames {
    /// An empty set.
    pub fn none() -> Self {
        Self {
            names: HashMap::new(),
        }
    }

    /// Protect more names of a kind.
    pub fn extend<I, S>(&mut self, kind: ResourceKind, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names
            .entry(kind)
            .or_default()
            .extend(names.into_iter().map(Into::into));
    }

    pub fn is_protected(&self, kind: ResourceKind, name: &str) -> bool {
        self.names.get(&kind).is_some_and(|n| n.contains(name))
    }

    /// Protected names of a kind, sorted.
    pub fn names(&self, kind: ResourceKind) -> Vec<&str> {
        self.names
            .get(&kind)
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect()
    }
}

/// Declared keys of a deletable kind.
fn declared_keys(kind: ResourceKind, manifest: &Manifest) -> Vec<ResourceKey> {
    fn named<'m, T: 'm>(items: &'m [T], name: impl Fn(&'m T) -> &'m str) -> Vec<ResourceKey> {
        items.iter().map(|item| ResourceKey::named(name(item))).collect()
    }

    match kind {
        ResourceKind::Organization => named(&manifest.organizations, |o| o.name.as_str()),
        ResourceKind::Team => manifest
            .teams
            .iter()
            .map(|t| ResourceKey::scoped(&t.organization, &t.name))
            .collect(),
        ResourceKind::User => named(&manifest.users, |u| u.username.as_str()),
        ResourceKind::CredentialType => named(&manifest.credential_types, |c| c.name.as_str()),
        ResourceKind::Credential => named(&manifest.credentials, |c| c.name.as_str()),
        ResourceKind::ExecutionEnvironment => named(&manifest.execution_environments, |e| e.name.as_str()),
        ResourceKind::Project => named(&manifest.projects, |p| p.name.as_str()),
        ResourceKind::Inventory => named(&manifest.inventories, |i| i.name.as_str()),
        ResourceKind::Host => manifest
            .inventories
            .iter()
            .flat_map(|i| i.hosts.iter().map(|h| ResourceKey::scoped(&i.name, &h.name)))
            .collect(),
        ResourceKind::Group => manifest
            .inventories
            .iter()
            .flat_map(|i| i.groups.iter().map(|g| ResourceKey::scoped(&i.name, &g.name)))
            .collect(),
        ResourceKind::JobTemplate => named(&manifest.job_templates, |j| j.name.as_str()),
        ResourceKind::WorkflowJobTemplate => named(&manifest.workflow_job_templates, |w| w.name.as_str()),
        ResourceKind::WorkflowEdge | ResourceKind::RoleAssignment => Vec::new(),
    }
}

/// `Unresolved` means absent.
fn found(result: Result<u64>) -> Result<Option<u64>> {
    match result {
        Ok(id) => Ok(Some(id)),
        Err(SyncError::Unresolved { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Delete one object and classify the response.
fn delete(client: &Client, kind: ResourceKind, name: &str, id: u64) -> Result<ApplyResult> {
    let endpoint = kind.endpoint().unwrap_or_default();
    let path = format!("{endpoint}{id}/");
    let response = client
        .delete(&path)
        .map_err(|e| SyncError::remote(kind, name, e))?;

    match response.class() {
        ResponseClass::Success => {
            log::info!("deleted {kind} '{name}' (id {id})");
            Ok(ApplyResult::Removed)
        }
        ResponseClass::NotFound => Ok(ApplyResult::skipped("already gone")),
        ResponseClass::AlreadyExists | ResponseClass::Fatal => Err(SyncError::remote(
            kind,
            name,
            towerkit::Error::api("DELETE", path, response.status, &response.body),
        )),
    }
}

/// Removes resources in reverse dependency order.
pub struct Decommissioner<'a, C: Cache> {
    resolver: Resolver<'a, C>,
    protected: ProtectedNames,
}

impl<'a, C: Cache> Decommissioner<'a, C> {
    pub fn new(client: &'a Client, cache: &'a mut C, protected: ProtectedNames) -> Self {
        Self {
            resolver: Resolver::new(client, cache),
            protected,
        }
    }

    /// Delete every declared resource, dependents first.
    ///
    /// # Errors
    ///
    /// Fails only if the confirmation prompt fails. Per-resource failures
    /// are counted in the report.
    pub fn run<P, F>(&mut self, manifest: &Manifest, progress: &mut P, confirm: &mut F) -> anyhow::Result<SyncReport>
    where
        P: ProgressCallback,
        F: ConfirmCallback,
    {
        let mut report = SyncReport::new();
        let total = manifest.total();
        if total == 0 {
            return Ok(report);
        }

        if !confirm.confirm(&format!("Delete up to {total} declared resources?"))? {
            for kind in decommission_order() {
                report.touch(kind).skipped = manifest.count(kind);
            }
            return Ok(report);
        }

        for kind in decommission_order() {
            progress.on_kind_start(kind, manifest.count(kind));
            report.touch(kind);
            {
                let mut tally = Tally::new(&mut report, progress);
                self.decommission_kind(kind, manifest, &mut tally);
            }
            progress.on_kind_complete(kind);
        }

        Ok(report)
    }

    /// Delete every listed object of [`SWEEP_KINDS`] that is neither
    /// protected nor flagged `managed`.
    ///
    /// # Errors
    ///
    /// Fails only if the confirmation prompt fails.
    pub fn sweep<P, F>(&mut self, progress: &mut P, confirm: &mut F) -> anyhow::Result<SyncReport>
    where
        P: ProgressCallback,
        F: ConfirmCallback,
    {
        let client = self.resolver.client();
        let mut report = SyncReport::new();
        let mut targets: Vec<(ResourceKind, u64, String)> = Vec::new();

        for kind in SWEEP_KINDS {
            report.touch(kind);
            let endpoint = kind.endpoint().unwrap_or_default();
            let objects = match client.list_all(endpoint, &[]) {
                Ok(objects) => objects,
                Err(e) => {
                    log::warn!("could not list {endpoint}: {e}");
                    continue;
                }
            };

            for object in &objects {
                let Some(id) = id_of(object) else { continue };
                let name = object
                    .get("name")
                    .and_then(Value::as_str)
                    .map_or_else(|| format!("id={id}"), str::to_string);

                if self.protected.is_protected(kind, &name) {
                    log::info!("{kind} '{name}' is protected");
                    report.record(kind, &ApplyResult::skipped("protected"));
                } else if object.get("managed").and_then(Value::as_bool) == Some(true) {
                    log::info!("{kind} '{name}' is managed by the platform");
                    report.record(kind, &ApplyResult::skipped("managed"));
                } else {
                    targets.push((kind, id, name));
                }
            }
        }

        if targets.is_empty() {
            return Ok(report);
        }
        if !confirm.confirm(&format!("Delete {} objects from the controller?", targets.len()))? {
            for (kind, ..) in &targets {
                report.record(*kind, &ApplyResult::skipped("declined"));
            }
            return Ok(report);
        }

        for kind in SWEEP_KINDS {
            let batch: Vec<_> = targets.iter().filter(|(k, ..)| *k == kind).collect();
            progress.on_kind_start(kind, batch.len());
            {
                let mut tally = Tally::new(&mut report, progress);
                for (_, id, name) in batch {
                    tally.apply(kind, name, || delete(client, kind, name, *id));
                }
            }
            progress.on_kind_complete(kind);
        }

        Ok(report)
    }

    fn decommission_kind<P: ProgressCallback>(
        &mut self,
        kind: ResourceKind,
        manifest: &Manifest,
        tally: &mut Tally<'_, P>,
    ) {
        match kind {
            ResourceKind::RoleAssignment => {
                for spec in &manifest.role_assignments {
                    tally.apply(kind, &spec.key(), || self.revoke(spec));
                }
            }
            ResourceKind::WorkflowEdge => {
                for workflow in &manifest.workflow_job_templates {
                    for edge in workflow.edges() {
                        tally.apply(kind, &edge.key(), || self.unlink(&edge));
                    }
                }
            }
            _ => {
                for key in declared_keys(kind, manifest) {
                    tally.apply(kind, &key.to_string(), || self.remove(kind, &key));
                }
            }
        }
    }

    fn remove(&mut self, kind: ResourceKind, key: &ResourceKey) -> Result<ApplyResult> {
        if self.protected.is_protected(kind, key.name()) {
            return Ok(ApplyResult::skipped("protected"));
        }
        let Some(id) = found(self.resolver.resolve(kind, key))? else {
            return Ok(ApplyResult::skipped("not found"));
        };
        delete(self.resolver.client(), kind, key.name(), id)
    }

    fn unlink(&mut self, edge: &EdgeSpec<'_>) -> Result<ApplyResult> {
        let kind = ResourceKind::WorkflowEdge;
        let workflow = self
            .resolver
            .resolve(ResourceKind::WorkflowJobTemplate, &ResourceKey::named(edge.workflow));
        let Some(workflow) = found(workflow)? else {
            return Ok(ApplyResult::skipped("workflow not found"));
        };

        let nodes = self
            .resolver
            .client()
            .list_all(&format!("workflow_job_templates/{workflow}/workflow_nodes/"), &[])
            .map_err(|e| SyncError::remote(kind, edge.key(), e))?;
        let node = |identifier: &str| {
            nodes
                .iter()
                .find(|n| n.get("identifier").and_then(Value::as_str) == Some(identifier))
                .and_then(id_of)
        };
        let (Some(from), Some(to)) = (node(edge.from), node(edge.to)) else {
            return Ok(ApplyResult::skipped("node not found"));
        };

        let path = format!("workflow_job_template_nodes/{from}/{}/", edge.outcome.relation());
        self.unlink_path(kind, &edge.key(), &path, to)
    }

    fn revoke(&mut self, spec: &RoleAssignmentSpec) -> Result<ApplyResult> {
        let kind = ResourceKind::from_endpoint(&spec.object_type)
            .filter(ResourceKind::has_roles)
            .ok_or_else(|| {
                SyncError::InvalidReference(format!("'{}' objects carry no roles", spec.object_type))
            })?;

        let team = self.resolver.resolve_team(spec.organization.as_deref(), &spec.team);
        let Some(team) = found(team)? else {
            return Ok(ApplyResult::skipped("team not found"));
        };
        let object = self.resolver.resolve_object(kind, &spec.object_name);
        let Some(object) = found(object)? else {
            return Ok(ApplyResult::skipped("object not found"));
        };

        let role = role_id(self.resolver.client(), kind, object, &spec.object_name, &spec.role)?;
        self.unlink_path(ResourceKind::RoleAssignment, &spec.key(), &role_teams_path(role), team)
    }

    fn unlink_path(&self, kind: ResourceKind, key: &str, path: &str, id: u64) -> Result<ApplyResult> {
        let client = self.resolver.client();
        let linked = is_linked(client, path, id).map_err(|e| SyncError::remote(kind, key, e))?;
        if !linked {
            return Ok(ApplyResult::skipped("not linked"));
        }
        client
            .disassociate(path, id)
            .map_err(|e| SyncError::remote(kind, key, e))?;
        log::info!("removed {kind} '{key}'");
        Ok(ApplyResult::Removed)
    }
}
