//! Declared resource graph, loaded from TOML.
//!
//! References between resources are by name. Hosts and groups are nested
//! under their inventory, workflow nodes under their workflow template.

use crate::error::{Result, SyncError};
use crate::kind::ResourceKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

const SAMPLE_MANIFEST: &str = include_str!("../assets/sample.toml");

/// Full declared graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub organizations: Vec<OrganizationSpec>,
    #[serde(default)]
    pub teams: Vec<TeamSpec>,
    #[serde(default)]
    pub users: Vec<UserSpec>,
    #[serde(default)]
    pub credential_types: Vec<CredentialTypeSpec>,
    #[serde(default)]
    pub credentials: Vec<CredentialSpec>,
    #[serde(default)]
    pub execution_environments: Vec<ExecutionEnvironmentSpec>,
    #[serde(default)]
    pub projects: Vec<ProjectSpec>,
    #[serde(default)]
    pub inventories: Vec<InventorySpec>,
    #[serde(default)]
    pub job_templates: Vec<JobTemplateSpec>,
    #[serde(default)]
    pub workflow_job_templates: Vec<WorkflowSpec>,
    #[serde(default)]
    pub role_assignments: Vec<RoleAssignmentSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamSpec {
    pub name: String,
    pub organization: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSpec {
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub is_superuser: bool,
    /// Organization the user is a member of; also scopes `teams`.
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub teams: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialTypeSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_credential_type_kind")]
    pub kind: String,
    #[serde(default)]
    pub inputs: toml::Table,
    #[serde(default)]
    pub injectors: toml::Table,
}

fn default_credential_type_kind() -> String {
    "cloud".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Credential type name, declared or built in (e.g. "Machine").
    pub credential_type: String,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub inputs: toml::Table,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEnvironmentSpec {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub organization: Option<String>,
    /// Registry credential used to pull the image.
    #[serde(default)]
    pub credential: Option<String>,
    #[serde(default = "default_pull")]
    pub pull: String,
}

fn default_pull() -> String {
    "missing".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSpec {
    pub name: String,
    pub organization: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_scm_type")]
    pub scm_type: String,
    #[serde(default)]
    pub scm_url: String,
    #[serde(default)]
    pub scm_branch: String,
    #[serde(default)]
    pub scm_update_on_launch: bool,
    /// SCM credential.
    #[serde(default)]
    pub credential: Option<String>,
}

fn default_scm_type() -> String {
    "git".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventorySpec {
    pub name: String,
    pub organization: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub variables: toml::Table,
    #[serde(default)]
    pub hosts: Vec<HostSpec>,
    #[serde(default)]
    pub groups: Vec<GroupSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub variables: toml::Table,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub variables: toml::Table,
    /// Host names from the same inventory.
    #[serde(default)]
    pub hosts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobTemplateSpec {
    pub name: String,
    pub project: String,
    pub inventory: String,
    pub playbook: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub execution_environment: Option<String>,
    #[serde(default)]
    pub credentials: Vec<String>,
    #[serde(default = "default_job_type")]
    pub job_type: String,
    #[serde(default)]
    pub verbosity: u8,
    #[serde(default)]
    pub extra_vars: toml::Table,
    #[serde(default)]
    pub limit: String,
    #[serde(default)]
    pub job_tags: String,
    #[serde(default)]
    pub ask_variables_on_launch: bool,
}

fn default_job_type() -> String {
    "run".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub extra_vars: toml::Table,
    #[serde(default)]
    pub nodes: Vec<WorkflowNodeSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNodeSpec {
    /// Unique within the workflow.
    pub identifier: String,
    pub job_template: String,
    #[serde(default)]
    pub success_nodes: Vec<String>,
    #[serde(default)]
    pub failure_nodes: Vec<String>,
    #[serde(default)]
    pub always_nodes: Vec<String>,
}

/// Outcome class of a workflow edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeOutcome {
    Success,
    Failure,
    Always,
}

impl EdgeOutcome {
    pub const ALL: [EdgeOutcome; 3] = [Self::Success, Self::Failure, Self::Always];

    /// Sub-list of a workflow node holding successors of this outcome.
    pub fn relation(&self) -> &'static str {
        match self {
            Self::Success => "success_nodes",
            Self::Failure => "failure_nodes",
            Self::Always => "always_nodes",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Always => "always",
        }
    }
}

/// A declared edge between two node identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeSpec<'a> {
    pub workflow: &'a str,
    pub from: &'a str,
    pub to: &'a str,
    pub outcome: EdgeOutcome,
}

impl EdgeSpec<'_> {
    /// Display key, e.g. `Deploy Pipeline: build -> test (success)`.
    pub fn key(&self) -> String {
        format!(
            "{}: {} -> {} ({})",
            self.workflow,
            self.from,
            self.to,
            self.outcome.label()
        )
    }
}

impl WorkflowNodeSpec {
    /// Successor identifiers for an outcome.
    pub fn successors(&self, outcome: EdgeOutcome) -> &[String] {
        match outcome {
            EdgeOutcome::Success => &self.success_nodes,
            EdgeOutcome::Failure => &self.failure_nodes,
            EdgeOutcome::Always => &self.always_nodes,
        }
    }
}

impl WorkflowSpec {
    /// Every declared edge, in node order then outcome order.
    pub fn edges(&self) -> Vec<EdgeSpec<'_>> {
        let mut edges = Vec::new();
        for node in &self.nodes {
            for outcome in EdgeOutcome::ALL {
                for to in node.successors(outcome) {
                    edges.push(EdgeSpec {
                        workflow: &self.name,
                        from: &node.identifier,
                        to,
                        outcome,
                    });
                }
            }
        }
        edges
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleAssignmentSpec {
    pub team: String,
    /// Organization of the team; required when the team name is not unique.
    #[serde(default)]
    pub organization: Option<String>,
    /// Endpoint name of the object, e.g. `job_templates`.
    pub object_type: String,
    pub object_name: String,
    /// Role field, e.g. `execute_role`, `use_role`, `admin_role`.
    pub role: String,
}

impl RoleAssignmentSpec {
    pub fn key(&self) -> String {
        format!(
            "{} -> {}:{} ({})",
            self.team, self.object_type, self.object_name, self.role
        )
    }
}

impl Manifest {
    /// Parse a manifest from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| SyncError::Config(format!("invalid manifest: {e}")))
    }

    /// Load a manifest file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("could not read {}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// The built-in sample graph.
    pub fn sample() -> Result<Self> {
        Self::from_toml_str(SAMPLE_MANIFEST)
    }

    /// Number of declared instances of a kind.
    pub fn count(&self, kind: ResourceKind) -> usize {
        match kind {
            ResourceKind::Organization => self.organizations.len(),
            ResourceKind::Team => self.teams.len(),
            ResourceKind::User => self.users.len(),
            ResourceKind::CredentialType => self.credential_types.len(),
            ResourceKind::Credential => self.credentials.len(),
            ResourceKind::ExecutionEnvironment => self.execution_environments.len(),
            ResourceKind::Project => self.projects.len(),
            ResourceKind::Inventory => self.inventories.len(),
            ResourceKind::Host => self.inventories.iter().map(|i| i.hosts.len()).sum(),
            ResourceKind::Group => self.inventories.iter().map(|i| i.groups.len()).sum(),
            ResourceKind::JobTemplate => self.job_templates.len(),
            ResourceKind::WorkflowJobTemplate => self.workflow_job_templates.len(),
            ResourceKind::WorkflowEdge => self
                .workflow_job_templates
                .iter()
                .map(|w| w.edges().len())
                .sum(),
            ResourceKind::RoleAssignment => self.role_assignments.len(),
        }
    }

    /// Total number of declared instances.
    pub fn total(&self) -> usize {
        crate::kind::PROVISION_ORDER
            .iter()
            .map(|k| self.count(*k))
            .sum()
    }

    /// Problems that do not stop a run: duplicate node identifiers and
    /// edges to undeclared identifiers.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        for workflow in &self.workflow_job_templates {
            let mut seen = HashSet::new();
            for node in &workflow.nodes {
                if !seen.insert(node.identifier.as_str()) {
                    warnings.push(format!(
                        "workflow '{}': duplicate node identifier '{}'",
                        workflow.name, node.identifier
                    ));
                }
            }
            for edge in workflow.edges() {
                if !seen.contains(edge.to) {
                    warnings.push(format!(
                        "workflow '{}': edge {} -> {} references an undeclared node",
                        workflow.name, edge.from, edge.to
                    ));
                }
            }
        }

        for assignment in &self.role_assignments {
            match ResourceKind::from_endpoint(&assignment.object_type) {
                Some(kind) if kind.has_roles() => {}
                _ => warnings.push(format!(
                    "role assignment '{}': '{}' objects have no roles",
                    assignment.key(),
                    assignment.object_type
                )),
            }
        }

        warnings
    }
}

/// Convert a TOML table to a JSON object.
pub fn table_to_json(table: &toml::Table) -> Value {
    serde_json::to_value(table).unwrap_or_else(|_| Value::Object(Map::new()))
}

/// Serialize variables the way the controller stores them (a JSON string).
/// Empty tables become an empty string.
pub fn variables_string(table: &toml::Table) -> String {
    if table.is_empty() {
        String::new()
    } else {
        table_to_json(table).to_string()
    }
}
