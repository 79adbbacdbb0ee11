//! Resource kinds, their dependency graph and the static processing order.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of controller resource managed by the sync engine.
///
/// Variants are declared in provisioning order, so `Ord` follows
/// [`PROVISION_ORDER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Organization,
    Team,
    User,
    CredentialType,
    Credential,
    ExecutionEnvironment,
    Project,
    Inventory,
    Host,
    Group,
    JobTemplate,
    WorkflowJobTemplate,
    /// Success/failure/always link between two workflow nodes.
    WorkflowEdge,
    /// A team granted a role on another object.
    RoleAssignment,
}

/// Static provisioning order. A topological sort of the dependency graph.
pub const PROVISION_ORDER: [ResourceKind; 14] = [
    ResourceKind::Organization,
    ResourceKind::Team,
    ResourceKind::User,
    ResourceKind::CredentialType,
    ResourceKind::Credential,
    ResourceKind::ExecutionEnvironment,
    ResourceKind::Project,
    ResourceKind::Inventory,
    ResourceKind::Host,
    ResourceKind::Group,
    ResourceKind::JobTemplate,
    ResourceKind::WorkflowJobTemplate,
    ResourceKind::WorkflowEdge,
    ResourceKind::RoleAssignment,
];

/// Decommissioning order: the exact reverse of [`PROVISION_ORDER`].
pub fn decommission_order() -> impl Iterator<Item = ResourceKind> {
    PROVISION_ORDER.into_iter().rev()
}

impl ResourceKind {
    /// Collection endpoint relative to the API prefix, e.g. `teams/`.
    ///
    /// Edges and role assignments have no collection of their own.
    pub fn endpoint(&self) -> Option<&'static str> {
        Some(match self {
            Self::Organization => "organizations/",
            Self::Team => "teams/",
            Self::User => "users/",
            Self::CredentialType => "credential_types/",
            Self::Credential => "credentials/",
            Self::ExecutionEnvironment => "execution_environments/",
            Self::Project => "projects/",
            Self::Inventory => "inventories/",
            Self::Host => "hosts/",
            Self::Group => "groups/",
            Self::JobTemplate => "job_templates/",
            Self::WorkflowJobTemplate => "workflow_job_templates/",
            Self::WorkflowEdge | Self::RoleAssignment => return None,
        })
    }

    /// Field used for exact-match lookups.
    pub fn lookup_field(&self) -> &'static str {
        match self {
            Self::User => "username",
            _ => "name",
        }
    }

    /// Directory name used when persisting downloaded documents.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Organization => "organizations",
            Self::Team => "teams",
            Self::User => "users",
            Self::CredentialType => "credential_types",
            Self::Credential => "credentials",
            Self::ExecutionEnvironment => "execution_environments",
            Self::Project => "projects",
            Self::Inventory => "inventories",
            Self::Host => "hosts",
            Self::Group => "groups",
            Self::JobTemplate => "job_templates",
            Self::WorkflowJobTemplate => "workflow_job_templates",
            Self::WorkflowEdge => "workflow_edges",
            Self::RoleAssignment => "role_assignments",
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Organization => "Organization",
            Self::Team => "Team",
            Self::User => "User",
            Self::CredentialType => "Credential Type",
            Self::Credential => "Credential",
            Self::ExecutionEnvironment => "Execution Environment",
            Self::Project => "Project",
            Self::Inventory => "Inventory",
            Self::Host => "Host",
            Self::Group => "Group",
            Self::JobTemplate => "Job Template",
            Self::WorkflowJobTemplate => "Workflow Job Template",
            Self::WorkflowEdge => "Workflow Edge",
            Self::RoleAssignment => "Role Assignment",
        }
    }

    /// Kind whose names namespace this one (Team by Organization, Host and
    /// Group by Inventory).
    pub fn scope_kind(&self) -> Option<Self> {
        match self {
            Self::Team => Some(Self::Organization),
            Self::Host | Self::Group => Some(Self::Inventory),
            _ => None,
        }
    }

    /// Kinds whose ids must be resolved before this kind can be created.
    pub fn dependencies(&self) -> &'static [ResourceKind] {
        match self {
            Self::Organization | Self::CredentialType => &[],
            Self::Team => &[Self::Organization],
            Self::User => &[Self::Organization, Self::Team],
            Self::Credential => &[Self::Organization, Self::CredentialType],
            Self::ExecutionEnvironment | Self::Project => &[Self::Organization, Self::Credential],
            Self::Inventory => &[Self::Organization],
            Self::Host => &[Self::Inventory],
            Self::Group => &[Self::Inventory, Self::Host],
            Self::JobTemplate => &[
                Self::Organization,
                Self::Project,
                Self::Inventory,
                Self::Credential,
                Self::ExecutionEnvironment,
            ],
            Self::WorkflowJobTemplate => &[Self::Organization, Self::JobTemplate],
            Self::WorkflowEdge => &[Self::WorkflowJobTemplate],
            Self::RoleAssignment => &[
                Self::Team,
                Self::Credential,
                Self::Project,
                Self::Inventory,
                Self::JobTemplate,
                Self::WorkflowJobTemplate,
            ],
        }
    }

    /// Whether objects of this kind carry `summary_fields.object_roles`.
    pub fn has_roles(&self) -> bool {
        matches!(
            self,
            Self::Organization
                | Self::Team
                | Self::Credential
                | Self::Project
                | Self::Inventory
                | Self::JobTemplate
                | Self::WorkflowJobTemplate
        )
    }

    /// Parse an endpoint or directory name (`job_templates`, `job_templates/`).
    pub fn from_endpoint(name: &str) -> Option<Self> {
        let name = name.trim_matches('/');
        PROVISION_ORDER.into_iter().find(|k| k.dir_name() == name)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(kind: ResourceKind) -> usize {
        PROVISION_ORDER.iter().position(|k| *k == kind).unwrap()
    }

    #[test]
    fn test_provision_order_is_topological() {
        for kind in PROVISION_ORDER {
            for dep in kind.dependencies() {
                assert!(
                    position(*dep) < position(kind),
                    "{dep} must come before {kind}"
                );
            }
        }
    }

    #[test]
    fn test_decommission_order_is_reverse() {
        let forward: Vec<_> = PROVISION_ORDER.to_vec();
        let mut backward: Vec<_> = decommission_order().collect();
        backward.reverse();
        assert_eq!(forward, backward);
        assert_eq!(decommission_order().next(), Some(ResourceKind::RoleAssignment));
        assert_eq!(decommission_order().last(), Some(ResourceKind::Organization));
    }

    #[test]
    fn test_order_covers_every_kind_once() {
        let mut sorted = PROVISION_ORDER.to_vec();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), PROVISION_ORDER.len());
        assert_eq!(sorted, PROVISION_ORDER.to_vec());
    }

    #[test]
    fn test_scoped_kinds() {
        assert_eq!(ResourceKind::Project.scope_kind(), None);
        assert_eq!(ResourceKind::Host.scope_kind(), Some(ResourceKind::Inventory));
        assert_eq!(ResourceKind::Team.scope_kind(), Some(ResourceKind::Organization));
        assert_eq!(ResourceKind::Group.scope_kind(), Some(ResourceKind::Inventory));
    }

    #[test]
    fn test_scope_kind_is_a_dependency() {
        for kind in PROVISION_ORDER {
            if let Some(scope) = kind.scope_kind() {
                assert!(kind.dependencies().contains(&scope));
            }
        }
    }

    #[test]
    fn test_endpoints() {
        assert_eq!(ResourceKind::User.endpoint(), Some("users/"));
        assert_eq!(ResourceKind::User.lookup_field(), "username");
        assert_eq!(ResourceKind::Team.lookup_field(), "name");
        assert_eq!(ResourceKind::WorkflowEdge.endpoint(), None);
        assert_eq!(ResourceKind::RoleAssignment.endpoint(), None);
    }

    #[test]
    fn test_from_endpoint() {
        assert_eq!(
            ResourceKind::from_endpoint("job_templates/"),
            Some(ResourceKind::JobTemplate)
        );
        assert_eq!(
            ResourceKind::from_endpoint("workflow_job_templates"),
            Some(ResourceKind::WorkflowJobTemplate)
        );
        assert_eq!(ResourceKind::from_endpoint("widgets"), None);
    }
}
