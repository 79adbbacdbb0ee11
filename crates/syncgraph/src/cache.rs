//! Reference Cache: kind-scoped resource keys mapped to remote ids.
//!
//! The cache is explicit state owned by one run and passed into every
//! operation that builds a payload or wires a reference.

use crate::kind::ResourceKind;
use std::collections::HashMap;
use std::fmt;

/// Kind-scoped identity of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKey {
    /// Globally unique name (or username).
    Name(String),
    /// Name unique within a parent: Team within Organization, Host and
    /// Group within Inventory. The scope is the parent's name.
    Scoped { scope: String, name: String },
}

impl ResourceKey {
    /// Create a bare-name key.
    pub fn named(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// Create a scoped key.
    pub fn scoped(scope: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Scoped {
            scope: scope.into(),
            name: name.into(),
        }
    }

    /// The name part.
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) | Self::Scoped { name, .. } => name,
        }
    }

    /// The scope part, if any.
    pub fn scope(&self) -> Option<&str> {
        match self {
            Self::Name(_) => None,
            Self::Scoped { scope, .. } => Some(scope),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "{name}"),
            Self::Scoped { scope, name } => write!(f, "{scope}/{name}"),
        }
    }
}

/// Storage for resolved references.
pub trait Cache {
    /// Remote id for a key, if resolved in this run.
    fn get(&self, kind: ResourceKind, key: &ResourceKey) -> Option<u64>;

    /// Record a resolved id.
    fn put(&mut self, kind: ResourceKind, key: ResourceKey, id: u64);

    /// Keys of a kind whose name part equals `name`, across all scopes.
    fn find_by_name(&self, kind: ResourceKind, name: &str) -> Vec<(ResourceKey, u64)>;
}

/// In-memory [`Cache`], discarded at the end of a run.
#[derive(Debug, Default)]
pub struct RefCache {
    entries: HashMap<(ResourceKind, ResourceKey), u64>,
}

impl RefCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of resolved references.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is resolved yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of resolved references of one kind.
    pub fn count(&self, kind: ResourceKind) -> usize {
        self.entries.keys().filter(|(k, _)| *k == kind).count()
    }
}

impl Cache for RefCache {
    fn get(&self, kind: ResourceKind, key: &ResourceKey) -> Option<u64> {
        self.entries.get(&(kind, key.clone())).copied()
    }

    fn put(&mut self, kind: ResourceKind, key: ResourceKey, id: u64) {
        match self.entries.get(&(kind, key.clone())) {
            Some(existing) if *existing != id => {
                // A key maps to at most one id per run; the first one wins.
                log::warn!("{kind} '{key}' already resolved to id {existing}, ignoring id {id}");
            }
            Some(_) => {}
            None => {
                log::trace!("cache {kind} '{key}' -> {id}");
                self.entries.insert((kind, key), id);
            }
        }
    }

    fn find_by_name(&self, kind: ResourceKind, name: &str) -> Vec<(ResourceKey, u64)> {
        let mut found: Vec<(ResourceKey, u64)> = self
            .entries
            .iter()
            .filter(|((k, key), _)| *k == kind && key.name() == name)
            .map(|((_, key), id)| (key.clone(), *id))
            .collect();
        found.sort();
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_and_get() {
        let mut cache = RefCache::new();
        assert!(cache.is_empty());

        cache.put(ResourceKind::Organization, ResourceKey::named("Org-A"), 1);
        assert_eq!(
            cache.get(ResourceKind::Organization, &ResourceKey::named("Org-A")),
            Some(1)
        );
        assert_eq!(cache.get(ResourceKind::Team, &ResourceKey::named("Org-A")), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_scoped_keys_are_distinct() {
        let mut cache = RefCache::new();
        cache.put(ResourceKind::Team, ResourceKey::scoped("Org-A", "Ops"), 1);
        cache.put(ResourceKind::Team, ResourceKey::scoped("Org-B", "Ops"), 2);

        assert_eq!(cache.get(ResourceKind::Team, &ResourceKey::scoped("Org-B", "Ops")), Some(2));
        assert_eq!(cache.get(ResourceKind::Team, &ResourceKey::named("Ops")), None);
        assert_eq!(cache.find_by_name(ResourceKind::Team, "Ops").len(), 2);
        assert_eq!(cache.count(ResourceKind::Team), 2);
    }

    #[test]
    fn test_first_id_wins() {
        let mut cache = RefCache::new();
        cache.put(ResourceKind::Project, ResourceKey::named("p"), 3);
        cache.put(ResourceKind::Project, ResourceKey::named("p"), 4);
        assert_eq!(cache.get(ResourceKind::Project, &ResourceKey::named("p")), Some(3));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_key_display() {
        assert_eq!(ResourceKey::named("web").to_string(), "web");
        assert_eq!(ResourceKey::scoped("Lab", "web").to_string(), "Lab/web");
        assert_eq!(ResourceKey::scoped("Lab", "web").scope(), Some("Lab"));
        assert_eq!(ResourceKey::named("web").scope(), None);
    }
}
