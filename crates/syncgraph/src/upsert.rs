//! Reference resolution and the Idempotent Upsert Operation.
//!
//! [`Resolver`] turns declared names into remote ids: the cache is consulted
//! first, then the controller is queried by exact match and the hit is
//! cached. [`Resolver::upsert`] adds "create if absent" on top. An existing
//! resource is returned as-is; the candidate payload is never applied to it.

use crate::cache::{Cache, ResourceKey};
use crate::error::{Result, SyncError};
use crate::kind::ResourceKind;
use crate::types::ApplyResult;
use serde_json::Value;
use towerkit::{Client, ResponseClass};

/// Where to look a key up: a collection path plus extra exact-match filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    pub path: String,
    pub filters: Vec<(&'static str, String)>,
}

impl Lookup {
    /// Lookup in a plain collection.
    pub fn collection(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            filters: Vec::new(),
        }
    }

    /// Add an exact-match filter.
    pub fn filter(mut self, field: &'static str, value: impl ToString) -> Self {
        self.filters.push((field, value.to_string()));
        self
    }

    fn query(&self) -> Vec<(&str, &str)> {
        self.filters.iter().map(|(k, v)| (*k, v.as_str())).collect()
    }
}

/// Outcome of an upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upserted {
    pub id: u64,
    /// `Created` or `NoChange`
    pub result: ApplyResult,
}

/// Extract the numeric `id` of an object.
pub fn id_of(value: &Value) -> Option<u64> {
    value.get("id").and_then(Value::as_u64)
}

/// Cache-backed name resolution over a controller client.
pub struct Resolver<'a, C: Cache> {
    client: &'a Client,
    cache: &'a mut C,
}

impl<'a, C: Cache> Resolver<'a, C> {
    /// Create a resolver over a client and a run-scoped cache.
    pub fn new(client: &'a Client, cache: &'a mut C) -> Self {
        Self { client, cache }
    }

    /// The client.
    pub fn client(&self) -> &'a Client {
        self.client
    }

    /// Read-only view of the cache.
    pub fn cache(&self) -> &C {
        &*self.cache
    }

    /// Where a key of `kind` lives. Scoped kinds resolve their parent first.
    pub fn lookup_for(&mut self, kind: ResourceKind, key: &ResourceKey) -> Result<Lookup> {
        let endpoint = kind.endpoint().ok_or_else(|| {
            SyncError::InvalidReference(format!("{kind} has no collection to look up"))
        })?;

        match (kind.scope_kind(), key.scope()) {
            (Some(ResourceKind::Organization), Some(org)) => {
                let org_id = self.resolve(ResourceKind::Organization, &ResourceKey::named(org))?;
                Ok(Lookup::collection(endpoint).filter("organization", org_id))
            }
            (Some(parent), Some(scope)) => {
                let parent_id = self.resolve(parent, &ResourceKey::named(scope))?;
                let parent_endpoint = parent.endpoint().unwrap_or_default();
                Ok(Lookup::collection(format!("{parent_endpoint}{parent_id}/{endpoint}")))
            }
            (None, Some(scope)) => Err(SyncError::InvalidReference(format!(
                "{kind} '{}' cannot be scoped by '{scope}'",
                key.name()
            ))),
            (_, None) => Ok(Lookup::collection(endpoint)),
        }
    }

    /// Find an existing object by key without touching the cache.
    pub fn find(&self, kind: ResourceKind, key: &ResourceKey, lookup: &Lookup) -> Result<Option<Value>> {
        self.client
            .find_exact(&lookup.path, kind.lookup_field(), key.name(), &lookup.query())
            .map_err(|e| SyncError::remote(kind, key, e))
    }

    /// Resolve a key to a remote id: cache first, then an exact-match query.
    pub fn resolve(&mut self, kind: ResourceKind, key: &ResourceKey) -> Result<u64> {
        if let Some(id) = self.cache.get(kind, key) {
            return Ok(id);
        }

        let lookup = self.lookup_for(kind, key)?;
        let found = self.find(kind, key, &lookup)?;
        let id = found
            .as_ref()
            .and_then(id_of)
            .ok_or_else(|| SyncError::Unresolved {
                kind,
                key: key.clone(),
            })?;

        self.cache.put(kind, key.clone(), id);
        Ok(id)
    }

    /// Resolve an optional bare-name reference.
    pub fn resolve_opt(&mut self, kind: ResourceKind, name: Option<&str>) -> Result<Option<u64>> {
        name.map(|n| self.resolve(kind, &ResourceKey::named(n)))
            .transpose()
    }

    /// Resolve a team by name, optionally scoped by organization.
    ///
    /// Without an organization the name must be unique, among declared
    /// teams first and then on the controller.
    pub fn resolve_team(&mut self, organization: Option<&str>, name: &str) -> Result<u64> {
        if let Some(org) = organization {
            return self.resolve(ResourceKind::Team, &ResourceKey::scoped(org, name));
        }

        let cached = self.cache.find_by_name(ResourceKind::Team, name);
        match cached.as_slice() {
            [(_, id)] => return Ok(*id),
            [] => {}
            _ => {
                return Err(SyncError::InvalidReference(format!(
                    "team '{name}' exists in several organizations; set its organization"
                )));
            }
        }

        let teams = self
            .client
            .list_all("teams/", &[("name", name)])
            .map_err(|e| SyncError::remote(ResourceKind::Team, name, e))?;
        let matching: Vec<&Value> = teams
            .iter()
            .filter(|t| t.get("name").and_then(Value::as_str) == Some(name))
            .collect();

        match matching.as_slice() {
            [team] => id_of(team).ok_or_else(|| SyncError::Unresolved {
                kind: ResourceKind::Team,
                key: ResourceKey::named(name),
            }),
            [] => Err(SyncError::Unresolved {
                kind: ResourceKind::Team,
                key: ResourceKey::named(name),
            }),
            _ => Err(SyncError::InvalidReference(format!(
                "team '{name}' exists in several organizations; set its organization"
            ))),
        }
    }

    /// Resolve the object of a role grant. Teams go through [`Self::resolve_team`].
    pub fn resolve_object(&mut self, kind: ResourceKind, name: &str) -> Result<u64> {
        if kind == ResourceKind::Team {
            self.resolve_team(None, name)
        } else {
            self.resolve(kind, &ResourceKey::named(name))
        }
    }

    /// Return the id of the resource matching `key`, creating it from
    /// `payload` when absent. Never creates a duplicate for a key.
    pub fn upsert(
        &mut self,
        kind: ResourceKind,
        key: &ResourceKey,
        lookup: &Lookup,
        payload: &Value,
    ) -> Result<Upserted> {
        if let Some(id) = self.cache.get(kind, key) {
            return Ok(Upserted {
                id,
                result: ApplyResult::NoChange,
            });
        }

        if let Some(existing) = self.find(kind, key, lookup)? {
            let id = id_of(&existing).ok_or_else(|| missing_id(kind, key))?;
            log::debug!("{kind} '{key}' exists (id {id})");
            self.cache.put(kind, key.clone(), id);
            return Ok(Upserted {
                id,
                result: ApplyResult::NoChange,
            });
        }

        let response = self
            .client
            .post(&lookup.path, payload)
            .map_err(|e| SyncError::remote(kind, key, e))?;

        match response.class() {
            ResponseClass::Success => {
                let body = response
                    .json_body()
                    .map_err(|e| SyncError::remote(kind, key, e.into()))?;
                let id = id_of(&body).ok_or_else(|| missing_id(kind, key))?;
                log::info!("created {kind} '{key}' (id {id})");
                self.cache.put(kind, key.clone(), id);
                Ok(Upserted {
                    id,
                    result: ApplyResult::Created,
                })
            }
            ResponseClass::AlreadyExists => {
                // Created by someone else between lookup and create.
                let existing = self.find(kind, key, lookup)?;
                let id = existing
                    .as_ref()
                    .and_then(id_of)
                    .ok_or_else(|| {
                        SyncError::remote(
                            kind,
                            key,
                            towerkit::Error::api("POST", lookup.path.clone(), response.status, &response.body),
                        )
                    })?;
                self.cache.put(kind, key.clone(), id);
                Ok(Upserted {
                    id,
                    result: ApplyResult::NoChange,
                })
            }
            ResponseClass::NotFound | ResponseClass::Fatal => Err(SyncError::remote(
                kind,
                key,
                towerkit::Error::api("POST", lookup.path.clone(), response.status, &response.body),
            )),
        }
    }
}

fn missing_id(kind: ResourceKind, key: &ResourceKey) -> SyncError {
    SyncError::remote(
        kind,
        key,
        towerkit::Error::InvalidResponse("object without an id".to_string()),
    )
}
