//! In-memory fake controller.
//!
//! [`MockTransport`] implements [`Transport`] over a small model of the
//! controller API: collections with per-collection ids, exact-match list
//! filters, paginated listings with `next` links, nested sub-collections,
//! association lists, per-object roles and project syncs that finish after a
//! configurable number of polls.
//!
//! ```
//! use towerkit::{Client, MockTransport};
//! use serde_json::json;
//!
//! let mock = MockTransport::new();
//! mock.insert("organizations", json!({"name": "Default"}));
//!
//! let client = Client::new(Box::new(mock.clone()));
//! let found = client.find_exact("organizations/", "name", "Default", &[]).unwrap();
//! assert_eq!(found.unwrap()["id"], 1);
//! ```

use crate::error::{Error, Result};
use crate::response::{Method, Response};
use crate::transport::Transport;
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const DEFAULT_PAGE_SIZE: usize = 25;

/// A list response with no results, for injecting lookup misses.
pub const EMPTY_PAGE: &str = r#"{"count": 0, "next": null, "previous": null, "results": []}"#;

const API_PREFIXES: &[&str] = &["/api/v2/", "/api/controller/v2/"];

/// Children stored in their own collection but created and listed under a
/// parent: (parent collection, sub path, child collection, parent field).
const NESTED: &[(&str, &str, &str, &str)] = &[
    ("inventories", "hosts", "hosts", "inventory"),
    ("inventories", "groups", "groups", "inventory"),
    ("inventories", "inventory_sources", "inventory_sources", "inventory"),
    (
        "workflow_job_templates",
        "workflow_nodes",
        "workflow_job_template_nodes",
        "workflow_job_template",
    ),
];

/// Association lists: (parent collection, relation, target collection).
const LINKS: &[(&str, &str, &str)] = &[
    ("organizations", "users", "users"),
    ("teams", "users", "users"),
    ("groups", "hosts", "hosts"),
    ("job_templates", "credentials", "credentials"),
    ("workflow_job_template_nodes", "success_nodes", "workflow_job_template_nodes"),
    ("workflow_job_template_nodes", "failure_nodes", "workflow_job_template_nodes"),
    ("workflow_job_template_nodes", "always_nodes", "workflow_job_template_nodes"),
    ("roles", "teams", "teams"),
];

/// Role fields generated for each role-bearing collection.
const ROLE_FIELDS: &[(&str, &[&str])] = &[
    ("organizations", &["admin_role", "member_role", "read_role"]),
    ("teams", &["admin_role", "member_role", "read_role"]),
    ("credentials", &["admin_role", "use_role", "read_role"]),
    ("projects", &["admin_role", "use_role", "update_role", "read_role"]),
    (
        "inventories",
        &["admin_role", "use_role", "adhoc_role", "update_role", "read_role"],
    ),
    ("job_templates", &["admin_role", "execute_role", "read_role"]),
    (
        "workflow_job_templates",
        &["admin_role", "execute_role", "approval_role", "read_role"],
    ),
];

const SYNC_PENDING: &[&str] = &["new", "pending", "waiting", "running"];

/// Field that must be unique, and the parent field that scopes it.
fn uniqueness(collection: &str) -> Option<(&'static str, Option<&'static str>)> {
    match collection {
        "users" => Some(("username", None)),
        "teams" => Some(("name", Some("organization"))),
        "hosts" | "groups" | "inventory_sources" => Some(("name", Some("inventory"))),
        "workflow_job_template_nodes" | "roles" => None,
        _ => Some(("name", None)),
    }
}

#[derive(Debug, Clone)]
struct Injected {
    method: Method,
    path: String,
    status: u16,
    body: String,
    once: bool,
}

#[derive(Debug)]
struct MockState {
    next_ids: HashMap<String, u64>,
    collections: BTreeMap<String, BTreeMap<u64, Value>>,
    links: BTreeMap<(String, u64, String), BTreeSet<u64>>,
    requests: Vec<(Method, String)>,
    failures: Vec<Injected>,
    page_size: usize,
    sync_polls: Option<u32>,
    sync_final_status: String,
    polls: HashMap<u64, u32>,
    duplicate_link_conflicts: bool,
    offline: bool,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            next_ids: HashMap::new(),
            collections: BTreeMap::new(),
            links: BTreeMap::new(),
            requests: Vec::new(),
            failures: Vec::new(),
            page_size: DEFAULT_PAGE_SIZE,
            sync_polls: Some(1),
            sync_final_status: "successful".to_string(),
            polls: HashMap::new(),
            duplicate_link_conflicts: false,
            offline: false,
        }
    }
}

/// Fake controller for tests. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Create an empty controller.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed an object directly, bypassing uniqueness checks. Returns its id.
    pub fn insert(&self, collection: &str, value: Value) -> u64 {
        self.state().insert(collection, value)
    }

    /// Current representation of an object.
    pub fn object(&self, collection: &str, id: u64) -> Option<Value> {
        let state = self.state();
        state
            .collections
            .get(collection)
            .and_then(|c| c.get(&id))
            .map(|v| state.decorate(collection, v))
    }

    /// First object whose `field` equals `value`.
    pub fn find_by(&self, collection: &str, field: &str, value: &str) -> Option<Value> {
        self.objects(collection)
            .into_iter()
            .find(|o| field_matches(o, field, value))
    }

    /// All objects in a collection, by id.
    pub fn objects(&self, collection: &str) -> Vec<Value> {
        let state = self.state();
        state
            .collections
            .get(collection)
            .map(|c| c.values().map(|v| state.decorate(collection, v)).collect())
            .unwrap_or_default()
    }

    /// Number of objects in a collection.
    pub fn count(&self, collection: &str) -> usize {
        self.state().collections.get(collection).map_or(0, BTreeMap::len)
    }

    /// Seed an association.
    pub fn link(&self, collection: &str, id: u64, relation: &str, target: u64) {
        self.state()
            .links
            .entry((collection.to_string(), id, relation.to_string()))
            .or_default()
            .insert(target);
    }

    /// Ids associated with an object through a relation.
    pub fn linked(&self, collection: &str, id: u64, relation: &str) -> Vec<u64> {
        self.state()
            .links
            .get(&(collection.to_string(), id, relation.to_string()))
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Set the page size used by list endpoints.
    pub fn set_page_size(&self, size: usize) {
        self.state().page_size = size.max(1);
    }

    /// Configure project syncs: after `polls` detail reads a pending project
    /// reports `final_status`. `None` keeps it pending forever.
    pub fn set_project_sync(&self, polls: Option<u32>, final_status: &str) {
        let mut state = self.state();
        state.sync_polls = polls;
        state.sync_final_status = final_status.to_string();
    }

    /// Answer duplicate associations with 409 "already a member" instead of 204.
    pub fn set_duplicate_link_conflicts(&self, enabled: bool) {
        self.state().duplicate_link_conflicts = enabled;
    }

    /// Answer every `method` request to `path` (e.g. `teams/`) with `status`.
    pub fn fail(&self, method: Method, path: &str, status: u16, body: &str) {
        self.inject(method, path, status, body, false);
    }

    /// Answer only the next `method` request to `path` with `status`.
    pub fn fail_once(&self, method: Method, path: &str, status: u16, body: &str) {
        self.inject(method, path, status, body, true);
    }

    fn inject(&self, method: Method, path: &str, status: u16, body: &str, once: bool) {
        self.state().failures.push(Injected {
            method,
            path: path.to_string(),
            status,
            body: body.to_string(),
            once,
        });
    }

    /// Make every request fail at the transport level.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Requests received so far, as (method, normalized path).
    pub fn requests(&self) -> Vec<(Method, String)> {
        self.state().requests.clone()
    }

    /// Forget recorded requests.
    pub fn clear_requests(&self) {
        self.state().requests.clear();
    }

    fn dispatch(&self, method: Method, path: &str, query: &[(&str, &str)], body: Option<&Value>) -> Result<Response> {
        let mut state = self.state();
        if state.offline {
            return Err(Error::Connectivity {
                target: path.to_string(),
                message: "connection refused".to_string(),
            });
        }

        let (segments, mut filters) = split_path(path);
        filters.extend(query.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())));
        let key = format!("{}/", segments.join("/"));
        state.requests.push((method, key.clone()));

        if let Some(index) = state
            .failures
            .iter()
            .position(|f| f.method == method && f.path == key)
        {
            let injected = if state.failures[index].once {
                state.failures.remove(index)
            } else {
                state.failures[index].clone()
            };
            return Ok(Response::new(injected.status, injected.body));
        }

        let parts: Vec<&str> = segments.iter().map(String::as_str).collect();
        let response = match method {
            Method::Get => state.handle_get(&parts, &filters, &key),
            Method::Post => state.handle_post(&parts, body.unwrap_or(&Value::Null)),
            Method::Delete => state.handle_delete(&parts),
        };
        Ok(response)
    }
}

impl Transport for MockTransport {
    fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Response> {
        self.dispatch(Method::Get, path, query, None)
    }

    fn post(&self, path: &str, body: &Value) -> Result<Response> {
        self.dispatch(Method::Post, path, &[], Some(body))
    }

    fn delete(&self, path: &str) -> Result<Response> {
        self.dispatch(Method::Delete, path, &[], None)
    }
}

impl MockState {
    fn insert(&mut self, collection: &str, value: Value) -> u64 {
        let mut value = if value.is_object() {
            value
        } else {
            Value::Object(Map::new())
        };

        let counter = self.next_ids.entry(collection.to_string()).or_insert(0);
        *counter += 1;
        let id = *counter;

        value["id"] = json!(id);
        if value.get("url").is_none() {
            value["url"] = json!(format!("/api/v2/{collection}/{id}/"));
        }

        if collection == "workflow_job_template_nodes"
            && let Some(jt) = value.get("unified_job_template").and_then(Value::as_u64)
            && value.pointer("/related/unified_job_template").is_none()
        {
            ensure_object(&mut value, "related")["unified_job_template"] =
                json!(format!("/api/v2/job_templates/{jt}/"));
        }

        if let Some((_, fields)) = ROLE_FIELDS.iter().find(|(c, _)| *c == collection) {
            let mut roles = Map::new();
            for field in *fields {
                let role_id = self.insert(
                    "roles",
                    json!({"name": field, "resource_type": collection, "content_object": id}),
                );
                roles.insert((*field).to_string(), json!({"id": role_id, "name": field}));
            }
            if let Some(existing) =
                ensure_object(ensure_object(&mut value, "summary_fields"), "object_roles").as_object_mut()
            {
                existing.extend(roles);
            }
        }

        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(id, value);
        id
    }

    fn decorate(&self, collection: &str, value: &Value) -> Value {
        let mut value = value.clone();
        if collection == "job_templates"
            && let Some(id) = value.get("id").and_then(Value::as_u64)
        {
            let creds: Vec<Value> = self
                .links
                .get(&("job_templates".to_string(), id, "credentials".to_string()))
                .into_iter()
                .flatten()
                .filter_map(|cid| self.collections.get("credentials")?.get(cid))
                .map(|c| json!({"id": c["id"], "name": c["name"]}))
                .collect();
            ensure_object(&mut value, "summary_fields")["credentials"] = Value::Array(creds);
        }
        value
    }

    fn exists(&self, collection: &str, id: u64) -> bool {
        self.collections
            .get(collection)
            .is_some_and(|c| c.contains_key(&id))
    }

    fn page(&self, items: Vec<Value>, filters: &[(String, String)], base: &str) -> Response {
        let page: usize = filters
            .iter()
            .find(|(k, _)| k == "page")
            .and_then(|(_, v)| v.parse().ok())
            .unwrap_or(1)
            .max(1);
        let start = (page - 1) * self.page_size;
        let count = items.len();
        let results: Vec<Value> = items.into_iter().skip(start).take(self.page_size).collect();

        let next = if start + self.page_size < count {
            let mut query = String::new();
            for (k, v) in filters.iter().filter(|(k, _)| k != "page") {
                query.push_str(&format!("{}={}&", urlencoding::encode(k), urlencoding::encode(v)));
            }
            json!(format!("/api/v2/{base}?{query}page={}", page + 1))
        } else {
            Value::Null
        };

        Response::json(
            200,
            &json!({"count": count, "next": next, "previous": null, "results": results}),
        )
    }

    fn filtered(&self, collection: &str, filters: &[(String, String)], extra: Option<(&str, u64)>) -> Vec<Value> {
        self.collections
            .get(collection)
            .into_iter()
            .flat_map(BTreeMap::values)
            .filter(|item| {
                extra.is_none_or(|(field, id)| item.get(field).and_then(Value::as_u64) == Some(id))
            })
            .filter(|item| {
                filters
                    .iter()
                    .filter(|(k, _)| k != "page" && k != "page_size")
                    .all(|(k, v)| field_matches(item, k, v))
            })
            .map(|item| self.decorate(collection, item))
            .collect()
    }

    fn handle_get(&mut self, parts: &[&str], filters: &[(String, String)], base: &str) -> Response {
        match parts {
            ["ping"] => Response::json(200, &json!({"version": "mock", "active_node": "mock"})),
            ["me"] => Response::json(
                200,
                &json!({"count": 1, "next": null, "results": [{"id": 1, "username": "admin"}]}),
            ),
            [collection] => {
                let items = self.filtered(collection, filters, None);
                self.page(items, filters, base)
            }
            [collection, id] => {
                let Some(id) = id.parse::<u64>().ok().filter(|id| self.exists(collection, *id)) else {
                    return not_found();
                };
                if *collection == "projects" {
                    self.advance_sync(id);
                }
                match self.collections.get(*collection).and_then(|c| c.get(&id)) {
                    Some(value) => Response::json(200, &self.decorate(collection, value)),
                    None => not_found(),
                }
            }
            [collection, id, sub] => {
                let Some(id) = id.parse::<u64>().ok().filter(|id| self.exists(collection, *id)) else {
                    return not_found();
                };
                if let Some((_, _, child, field)) =
                    NESTED.iter().find(|(p, s, _, _)| p == collection && s == sub)
                {
                    let items = self.filtered(child, filters, Some((field, id)));
                    return self.page(items, filters, base);
                }
                if let Some((_, relation, target)) =
                    LINKS.iter().find(|(p, r, _)| p == collection && r == sub)
                {
                    let ids = self
                        .links
                        .get(&((*collection).to_string(), id, (*relation).to_string()))
                        .cloned()
                        .unwrap_or_default();
                    let items: Vec<Value> = self
                        .filtered(target, filters, None)
                        .into_iter()
                        .filter(|item| item.get("id").and_then(Value::as_u64).is_some_and(|i| ids.contains(&i)))
                        .collect();
                    return self.page(items, filters, base);
                }
                not_found()
            }
            _ => not_found(),
        }
    }

    fn advance_sync(&mut self, id: u64) {
        let polls = self.polls.entry(id).or_insert(0);
        *polls += 1;
        let polls = *polls;
        let final_status = self.sync_final_status.clone();
        let done = self.sync_polls.is_some_and(|n| polls >= n);
        if let Some(project) = self.collections.get_mut("projects").and_then(|c| c.get_mut(&id)) {
            let pending = project
                .get("status")
                .and_then(Value::as_str)
                .is_some_and(|s| SYNC_PENDING.contains(&s));
            if pending && done {
                project["status"] = json!(final_status);
            }
        }
    }

    fn create(&mut self, collection: &str, mut body: Value) -> Response {
        if !body.is_object() {
            return Response::json(400, &json!({"detail": "JSON object expected"}));
        }

        if let Some((field, scope)) = uniqueness(collection) {
            let Some(key) = body.get(field).and_then(Value::as_str).map(str::to_string) else {
                let mut detail = Map::new();
                detail.insert(field.to_string(), json!(["This field is required."]));
                return Response::json(400, &Value::Object(detail));
            };
            let scope_value = scope.map(|s| body.get(s).cloned().unwrap_or(Value::Null));
            let duplicate = self.collections.get(collection).is_some_and(|c| {
                c.values().any(|o| {
                    o.get(field).and_then(Value::as_str) == Some(key.as_str())
                        && scope.zip(scope_value.as_ref()).is_none_or(|(s, v)| o.get(s) == Some(v))
                })
            });
            if duplicate {
                return Response::json(
                    400,
                    &json!({"__all__": [format!("Object with this {field} already exists.")]}),
                );
            }
        }

        if collection == "projects" && body.get("status").is_none() {
            body["status"] = json!("pending");
        }

        let id = self.insert(collection, body);
        match self.collections.get(collection).and_then(|c| c.get(&id)) {
            Some(value) => Response::json(201, &self.decorate(collection, value)),
            None => Response::new(500, "lost object"),
        }
    }

    fn handle_post(&mut self, parts: &[&str], body: &Value) -> Response {
        match parts {
            [collection] => self.create(collection, body.clone()),
            [collection, id, sub] => {
                let Some(id) = id.parse::<u64>().ok().filter(|id| self.exists(collection, *id)) else {
                    return not_found();
                };
                if let Some((_, _, child, field)) =
                    NESTED.iter().find(|(p, s, _, _)| p == collection && s == sub)
                {
                    let mut child_body = body.clone();
                    if child_body.is_object() {
                        child_body[*field] = json!(id);
                    }
                    return self.create(child, child_body);
                }
                if let Some((_, relation, target)) =
                    LINKS.iter().find(|(p, r, _)| p == collection && r == sub)
                {
                    return self.associate(collection, id, relation, target, body);
                }
                not_found()
            }
            _ => not_found(),
        }
    }

    fn associate(&mut self, collection: &str, id: u64, relation: &str, target: &str, body: &Value) -> Response {
        let Some(target_id) = body.get("id").and_then(Value::as_u64) else {
            return Response::json(400, &json!({"id": ["This field is required."]}));
        };
        if !self.exists(target, target_id) {
            return Response::json(400, &json!({"msg": format!("Object with id {target_id} does not exist.")}));
        }

        let key = (collection.to_string(), id, relation.to_string());
        if body.get("disassociate").is_some_and(|v| v.as_bool().unwrap_or(true)) {
            if let Some(set) = self.links.get_mut(&key) {
                set.remove(&target_id);
            }
            return Response::no_content();
        }

        let set = self.links.entry(key).or_default();
        if !set.insert(target_id) && self.duplicate_link_conflicts {
            return Response::json(409, &json!({"msg": "Object is already a member of this list."}));
        }
        Response::no_content()
    }

    fn handle_delete(&mut self, parts: &[&str]) -> Response {
        let [collection, id] = parts else {
            return Response::json(405, &json!({"detail": "Method not allowed."}));
        };
        let Some(id) = id.parse::<u64>().ok().filter(|id| self.exists(collection, *id)) else {
            return not_found();
        };

        if let Some(c) = self.collections.get_mut(*collection) {
            c.remove(&id);
        }

        for (_, _, child, field) in NESTED.iter().filter(|(p, ..)| p == collection) {
            if let Some(children) = self.collections.get_mut(*child) {
                children.retain(|_, v| v.get(*field).and_then(Value::as_u64) != Some(id));
            }
        }

        self.links.retain(|(c, i, _), _| !(c == collection && *i == id));
        for ((_, _, relation), set) in &mut self.links {
            let targets_this = LINKS
                .iter()
                .any(|(_, r, t)| r == relation && t == collection);
            if targets_this {
                set.remove(&id);
            }
        }

        Response::no_content()
    }
}

fn not_found() -> Response {
    Response::json(404, &json!({"detail": "Not found."}))
}

fn ensure_object<'a>(value: &'a mut Value, key: &str) -> &'a mut Value {
    if !value.get(key).is_some_and(Value::is_object) {
        value[key] = Value::Object(Map::new());
    }
    &mut value[key]
}

fn field_matches(item: &Value, field: &str, expected: &str) -> bool {
    match item.get(field) {
        Some(Value::String(s)) => s == expected,
        Some(Value::Number(n)) => n.to_string() == expected,
        Some(Value::Bool(b)) => b.to_string() == expected,
        Some(Value::Null) | None => expected == "null",
        Some(_) => false,
    }
}

/// Split a request path into API segments and query pairs.
fn split_path(path: &str) -> (Vec<String>, Vec<(String, String)>) {
    let mut rest = path;
    if let Some(scheme_end) = rest.find("://") {
        let after = &rest[scheme_end + 3..];
        rest = after.find('/').map_or("/", |i| &after[i..]);
    }

    let (path_part, query_part) = rest.split_once('?').unwrap_or((rest, ""));
    let trimmed = API_PREFIXES
        .iter()
        .find_map(|p| path_part.strip_prefix(p))
        .unwrap_or(path_part);

    let segments = trimmed
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    let query = query_part
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (decode(k), decode(v))
        })
        .collect();

    (segments, query)
}

/// Percent-decode a query component, treating `+` as a space.
fn decode(s: &str) -> String {
    let spaced = s.replace('+', " ");
    String::from_utf8_lossy(&urlencoding::decode_binary(spaced.as_bytes())).into_owned()
}
