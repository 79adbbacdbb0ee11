//! Blocking REST client for automation controller APIs (AWX / AAP controller).
//!
//! This crate provides:
//! - A [`Transport`] trait with a `ureq`-backed implementation
//! - A [`Client`] with pagination, exact-match lookup and association helpers
//! - Response classification ([`classify`]) into success, already-exists,
//!   not-found and fatal
//! - An in-memory [`MockTransport`] for tests
//!
//! # Example
//!
//! ```no_run
//! use towerkit::{Auth, Client, ConnectionConfig};
//!
//! let config = ConnectionConfig::new(
//!     "https://awx.lab.local",
//!     Auth::Basic { username: "admin".into(), password: "secret".into() },
//! );
//! let client = Client::connect(config);
//! client.check_connection()?;
//! for org in client.list_all("organizations/", &[])? {
//!     println!("{}", org["name"]);
//! }
//! # Ok::<(), towerkit::Error>(())
//! ```

pub mod error;
pub mod mock;
pub mod response;
pub mod transport;

pub use error::{Error, ErrorCategory, Result};
pub use mock::{EMPTY_PAGE, MockTransport};
pub use response::{Method, Response, ResponseClass, classify};
pub use transport::{Auth, ConnectionConfig, DEFAULT_API_PREFIX, Transport, UreqTransport};

use serde_json::{Value, json};

/// Controller client over any [`Transport`].
pub struct Client {
    transport: Box<dyn Transport>,
}

impl Client {
    /// Create a client over the given transport.
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Create a client over a `ureq` transport.
    pub fn connect(config: ConnectionConfig) -> Self {
        Self::new(Box::new(UreqTransport::new(config)))
    }

    /// Verify the controller is reachable and accepts our credentials.
    ///
    /// # Errors
    ///
    /// Returns `Error::Connectivity` if `ping/` cannot be reached and
    /// `Error::Auth` if `me/` rejects the credentials.
    pub fn check_connection(&self) -> Result<()> {
        let ping = self.transport.get("ping/", &[])?;
        if !ping.is_success() {
            return Err(Error::Connectivity {
                target: "ping/".to_string(),
                message: format!("HTTP {}", ping.status),
            });
        }

        let me = self.transport.get("me/", &[])?;
        match me.status {
            401 | 403 => Err(Error::Auth { status: me.status }),
            _ if me.is_success() => Ok(()),
            status => Err(Error::api("GET", "me/", status, &me.body)),
        }
    }

    /// GET and parse a JSON body.
    ///
    /// # Errors
    ///
    /// Returns `Error::Api` on a non-2xx status.
    pub fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        let response = self.transport.get(path, query)?;
        if !response.is_success() {
            return Err(Error::api("GET", path, response.status, &response.body));
        }
        Ok(response.json_body()?)
    }

    /// List every object of a collection, following `next` links.
    ///
    /// # Errors
    ///
    /// Fails if any page cannot be fetched or lacks a `results` array.
    pub fn list_all(&self, path: &str, query: &[(&str, &str)]) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        let mut page = self.get_json(path, query)?;

        loop {
            let results = page
                .get("results")
                .and_then(Value::as_array)
                .ok_or_else(|| Error::InvalidResponse(format!("{path}: missing results array")))?;
            items.extend(results.iter().cloned());

            let Some(next) = page.get("next").and_then(Value::as_str).map(str::to_string) else {
                break;
            };
            log::trace!("following next link {next}");
            page = self.get_json(&next, &[])?;
        }

        Ok(items)
    }

    /// Find the single object whose `field` equals `value` exactly.
    ///
    /// `extra` narrows the query (e.g. `organization=3` for teams).
    ///
    /// # Errors
    ///
    /// Propagates listing errors. A 404 on the collection means "absent".
    pub fn find_exact(
        &self,
        path: &str,
        field: &str,
        value: &str,
        extra: &[(&str, &str)],
    ) -> Result<Option<Value>> {
        let mut query = vec![(field, value)];
        query.extend_from_slice(extra);

        let items = match self.list_all(path, &query) {
            Ok(items) => items,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };

        Ok(items
            .into_iter()
            .find(|item| item.get(field).and_then(Value::as_str) == Some(value)))
    }

    /// POST a creation payload and return the created object.
    ///
    /// # Errors
    ///
    /// Returns `Error::Api` on a non-2xx status, including duplicates; use
    /// [`Client::post`] when the raw response is needed.
    pub fn create(&self, path: &str, payload: &Value) -> Result<Value> {
        let response = self.transport.post(path, payload)?;
        if !response.is_success() {
            return Err(Error::api("POST", path, response.status, &response.body));
        }
        Ok(response.json_body()?)
    }

    /// POST and return the raw response.
    ///
    /// # Errors
    ///
    /// Fails only on transport errors.
    pub fn post(&self, path: &str, payload: &Value) -> Result<Response> {
        self.transport.post(path, payload)
    }

    /// Associate object `id` with the list at `path`.
    ///
    /// Returns `Success` or `AlreadyExists`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Api` when the controller refuses the association.
    pub fn associate(&self, path: &str, id: u64) -> Result<ResponseClass> {
        self.link_call(path, &json!({ "id": id }))
    }

    /// Remove object `id` from the list at `path`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Api` when the controller refuses the request.
    pub fn disassociate(&self, path: &str, id: u64) -> Result<ResponseClass> {
        self.link_call(path, &json!({ "id": id, "disassociate": true }))
    }

    fn link_call(&self, path: &str, body: &Value) -> Result<ResponseClass> {
        let response = self.transport.post(path, body)?;
        match response.class() {
            class @ (ResponseClass::Success | ResponseClass::AlreadyExists) => Ok(class),
            ResponseClass::NotFound | ResponseClass::Fatal => {
                Err(Error::api("POST", path, response.status, &response.body))
            }
        }
    }

    /// DELETE and return the raw response for classification.
    ///
    /// # Errors
    ///
    /// Fails only on transport errors.
    pub fn delete(&self, path: &str) -> Result<Response> {
        self.transport.delete(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(mock: &MockTransport) -> Client {
        Client::new(Box::new(mock.clone()))
    }

    #[test]
    fn test_check_connection_ok() {
        let mock = MockTransport::new();
        assert!(client(&mock).check_connection().is_ok());
    }

    #[test]
    fn test_check_connection_offline() {
        let mock = MockTransport::new();
        mock.set_offline(true);
        let err = client(&mock).check_connection().unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Connectivity);
    }

    #[test]
    fn test_check_connection_rejected_credentials() {
        let mock = MockTransport::new();
        mock.fail(Method::Get, "me/", 401, "{\"detail\":\"Authentication credentials were not provided.\"}");
        let err = client(&mock).check_connection().unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Auth);
        assert!(err.category().is_fatal_at_start());
    }

    #[test]
    fn test_list_all_follows_next() {
        let mock = MockTransport::new();
        mock.set_page_size(2);
        for i in 0..5 {
            mock.insert("projects", json!({"name": format!("p{i}")}));
        }

        let items = client(&mock).list_all("projects/", &[]).unwrap();
        assert_eq!(items.len(), 5);

        let gets = mock
            .requests()
            .into_iter()
            .filter(|(m, p)| *m == Method::Get && p == "projects/")
            .count();
        assert_eq!(gets, 3);
    }

    #[test]
    fn test_list_all_keeps_filters_across_pages() {
        let mock = MockTransport::new();
        mock.set_page_size(1);
        mock.insert("hosts", json!({"name": "a", "inventory": 1}));
        mock.insert("hosts", json!({"name": "b", "inventory": 2}));
        mock.insert("hosts", json!({"name": "c", "inventory": 1}));

        let items = client(&mock).list_all("hosts/", &[("inventory", "1")]).unwrap();
        let names: Vec<&str> = items.iter().filter_map(|h| h["name"].as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[test]
    fn test_list_all_missing_results() {
        let mock = MockTransport::new();
        mock.fail(Method::Get, "odd/", 200, "{\"items\": []}");
        let err = client(&mock).list_all("odd/", &[]).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Format);
    }

    #[test]
    fn test_find_exact() {
        let mock = MockTransport::new();
        mock.insert("teams", json!({"name": "Ops", "organization": 1}));
        mock.insert("teams", json!({"name": "Ops", "organization": 2}));

        let c = client(&mock);
        let found = c.find_exact("teams/", "name", "Ops", &[("organization", "2")]).unwrap();
        assert_eq!(found.unwrap()["id"], 2);
        assert!(c.find_exact("teams/", "name", "Dev", &[]).unwrap().is_none());
    }

    #[test]
    fn test_find_exact_name_with_spaces_across_pages() {
        let mock = MockTransport::new();
        mock.set_page_size(1);
        mock.insert("inventories", json!({"name": "Lab Inventory", "kind": ""}));
        mock.insert("inventories", json!({"name": "Lab Inventory", "kind": "smart"}));

        let items = client(&mock)
            .list_all("inventories/", &[("name", "Lab Inventory")])
            .unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_create_and_duplicate() {
        let mock = MockTransport::new();
        let c = client(&mock);

        let created = c.create("organizations/", &json!({"name": "Org-A"})).unwrap();
        assert_eq!(created["id"], 1);

        let err = c.create("organizations/", &json!({"name": "Org-A"})).unwrap_err();
        assert_eq!(err.status(), Some(400));

        let raw = c.post("organizations/", &json!({"name": "Org-A"})).unwrap();
        assert_eq!(raw.class(), ResponseClass::AlreadyExists);
    }

    #[test]
    fn test_associate_is_idempotent() {
        let mock = MockTransport::new();
        let team = mock.insert("teams", json!({"name": "Ops", "organization": 1}));
        let user = mock.insert("users", json!({"username": "alice"}));
        let c = client(&mock);

        let path = format!("teams/{team}/users/");
        assert_eq!(c.associate(&path, user).unwrap(), ResponseClass::Success);
        assert_eq!(c.associate(&path, user).unwrap(), ResponseClass::Success);

        mock.set_duplicate_link_conflicts(true);
        assert_eq!(c.associate(&path, user).unwrap(), ResponseClass::AlreadyExists);
        assert_eq!(mock.linked("teams", team, "users"), vec![user]);

        c.disassociate(&path, user).unwrap();
        assert!(mock.linked("teams", team, "users").is_empty());
    }

    #[test]
    fn test_associate_missing_target_is_error() {
        let mock = MockTransport::new();
        let team = mock.insert("teams", json!({"name": "Ops"}));
        let err = client(&mock).associate(&format!("teams/{team}/users/"), 99).unwrap_err();
        assert_eq!(err.status(), Some(400));
    }

    #[test]
    fn test_delete_classification() {
        let mock = MockTransport::new();
        let id = mock.insert("projects", json!({"name": "p"}));
        let c = client(&mock);

        let path = format!("projects/{id}/");
        assert_eq!(c.delete(&path).unwrap().class(), ResponseClass::Success);
        assert_eq!(c.delete(&path).unwrap().class(), ResponseClass::NotFound);
    }
}
