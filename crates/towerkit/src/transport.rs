//! Transport layer: the three verbs the sync engine needs.
//!
//! [`UreqTransport`] talks to a real controller with a pre-authenticated
//! agent. Tests use [`crate::MockTransport`] instead.

use crate::error::{Error, Result};
use crate::response::Response;
use base64::prelude::*;
use serde_json::Value;
use std::time::Duration;

/// Default API prefix for AWX.
pub const DEFAULT_API_PREFIX: &str = "/api/v2/";

/// Request/response transport.
///
/// Paths are resolved against the API root: `organizations/` is relative to
/// the prefix, `/api/v2/organizations/?page=2` (as found in `next` links) is
/// relative to the host, and absolute URLs are used as-is. Non-2xx statuses
/// are returned as responses, never as errors; `Err` means the request did
/// not complete.
pub trait Transport: Send + Sync {
    /// GET with query parameters.
    fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Response>;

    /// POST a JSON body. Empty "no content" answers are valid responses.
    fn post(&self, path: &str, body: &Value) -> Result<Response>;

    /// DELETE.
    fn delete(&self, path: &str) -> Result<Response>;
}

/// How requests are authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Auth {
    /// HTTP basic auth.
    Basic { username: String, password: String },
    /// OAuth2 personal access token.
    Token(String),
    /// No credentials (only useful against `ping/`).
    Anonymous,
}

impl Auth {
    /// Value for the `Authorization` header.
    pub fn header_value(&self) -> Option<String> {
        match self {
            Self::Basic { username, password } => Some(format!(
                "Basic {}",
                BASE64_STANDARD.encode(format!("{username}:{password}"))
            )),
            Self::Token(token) => Some(format!("Bearer {token}")),
            Self::Anonymous => None,
        }
    }
}

/// Connection settings for [`UreqTransport`].
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Base URL, e.g. `https://awx.lab.local`.
    pub host: String,
    /// API prefix, e.g. `/api/v2/` or `/api/controller/v2/`.
    pub api_prefix: String,
    /// Credentials.
    pub auth: Auth,
    /// Verify TLS certificates. Lab controllers usually use self-signed ones.
    pub verify_tls: bool,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl ConnectionConfig {
    /// Create a config with basic auth and lab-friendly defaults.
    pub fn new(host: impl Into<String>, auth: Auth) -> Self {
        Self {
            host: host.into(),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            auth,
            verify_tls: false,
            timeout: Duration::from_secs(30),
        }
    }

    /// Full API base URL.
    pub fn api_base(&self) -> String {
        format!(
            "{}/{}/",
            self.host.trim_end_matches('/'),
            self.api_prefix.trim_matches('/')
        )
    }

    /// Resolve a path to a full URL.
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{}", self.host.trim_end_matches('/'), path)
        } else {
            format!("{}{}", self.api_base(), path)
        }
    }
}

/// Blocking transport backed by a `ureq` agent.
pub struct UreqTransport {
    agent: ureq::Agent,
    config: ConnectionConfig,
    auth_header: Option<String>,
}

impl UreqTransport {
    /// Create a transport. No request is made until the first call.
    pub fn new(config: ConnectionConfig) -> Self {
        let tls = ureq::tls::TlsConfig::builder()
            .disable_verification(!config.verify_tls)
            .build();

        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(config.timeout))
            .tls_config(tls)
            .build()
            .into();

        let auth_header = config.auth.header_value();

        Self {
            agent,
            config,
            auth_header,
        }
    }

    fn connectivity(url: &str, err: &ureq::Error) -> Error {
        Error::Connectivity {
            target: url.to_string(),
            message: err.to_string(),
        }
    }
}

fn read_response(mut response: ureq::http::Response<ureq::Body>) -> Result<Response> {
    let status = response.status().as_u16();
    let body = response
        .body_mut()
        .read_to_string()
        .map_err(|e| Error::InvalidResponse(e.to_string()))?;
    Ok(Response { status, body })
}

impl Transport for UreqTransport {
    fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Response> {
        let url = self.config.url_for(path);
        log::debug!("GET {url} {query:?}");

        let mut request = self.agent.get(&url).header("Accept", "application/json");
        if let Some(auth) = &self.auth_header {
            request = request.header("Authorization", auth.as_str());
        }
        for (key, value) in query {
            request = request.query(*key, *value);
        }

        let response = request
            .call()
            .map_err(|e| Self::connectivity(&url, &e))?;
        read_response(response)
    }

    fn post(&self, path: &str, body: &Value) -> Result<Response> {
        let url = self.config.url_for(path);
        log::debug!("POST {url}");

        let mut request = self.agent.post(&url).header("Accept", "application/json");
        if let Some(auth) = &self.auth_header {
            request = request.header("Authorization", auth.as_str());
        }

        let response = request
            .send_json(body)
            .map_err(|e| Self::connectivity(&url, &e))?;
        read_response(response)
    }

    fn delete(&self, path: &str) -> Result<Response> {
        let url = self.config.url_for(path);
        log::debug!("DELETE {url}");

        let mut request = self.agent.delete(&url).header("Accept", "application/json");
        if let Some(auth) = &self.auth_header {
            request = request.header("Authorization", auth.as_str());
        }

        let response = request
            .call()
            .map_err(|e| Self::connectivity(&url, &e))?;
        read_response(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ConnectionConfig {
        ConnectionConfig::new(
            "https://awx.lab.local/",
            Auth::Basic {
                username: "admin".to_string(),
                password: "changeme".to_string(),
            },
        )
    }

    #[test]
    fn test_api_base() {
        assert_eq!(config().api_base(), "https://awx.lab.local/api/v2/");

        let mut gateway = config();
        gateway.api_prefix = "api/controller/v2".to_string();
        assert_eq!(gateway.api_base(), "https://awx.lab.local/api/controller/v2/");
    }

    #[test]
    fn test_url_for_relative_path() {
        assert_eq!(
            config().url_for("organizations/"),
            "https://awx.lab.local/api/v2/organizations/"
        );
    }

    #[test]
    fn test_url_for_next_link() {
        assert_eq!(
            config().url_for("/api/v2/teams/?page=2"),
            "https://awx.lab.local/api/v2/teams/?page=2"
        );
    }

    #[test]
    fn test_url_for_absolute_url() {
        assert_eq!(
            config().url_for("http://other/api/v2/ping/"),
            "http://other/api/v2/ping/"
        );
    }

    #[test]
    fn test_basic_auth_header() {
        let header = config().auth.header_value().unwrap();
        // base64("admin:changeme")
        assert_eq!(header, "Basic YWRtaW46Y2hhbmdlbWU=");
    }

    #[test]
    fn test_token_and_anonymous_headers() {
        assert_eq!(
            Auth::Token("abc".to_string()).header_value().as_deref(),
            Some("Bearer abc")
        );
        assert_eq!(Auth::Anonymous.header_value(), None);
    }

    #[test]
    fn test_defaults_tolerate_self_signed() {
        let cfg = config();
        assert!(!cfg.verify_tls);
        assert_eq!(cfg.timeout, Duration::from_secs(30));
        assert_eq!(cfg.api_prefix, DEFAULT_API_PREFIX);
    }
}
