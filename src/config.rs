//! Settings: built-in defaults, then `config.toml`, then flags/env.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use syncgraph::{ProtectedNames, ProvisionOptions, ResourceKind};
use towerkit::{Auth, ConnectionConfig, DEFAULT_API_PREFIX};

use crate::cli::ConnectionArgs;
use crate::paths;

/// Everything read from `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub controller: ControllerSettings,
    pub sync: SyncSettings,
    /// Extra protected names, keyed by API collection (`organizations`, `projects`, ...)
    pub protected: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerSettings {
    pub host: String,
    pub api_prefix: String,
    pub username: String,
    pub password: Option<String>,
    pub token: Option<String>,
    pub verify_tls: bool,
    pub timeout_secs: u64,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            host: "http://awx.lab.local:32000".to_string(),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            username: "admin".to_string(),
            password: Some("changeme".to_string()),
            token: None,
            verify_tls: false,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Project-sync deadline
    pub sync_timeout_secs: u64,
    pub poll_interval_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            sync_timeout_secs: 120,
            poll_interval_secs: 3,
        }
    }
}

impl Settings {
    /// Load `config.toml` from the config directory, or defaults if absent.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_dir()?)
    }

    /// Load `config.toml` from `dir`, or defaults if absent.
    pub fn load_from(dir: &Path) -> Result<Self> {
        let path = dir.join(paths::CONFIG_FILE);
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config: {}", path.display()))
    }

    /// Apply connection flags (which also carry the `AWX_*` env vars).
    pub fn apply(&mut self, args: &ConnectionArgs) {
        let controller = &mut self.controller;
        if let Some(host) = &args.host {
            controller.host.clone_from(host);
        }
        if let Some(prefix) = &args.api_prefix {
            controller.api_prefix.clone_from(prefix);
        }
        if let Some(username) = &args.username {
            controller.username.clone_from(username);
        }
        if args.password.is_some() {
            controller.password.clone_from(&args.password);
        }
        if args.token.is_some() {
            controller.token.clone_from(&args.token);
        }
        if args.verify_tls {
            controller.verify_tls = true;
        }
    }

    /// Transport settings. A token wins over username/password.
    pub fn connection(&self) -> Result<ConnectionConfig> {
        let controller = &self.controller;
        if controller.host.trim().is_empty() {
            bail!("No controller host configured (set AWX_HOST or --host)");
        }

        let auth = match (&controller.token, &controller.password) {
            (Some(token), _) if !token.is_empty() => Auth::Token(token.clone()),
            (_, Some(password)) => Auth::Basic {
                username: controller.username.clone(),
                password: password.clone(),
            },
            _ => bail!("No credentials configured (set AWX_PASSWORD or AWX_TOKEN)"),
        };

        let mut config = ConnectionConfig::new(controller.host.trim_end_matches('/'), auth);
        config.api_prefix = normalize_prefix(&controller.api_prefix);
        config.verify_tls = controller.verify_tls;
        config.timeout = Duration::from_secs(controller.timeout_secs);
        Ok(config)
    }

    /// Provisioning options from the sync settings.
    pub fn provision_options(&self) -> ProvisionOptions {
        ProvisionOptions {
            wait_for_projects: true,
            sync_deadline: Duration::from_secs(self.sync.sync_timeout_secs),
            poll_interval: Duration::from_secs(self.sync.poll_interval_secs),
        }
    }

    /// Default protected names plus the configured extras.
    pub fn protected_names(&self) -> ProtectedNames {
        let mut protected = ProtectedNames::default();
        for (collection, names) in &self.protected {
            match ResourceKind::from_endpoint(collection) {
                Some(kind) => protected.extend(kind, names.iter().cloned()),
                None => log::warn!("Ignoring protected names for unknown collection '{collection}'"),
            }
        }
        protected
    }
}

/// Ensure the prefix starts and ends with `/`.
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    }
}

/// The manifest to use: an explicit path, else `manifest.toml` in the config
/// directory if present, else the built-in sample.
pub fn manifest_path(explicit: Option<&str>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        return Ok(Some(paths::expand(path)));
    }
    let candidate = paths::config_dir()?.join(paths::MANIFEST_FILE);
    Ok(candidate.exists().then_some(candidate))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn no_flags() -> ConnectionArgs {
        ConnectionArgs {
            host: None,
            api_prefix: None,
            username: None,
            password: None,
            token: None,
            verify_tls: false,
        }
    }

    #[test]
    fn test_defaults_without_file() {
        let temp = TempDir::new().unwrap();
        let settings = Settings::load_from(temp.path()).unwrap();
        assert_eq!(settings.controller.host, "http://awx.lab.local:32000");
        assert_eq!(settings.controller.api_prefix, "/api/v2/");
        assert_eq!(settings.controller.username, "admin");
        assert!(!settings.controller.verify_tls);
        assert_eq!(settings.sync.sync_timeout_secs, 120);
        assert_eq!(settings.sync.poll_interval_secs, 3);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("config.toml"),
            r#"
[controller]
host = "https://aap.example.com"
api_prefix = "/api/controller/v2/"

[protected]
organizations = ["Platform Team"]
"#,
        )
        .unwrap();

        let settings = Settings::load_from(temp.path()).unwrap();
        assert_eq!(settings.controller.host, "https://aap.example.com");
        assert_eq!(settings.controller.api_prefix, "/api/controller/v2/");
        assert_eq!(settings.controller.username, "admin");
        assert_eq!(settings.sync.sync_timeout_secs, 120);

        let protected = settings.protected_names();
        assert!(protected.is_protected(ResourceKind::Organization, "Platform Team"));
        assert!(protected.is_protected(ResourceKind::Organization, "Default"));
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("config.toml"), "controller = [").unwrap();
        assert!(Settings::load_from(temp.path()).is_err());
    }

    #[test]
    fn test_flags_override_file() {
        let mut settings = Settings::default();
        let mut flags = no_flags();
        flags.host = Some("https://other:8443".to_string());
        flags.password = Some("s3cret".to_string());
        settings.apply(&flags);

        let config = settings.connection().unwrap();
        assert_eq!(config.host, "https://other:8443");
        assert_eq!(
            config.auth,
            Auth::Basic {
                username: "admin".to_string(),
                password: "s3cret".to_string()
            }
        );
    }

    #[test]
    fn test_token_wins_over_password() {
        let mut settings = Settings::default();
        let mut flags = no_flags();
        flags.token = Some("abc".to_string());
        settings.apply(&flags);
        assert_eq!(settings.connection().unwrap().auth, Auth::Token("abc".to_string()));
    }

    #[test]
    fn test_missing_credentials() {
        let mut settings = Settings::default();
        settings.controller.password = None;
        assert!(settings.connection().is_err());
    }

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix("api/v2"), "/api/v2/");
        assert_eq!(normalize_prefix("/api/controller/v2/"), "/api/controller/v2/");
        assert_eq!(normalize_prefix(""), "/");
    }

    #[test]
    fn test_unknown_protected_collection_is_ignored() {
        let mut settings = Settings::default();
        settings
            .protected
            .insert("widgets".to_string(), vec!["x".to_string()]);
        let protected = settings.protected_names();
        assert!(protected.is_protected(ResourceKind::Project, "Demo Project"));
    }
}
