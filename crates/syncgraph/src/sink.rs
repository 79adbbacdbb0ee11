//! Where collected documents go.

use crate::error::Result;
use crate::kind::ResourceKind;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;

/// Receives collected documents.
pub trait AssetSink {
    /// Persist one document of `kind`. `label` marks an attachment
    /// (`nodes`, `survey`, `sources`) written next to its owner.
    fn write(&mut self, kind: ResourceKind, document: &Value, label: Option<&str>) -> Result<()>;
}

/// Replace every character outside `[A-Za-z0-9 _-]` with `_`.
pub fn safe_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// File name for a document: `007_My Template.json`, `007_My Template_survey.json`.
pub fn file_name(id: u64, name: &str, label: Option<&str>) -> String {
    let safe = safe_filename(name);
    match label {
        Some(label) => format!("{id:03}_{safe}_{label}.json"),
        None => format!("{id:03}_{safe}.json"),
    }
}

fn identity(document: &Value) -> (u64, &str) {
    let id = document.get("id").and_then(Value::as_u64).unwrap_or(0);
    let name = document
        .get("name")
        .or_else(|| document.get("username"))
        .and_then(Value::as_str)
        .unwrap_or("unnamed");
    (id, name)
}

/// Writes pretty-printed JSON under `<root>/<kind dir>/`.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
    written: usize,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            written: 0,
        }
    }

    /// Number of files written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Path a document would be written to.
    pub fn path_for(&self, kind: ResourceKind, document: &Value, label: Option<&str>) -> PathBuf {
        let (id, name) = identity(document);
        self.root.join(kind.dir_name()).join(file_name(id, name, label))
    }
}

impl AssetSink for DirectorySink {
    fn write(&mut self, kind: ResourceKind, document: &Value, label: Option<&str>) -> Result<()> {
        let path = self.path_for(kind, document, label);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(document).map_err(std::io::Error::other)?;
        fs::write(&path, content + "\n")?;
        log::debug!("wrote {}", path.display());
        self.written += 1;
        Ok(())
    }
}

/// Keeps documents in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub documents: Vec<(ResourceKind, Option<String>, Value)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Main documents of one kind, attachments excluded.
    pub fn of_kind(&self, kind: ResourceKind) -> Vec<&Value> {
        self.documents
            .iter()
            .filter(|(k, label, _)| *k == kind && label.is_none())
            .map(|(_, _, doc)| doc)
            .collect()
    }

    /// An attachment by owner kind, owner id and label.
    pub fn attachment(&self, kind: ResourceKind, id: u64, label: &str) -> Option<&Value> {
        self.documents
            .iter()
            .find(|(k, l, doc)| {
                *k == kind && l.as_deref() == Some(label) && doc.get("id").and_then(Value::as_u64) == Some(id)
            })
            .map(|(_, _, doc)| doc)
    }
}

impl AssetSink for MemorySink {
    fn write(&mut self, kind: ResourceKind, document: &Value, label: Option<&str>) -> Result<()> {
        self.documents
            .push((kind, label.map(str::to_string), document.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_safe_filename() {
        assert_eq!(safe_filename("MigrateMe - Deploy App (Dev)"), "MigrateMe - Deploy App _Dev_");
        assert_eq!(safe_filename("a/b:c"), "a_b_c");
        assert_eq!(safe_filename("plain_name-1"), "plain_name-1");
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name(7, "Build", None), "007_Build.json");
        assert_eq!(file_name(1234, "WF", Some("survey")), "1234_WF_survey.json");
    }

    #[test]
    fn test_directory_sink_writes_under_kind_dir() {
        let temp = TempDir::new().unwrap();
        let mut sink = DirectorySink::new(temp.path());
        let doc = json!({"id": 3, "name": "Deploy (prod)"});

        sink.write(ResourceKind::JobTemplate, &doc, None).unwrap();
        sink.write(ResourceKind::JobTemplate, &doc, Some("survey")).unwrap();

        let dir = temp.path().join("job_templates");
        assert!(dir.join("003_Deploy _prod_.json").exists());
        assert!(dir.join("003_Deploy _prod__survey.json").exists());
        assert_eq!(sink.written(), 2);

        let content = fs::read_to_string(dir.join("003_Deploy _prod_.json")).unwrap();
        let parsed: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed, doc);
    }

    #[test]
    fn test_directory_sink_overwrites() {
        let temp = TempDir::new().unwrap();
        let mut sink = DirectorySink::new(temp.path());

        sink.write(ResourceKind::Organization, &json!({"id": 1, "name": "Org", "v": 1}), None)
            .unwrap();
        sink.write(ResourceKind::Organization, &json!({"id": 1, "name": "Org", "v": 2}), None)
            .unwrap();

        let files: Vec<_> = fs::read_dir(temp.path().join("organizations")).unwrap().collect();
        assert_eq!(files.len(), 1);
        let content = fs::read_to_string(temp.path().join("organizations/001_Org.json")).unwrap();
        assert!(content.contains("\"v\": 2"));
    }

    #[test]
    fn test_users_are_named_by_username() {
        let sink = DirectorySink::new("/out");
        let path = sink.path_for(ResourceKind::User, &json!({"id": 2, "username": "jsmith"}), None);
        assert_eq!(path, PathBuf::from("/out/users/002_jsmith.json"));
    }
}
