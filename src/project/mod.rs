//! Projects and their persisted metadata.
//!
//! A project is a named workspace owned by the host tool. The plugin only
//! reads and writes a couple of metadata keys on it; everything else about
//! the project is opaque.

mod store;

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

pub use store::FileProjectStore;

use crate::error::ProjectError;

/// Metadata key holding the tunnel enable flag (`"true"` / `"false"`).
pub const ENABLE_KEY: &str = "NGROK_ENABLE";
/// Metadata key holding the ngrok auth token.
pub const TOKEN_KEY: &str = "NGROK_AUTHTOKEN";

/// A workspace project with string metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    /// Source directory, used to infer the current project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            meta: BTreeMap::new(),
        }
    }

    /// Set the source directory.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Get a metadata value, or `default` when unset.
    pub fn get_meta<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.meta.get(key).map(String::as_str).unwrap_or(default)
    }

    /// Get a boolean metadata value. Anything but `true`/`1`/`yes` is false.
    pub fn get_bool_meta(&self, key: &str, default: bool) -> bool {
        match self.meta.get(key) {
            Some(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
            None => default,
        }
    }

    pub fn set_meta(&mut self, key: impl Into<String>, value: impl ToString) {
        self.meta.insert(key.into(), value.to_string());
    }

    /// Whether tunneling is turned on for this project.
    pub fn tunnel_enabled(&self) -> bool {
        self.get_bool_meta(ENABLE_KEY, false)
    }

    /// Stored auth token, if any non-empty one is set.
    pub fn auth_token(&self) -> Option<SecretString> {
        self.meta
            .get(TOKEN_KEY)
            .filter(|t| !t.trim().is_empty())
            .map(|t| SecretString::from(t.clone()))
    }

    /// Internal hostname under which the project's own service is reachable.
    pub fn workspace_host(&self) -> String {
        format!("{}.workspace", self.name)
    }
}

/// Access to the host's projects.
///
/// `cd_project` selects the project later returned by `current`, the same way
/// the host switches its working project before running a command.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// The project in scope for this invocation.
    async fn current(&self) -> Result<Project, ProjectError>;

    /// Make `name` the current project.
    async fn cd_project(&self, name: &str) -> Result<(), ProjectError>;

    /// Persist the project's metadata.
    async fn save(&self, project: &Project) -> Result<(), ProjectError>;
}

/// Check that a project name is usable in paths and container names.
pub(crate) fn validate_name(name: &str) -> Result<(), ProjectError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !name.starts_with('.')
        && !name.starts_with('-');
    if valid {
        Ok(())
    } else {
        Err(ProjectError::InvalidName(name.to_string()))
    }
}
