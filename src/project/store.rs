//! File-backed project store.
//!
//! Layout: `<projects_dir>/<name>/config.json`, one JSON document per project.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::config::helpers::optional_env;
use crate::error::ProjectError;
use crate::project::{Project, ProjectStore, validate_name};

const PROJECT_FILE: &str = "config.json";

/// Projects stored as JSON files under a directory.
pub struct FileProjectStore {
    projects_dir: PathBuf,
    /// Working directory used to infer the current project.
    cwd: Option<PathBuf>,
    selected: RwLock<Option<String>>,
}

impl FileProjectStore {
    /// Create a store rooted at `projects_dir`, inferring from the process cwd.
    pub fn new(projects_dir: impl Into<PathBuf>) -> Self {
        Self {
            projects_dir: projects_dir.into(),
            cwd: std::env::current_dir().ok(),
            selected: RwLock::new(None),
        }
    }

    /// Override the working directory used for inference.
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    fn project_file(&self, name: &str) -> PathBuf {
        self.projects_dir.join(name).join(PROJECT_FILE)
    }

    async fn load(&self, name: &str) -> Result<Project, ProjectError> {
        validate_name(name)?;
        let path = self.project_file(name);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ProjectError::NotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        parse_project(&path, &raw)
    }

    /// All stored projects, skipping unreadable entries.
    pub async fn list(&self) -> Result<Vec<Project>, ProjectError> {
        let mut projects = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.projects_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(projects),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            match self.load(&name).await {
                Ok(project) => projects.push(project),
                Err(e) => tracing::debug!(project = %name, "Skipping project entry: {}", e),
            }
        }

        projects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(projects)
    }

    /// Find the project whose source path is the deepest ancestor of `cwd`.
    async fn infer_from_cwd(&self, cwd: &Path) -> Result<Option<Project>, ProjectError> {
        let best = self
            .list()
            .await?
            .into_iter()
            .filter_map(|p| {
                let depth = p
                    .path
                    .as_ref()
                    .filter(|path| cwd.starts_with(path))
                    .map(|path| path.components().count())?;
                Some((depth, p))
            })
            .max_by_key(|(depth, _)| *depth)
            .map(|(_, p)| p);
        Ok(best)
    }
}

fn parse_project(path: &Path, raw: &str) -> Result<Project, ProjectError> {
    serde_json::from_str(raw).map_err(|e| ProjectError::Malformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl ProjectStore for FileProjectStore {
    async fn current(&self) -> Result<Project, ProjectError> {
        if let Some(name) = self.selected.read().await.clone() {
            return self.load(&name).await;
        }

        if let Some(name) = optional_env("WS_PROJECT").ok().flatten() {
            return self.load(&name).await;
        }

        if let Some(cwd) = self.cwd.as_deref()
            && let Some(project) = self.infer_from_cwd(cwd).await?
        {
            return Ok(project);
        }

        Err(ProjectError::NoCurrentProject)
    }

    async fn cd_project(&self, name: &str) -> Result<(), ProjectError> {
        // Fail early on unknown names rather than at the first `current()`.
        self.load(name).await?;
        *self.selected.write().await = Some(name.to_string());
        tracing::debug!(project = %name, "Selected project");
        Ok(())
    }

    async fn save(&self, project: &Project) -> Result<(), ProjectError> {
        validate_name(&project.name)?;
        let path = self.project_file(&project.name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let body = serde_json::to_string_pretty(project).map_err(|e| ProjectError::Malformed {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        // Write-then-rename so a crash never leaves a truncated document.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;

        tracing::debug!(project = %project.name, "Saved project metadata");
        Ok(())
    }
}
