//! Command and event entry points.
//!
//! [`NgrokController`] resolves which project a command targets and hands the
//! work to the [`TunnelManager`]. It keeps no state of its own.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::hooks::{HookRegistry, LifecycleEvent, LifecycleHook};
use crate::project::{ENABLE_KEY, Project, ProjectStore, TOKEN_KEY};
use crate::prompts::Prompter;
use crate::tunnel::{Result, StartOptions, StartOutcome, TunnelManager};

pub struct NgrokController {
    projects: Arc<dyn ProjectStore>,
    manager: Arc<TunnelManager>,
    prompter: Arc<dyn Prompter>,
}

impl NgrokController {
    pub fn new(
        projects: Arc<dyn ProjectStore>,
        manager: Arc<TunnelManager>,
        prompter: Arc<dyn Prompter>,
    ) -> Self {
        Self {
            projects,
            manager,
            prompter,
        }
    }

    pub fn manager(&self) -> &Arc<TunnelManager> {
        &self.manager
    }

    /// Subscribe the tunnel to the host's project lifecycle events.
    pub fn register_hooks(&self, registry: &mut HookRegistry, cancel: CancellationToken) {
        registry.register(
            LifecycleEvent::ProjectStart,
            Arc::new(TunnelStartHook {
                manager: Arc::clone(&self.manager),
                cancel,
            }),
        );
        registry.register(
            LifecycleEvent::ProjectStop,
            Arc::new(TunnelStopHook {
                manager: Arc::clone(&self.manager),
            }),
        );
    }

    /// Select `name` if given, then return the current project.
    pub async fn resolve(&self, name: Option<&str>) -> Result<Project> {
        if let Some(name) = name {
            self.projects.cd_project(name).await?;
        }
        Ok(self.projects.current().await?)
    }

    /// Ask whether to enable tunneling and for the auth token, then save.
    pub async fn init(&self, name: Option<&str>) -> Result<Project> {
        let mut project = self.resolve(name).await?;

        let enabled = self
            .prompter
            .confirm("Enable ngrok?", project.tunnel_enabled())
            .await?;
        project.set_meta(ENABLE_KEY, enabled);

        if enabled {
            let current = project.get_meta(TOKEN_KEY, "").to_string();
            let token = self.prompter.input("Auth token:", &current).await?;
            project.set_meta(TOKEN_KEY, token.trim());
        }

        self.projects.save(&project).await?;
        tracing::info!(project = %project.name, enabled, "Saved ngrok settings");
        Ok(project)
    }

    pub async fn start(
        &self,
        name: Option<&str>,
        options: StartOptions,
        cancel: &CancellationToken,
    ) -> Result<StartOutcome> {
        let project = self.resolve(name).await?;
        self.manager.start(&project, options, cancel).await
    }

    pub async fn stop(&self, name: Option<&str>) -> Result<()> {
        let project = self.resolve(name).await?;
        self.manager.stop(&project).await
    }

    pub async fn attach(&self, name: Option<&str>) -> Result<()> {
        let project = self.resolve(name).await?;
        self.manager.attach(&project).await
    }

    /// Public URL of the project's running tunnel.
    pub async fn forwarding(&self, name: Option<&str>) -> Result<String> {
        let project = self.resolve(name).await?;
        self.manager.get_forwarding(&project).await
    }

    pub async fn on_project_start(
        &self,
        project: &Project,
        cancel: &CancellationToken,
    ) -> Result<StartOutcome> {
        self.manager.on_project_start(project, cancel).await
    }

    pub async fn on_project_stop(&self, project: &Project) -> Result<bool> {
        self.manager.on_project_stop(project).await
    }
}

/// Starts the tunnel when the host starts a project.
struct TunnelStartHook {
    manager: Arc<TunnelManager>,
    cancel: CancellationToken,
}

#[async_trait]
impl LifecycleHook for TunnelStartHook {
    fn name(&self) -> &str {
        "ngrok:start"
    }

    async fn handle(&self, project: &Project) -> Result<()> {
        self.manager.on_project_start(project, &self.cancel).await?;
        Ok(())
    }
}

/// Removes the tunnel when the host stops a project.
struct TunnelStopHook {
    manager: Arc<TunnelManager>,
}

#[async_trait]
impl LifecycleHook for TunnelStopHook {
    fn name(&self) -> &str {
        "ngrok:stop"
    }

    async fn handle(&self, project: &Project) -> Result<()> {
        self.manager.on_project_stop(project).await?;
        Ok(())
    }
}
