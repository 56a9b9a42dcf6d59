//! Tunnel container lifecycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::config::TunnelConfig;
use crate::docker::{ContainerRuntime, ContainerSpec, OutputStream, RestartPolicy, RuntimeError};
use crate::project::{Project, TOKEN_KEY};
use crate::tunnel::error::{Result, TunnelError};
use crate::tunnel::link::LinkScanner;

/// Tunnel lifecycle state of a project, as last observed by this manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    /// No container.
    Absent,
    /// Pulling the image and creating the container.
    Creating,
    /// Started and attached, waiting for the forwarding link.
    AwaitingLink,
    /// Agent running; the link was reported or is no longer being watched.
    Running,
}

/// Options for [`TunnelManager::start`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartOptions {
    /// Remove any existing container first.
    pub restart: bool,
    /// Open an interactive session on the container afterwards.
    pub attach: bool,
}

/// How the wait for a forwarding link ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    Found(String),
    /// Output ended without a link.
    StreamEnded,
    /// Deadline passed first.
    TimedOut(Duration),
    Cancelled,
}

impl LinkOutcome {
    pub fn link(&self) -> Option<&str> {
        match self {
            LinkOutcome::Found(link) => Some(link),
            _ => None,
        }
    }
}

/// Result of a start request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// Tunneling is turned off for the project; nothing was started.
    Disabled,
    /// A container already existed and was left as is.
    AlreadyRunning,
    /// A new container was created and started.
    Created(LinkOutcome),
}

/// Name of the tunnel container for a project.
pub fn container_name(project: &str) -> String {
    format!("ngrok-{}", project)
}

/// Record returned by the agent's `/api/tunnels/<name>` endpoint.
#[derive(Debug, Deserialize)]
struct TunnelRecord {
    public_url: String,
}

/// Pull the public URL out of an admin API response body.
pub fn parse_public_url(body: &str) -> std::result::Result<String, String> {
    let record: TunnelRecord = serde_json::from_str(body.trim()).map_err(|e| e.to_string())?;
    if record.public_url.is_empty() {
        return Err("public_url is empty".to_string());
    }
    Ok(record.public_url)
}

/// How long the output must stay quiet before a link at the very end of it
/// is taken as complete.
pub const LINK_SETTLE: Duration = Duration::from_millis(250);

/// Wait until a forwarding link shows up in `stream`.
///
/// Resolves on the first of: a link, end of stream, stream error, `deadline`
/// elapsing, or `cancel` firing. `deadline = None` waits without limit.
///
/// A link that ends exactly where the output so far ends is held back, since
/// the next chunk may extend it. It is accepted once the stream ends or stays
/// idle for [`LINK_SETTLE`].
pub async fn wait_for_link(
    mut stream: OutputStream,
    deadline: Option<Duration>,
    cancel: &CancellationToken,
) -> std::result::Result<LinkOutcome, RuntimeError> {
    let scan = async move {
        let mut scanner = LinkScanner::new();
        loop {
            let next = if scanner.holds_link() {
                match tokio::time::timeout(LINK_SETTLE, stream.next()).await {
                    Ok(next) => next,
                    // Output went quiet right after a link.
                    Err(_) => None,
                }
            } else {
                stream.next().await
            };
            let Some(chunk) = next else {
                break;
            };

            let chunk = chunk?;
            tracing::trace!("agent output: {:?}", chunk);
            if let Some(link) = scanner.push(&chunk) {
                return Ok(LinkOutcome::Found(link));
            }
        }
        Ok::<_, RuntimeError>(
            scanner
                .finish()
                .map_or(LinkOutcome::StreamEnded, LinkOutcome::Found),
        )
    };

    let bounded = async move {
        match deadline {
            Some(limit) => tokio::time::timeout(limit, scan)
                .await
                .unwrap_or(Ok(LinkOutcome::TimedOut(limit))),
            None => scan.await,
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Ok(LinkOutcome::Cancelled),
        outcome = bounded => outcome,
    }
}

/// Owns the per-project ngrok containers.
///
/// All Docker access goes through the [`ContainerRuntime`] handed in at
/// construction; the manager itself only sequences calls and tracks state.
pub struct TunnelManager {
    runtime: Arc<dyn ContainerRuntime>,
    config: TunnelConfig,
    states: RwLock<HashMap<String, TunnelState>>,
}

impl TunnelManager {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: TunnelConfig) -> Self {
        Self {
            runtime,
            config,
            states: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &TunnelConfig {
        &self.config
    }

    /// Last observed state for a project.
    pub async fn state(&self, project: &str) -> TunnelState {
        self.states
            .read()
            .await
            .get(project)
            .copied()
            .unwrap_or(TunnelState::Absent)
    }

    async fn set_state(&self, project: &str, state: TunnelState) {
        tracing::trace!(project = %project, ?state, "Tunnel state");
        self.states.write().await.insert(project.to_string(), state);
    }

    /// Container definition for a project's tunnel.
    pub fn container_spec(&self, project: &Project) -> Result<ContainerSpec> {
        let token = project
            .auth_token()
            .ok_or_else(|| TunnelError::MissingAuthToken {
                project: project.name.clone(),
            })?;

        Ok(ContainerSpec {
            name: container_name(&project.name),
            image: self.config.image.clone(),
            env: vec![(TOKEN_KEY.to_string(), token.expose_secret().to_string())],
            cmd: vec!["http".to_string(), format!("{}:80", project.workspace_host())],
            restart: RestartPolicy::Always,
            tty: true,
            network: Some(self.config.network.clone()),
        })
    }

    /// Start the project's tunnel.
    ///
    /// With `restart`, any existing container is removed first, even when
    /// tunneling is disabled. Creation only happens for enabled projects.
    pub async fn start(
        &self,
        project: &Project,
        options: StartOptions,
        cancel: &CancellationToken,
    ) -> Result<StartOutcome> {
        let name = container_name(&project.name);

        if options.restart {
            tracing::info!(project = %project.name, "Removing tunnel container for restart");
            self.runtime.remove_container(&name).await?;
            self.set_state(&project.name, TunnelState::Absent).await;
        }

        if !project.tunnel_enabled() {
            tracing::info!(project = %project.name, "Tunneling disabled, not starting");
            return Ok(StartOutcome::Disabled);
        }

        let outcome = self.ensure_running(project, cancel).await?;

        if options.attach {
            if cancel.is_cancelled() {
                tracing::info!(project = %project.name, "Interrupted, not attaching");
            } else {
                self.runtime.attach_interactive(&name).await?;
            }
        }

        Ok(outcome)
    }

    /// Host `project:start` handler: start only if tunneling is enabled.
    pub async fn on_project_start(
        &self,
        project: &Project,
        cancel: &CancellationToken,
    ) -> Result<StartOutcome> {
        if !project.tunnel_enabled() {
            return Ok(StartOutcome::Disabled);
        }
        self.ensure_running(project, cancel).await
    }

    /// Host `project:stop` handler: stop only if tunneling is enabled.
    /// Returns whether a stop was performed.
    pub async fn on_project_stop(&self, project: &Project) -> Result<bool> {
        if !project.tunnel_enabled() {
            return Ok(false);
        }
        self.stop(project).await?;
        Ok(true)
    }

    async fn ensure_running(
        &self,
        project: &Project,
        cancel: &CancellationToken,
    ) -> Result<StartOutcome> {
        let name = container_name(&project.name);
        println!("Starting ngrok...");

        if self.runtime.container_exists(&name).await? {
            tracing::debug!(project = %project.name, "Tunnel container already exists");
            self.set_state(&project.name, TunnelState::Running).await;
            return Ok(StartOutcome::AlreadyRunning);
        }

        let spec = self.container_spec(project)?;
        self.set_state(&project.name, TunnelState::Creating).await;

        let stream = match self.create_and_start(&spec).await {
            Ok(stream) => stream,
            Err(e) => {
                self.set_state(&project.name, TunnelState::Absent).await;
                return Err(e);
            }
        };

        if let Err(e) = self.runtime.resize_tty(&name, self.config.tty).await {
            // Only the console layout depends on the geometry.
            tracing::warn!(project = %project.name, "Could not resize tunnel TTY: {}", e);
        }

        self.set_state(&project.name, TunnelState::AwaitingLink).await;
        let outcome = wait_for_link(stream, self.config.link_timeout, cancel).await;
        // The container keeps running under its restart policy whatever the wait saw.
        self.set_state(&project.name, TunnelState::Running).await;

        let outcome = outcome.map_err(|e| TunnelError::Stream {
            project: project.name.clone(),
            reason: e.to_string(),
        })?;
        self.report(project, &outcome);

        Ok(StartOutcome::Created(outcome))
    }

    /// Pull, create, attach and start. The attach precedes the start so no
    /// early output is missed. Leaves no half-made container behind.
    async fn create_and_start(&self, spec: &ContainerSpec) -> Result<OutputStream> {
        self.runtime.pull_image(&spec.image).await?;
        self.runtime.create_container(spec).await?;

        let started = async {
            let stream = self.runtime.attach_output(&spec.name).await?;
            self.runtime.start_container(&spec.name).await?;
            Ok::<_, RuntimeError>(stream)
        }
        .await;

        match started {
            Ok(stream) => Ok(stream),
            Err(e) => {
                if let Err(cleanup) = self.runtime.remove_container(&spec.name).await {
                    tracing::warn!("Failed to clean up {}: {}", spec.name, cleanup);
                }
                Err(e.into())
            }
        }
    }

    fn report(&self, project: &Project, outcome: &LinkOutcome) {
        match outcome {
            LinkOutcome::Found(link) => {
                tracing::info!(project = %project.name, link = %link, "{} forwarding: {}", project.name, link);
                println!("Forwarding: {}", link);
            }
            LinkOutcome::StreamEnded => {
                tracing::warn!(
                    project = %project.name,
                    "Agent output ended before a forwarding link appeared"
                );
            }
            LinkOutcome::TimedOut(limit) => {
                tracing::warn!(
                    project = %project.name,
                    "No forwarding link within {:?}; the tunnel keeps starting in the background (see ngrok:forwarding)",
                    limit
                );
            }
            LinkOutcome::Cancelled => {
                tracing::info!(project = %project.name, "Stopped waiting for the forwarding link");
            }
        }
    }

    /// Remove the project's tunnel container. Removing nothing is success.
    pub async fn stop(&self, project: &Project) -> Result<()> {
        println!("Stopping ngrok...");
        self.runtime
            .remove_container(&container_name(&project.name))
            .await?;
        self.set_state(&project.name, TunnelState::Absent).await;
        Ok(())
    }

    /// Interactive session on the running tunnel container.
    pub async fn attach(&self, project: &Project) -> Result<()> {
        let name = container_name(&project.name);
        if !self.runtime.container_exists(&name).await? {
            return Err(TunnelError::NotStarted {
                project: project.name.clone(),
            });
        }
        self.runtime.attach_interactive(&name).await?;
        Ok(())
    }

    /// Ask the agent's admin API for the public URL.
    ///
    /// The API only listens inside the Docker network, so the request is made
    /// with `curl` from the proxy container.
    pub async fn get_forwarding(&self, project: &Project) -> Result<String> {
        let name = container_name(&project.name);
        let not_started = || TunnelError::NotStarted {
            project: project.name.clone(),
        };

        if !self.runtime.container_exists(&name).await? {
            return Err(not_started());
        }

        let address = match self
            .runtime
            .network_address(&name, &self.config.network)
            .await
        {
            Ok(Some(address)) => address,
            // Stopped containers have no address.
            Ok(None) => return Err(not_started()),
            Err(e) if e.is_not_found() => return Err(not_started()),
            Err(e) => return Err(e.into()),
        };

        let argv = vec!["curl".to_string(), self.config.admin_tunnels_url(&address)];
        let body = self
            .runtime
            .exec(&self.config.proxy_container, &argv, false)
            .await?;

        parse_public_url(&body).map_err(|reason| TunnelError::InvalidForwarding {
            project: project.name.clone(),
            reason,
        })
    }
}
