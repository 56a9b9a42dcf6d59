//! Container runtime used by the tunnel manager.
//!
//! [`ContainerRuntime`] is the narrow set of Docker operations the plugin
//! sequences. [`DockerRuntime`] implements it on top of bollard; tests use
//! [`crate::testing::StubRuntime`].
//!
//! ```text
//!   TunnelManager ──▶ ContainerRuntime ──▶ DockerRuntime ──▶ Docker daemon
//!                              │
//!                              └──────▶ StubRuntime (tests)
//! ```

mod client;
mod connect;
pub mod error;
mod terminal;

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

pub use client::DockerRuntime;
pub use connect::{DockerStatus, Platform, check_docker, connect_docker};
pub use error::{Result, RuntimeError};

/// Text chunks read from an attached container, decoded as UTF-8.
pub type OutputStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Terminal geometry for a container TTY.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSize {
    pub columns: u16,
    pub rows: u16,
}

/// Docker restart policy for a created container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestartPolicy {
    #[default]
    No,
    Always,
    UnlessStopped,
}

/// Everything needed to create a container.
#[derive(Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    /// Environment variables: (name, value).
    pub env: Vec<(String, String)>,
    pub cmd: Vec<String>,
    pub restart: RestartPolicy,
    /// Allocate a pseudo-terminal with stdin kept open.
    pub tty: bool,
    /// Network to attach the container to.
    pub network: Option<String>,
}

impl ContainerSpec {
    /// Value of an environment variable in the spec.
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Environment in Docker's `KEY=value` form.
    pub fn env_pairs(&self) -> Vec<String> {
        self.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect()
    }
}

// Env values carry credentials; only the keys are printed.
impl fmt::Debug for ContainerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env_keys: Vec<&str> = self.env.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("ContainerSpec")
            .field("name", &self.name)
            .field("image", &self.image)
            .field("env", &env_keys)
            .field("cmd", &self.cmd)
            .field("restart", &self.restart)
            .field("tty", &self.tty)
            .field("network", &self.network)
            .finish()
    }
}

/// Docker operations the plugin depends on.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Whether a container with this name exists (running or not).
    async fn container_exists(&self, name: &str) -> Result<bool>;

    /// Make sure `image` is available locally, pulling it if missing.
    async fn pull_image(&self, image: &str) -> Result<()>;

    /// Create a container and return its id.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String>;

    /// Attach to the container's combined stdin/stdout/stderr and stream
    /// its output as text, including output logged before the attach.
    async fn attach_output(&self, name: &str) -> Result<OutputStream>;

    async fn start_container(&self, name: &str) -> Result<()>;

    async fn resize_tty(&self, name: &str, size: TerminalSize) -> Result<()>;

    /// Force-remove a container. A missing container is not an error.
    async fn remove_container(&self, name: &str) -> Result<()>;

    /// IP address of the container on `network`, if attached to it.
    async fn network_address(&self, name: &str, network: &str) -> Result<Option<String>>;

    /// Run `argv` inside `target` and return its stdout.
    async fn exec(&self, target: &str, argv: &[String], tty: bool) -> Result<String>;

    /// Connect the caller's terminal to the container until detach or exit.
    async fn attach_interactive(&self, name: &str) -> Result<()>;
}
