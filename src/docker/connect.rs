//! Connecting to the Docker daemon.
//!
//! bollard's local defaults honour `DOCKER_HOST`. When they fail (Docker
//! Desktop on macOS, rootless Docker on Linux) the well-known per-user socket
//! paths are tried before giving up. Failures carry a platform hint so the
//! CLI can tell the user what to do.

use bollard::{API_DEFAULT_VERSION, Docker};

use crate::docker::error::{Result, RuntimeError};

const CONNECT_TIMEOUT_SECS: u64 = 120;

/// Docker daemon availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DockerStatus {
    /// Daemon responded to ping.
    Available,
    /// `docker` binary not found on PATH.
    NotInstalled,
    /// Binary found but daemon not responding.
    NotRunning,
}

impl DockerStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, DockerStatus::Available)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DockerStatus::Available => "available",
            DockerStatus::NotInstalled => "not installed",
            DockerStatus::NotRunning => "not running",
        }
    }
}

/// Host platform, for guidance messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOS,
    Linux,
    Windows,
}

impl Platform {
    pub fn current() -> Self {
        match std::env::consts::OS {
            "macos" => Platform::MacOS,
            "windows" => Platform::Windows,
            _ => Platform::Linux,
        }
    }

    pub fn install_hint(&self) -> &'static str {
        match self {
            Platform::MacOS => {
                "Install Docker Desktop: https://docs.docker.com/desktop/install/mac-install/"
            }
            Platform::Linux => "Install Docker Engine: https://docs.docker.com/engine/install/",
            Platform::Windows => {
                "Install Docker Desktop: https://docs.docker.com/desktop/install/windows-install/"
            }
        }
    }

    pub fn start_hint(&self) -> &'static str {
        match self {
            Platform::MacOS => "Start Docker Desktop from Applications, or run: open -a Docker",
            Platform::Linux => "Start the Docker daemon: sudo systemctl start docker",
            Platform::Windows => "Start Docker Desktop from the Start menu",
        }
    }

    /// Hint matching a non-available status.
    pub fn hint_for(&self, status: DockerStatus) -> Option<&'static str> {
        match status {
            DockerStatus::Available => None,
            DockerStatus::NotInstalled => Some(self.install_hint()),
            DockerStatus::NotRunning => Some(self.start_hint()),
        }
    }
}

/// Connect to the Docker daemon and verify it answers a ping.
pub async fn connect_docker() -> Result<Docker> {
    let mut last_error = match Docker::connect_with_local_defaults() {
        Ok(docker) => match docker.ping().await {
            Ok(_) => return Ok(docker),
            Err(e) => e.to_string(),
        },
        Err(e) => e.to_string(),
    };

    for socket in fallback_sockets() {
        if !std::path::Path::new(&socket).exists() {
            continue;
        }
        tracing::debug!("Trying Docker socket {}", socket);
        match Docker::connect_with_socket(&socket, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION) {
            Ok(docker) => match docker.ping().await {
                Ok(_) => return Ok(docker),
                Err(e) => last_error = e.to_string(),
            },
            Err(e) => last_error = e.to_string(),
        }
    }

    Err(RuntimeError::DockerNotAvailable { reason: last_error })
}

/// Classify Docker availability for error reporting.
pub async fn check_docker() -> DockerStatus {
    if connect_docker().await.is_ok() {
        DockerStatus::Available
    } else if docker_binary_exists() {
        DockerStatus::NotRunning
    } else {
        DockerStatus::NotInstalled
    }
}

fn fallback_sockets() -> Vec<String> {
    let mut sockets = Vec::new();
    if let Some(home) = dirs::home_dir() {
        sockets.push(home.join(".docker/run/docker.sock").display().to_string());
        sockets.push(home.join(".docker/desktop/docker.sock").display().to_string());
    }
    if let Some(runtime_dir) = dirs::runtime_dir() {
        sockets.push(runtime_dir.join("docker.sock").display().to_string());
    }
    sockets
}

fn docker_binary_exists() -> bool {
    let Some(path) = std::env::var_os("PATH") else {
        return false;
    };
    let exe = if cfg!(windows) { "docker.exe" } else { "docker" };
    std::env::split_paths(&path).any(|dir| dir.join(exe).is_file())
}
