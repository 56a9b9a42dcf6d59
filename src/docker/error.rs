//! Error types for the container runtime.

use thiserror::Error;

/// Result type for container runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors reported by the container runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Docker is not available.
    #[error("Docker not available: {reason}")]
    DockerNotAvailable {
        /// Reason why Docker is unavailable.
        reason: String,
    },

    /// Failed to pull the image.
    #[error("Failed to pull image '{image}': {reason}")]
    ImagePullFailed {
        /// Image name.
        image: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to create the container.
    #[error("Failed to create container '{name}': {reason}")]
    ContainerCreationFailed {
        /// Container name.
        name: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to start the container.
    #[error("Failed to start container '{name}': {reason}")]
    ContainerStartFailed {
        /// Container name.
        name: String,
        /// Reason for failure.
        reason: String,
    },

    /// The named container does not exist.
    #[error("Container '{name}' not found")]
    ContainerNotFound {
        /// Container name.
        name: String,
    },

    /// Attaching to a container failed or its stream broke.
    #[error("Attach to '{name}' failed: {reason}")]
    AttachFailed {
        /// Container name.
        name: String,
        /// Reason for failure.
        reason: String,
    },

    /// Running a command inside a container failed.
    #[error("Exec in '{target}' failed: {reason}")]
    ExecFailed {
        /// Container the command ran in.
        target: String,
        /// Reason for failure.
        reason: String,
    },

    /// Any other Docker API failure.
    #[error("Docker API error on '{name}': {reason}")]
    Api {
        /// Container or image the call targeted.
        name: String,
        /// Reason for failure.
        reason: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RuntimeError {
    /// Whether this error means the target does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RuntimeError::ContainerNotFound { .. })
    }
}

/// Whether a bollard error is an HTTP 404 from the daemon.
pub(crate) fn is_not_found(err: &bollard::errors::Error) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}
