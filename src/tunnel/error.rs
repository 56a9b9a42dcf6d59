//! Error types for tunnel management.

use thiserror::Error;

use crate::docker::RuntimeError;
use crate::error::{ProjectError, PromptError};

/// Result type for tunnel operations.
pub type Result<T> = std::result::Result<T, TunnelError>;

/// Errors that can occur while managing a project's tunnel.
#[derive(Debug, Error)]
pub enum TunnelError {
    /// No tunnel container exists for the project.
    #[error("Ngrok for \"{project}\" not started")]
    NotStarted {
        /// Project name.
        project: String,
    },

    /// The agent's output stream failed before a link was found.
    #[error("Output stream for \"{project}\" failed: {reason}")]
    Stream {
        /// Project name.
        project: String,
        /// Reason for failure.
        reason: String,
    },

    /// Tunneling is enabled but no auth token is stored.
    #[error("No auth token set for \"{project}\"; run ngrok:init")]
    MissingAuthToken {
        /// Project name.
        project: String,
    },

    /// The admin API answered with something other than a tunnel record.
    #[error("Unexpected tunnel listing for \"{project}\": {reason}")]
    InvalidForwarding {
        /// Project name.
        project: String,
        /// Reason for failure.
        reason: String,
    },

    /// Container runtime failure.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// Project store failure.
    #[error(transparent)]
    Project(#[from] ProjectError),

    /// Interactive prompt failure.
    #[error(transparent)]
    Prompt(#[from] PromptError),
}
