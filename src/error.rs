//! Error types shared across the plugin.
//!
//! Docker and tunnel errors live next to their modules
//! ([`crate::docker::RuntimeError`], [`crate::tunnel::TunnelError`]).

use std::path::PathBuf;

use thiserror::Error;

/// Configuration resolution errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable or setting has an unusable value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue {
        /// Variable or setting name.
        key: String,
        /// What was wrong with it.
        message: String,
    },

    /// The settings file exists but could not be read or parsed.
    #[error("Failed to load settings from {path}: {reason}")]
    Settings {
        /// Settings file path.
        path: PathBuf,
        /// Reason for failure.
        reason: String,
    },

    /// No home directory to derive the default data directory from.
    #[error("Could not determine a data directory; set WS_DATA_DIR")]
    NoDataDir,
}

/// Errors from the project store.
#[derive(Debug, Error)]
pub enum ProjectError {
    /// No project with this name is registered.
    #[error("Project \"{0}\" not found")]
    NotFound(String),

    /// No name was given and none could be inferred from the environment.
    #[error("No current project: pass --name or run inside a project directory")]
    NoCurrentProject,

    /// Project name that cannot be used as a directory or container name.
    #[error("Invalid project name \"{0}\"")]
    InvalidName(String),

    /// The project document could not be parsed or serialized.
    #[error("Malformed project file {path}: {reason}")]
    Malformed {
        /// Project file path.
        path: PathBuf,
        /// Reason for failure.
        reason: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from interactive prompts.
#[derive(Debug, Error)]
pub enum PromptError {
    /// The terminal could not be used for prompting.
    #[error("Prompt failed: {0}")]
    Terminal(String),

    /// The user aborted the prompt.
    #[error("Prompt cancelled")]
    Cancelled,
}

impl From<dialoguer::Error> for PromptError {
    fn from(e: dialoguer::Error) -> Self {
        match e {
            dialoguer::Error::IO(io) if io.kind() == std::io::ErrorKind::Interrupted => {
                PromptError::Cancelled
            }
            other => PromptError::Terminal(other.to_string()),
        }
    }
}
