//! Configuration for the plugin.
//!
//! Values resolve as environment variable > settings file > default. A `.env`
//! file in the working directory is loaded by the binary before resolution.

pub(crate) mod helpers;
mod tunnel;

use std::path::PathBuf;

pub use tunnel::TunnelConfig;

use crate::config::helpers::optional_env;
use crate::error::ConfigError;
use crate::settings::Settings;

/// Default data directory name under the user's home.
const DEFAULT_DATA_DIR: &str = ".workspace";

/// Resolved plugin configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the host's data (projects and the settings file).
    pub data_dir: PathBuf,
    /// Tunnel sidecar settings.
    pub tunnel: TunnelConfig,
}

impl Config {
    /// Resolve configuration from the environment and the settings file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let data_dir = resolve_data_dir()?;
        let settings = Settings::load_from(&Settings::path_in(&data_dir))?;
        Self::from_settings(data_dir, &settings)
    }

    /// Resolve with an explicit data directory and settings.
    pub fn from_settings(data_dir: PathBuf, settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            tunnel: TunnelConfig::resolve(settings)?,
            data_dir,
        })
    }

    /// Directory holding one sub-directory per project.
    pub fn projects_dir(&self) -> PathBuf {
        self.data_dir.join("projects")
    }
}

fn resolve_data_dir() -> Result<PathBuf, ConfigError> {
    if let Some(dir) = optional_env("WS_DATA_DIR")? {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(DEFAULT_DATA_DIR))
        .ok_or(ConfigError::NoDataDir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projects_live_under_data_dir() {
        let config =
            Config::from_settings(PathBuf::from("/tmp/ws"), &Settings::default()).unwrap();
        assert_eq!(config.projects_dir(), PathBuf::from("/tmp/ws/projects"));
    }
}
