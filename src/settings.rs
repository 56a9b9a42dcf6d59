//! Settings file for the plugin.
//!
//! Settings sit between environment variables and built-in defaults:
//! env > `<data_dir>/ngrok.toml` > default. Every field is optional so a
//! partial file only overrides what it names.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File name of the settings document inside the data directory.
pub const SETTINGS_FILE: &str = "ngrok.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub tunnel: TunnelSettings,
}

/// Overrides for the tunnel sidecar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelSettings {
    pub image: Option<String>,
    pub network: Option<String>,
    pub proxy_container: Option<String>,
    pub admin_port: Option<u16>,
    /// Seconds to wait for a forwarding link; 0 waits forever.
    pub link_timeout_secs: Option<u64>,
    pub tty_columns: Option<u16>,
    pub tty_rows: Option<u16>,
}

impl Settings {
    /// Settings path for a data directory.
    pub fn path_in(data_dir: &Path) -> PathBuf {
        data_dir.join(SETTINGS_FILE)
    }

    /// Load settings from `path`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(ConfigError::Settings {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        };

        toml::from_str(&raw).map_err(|e| ConfigError::Settings {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}
