use std::time::Duration;

use crate::config::helpers::{optional_env, parse_optional_env};
use crate::docker::TerminalSize;
use crate::error::ConfigError;
use crate::settings::Settings;

/// Tunnel sidecar configuration.
///
/// Everything the tunnel manager needs to build and query the per-project
/// ngrok container. Resolved as env > settings file > default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelConfig {
    /// Agent image (e.g., "ngrok/ngrok:latest").
    pub image: String,
    /// Docker network shared with the project containers.
    pub network: String,
    /// Container used to reach the agent's admin API from inside the network.
    pub proxy_container: String,
    /// Port of the agent's local admin API.
    pub admin_port: u16,
    /// How long `start` waits for a forwarding link. `None` waits forever.
    pub link_timeout: Option<Duration>,
    /// TTY geometry applied after start; the agent's console layout depends on it.
    pub tty: TerminalSize,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            image: "ngrok/ngrok:latest".to_string(),
            network: "workspace".to_string(),
            proxy_container: "proxy.workspace".to_string(),
            admin_port: 4040,
            link_timeout: Some(Duration::from_secs(60)),
            tty: TerminalSize {
                columns: 90,
                rows: 40,
            },
        }
    }
}

impl TunnelConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let s = &settings.tunnel;

        let link_timeout_secs = parse_optional_env(
            "NGROK_LINK_TIMEOUT_SECS",
            s.link_timeout_secs
                .unwrap_or_else(|| defaults.link_timeout.map_or(0, |d| d.as_secs())),
        )?;

        let tty = TerminalSize {
            columns: parse_optional_env(
                "NGROK_TTY_COLUMNS",
                s.tty_columns.unwrap_or(defaults.tty.columns),
            )?,
            rows: parse_optional_env("NGROK_TTY_ROWS", s.tty_rows.unwrap_or(defaults.tty.rows))?,
        };
        if tty.columns == 0 || tty.rows == 0 {
            return Err(ConfigError::InvalidValue {
                key: "NGROK_TTY_COLUMNS/NGROK_TTY_ROWS".to_string(),
                message: "terminal geometry must be non-zero".to_string(),
            });
        }

        Ok(Self {
            image: optional_env("NGROK_IMAGE")?
                .or_else(|| s.image.clone())
                .unwrap_or(defaults.image),
            network: optional_env("NGROK_NETWORK")?
                .or_else(|| s.network.clone())
                .unwrap_or(defaults.network),
            proxy_container: optional_env("NGROK_PROXY_CONTAINER")?
                .or_else(|| s.proxy_container.clone())
                .unwrap_or(defaults.proxy_container),
            admin_port: parse_optional_env(
                "NGROK_ADMIN_PORT",
                s.admin_port.unwrap_or(defaults.admin_port),
            )?,
            link_timeout: (link_timeout_secs > 0).then(|| Duration::from_secs(link_timeout_secs)),
            tty,
        })
    }

    /// Admin API URL listing the tunnel started from the agent's command line.
    pub fn admin_tunnels_url(&self, address: &str) -> String {
        format!(
            "http://{}:{}/api/tunnels/command_line",
            address, self.admin_port
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::TunnelSettings;

    #[test]
    fn defaults_match_agent_contract() {
        let config = TunnelConfig::default();
        assert_eq!(config.image, "ngrok/ngrok:latest");
        assert_eq!(config.tty.columns, 90);
        assert_eq!(config.tty.rows, 40);
        assert_eq!(config.admin_port, 4040);
    }

    #[test]
    fn settings_override_defaults() {
        let settings = Settings {
            tunnel: TunnelSettings {
                network: Some("devnet".to_string()),
                admin_port: Some(4041),
                ..Default::default()
            },
        };

        let config = TunnelConfig::resolve(&settings).unwrap();
        assert_eq!(config.network, "devnet");
        assert_eq!(config.admin_port, 4041);
    }

    #[test]
    fn zero_timeout_means_unbounded() {
        let settings = Settings {
            tunnel: TunnelSettings {
                link_timeout_secs: Some(0),
                ..Default::default()
            },
        };

        let config = TunnelConfig::resolve(&settings).unwrap();
        assert_eq!(config.link_timeout, None);
    }

    #[test]
    fn zero_geometry_is_rejected() {
        let settings = Settings {
            tunnel: TunnelSettings {
                tty_rows: Some(0),
                ..Default::default()
            },
        };

        assert!(TunnelConfig::resolve(&settings).is_err());
    }

    #[test]
    fn admin_url_uses_port() {
        let config = TunnelConfig::default();
        assert_eq!(
            config.admin_tunnels_url("172.18.0.5"),
            "http://172.18.0.5:4040/api/tunnels/command_line"
        );
    }
}
