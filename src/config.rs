//! Bridge configuration
//!
//! Loaded once at startup from a TOML file. Every section has defaults, so an
//! empty or partial file is valid; a missing default file is written out so
//! users have something to edit.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

const CONFIG_DIR: &str = "gamepad-bridge";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    pub network: NetworkConfig,
    pub devices: DeviceConfig,
    pub bridge: LoopConfig,
    pub portal: PortalConfig,
}

/// Where the gamepad datagrams arrive
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    pub bind_address: IpAddr,
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 4242,
        }
    }
}

/// Identity of the two virtual devices
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct DeviceConfig {
    pub gamepad_name: String,
    pub motion_name: String,
    /// Effect slots advertised by the gamepad. Only one is tracked, but games
    /// tend to refuse devices with a single slot.
    pub ff_effects_max: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            gamepad_name: "Wii U GamePad".to_string(),
            motion_name: "Wii U GamePad IMU".to_string(),
            ff_effects_max: 16,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct LoopConfig {
    pub tick_interval_ms: u64,
    pub receive_buffer_len: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 10,
            receive_buffer_len: 1024,
        }
    }
}

impl LoopConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Screen-cast portal negotiation
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct PortalConfig {
    pub enabled: bool,
    /// Prefix for request and session handle tokens; `[A-Za-z0-9_]` only
    pub handle_token_prefix: String,
    pub parent_window: String,
    pub multiple: bool,
    /// 1 = hidden, 2 = embedded, 4 = metadata
    pub cursor_mode: u32,
    /// 1 = monitor, 2 = window, 4 = virtual
    pub source_types: u32,
    /// Per-step reply deadline; unset waits forever
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_timeout_secs: Option<u64>,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            handle_token_prefix: "gamepad_bridge".to_string(),
            parent_window: String::new(),
            multiple: false,
            cursor_mode: 1,
            source_types: 2,
            step_timeout_secs: None,
        }
    }
}

impl PortalConfig {
    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout_secs.map(Duration::from_secs)
    }
}

impl BridgeConfig {
    /// Default location, `$XDG_CONFIG_HOME/gamepad-bridge/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Loads an explicit file, or the default file if `path` is `None`.
    ///
    /// An explicit path must exist. The default file is created with defaults
    /// when missing.
    pub async fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::read(path).await?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::read(&path).await?,
                Some(path) => {
                    let config = Self::default();
                    config.write_default(&path).await;
                    config
                }
                None => {
                    warn!("No config directory available, using defaults");
                    Self::default()
                }
            },
        };
        config.validate()?;
        Ok(config)
    }

    async fn read(path: &Path) -> Result<Self, ConfigError> {
        debug!("Reading config from {}", path.display());
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let config = Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    async fn write_default(&self, path: &Path) {
        let content = match toml::to_string_pretty(self) {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to serialize default config: {}", e);
                return;
            }
        };
        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                warn!("Failed to create config directory {}: {}", parent.display(), e);
                return;
            }
        }
        match tokio::fs::write(path, content).await {
            Ok(()) => info!("Wrote default config to {}", path.display()),
            Err(e) => warn!("Failed to write default config to {}: {}", path.display(), e),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bridge.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "bridge.tick_interval_ms must be at least 1".to_string(),
            ));
        }
        if self.bridge.receive_buffer_len < crate::protocol::TELEMETRY_PACKET_LEN {
            return Err(ConfigError::Invalid(format!(
                "bridge.receive_buffer_len must hold a {} byte packet",
                crate::protocol::TELEMETRY_PACKET_LEN
            )));
        }
        if self.devices.ff_effects_max == 0 {
            return Err(ConfigError::Invalid(
                "devices.ff_effects_max must be at least 1".to_string(),
            ));
        }
        let prefix = &self.portal.handle_token_prefix;
        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ConfigError::Invalid(format!(
                "portal.handle_token_prefix '{}' may only contain A-Z, a-z, 0-9 and _",
                prefix
            )));
        }
        Ok(())
    }
}
