//! Host runtime configuration
//!
//! Loaded from `config/firmware.toml` (or the path in `INCUBATOR_CONFIG`).
//! Every section and key is optional; missing values take the defaults below.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming an alternative config file
pub const CONFIG_PATH_ENV: &str = "INCUBATOR_CONFIG";

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct FirmwareConfig {
    pub unit: UnitConfig,
    pub network: NetworkConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct UnitConfig {
    /// Factory profile this unit was provisioned with
    pub id: u32,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    pub listen_address: SocketAddr,
    /// Longest wait for any single read
    pub read_timeout_ms: u64,
    /// Budget for receiving one whole request
    pub request_timeout_ms: u64,
    pub write_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_address: SocketAddr::from(([0, 0, 0, 0], 8080)),
            read_timeout_ms: 5000,
            request_timeout_ms: 10000,
            write_timeout_ms: 5000,
        }
    }
}

impl NetworkConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Where settings records live
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Memory,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub settings_dir: PathBuf,
    pub write_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            settings_dir: PathBuf::from("data"),
            write_timeout_ms: 2000,
        }
    }
}

impl StorageConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl FirmwareConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))
    }

    /// Load from `INCUBATOR_CONFIG` or the default locations, falling back to
    /// built-in defaults. Nothing is logged here since tracing is set up from
    /// the result; call [`ConfigOrigin::log`] afterwards.
    pub fn load_or_default() -> (Self, ConfigOrigin) {
        let paths = match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => vec![PathBuf::from(path)],
            None => vec![
                PathBuf::from("config").join("firmware.toml"),
                PathBuf::from("..").join("config").join("firmware.toml"),
            ],
        };

        let mut origin = ConfigOrigin::Defaults;
        for path in paths {
            if !path.exists() {
                continue;
            }
            match Self::load(&path) {
                Ok(config) => return (config, ConfigOrigin::File(path)),
                Err(e) => {
                    origin = ConfigOrigin::Rejected {
                        path,
                        error: e.to_string(),
                    }
                }
            }
        }

        (Self::default(), origin)
    }
}

/// Where the active configuration came from
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigOrigin {
    File(PathBuf),
    Defaults,
    /// A config file exists but could not be used
    Rejected { path: PathBuf, error: String },
}

impl ConfigOrigin {
    pub fn log(&self) {
        match self {
            ConfigOrigin::File(path) => info!("[CONFIG] Loaded from {}", path.display()),
            ConfigOrigin::Defaults => warn!("[CONFIG] No config file found, using defaults"),
            ConfigOrigin::Rejected { path, error } => {
                warn!("[CONFIG] Failed to load {}: {}", path.display(), error);
                warn!("[CONFIG] Using defaults");
            }
        }
    }
}
