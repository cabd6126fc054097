//! Configuration types for torlet

use crate::instance::LoadBalanceMethod;
use crate::torrc::TorrcMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Pool configuration
    #[serde(default)]
    pub pool: PoolSettings,
    /// Tor process configuration
    #[serde(default)]
    pub tor: TorSettings,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl DaemonConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, crate::TorletError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::TorletError::Config(format!("Failed to read config file: {}", e))
        })?;
        toml::from_str(&content)
            .map_err(|e| crate::TorletError::Config(format!("Failed to parse config: {}", e)))
    }
}

/// Pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSettings {
    /// Base directory holding per-instance data directories
    pub data_directory: PathBuf,
    /// Number of instances created at startup
    pub instances: u32,
    /// Load-balance method applied by `next_instance`
    pub load_balance_method: LoadBalanceMethod,
    /// Default torrc entries merged under every instance's overrides
    #[serde(default)]
    pub default_torrc: TorrcMap,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            data_directory: PathBuf::from("/var/lib/torlet"),
            instances: 1,
            load_balance_method: LoadBalanceMethod::RoundRobin,
            default_torrc: TorrcMap::new(),
        }
    }
}

/// Tor process configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorSettings {
    /// Path to the tor binary
    pub tor_path: PathBuf,
    /// First SOCKS port handed to instances
    pub socks_base_port: u16,
    /// First control port handed to instances
    pub control_base_port: u16,
    /// Maximum number of concurrently running instances
    pub max_instances: u32,
    /// Delay between control-port readiness probes, in milliseconds
    pub startup_probe_interval_ms: u64,
    /// Number of readiness probes before startup is declared failed
    pub startup_probe_attempts: u32,
}

impl Default for TorSettings {
    fn default() -> Self {
        Self {
            tor_path: PathBuf::from("tor"),
            socks_base_port: 19050,
            control_base_port: 19150,
            max_instances: 100,
            startup_probe_interval_ms: 250,
            startup_probe_attempts: 240,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format (json or text)
    pub format: String,
    /// Log file path (if any)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            file: None,
        }
    }
}
