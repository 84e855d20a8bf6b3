use serde::Deserialize;
use std::path::{Path, PathBuf};

// Re-export existing config types
pub use crate::nats::NatsConfig;
pub use crate::probe::ProbeConfig;

/// Complete Tilewatch configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TilewatchConfig {
    /// TOML file listing every entity and its groups
    #[serde(default = "default_topology_path")]
    pub topology_path: PathBuf,
    #[serde(default)]
    pub nats: NatsConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub control: ControlConfig,
}

fn default_topology_path() -> PathBuf {
    PathBuf::from("topology.toml")
}

/// Ingest queue configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Bounded queue between subscribers and the router
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_queue_capacity() -> usize {
    10_000
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_port")]
    pub port: u16,
}

fn default_api_port() -> u16 {
    5000
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
        }
    }
}

/// Control channel configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ControlConfig {
    /// How long a command waits for its ack
    #[serde(default = "default_request_expiry")]
    pub request_expiry_seconds: i64,
    /// How often expired requests are purged
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
}

fn default_request_expiry() -> i64 {
    60
}

fn default_cleanup_interval() -> u64 {
    30
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            request_expiry_seconds: default_request_expiry(),
            cleanup_interval_seconds: default_cleanup_interval(),
        }
    }
}

impl Default for TilewatchConfig {
    fn default() -> Self {
        Self {
            topology_path: default_topology_path(),
            nats: NatsConfig::default(),
            probe: ProbeConfig::default(),
            ingest: IngestConfig::default(),
            api: ApiConfig::default(),
            control: ControlConfig::default(),
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: impl AsRef<Path>) -> anyhow::Result<TilewatchConfig> {
    let contents = std::fs::read_to_string(path)?;
    let config: TilewatchConfig = toml::from_str(&contents)?;
    Ok(config)
}

/// Load configuration, falling back to defaults when the file does not exist
pub fn load_config_or_default(path: impl AsRef<Path>) -> anyhow::Result<TilewatchConfig> {
    let path = path.as_ref();
    if !path.exists() {
        tracing::info!(path = %path.display(), "Config file not found, using defaults");
        return Ok(TilewatchConfig::default());
    }
    load_config(path)
}
