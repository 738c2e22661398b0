//! Node configuration loading and management.

use netmgr_core::{PeerIdentity, Transport};
use netmgr_routing::{GraphConfig, ReliabilityThresholds};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Full configuration for the netmgr node.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NetmgrConfig {
    /// API server settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Held-message retry cadence.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Peer discovery cadence and limits.
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Relationship graph tunables.
    #[serde(default)]
    pub graph: GraphConfig,

    /// Reliability classification thresholds.
    #[serde(default)]
    pub reliability: ReliabilityThresholds,

    /// Bootstrap peers loaded as seeds at startup.
    #[serde(default)]
    pub seeds: Vec<SeedConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API listen address.
    #[serde(default = "default_api_addr")]
    pub listen_addr: String,
    /// API port.
    #[serde(default = "default_api_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the data directory.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json).
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_delay")]
    pub initial_delay_secs: u64,
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_discovery_delay")]
    pub initial_delay_secs: u64,
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Peers attached to each discovery request.
    #[serde(default = "default_peers_to_share")]
    pub peers_to_share: usize,
    /// Soft bound on discovered peers per transport.
    #[serde(default = "default_max_peers")]
    pub max_peers_per_transport: usize,
    /// Unanswered requests older than this are forgotten.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// A `[[seeds]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedConfig {
    pub transport: Transport,
    pub id: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub port: Option<u16>,
}

impl SeedConfig {
    pub fn to_identity(&self) -> PeerIdentity {
        let peer = PeerIdentity::new(self.id.clone(), self.transport, self.address.clone());
        match self.port {
            Some(port) => peer.with_port(port),
            None => peer,
        }
    }
}

// Default value functions
fn default_api_addr() -> String {
    "127.0.0.1".into()
}
fn default_api_port() -> u16 {
    9301
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "text".into()
}
fn default_retry_delay() -> u64 {
    10
}
fn default_discovery_delay() -> u64 {
    40
}
fn default_interval() -> u64 {
    60
}
fn default_peers_to_share() -> usize {
    8
}
fn default_max_peers() -> usize {
    1500
}
fn default_request_timeout() -> u64 {
    120
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_api_addr(),
            port: default_api_port(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: default_retry_delay(),
            interval_secs: default_interval(),
        }
    }
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: default_discovery_delay(),
            interval_secs: default_interval(),
            peers_to_share: default_peers_to_share(),
            max_peers_per_transport: default_max_peers(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl DiscoveryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl NetmgrConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: NetmgrConfig = toml::from_str(&contents)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save the current config to a TOML file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Listen address of the HTTP API.
    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.api.listen_addr, self.api.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NetmgrConfig::default();
        assert_eq!(config.api.port, 9301);
        assert_eq!(config.retry.initial_delay_secs, 10);
        assert_eq!(config.retry.interval_secs, 60);
        assert_eq!(config.discovery.initial_delay_secs, 40);
        assert_eq!(config.discovery.peers_to_share, 8);
        assert_eq!(config.discovery.max_peers_per_transport, 1500);
        assert_eq!(config.graph.window_capacity, 50);
        assert_eq!(config.graph.max_hops, 15);
        assert_eq!(config.reliability.reliable_min_acks, 100);
        assert!(config.seeds.is_empty());
    }

    #[test]
    fn test_discovery_runs_after_first_sweep() {
        let config = NetmgrConfig::default();
        assert!(config.discovery.initial_delay() > config.retry.initial_delay());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let mut config = NetmgrConfig::default();
        config.seeds.push(SeedConfig {
            transport: Transport::Tor,
            id: "seed-1".into(),
            address: "seed.onion".into(),
            port: Some(9050),
        });
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let decoded: NetmgrConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(decoded.api.port, config.api.port);
        assert_eq!(decoded.seeds, config.seeds);
    }

    #[test]
    fn test_config_load_nonexistent_uses_defaults() {
        let config = NetmgrConfig::load(Path::new("/nonexistent/netmgr.toml")).unwrap();
        assert_eq!(config.api.port, 9301);
    }

    #[test]
    fn test_config_from_toml_partial() {
        let toml_str = r#"
[api]
port = 8001

[graph]
max_hops = 6

[reliability]
real_time_max_latency_ms = 500.0

[[seeds]]
transport = "I2P"
id = "bootstrap"
"#;
        let config: NetmgrConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.api.port, 8001);
        assert_eq!(config.graph.max_hops, 6);
        assert_eq!(config.graph.window_capacity, 50);
        assert_eq!(config.reliability.real_time_max_latency_ms, 500.0);
        assert_eq!(config.reliability.reliable_max_latency_ms, 8000.0);

        let seed = config.seeds[0].to_identity();
        assert_eq!(seed.transport, Some(Transport::I2p));
        assert!(seed.address.is_empty());
    }
}
