/// Configuration management for shardmon
use crate::core::store::MemoryStore;
use crate::core::{Group, GroupServer, Proxy, Sentinel, MAX_GROUP_ID};
use crate::error::{ConfigError, MonitorResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Main shardmon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Product identity shared by every component of the cluster
    pub product: ProductConfig,
    /// Probe cadence and deadlines
    pub health: HealthConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Seed topology for the in-memory store
    #[serde(default)]
    pub topology: TopologyConfig,
}

/// Product identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductConfig {
    /// Product name; sentinel masters are named `<name>-<group id>`
    pub name: String,
    /// Password for data servers and proxy admin credentials
    #[serde(default)]
    pub auth: String,
}

/// Health check configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Data server and sentinel refresh interval in seconds
    pub redis_interval_sec: u64,
    /// Proxy refresh interval in seconds
    pub proxy_interval_sec: u64,
    /// Deadline of a single probe in milliseconds
    pub probe_timeout_ms: u64,
    /// Bring proxies online when they report neither online nor closed
    #[serde(default = "default_auto_online")]
    pub auto_online: bool,
}

fn default_auto_online() -> bool {
    true
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Log format (json, text)
    pub format: String,
}

/// Topology seed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopologyConfig {
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
    #[serde(default)]
    pub sentinel: SentinelConfig,
    #[serde(default)]
    pub proxies: Vec<ProxyConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    pub id: i32,
    /// Server addresses, primary first
    pub servers: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SentinelConfig {
    #[serde(default)]
    pub servers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub token: String,
    pub admin_addr: String,
    #[serde(default)]
    pub proxy_addr: String,
}

impl Default for ProductConfig {
    fn default() -> Self {
        Self {
            name: "codis-demo".to_string(),
            auth: String::new(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            redis_interval_sec: 1,
            proxy_interval_sec: 1,
            probe_timeout_ms: 800,
            auto_online: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl HealthConfig {
    pub fn redis_interval(&self) -> Duration {
        Duration::from_secs(self.redis_interval_sec)
    }

    pub fn proxy_interval(&self) -> Duration {
        Duration::from_secs(self.proxy_interval_sec)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl TopologyConfig {
    /// Build the in-memory store this seed describes
    pub fn build_store(&self) -> MonitorResult<MemoryStore> {
        let mut store = MemoryStore::new();
        for group in &self.groups {
            store.upsert_group(Group {
                servers: group.servers.iter().map(|addr| GroupServer::new(addr)).collect(),
                ..Group::new(group.id)
            })?;
        }
        store.set_sentinel(Sentinel::new(self.sentinel.servers.clone()));
        for proxy in &self.proxies {
            store.add_proxy(Proxy {
                proxy_addr: proxy.proxy_addr.clone(),
                ..Proxy::new(&proxy.token, &proxy.admin_addr)
            })?;
        }
        Ok(store)
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.product.name.is_empty() {
            return Err(ConfigError::ValidationError(
                "product name cannot be empty".to_string(),
            ));
        }

        // Validate health config
        if self.health.redis_interval_sec == 0 || self.health.proxy_interval_sec == 0 {
            return Err(ConfigError::ValidationError(
                "refresh intervals must be greater than 0".to_string(),
            ));
        }

        if self.health.probe_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "probe_timeout_ms must be greater than 0".to_string(),
            ));
        }

        let shortest = self.health.redis_interval().min(self.health.proxy_interval());
        if self.health.probe_timeout() >= shortest {
            return Err(ConfigError::ValidationError(
                "probe_timeout_ms must be less than the shortest refresh interval".to_string(),
            ));
        }

        // Validate logging config
        match self.logging.level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level: {}",
                    self.logging.level
                )))
            }
        }

        match self.logging.format.as_str() {
            "json" | "text" => {}
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {}",
                    self.logging.format
                )))
            }
        }

        self.validate_topology()
    }

    fn validate_topology(&self) -> Result<(), ConfigError> {
        let mut ids = HashSet::new();
        for group in &self.topology.groups {
            if group.id <= 0 || group.id > MAX_GROUP_ID {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid group id {}, must be in 1..={}",
                    group.id, MAX_GROUP_ID
                )));
            }
            if !ids.insert(group.id) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate group id: {}",
                    group.id
                )));
            }
            if group.servers.iter().any(|addr| addr.is_empty()) {
                return Err(ConfigError::ValidationError(format!(
                    "group-[{}] has an empty server address",
                    group.id
                )));
            }
        }

        if self.topology.sentinel.servers.iter().any(|addr| addr.is_empty()) {
            return Err(ConfigError::ValidationError(
                "sentinel server address cannot be empty".to_string(),
            ));
        }

        let mut tokens = HashSet::new();
        for proxy in &self.topology.proxies {
            if proxy.token.is_empty() || proxy.admin_addr.is_empty() {
                return Err(ConfigError::ValidationError(
                    "proxy token and admin_addr cannot be empty".to_string(),
                ));
            }
            if !tokens.insert(proxy.token.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate proxy token: {}",
                    proxy.token
                )));
            }
        }

        Ok(())
    }

    /// Create example configuration file
    pub fn create_example_config<P: AsRef<Path>>(path: P) -> Result<(), ConfigError> {
        let config = Config {
            topology: TopologyConfig {
                groups: vec![
                    GroupConfig {
                        id: 1,
                        servers: vec!["10.0.1.20:6379".to_string(), "10.0.1.21:6379".to_string()],
                    },
                    GroupConfig {
                        id: 2,
                        servers: vec!["10.0.1.22:6379".to_string(), "10.0.1.23:6379".to_string()],
                    },
                ],
                sentinel: SentinelConfig {
                    servers: vec![
                        "10.0.1.30:26379".to_string(),
                        "10.0.1.31:26379".to_string(),
                        "10.0.1.32:26379".to_string(),
                    ],
                },
                proxies: vec![ProxyConfig {
                    token: "5c7f3ad0e2a1b9d4".to_string(),
                    admin_addr: "10.0.1.40:11080".to_string(),
                    proxy_addr: "10.0.1.40:19000".to_string(),
                }],
            },
            ..Default::default()
        };

        config.save_to_file(path)
    }
}
