use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::StoreError;
use crate::types::ConsistencyLevel;

/// Key/value connection parameters handed to the store factory.
pub type StoreProperties = HashMap<String, String>;

pub const PROP_BACKEND: &str = "backend";
pub const PROP_HOSTS: &str = "hosts";
pub const PROP_PORT: &str = "port";
pub const PROP_KEYSPACE: &str = "keyspace";
pub const PROP_USERNAME: &str = "username";
pub const PROP_PASSWORD: &str = "password";
pub const PROP_CONNECTION_TIMEOUT_MS: &str = "connection_timeout_ms";
pub const PROP_REQUEST_TIMEOUT_MS: &str = "request_timeout_ms";
pub const PROP_POOL_SIZE: &str = "pool_size";
pub const PROP_PAGE_SIZE: &str = "page_size";
pub const PROP_REPLICATION_FACTOR: &str = "replication_factor";
pub const PROP_CONSISTENCY: &str = "consistency";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub hosts: Vec<String>,
    pub port: u16,
    pub keyspace: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub connection_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub pool_size: u32,
    pub page_size: i32,
    pub replication_factor: u32,
    pub consistency: ConsistencyLevel,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            hosts: vec!["localhost".to_string()],
            port: 9042,
            keyspace: "gora".to_string(),
            username: None,
            password: None,
            connection_timeout_ms: 5_000,
            request_timeout_ms: 10_000,
            pool_size: 4,
            page_size: 5_000,
            replication_factor: 1,
            consistency: ConsistencyLevel::One,
        }
    }
}

impl DatabaseConfig {
    /// Overlay a parameter map on the defaults.
    ///
    /// Unknown keys are ignored so that backend-specific options can travel
    /// in the same map; malformed values are rejected.
    pub fn from_properties(properties: &StoreProperties) -> Result<Self, StoreError> {
        let mut config = Self::default();

        if let Some(hosts) = properties.get(PROP_HOSTS) {
            let hosts: Vec<String> = hosts
                .split(',')
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
                .collect();
            if hosts.is_empty() {
                return Err(StoreError::ConfigError("`hosts` must name at least one host".to_string()));
            }
            config.hosts = hosts;
        }
        if let Some(port) = properties.get(PROP_PORT) {
            config.port = parse_property(PROP_PORT, port)?;
        }
        if let Some(keyspace) = properties.get(PROP_KEYSPACE) {
            config.keyspace = keyspace.clone();
        }
        config.username = properties.get(PROP_USERNAME).cloned().or(config.username);
        config.password = properties.get(PROP_PASSWORD).cloned().or(config.password);
        if let Some(value) = properties.get(PROP_CONNECTION_TIMEOUT_MS) {
            config.connection_timeout_ms = parse_property(PROP_CONNECTION_TIMEOUT_MS, value)?;
        }
        if let Some(value) = properties.get(PROP_REQUEST_TIMEOUT_MS) {
            config.request_timeout_ms = parse_property(PROP_REQUEST_TIMEOUT_MS, value)?;
        }
        if let Some(value) = properties.get(PROP_POOL_SIZE) {
            config.pool_size = parse_property(PROP_POOL_SIZE, value)?;
        }
        if let Some(value) = properties.get(PROP_PAGE_SIZE) {
            config.page_size = parse_property(PROP_PAGE_SIZE, value)?;
        }
        if let Some(value) = properties.get(PROP_REPLICATION_FACTOR) {
            config.replication_factor = parse_property(PROP_REPLICATION_FACTOR, value)?;
        }
        if let Some(value) = properties.get(PROP_CONSISTENCY) {
            config.consistency = value.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.hosts.is_empty() {
            return Err(StoreError::ConfigError("no contact hosts configured".to_string()));
        }
        if self.port == 0 {
            return Err(StoreError::ConfigError("port must be non-zero".to_string()));
        }
        if !crate::types::is_valid_identifier(&self.keyspace) {
            return Err(StoreError::ConfigError(format!("invalid keyspace name: {}", self.keyspace)));
        }
        if self.page_size <= 0 {
            return Err(StoreError::ConfigError("page_size must be positive".to_string()));
        }
        if self.replication_factor == 0 {
            return Err(StoreError::ConfigError("replication_factor must be positive".to_string()));
        }
        Ok(())
    }

    pub fn contact_points(&self) -> Vec<String> {
        self.hosts
            .iter()
            .map(|host| format!("{}:{}", host, self.port))
            .collect()
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn parse_property<V: FromStr>(key: &str, value: &str) -> Result<V, StoreError> {
    value
        .trim()
        .parse()
        .map_err(|_| StoreError::ConfigError(format!("invalid value for `{}`: {}", key, value)))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: String,
    pub database: DatabaseConfig,
    pub observability: ObservabilityConfig,
}

/// Load a store configuration file, with `GORA_*` environment overrides
/// (e.g. `GORA_DATABASE__PORT=19042`).
pub fn load_config(path: &str) -> Result<StoreConfig, StoreError> {
    let config = Config::builder()
        .add_source(File::with_name(path))
        .add_source(
            Environment::with_prefix("GORA")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    let config: StoreConfig = config.try_deserialize()?;
    config.database.validate()?;
    Ok(config)
}
