use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub messaging: MessagingConfig,
    pub logging: LoggingConfig,
}

/// Values consumed by the messaging core. How they are loaded is up to the
/// embedding application; `Config::load` is one option.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Addresses of the store replicas to poll and write to
    pub node_addresses: Vec<String>,
    /// Identity of this process as message source/destination
    pub local_party: String,
    /// Inter-poll delay in milliseconds. Larger values batch more messages
    /// per poll; smaller values reduce latency at the cost of store load.
    pub poll_interval_ms: u64,
    /// How often to re-measure network distance to every node
    pub distance_interval_secs: u64,
    /// Topic override; when unset, typed channels use the payload type name
    pub topic: Option<String>,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            node_addresses: Vec::new(),
            local_party: String::new(),
            poll_interval_ms: 200,
            distance_interval_secs: 30,
            topic: None,
        }
    }
}

impl MessagingConfig {
    /// Validate values that have no usable default
    pub fn validate(&self) -> Result<()> {
        if self.local_party.is_empty() {
            return Err(Error::Configuration("local_party must be set".to_string()));
        }
        if self.node_addresses.is_empty() {
            return Err(Error::Configuration(
                "at least one node address is required".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::Configuration(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration from an optional file layered with
    /// `SWITCHYARD_`-prefixed environment variables.
    pub fn load(path: Option<&Path>) -> std::result::Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        builder
            .add_source(Environment::with_prefix("SWITCHYARD").separator("__"))
            .build()?
            .try_deserialize()
    }
}
