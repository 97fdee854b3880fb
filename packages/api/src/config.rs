//! Server configuration.

use actors::WorkerConfig;
use broker::{BrokerConfig, ConfigError};

/// Everything the server reads from its environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// HTTP listen port
    pub port: u16,
    pub broker: BrokerConfig,
    pub workers: WorkerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            broker: BrokerConfig::default(),
            workers: WorkerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Config for tests: in-memory broker, near-instant work.
    pub fn memory() -> Self {
        Self {
            port: 0,
            broker: BrokerConfig::memory(),
            workers: WorkerConfig::fast(),
        }
    }

    /// Read configuration from the process environment.
    ///
    /// Call after loading any `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = match lookup("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidValue {
                    name: "PORT",
                    value: raw,
                })?,
            None => 3000,
        };

        Ok(Self {
            port,
            broker: BrokerConfig::from_lookup(&lookup)?,
            workers: WorkerConfig::from_lookup(&lookup)?,
        })
    }
}
