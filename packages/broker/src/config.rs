//! Broker connection configuration.

use thiserror::Error;

use crate::RetryPolicy;

const MEMORY_ENDPOINT: &str = "mem://";

/// Broker configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Connection endpoint: "mem://" or "redis://host:port"
    pub endpoint: String,
    /// Key prefix for job records and wait lists
    pub prefix: String,
    /// Reconnect backoff for transport failures
    pub retry: RetryPolicy,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self::redis("localhost", 6379)
    }
}

/// Configuration errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: '{value}'")]
    InvalidValue { name: &'static str, value: String },
}

impl BrokerConfig {
    /// Create a config for in-memory testing.
    pub fn memory() -> Self {
        Self {
            endpoint: MEMORY_ENDPOINT.to_string(),
            ..Self::default()
        }
    }

    /// Create a config for a Redis server.
    pub fn redis(host: impl AsRef<str>, port: u16) -> Self {
        Self {
            endpoint: format!("redis://{}:{}", host.as_ref(), port),
            prefix: "jobq".to_string(),
            retry: RetryPolicy::default(),
        }
    }

    /// Set the key prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the reconnect policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Whether this config selects the in-process backend.
    pub fn is_memory(&self) -> bool {
        self.endpoint == MEMORY_ENDPOINT
    }

    /// Build a config from process environment variables.
    ///
    /// `BROKER_URL` wins over `REDIS_HOST`/`REDIS_PORT`; `BROKER_PREFIX`
    /// overrides the key prefix.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match lookup("BROKER_URL") {
            Some(url) => Self {
                endpoint: url,
                ..Self::default()
            },
            None => {
                let host = lookup("REDIS_HOST").unwrap_or_else(|| "localhost".to_string());
                let port = match lookup("REDIS_PORT") {
                    Some(raw) => raw.parse::<u16>().map_err(|_| ConfigError::InvalidValue {
                        name: "REDIS_PORT",
                        value: raw,
                    })?,
                    None => 6379,
                };
                Self::redis(host, port)
            }
        };

        if let Some(prefix) = lookup("BROKER_PREFIX") {
            config = config.with_prefix(prefix);
        }

        Ok(config)
    }
}
