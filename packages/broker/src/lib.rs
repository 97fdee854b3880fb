//! Durable broker for the job queue system.
//!
//! This crate provides the shared connection used by queues, workers and
//! the side-channel writers. Two backends implement the same [`Broker`]
//! contract:
//!
//! - `redis://host:port` - Redis, with reconnect and capped exponential backoff
//! - `mem://` - in-process store for tests and local development
//!
//! # Usage
//!
//! ```ignore
//! use broker::{BrokerConfig, connect};
//!
//! let broker = connect(BrokerConfig::from_env()?).await?;
//! broker.hset("dashboard:7:01H...", fields).await?;
//! ```

mod backoff;
mod client;
mod config;
mod error;
mod memory;
mod redis_broker;

use std::sync::Arc;

pub use backoff::RetryPolicy;
pub use client::{Broker, BrokerFuture, SharedBroker};
pub use config::{BrokerConfig, ConfigError};
pub use error::BrokerError;
pub use memory::MemoryBroker;
pub use redis_broker::RedisBroker;

/// Connect to the broker named by `config.endpoint`.
///
/// For Redis this blocks, retrying with backoff, until the server answers.
pub async fn connect(config: BrokerConfig) -> Result<SharedBroker, BrokerError> {
    if config.is_memory() {
        tracing::info!("Using in-memory broker (prefix '{}')", config.prefix);
        return Ok(Arc::new(MemoryBroker::new(config.prefix)));
    }

    if config.endpoint.starts_with("redis://") {
        let broker = RedisBroker::connect(config).await?;
        return Ok(Arc::new(broker));
    }

    Err(BrokerError::InvalidEndpoint(config.endpoint))
}
