//! Broker errors.

use queue_core::{JobId, RecordError};
use thiserror::Error;

/// Errors surfaced by broker operations.
///
/// Transport failures never appear here: they are retried until the broker
/// is reachable again.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Unsupported broker endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Job not found: {0}")]
    JobNotFound(JobId),
    #[error(transparent)]
    Record(#[from] RecordError),
}
