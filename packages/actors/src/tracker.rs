//! Error tracking side channel.

use broker::{BrokerError, SharedBroker};
use chrono::{DateTime, SecondsFormat, Utc};
use queue_core::{Fields, JobId, keys};

/// Writes a short-lived failure record per failed job under
/// `job:{id}:tracking`. Retention is left to the broker TTL.
#[derive(Clone)]
pub struct ErrorTracker {
    broker: SharedBroker,
}

impl ErrorTracker {
    pub fn new(broker: SharedBroker) -> Self {
        Self { broker }
    }

    /// Write `{status: "failed", error, failedAt}` for `job_id`.
    pub async fn record(
        &self,
        job_id: JobId,
        message: &str,
        failed_at: DateTime<Utc>,
    ) -> Result<(), BrokerError> {
        let fields = Fields::from([
            ("status".to_string(), "failed".to_string()),
            ("error".to_string(), message.to_string()),
            (
                "failedAt".to_string(),
                failed_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
        ]);
        self.broker.hset(&keys::tracking_key(job_id), fields).await
    }

    /// Expire the tracking record after `seconds`.
    pub async fn expire_after(&self, job_id: JobId, seconds: i64) -> Result<(), BrokerError> {
        let key = keys::tracking_key(job_id);
        if !self.broker.expire(&key, seconds).await? {
            tracing::warn!("Tracking record {} vanished before its TTL was set", key);
        }
        Ok(())
    }

    /// Record a failure and apply the standard one-day retention.
    pub async fn track_failure(&self, job_id: JobId, message: &str) -> Result<(), BrokerError> {
        self.record(job_id, message, Utc::now()).await?;
        self.expire_after(job_id, keys::TRACKING_TTL_SECS).await
    }
}
