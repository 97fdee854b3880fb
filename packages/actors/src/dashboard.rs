//! Dashboard notification sink.

use broker::{BrokerError, SharedBroker};
use queue_core::{Fields, JobId, keys};

/// Mirrors admin job payloads into `dashboard:{entity}:{job}` hashes that
/// an external dashboard reads. Writes merge into any existing hash and
/// never expire.
#[derive(Clone)]
pub struct DashboardSink {
    broker: SharedBroker,
}

impl DashboardSink {
    pub fn new(broker: SharedBroker) -> Self {
        Self { broker }
    }

    pub async fn upsert(
        &self,
        entity_id: &str,
        job_id: JobId,
        fields: Fields,
    ) -> Result<(), BrokerError> {
        let key = keys::dashboard_key(entity_id, job_id);
        tracing::debug!("Updating dashboard record {}", key);
        self.broker.hset(&key, fields).await
    }
}
