//! Broker key layout.
//!
//! Job records live under a configurable prefix and the queue name. The side
//! channel keys are fixed because external consumers read them directly.

use crate::{JobCategory, JobId};

/// Retention of an error tracking record, in seconds.
pub const TRACKING_TTL_SECS: i64 = 86_400;

/// Hash holding one job record.
pub fn job_key(prefix: &str, category: JobCategory, id: JobId) -> String {
    format!("{}:{}:{}", prefix, category.queue_name(), id)
}

/// List of waiting job ids, pushed on the left and claimed from the right.
pub fn wait_key(prefix: &str, category: JobCategory) -> String {
    format!("{}:{}:wait", prefix, category.queue_name())
}

/// Set of ids currently claimed by a worker.
pub fn active_key(prefix: &str, category: JobCategory) -> String {
    format!("{}:{}:active", prefix, category.queue_name())
}

/// Error tracking hash for a failed job.
pub fn tracking_key(id: JobId) -> String {
    format!("job:{}:tracking", id)
}

/// Dashboard notification hash for an entity and job.
pub fn dashboard_key(entity_id: &str, id: JobId) -> String {
    format!("dashboard:{}:{}", entity_id, id)
}
