//! Event types for worker lifecycle notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{JobCategory, JobId};

/// Events emitted by the job queue system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    // Job events
    /// A new job was durably stored.
    JobEnqueued {
        job_id: JobId,
        category: JobCategory,
        timestamp: DateTime<Utc>,
    },
    /// A worker claimed a job.
    JobActive {
        job_id: JobId,
        category: JobCategory,
        worker_id: String,
        timestamp: DateTime<Utc>,
    },
    /// A job's handler returned normally.
    JobCompleted {
        job_id: JobId,
        category: JobCategory,
        result: Value,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    /// A job's handler raised.
    JobFailed {
        job_id: JobId,
        category: JobCategory,
        error: String,
        timestamp: DateTime<Utc>,
    },

    // Worker events
    /// A worker started consuming its queue.
    WorkerStarted {
        worker_id: String,
        category: JobCategory,
        timestamp: DateTime<Utc>,
    },
    /// A worker stopped consuming its queue.
    WorkerStopped {
        worker_id: String,
        category: JobCategory,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get the category associated with this event.
    pub fn category(&self) -> JobCategory {
        match self {
            JobEvent::JobEnqueued { category, .. } => *category,
            JobEvent::JobActive { category, .. } => *category,
            JobEvent::JobCompleted { category, .. } => *category,
            JobEvent::JobFailed { category, .. } => *category,
            JobEvent::WorkerStarted { category, .. } => *category,
            JobEvent::WorkerStopped { category, .. } => *category,
        }
    }

    /// Get the job ID associated with this event, if any.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            JobEvent::JobEnqueued { job_id, .. } => Some(*job_id),
            JobEvent::JobActive { job_id, .. } => Some(*job_id),
            JobEvent::JobCompleted { job_id, .. } => Some(*job_id),
            JobEvent::JobFailed { job_id, .. } => Some(*job_id),
            _ => None,
        }
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            JobEvent::JobEnqueued {
                job_id, category, ..
            } => format!("{} job {} enqueued", category.label(), job_id),
            JobEvent::JobActive {
                job_id,
                category,
                worker_id,
                ..
            } => format!("{} job {} picked up by {}", category.label(), job_id, worker_id),
            JobEvent::JobCompleted {
                job_id,
                category,
                result,
                duration_ms,
                ..
            } => format!(
                "{} job {} completed in {}ms with result: {}",
                category.label(),
                job_id,
                duration_ms,
                result
            ),
            JobEvent::JobFailed {
                job_id,
                category,
                error,
                ..
            } => format!("{} job {} failed with error: {}", category.label(), job_id, error),
            JobEvent::WorkerStarted {
                worker_id,
                category,
                ..
            } => format!("Worker {} consuming {}", worker_id, category.queue_name()),
            JobEvent::WorkerStopped {
                worker_id,
                category,
                ..
            } => format!("Worker {} left {}", worker_id, category.queue_name()),
        }
    }
}
