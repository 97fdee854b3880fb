//! Producer and lookup side of a job queue.

use broker::{BrokerError, SharedBroker};
use chrono::Utc;
use queue_core::{JobCategory, JobEvent, JobId, JobOutcome, JobRecord};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

/// Errors surfaced by queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Failed to enqueue job on {queue}: {source}")]
    Enqueue {
        queue: &'static str,
        #[source]
        source: BrokerError,
    },

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// A named, durable FIFO of job records for one category.
///
/// Cheap to clone: every clone shares the broker connection and the event
/// channel.
#[derive(Clone)]
pub struct Queue {
    category: JobCategory,
    broker: SharedBroker,
    events: Option<broadcast::Sender<JobEvent>>,
}

impl Queue {
    pub fn new(category: JobCategory, broker: SharedBroker) -> Self {
        Self {
            category,
            broker,
            events: None,
        }
    }

    /// Publish lifecycle events on `tx`.
    pub fn with_events(mut self, tx: broadcast::Sender<JobEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn category(&self) -> JobCategory {
        self.category
    }

    pub fn name(&self) -> &'static str {
        self.category.queue_name()
    }

    /// Store a new waiting job and return its id.
    ///
    /// Returns once the record is durably stored; processing happens later
    /// on a worker.
    pub async fn enqueue(&self, payload: Value) -> Result<JobId, QueueError> {
        let job = JobRecord::new(self.category, payload);

        self.broker
            .push_job(&job)
            .await
            .map_err(|source| QueueError::Enqueue {
                queue: self.name(),
                source,
            })?;

        tracing::debug!("Enqueued job {} on {}", job.id, self.name());
        self.emit(JobEvent::JobEnqueued {
            job_id: job.id,
            category: self.category,
            timestamp: job.created_at,
        });

        Ok(job.id)
    }

    /// Snapshot of a job, `None` when this queue never stored `id`.
    pub async fn get_job(&self, id: JobId) -> Result<Option<JobRecord>, QueueError> {
        Ok(self.broker.get_job(self.category, id).await?)
    }

    /// Claim the oldest waiting job for `worker_id`.
    pub(crate) async fn claim(&self, worker_id: &str) -> Result<Option<JobRecord>, QueueError> {
        let Some(job) = self.broker.claim_next(self.category, worker_id).await? else {
            return Ok(None);
        };

        self.emit(JobEvent::JobActive {
            job_id: job.id,
            category: self.category,
            worker_id: worker_id.to_string(),
            timestamp: job.processed_on.unwrap_or_else(Utc::now),
        });

        Ok(Some(job))
    }

    /// Jobs this queue has handed to a worker that are not finished yet.
    pub(crate) async fn active_jobs(&self) -> Result<Vec<JobRecord>, QueueError> {
        Ok(self.broker.active_jobs(self.category).await?)
    }

    /// Persist a handler's return value and move the job to `completed`.
    pub(crate) async fn complete(&self, id: JobId, result: Value) -> Result<JobRecord, QueueError> {
        let job = self
            .broker
            .finish_job(self.category, id, JobOutcome::Completed(result.clone()))
            .await?;

        self.emit(JobEvent::JobCompleted {
            job_id: id,
            category: self.category,
            result,
            duration_ms: job.duration_ms().unwrap_or_default(),
            timestamp: job.finished_on.unwrap_or_else(Utc::now),
        });

        Ok(job)
    }

    /// Record a handler's error and move the job to `failed`.
    pub(crate) async fn fail(&self, id: JobId, reason: String) -> Result<JobRecord, QueueError> {
        let job = self
            .broker
            .finish_job(self.category, id, JobOutcome::Failed(reason.clone()))
            .await?;

        self.emit(JobEvent::JobFailed {
            job_id: id,
            category: self.category,
            error: reason,
            timestamp: job.finished_on.unwrap_or_else(Utc::now),
        });

        Ok(job)
    }

    pub(crate) fn emit(&self, event: JobEvent) {
        if let Some(ref tx) = self.events {
            let _ = tx.send(event);
        }
    }
}
