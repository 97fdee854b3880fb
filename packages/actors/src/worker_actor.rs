//! Worker actor for executing jobs.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use queue_core::{JobEvent, JobRecord};
use ractor::{Actor, ActorProcessingErr, ActorRef};

use crate::handler::{HandlerResult, JobHandler};
use crate::messages::{WorkerMessage, WorkerStatus};
use crate::queue::{Queue, QueueError};
use crate::tracker::ErrorTracker;

/// State for the worker actor.
pub struct WorkerActorState {
    /// Unique worker ID.
    pub worker_id: String,
    /// Queue this worker consumes.
    pub queue: Queue,
    /// Handler applied to every claimed job.
    pub handler: Arc<dyn JobHandler>,
    /// Failure side channel.
    pub tracker: ErrorTracker,
    /// Delay between polls of an empty queue.
    pub poll_interval: Duration,
    /// Jobs finished successfully.
    pub completed: u64,
    /// Jobs finished with an error.
    pub failed: u64,
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned());
    match detail {
        Some(detail) => format!("Handler panicked: {}", detail),
        None => "Handler panicked".to_string(),
    }
}

impl WorkerActorState {
    fn status(&self) -> WorkerStatus {
        WorkerStatus {
            worker_id: self.worker_id.clone(),
            category: self.queue.category(),
            completed: self.completed,
            failed: self.failed,
        }
    }

    /// Run the handler on a claimed job and persist the outcome.
    async fn process(&mut self, job: JobRecord) -> Result<(), QueueError> {
        tracing::debug!(
            "Worker {} processing {} job {}",
            self.worker_id,
            job.category.label(),
            job.id
        );

        // A panicking handler fails its job instead of the worker.
        let outcome: HandlerResult = match tokio::spawn(self.handler.handle(&job)).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => Err(panic_message(e.into_panic())),
            Err(e) => Err(format!("Handler task ended unexpectedly: {}", e)),
        };

        match outcome {
            Ok(result) => {
                self.queue.complete(job.id, result).await?;
                self.completed += 1;
            }
            Err(error) => {
                if let Err(e) = self.tracker.track_failure(job.id, &error).await {
                    tracing::warn!("Failed to write tracking record for job {}: {}", job.id, e);
                }
                self.queue.fail(job.id, error).await?;
                self.failed += 1;
            }
        }

        Ok(())
    }
}

/// Worker actor arguments.
pub struct WorkerArgs {
    pub worker_id: String,
    pub queue: Queue,
    pub handler: Arc<dyn JobHandler>,
    pub tracker: ErrorTracker,
    pub poll_interval: Duration,
}

fn schedule_poll(myself: &ActorRef<WorkerMessage>, delay: Duration) {
    let myself = myself.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = myself.send_message(WorkerMessage::Poll);
    });
}

/// Worker actor that consumes one queue, one job at a time.
///
/// The worker drains its queue eagerly: after each job it polls again at
/// once, and only falls back to `poll_interval` when the queue is empty.
/// A stop request takes effect between jobs, never in the middle of one.
pub struct WorkerActor;

impl Actor for WorkerActor {
    type Msg = WorkerMessage;
    type State = WorkerActorState;
    type Arguments = WorkerArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting worker {} on {}", args.worker_id, args.queue.name());

        args.queue.emit(JobEvent::WorkerStarted {
            worker_id: args.worker_id.clone(),
            category: args.queue.category(),
            timestamp: Utc::now(),
        });
        myself.send_message(WorkerMessage::Poll)?;

        Ok(WorkerActorState {
            worker_id: args.worker_id,
            queue: args.queue,
            handler: args.handler,
            tracker: args.tracker,
            poll_interval: args.poll_interval,
            completed: 0,
            failed: 0,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            WorkerMessage::Poll => {
                match state.queue.claim(&state.worker_id).await? {
                    Some(job) => {
                        state.process(job).await?;
                        myself.send_message(WorkerMessage::Poll)?;
                    }
                    None => schedule_poll(&myself, state.poll_interval),
                }
            }

            WorkerMessage::GetStatus { reply } => {
                let _ = reply.send(state.status());
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        tracing::info!("Worker {} stopped", state.worker_id);
        state.queue.emit(JobEvent::WorkerStopped {
            worker_id: state.worker_id.clone(),
            category: state.queue.category(),
            timestamp: Utc::now(),
        });
        Ok(())
    }
}
