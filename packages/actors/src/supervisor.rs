//! Supervisor actor for managing all workers.

use std::collections::HashMap;
use std::time::Duration;

use broker::SharedBroker;
use queue_core::{JobCategory, JobEvent};
use ractor::{Actor, ActorId, ActorProcessingErr, ActorRef, SupervisionEvent};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::config::WorkerConfig;
use crate::handler::JobHandlerRegistry;
use crate::messages::{SupervisorMessage, WorkerMessage};
use crate::queue::Queue;
use crate::tracker::ErrorTracker;
use crate::worker_actor::{WorkerActor, WorkerArgs};

/// Longest wait for a worker to finish its current job on shutdown.
const WORKER_STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// Supervisor arguments.
pub struct SupervisorArgs {
    pub broker: SharedBroker,
    pub handlers: JobHandlerRegistry,
    pub config: WorkerConfig,
    /// Channel the workers publish lifecycle events on.
    pub events: broadcast::Sender<JobEvent>,
}

/// State for the supervisor actor.
pub struct SupervisorState {
    broker: SharedBroker,
    handlers: JobHandlerRegistry,
    config: WorkerConfig,
    tracker: ErrorTracker,
    /// Event broadcaster.
    pub event_tx: broadcast::Sender<JobEvent>,
    /// Live workers by actor ID.
    workers: HashMap<ActorId, WorkerEntry>,
    /// Worker counter for unique IDs.
    worker_counter: u64,
    stopping: bool,
}

struct WorkerEntry {
    worker_id: String,
    category: JobCategory,
    actor: ActorRef<WorkerMessage>,
}

impl SupervisorState {
    fn new(args: SupervisorArgs) -> Self {
        Self {
            tracker: ErrorTracker::new(args.broker.clone()),
            broker: args.broker,
            handlers: args.handlers,
            config: args.config,
            event_tx: args.events,
            workers: HashMap::new(),
            worker_counter: 0,
            stopping: false,
        }
    }

    /// Generate a unique worker ID.
    fn next_worker_id(&mut self, category: JobCategory) -> String {
        self.worker_counter += 1;
        format!("worker-{}-{}", category, self.worker_counter)
    }

    fn queue(&self, category: JobCategory) -> Queue {
        Queue::new(category, self.broker.clone()).with_events(self.event_tx.clone())
    }
}

async fn spawn_worker(
    myself: &ActorRef<SupervisorMessage>,
    state: &mut SupervisorState,
    category: JobCategory,
) -> Result<ActorRef<WorkerMessage>, ActorProcessingErr> {
    let handler = state
        .handlers
        .get(category)
        .ok_or_else(|| ActorProcessingErr::from(format!("No handler for {}", category)))?;

    let worker_id = state.next_worker_id(category);
    let args = WorkerArgs {
        worker_id: worker_id.clone(),
        queue: state.queue(category),
        handler,
        tracker: state.tracker.clone(),
        poll_interval: state.config.poll_interval,
    };

    let (actor, _handle) = Actor::spawn_linked(None, WorkerActor, args, myself.get_cell())
        .await
        .map_err(|e| ActorProcessingErr::from(format!("Failed to spawn worker: {}", e)))?;

    state.workers.insert(
        actor.get_id(),
        WorkerEntry {
            worker_id,
            category,
            actor: actor.clone(),
        },
    );
    Ok(actor)
}

/// Fail every job a dead worker left `active`, with a tracking record.
async fn recover_stalled(state: &SupervisorState, category: JobCategory, worker_id: &str) {
    let queue = state.queue(category);
    let jobs = match queue.active_jobs().await {
        Ok(jobs) => jobs,
        Err(e) => {
            tracing::warn!("Could not list active {} jobs: {}", category.label(), e);
            return;
        }
    };

    for job in jobs {
        if job.worker_id.as_deref() != Some(worker_id) {
            continue;
        }

        let reason = format!("Worker {} stopped while processing the job", worker_id);
        tracing::warn!("Recovering stalled {} job {}", category.label(), job.id);
        if let Err(e) = state.tracker.track_failure(job.id, &reason).await {
            tracing::warn!("Failed to write tracking record for job {}: {}", job.id, e);
        }
        if let Err(e) = queue.fail(job.id, reason).await {
            tracing::warn!("Failed to mark stalled job {} failed: {}", job.id, e);
        }
    }
}

/// Log job outcomes as they are published.
fn log_events(mut rx: broadcast::Receiver<JobEvent>) {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event @ JobEvent::JobCompleted { .. }) => {
                    tracing::info!("{}", event.description())
                }
                Ok(event @ JobEvent::JobFailed { .. }) => {
                    tracing::error!("{}", event.description())
                }
                Ok(event) => tracing::debug!("{}", event.description()),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event log lagged, skipped {} events", skipped)
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

/// Supervisor actor that owns one worker per registered handler and
/// replaces any worker that fails.
pub struct Supervisor;

impl Actor for Supervisor {
    type Msg = SupervisorMessage;
    type State = SupervisorState;
    type Arguments = SupervisorArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(
            "Starting job queue supervisor on {} broker",
            args.broker.backend()
        );

        let mut state = SupervisorState::new(args);
        log_events(state.event_tx.subscribe());

        for category in state.handlers.categories() {
            spawn_worker(&myself, &mut state, category).await?;
        }

        Ok(state)
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisorMessage::Subscribe { reply } => {
                let _ = reply.send(state.event_tx.subscribe());
            }

            SupervisorMessage::ListWorkers { reply } => {
                let timeout = Duration::from_secs(5);
                let mut statuses = Vec::new();
                for entry in state.workers.values() {
                    let result = ractor::rpc::call(
                        &entry.actor,
                        |reply| WorkerMessage::GetStatus { reply },
                        Some(timeout),
                    )
                    .await;
                    if let Ok(ractor::rpc::CallResult::Success(status)) = result {
                        statuses.push(status);
                    }
                }
                statuses.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));
                let _ = reply.send(statuses);
            }

            SupervisorMessage::Shutdown => {
                tracing::info!("Shutting down supervisor");
                state.stopping = true;
                let workers: Vec<WorkerEntry> = state.workers.drain().map(|(_, e)| e).collect();
                for entry in workers {
                    if let Err(e) = entry
                        .actor
                        .stop_and_wait(Some("shutdown".to_string()), Some(WORKER_STOP_TIMEOUT))
                        .await
                    {
                        tracing::warn!("Worker {} did not stop cleanly: {}", entry.worker_id, e);
                    }
                }
                myself.stop(None);
            }
        }

        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisionEvent::ActorFailed(cell, err) => {
                let Some(entry) = state.workers.remove(&cell.get_id()) else {
                    return Ok(());
                };
                let category = entry.category;
                tracing::error!("Worker {} failed: {}", entry.worker_id, err);
                recover_stalled(state, category, &entry.worker_id).await;

                if !state.stopping {
                    let worker = spawn_worker(&myself, state, category).await?;
                    tracing::info!(
                        "Restarted worker for {} as actor {}",
                        category.queue_name(),
                        worker.get_id()
                    );
                }
            }
            SupervisionEvent::ActorTerminated(cell, _, reason) => {
                if let Some(entry) = state.workers.remove(&cell.get_id()) {
                    tracing::info!(
                        "Worker {} on {} stopped: {}",
                        entry.worker_id,
                        entry.category.queue_name(),
                        reason.unwrap_or_default()
                    );
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Start the supervisor and its workers.
pub async fn start_supervisor(
    args: SupervisorArgs,
) -> Result<(ActorRef<SupervisorMessage>, tokio::task::JoinHandle<()>), ractor::SpawnErr> {
    Actor::spawn(None, Supervisor, args).await
}
