//! Server initialization for the job queue system.

use actors::{
    ActorRef, Queue, SupervisorArgs, SupervisorMessage, default_handlers, start_supervisor,
};
use broker::{BrokerError, SharedBroker};
use queue_core::{JobCategory, JobEvent};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::AppConfig;

#[derive(Debug, Error)]
pub enum InitError {
    #[error("Broker unavailable: {0}")]
    Broker(#[from] BrokerError),

    #[error("Failed to start workers: {0}")]
    Supervisor(#[from] ractor::SpawnErr),
}

/// A running job queue: the shared broker, both queues and the supervised
/// workers consuming them.
pub struct JobSystem {
    pub broker: SharedBroker,
    pub admin: Queue,
    pub user: Queue,
    pub events: broadcast::Sender<JobEvent>,
    supervisor: ActorRef<SupervisorMessage>,
    handle: tokio::task::JoinHandle<()>,
}

impl JobSystem {
    pub fn queue(&self, category: JobCategory) -> &Queue {
        match category {
            JobCategory::Admin => &self.admin,
            JobCategory::User => &self.user,
        }
    }

    /// Stop the workers and wait for the supervisor to exit.
    pub async fn shutdown(self) {
        tracing::info!("Stopping job queue workers");
        let _ = self.supervisor.send_message(SupervisorMessage::Shutdown);
        if let Err(e) = self.handle.await {
            tracing::warn!("Supervisor exited abnormally: {}", e);
        }
    }
}

/// Initialize the job queue system.
///
/// Connects to the broker (blocking with backoff until it answers), then
/// starts one worker per queue.
pub async fn init_job_queue(config: &AppConfig) -> Result<JobSystem, InitError> {
    tracing::info!("Initializing job queue system...");

    let broker = broker::connect(config.broker.clone()).await?;
    let (events, _) = broadcast::channel(1024);

    let admin = Queue::new(JobCategory::Admin, broker.clone()).with_events(events.clone());
    let user = Queue::new(JobCategory::User, broker.clone()).with_events(events.clone());

    let (supervisor, handle) = start_supervisor(SupervisorArgs {
        broker: broker.clone(),
        handlers: default_handlers(broker.clone(), &config.workers),
        config: config.workers.clone(),
        events: events.clone(),
    })
    .await?;

    tracing::info!(
        "Job queue system initialized ({} and {})",
        admin.name(),
        user.name()
    );

    Ok(JobSystem {
        broker,
        admin,
        user,
        events,
        supervisor,
        handle,
    })
}
