//! Message types for actor communication.

use queue_core::{JobCategory, JobEvent};
use ractor::RpcReplyPort;
use tokio::sync::broadcast;

/// Messages for the WorkerActor.
#[derive(Debug)]
pub enum WorkerMessage {
    /// Claim and process the next waiting job, if any.
    Poll,

    /// Report what the worker has done so far.
    GetStatus { reply: RpcReplyPort<WorkerStatus> },
}

/// Snapshot of a worker.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerStatus {
    pub worker_id: String,
    pub category: JobCategory,
    pub completed: u64,
    pub failed: u64,
}

/// Messages for the Supervisor.
#[derive(Debug)]
pub enum SupervisorMessage {
    /// Subscribe to lifecycle events.
    Subscribe {
        reply: RpcReplyPort<broadcast::Receiver<JobEvent>>,
    },

    /// Status of every live worker.
    ListWorkers { reply: RpcReplyPort<Vec<WorkerStatus>> },

    /// Stop all workers once their current job is done, then the
    /// supervisor.
    Shutdown,
}
