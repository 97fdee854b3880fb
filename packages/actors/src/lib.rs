//! Actor system for the job queue.
//!
//! This crate provides the queues, the Ractor-based workers that consume
//! them and the supervisor that keeps the workers alive.
//!
//! # Architecture
//!
//! - `Queue` - Enqueue and look up jobs of one category
//! - `WorkerActor` - Claims jobs from one queue and runs its handler
//! - `Supervisor` - Spawns a worker per handler, restarts failed workers
//!   and logs job outcomes
//! - `ErrorTracker` / `DashboardSink` - Side-channel writers
//!
//! # Usage
//!
//! ```ignore
//! use actors::{Queue, SupervisorArgs, WorkerConfig, default_handlers, start_supervisor};
//!
//! let (events, _) = tokio::sync::broadcast::channel(1024);
//! let admin = Queue::new(JobCategory::Admin, broker.clone()).with_events(events.clone());
//!
//! let config = WorkerConfig::from_env()?;
//! let (supervisor, handle) = start_supervisor(SupervisorArgs {
//!     handlers: default_handlers(broker.clone(), &config),
//!     broker,
//!     config,
//!     events,
//! })
//! .await?;
//!
//! let id = admin.enqueue(json!({"action": "grant"})).await?;
//! ```

mod config;
mod dashboard;
mod handler;
mod handlers;
mod messages;
mod queue;
mod supervisor;
mod tracker;
mod worker_actor;

pub use config::WorkerConfig;
pub use dashboard::DashboardSink;
pub use handler::{FnHandler, HandlerFuture, HandlerResult, JobHandler, JobHandlerRegistry};
pub use handlers::{AdminHandler, ENTITY_ID_FIELD, UserHandler, default_handlers, entity_id};
pub use messages::{SupervisorMessage, WorkerMessage, WorkerStatus};
pub use queue::{Queue, QueueError};
pub use supervisor::{Supervisor, SupervisorArgs, start_supervisor};
pub use tracker::ErrorTracker;
pub use worker_actor::WorkerActor;

pub use queue_core;

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort, concurrency};
