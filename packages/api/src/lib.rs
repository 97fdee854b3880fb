//! HTTP API for the job queue system.
//!
//! This crate exposes both queues over HTTP:
//! - `POST /admin/jobs`, `POST /user/jobs` - enqueue a job
//! - `GET /admin/jobs/:id`, `GET /user/jobs/:id` - job snapshot
//! - `GET /` - liveness banner

mod config;
mod init;
pub mod jobs;

use axum::Router;
use axum::routing::get;

pub use config::AppConfig;
pub use init::{InitError, JobSystem, init_job_queue};
pub use jobs::{JobView, json_error};

// Re-export core types for convenience
pub use queue_core::{JobCategory, JobEvent, JobId, JobRecord, JobState};

pub const BANNER: &str = "Job queue server is running";

/// Build the HTTP router over the system's queues.
pub fn router(system: &JobSystem) -> Router {
    JobCategory::ALL.into_iter().fold(
        Router::new().route("/", get(|| async { BANNER })),
        |router, category| {
            let path = format!("/{}/jobs", category);
            router.nest(&path, jobs::routes(system.queue(category).clone()))
        },
    )
}
