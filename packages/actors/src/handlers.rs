//! Built-in handlers for the admin and user queues.

use std::time::Duration;

use broker::SharedBroker;
use queue_core::{JobCategory, JobRecord, payload_fields};
use serde_json::{Value, json};

use crate::config::WorkerConfig;
use crate::dashboard::DashboardSink;
use crate::handler::{HandlerFuture, JobHandler, JobHandlerRegistry};

/// Payload field naming the dashboard entity of an admin job.
pub const ENTITY_ID_FIELD: &str = "entityId";

/// Resolve the dashboard entity of `payload`: its `entityId` when that is
/// a string or a number, `fallback` otherwise.
pub fn entity_id(payload: &Value, fallback: &str) -> String {
    match payload.get(ENTITY_ID_FIELD) {
        Some(Value::String(id)) if !id.is_empty() => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => fallback.to_string(),
    }
}

fn processed(job: &JobRecord) -> Value {
    json!({
        "processed": true,
        "type": job.category,
        "jobId": job.id,
    })
}

/// Processes admin jobs: notifies the dashboard, then does the work.
pub struct AdminHandler {
    dashboard: DashboardSink,
    default_entity_id: String,
    work: Duration,
}

impl AdminHandler {
    pub fn new(dashboard: DashboardSink, config: &WorkerConfig) -> Self {
        Self {
            dashboard,
            default_entity_id: config.default_entity_id.clone(),
            work: config.work_for(JobCategory::Admin),
        }
    }
}

impl JobHandler for AdminHandler {
    fn category(&self) -> JobCategory {
        JobCategory::Admin
    }

    fn handle(&self, job: &JobRecord) -> HandlerFuture {
        let dashboard = self.dashboard.clone();
        let entity = entity_id(&job.payload, &self.default_entity_id);
        let work = self.work;
        let job = job.clone();

        Box::pin(async move {
            dashboard
                .upsert(&entity, job.id, payload_fields(&job.payload))
                .await
                .map_err(|e| format!("Dashboard update failed: {}", e))?;

            tokio::time::sleep(work).await;
            Ok(processed(&job))
        })
    }
}

/// Processes user jobs.
pub struct UserHandler {
    work: Duration,
}

impl UserHandler {
    pub fn new(config: &WorkerConfig) -> Self {
        Self {
            work: config.work_for(JobCategory::User),
        }
    }
}

impl JobHandler for UserHandler {
    fn category(&self) -> JobCategory {
        JobCategory::User
    }

    fn handle(&self, job: &JobRecord) -> HandlerFuture {
        let work = self.work;
        let job = job.clone();
        Box::pin(async move {
            tokio::time::sleep(work).await;
            Ok(processed(&job))
        })
    }
}

/// Registry with the admin and user handlers wired to `broker`.
pub fn default_handlers(broker: SharedBroker, config: &WorkerConfig) -> JobHandlerRegistry {
    JobHandlerRegistry::new()
        .with(AdminHandler::new(DashboardSink::new(broker), config))
        .with(UserHandler::new(config))
}
