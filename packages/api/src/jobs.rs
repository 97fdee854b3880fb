//! Job routes, mounted once per queue.

use actors::Queue;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use queue_core::{JobId, JobRecord, JobState};
use serde::Serialize;
use serde_json::{Value, json};

/// Job snapshot as returned by `GET /{category}/jobs/:id`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub id: JobId,
    pub data: Value,
    pub state: JobState,
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<String>,
}

impl From<JobRecord> for JobView {
    fn from(job: JobRecord) -> Self {
        Self {
            id: job.id,
            data: job.payload,
            state: job.state,
            result: job.result,
            failed_reason: job.failed_reason,
        }
    }
}

pub fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// `POST /` enqueues, `GET /:id` looks up; both against `queue`.
pub fn routes(queue: Queue) -> Router {
    Router::new()
        .route("/", post(create_job))
        .route("/:id", get(get_job))
        .with_state(queue)
}

async fn create_job(State(queue): State<Queue>, Json(payload): Json<Value>) -> Response {
    match queue.enqueue(payload).await {
        Ok(id) => Json(json!({ "success": true, "jobId": id })).into_response(),
        Err(e) => {
            tracing::error!("Error adding {} job: {}", queue.category(), e);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn get_job(State(queue): State<Queue>, Path(raw_id): Path<String>) -> Response {
    let not_found = || {
        json_error(
            StatusCode::NOT_FOUND,
            format!("{} job not found", queue.category().label()),
        )
    };

    let Ok(id) = JobId::parse(&raw_id) else {
        return not_found();
    };

    match queue.get_job(id).await {
        Ok(Some(job)) => Json(JobView::from(job)).into_response(),
        Ok(None) => not_found(),
        Err(e) => {
            tracing::error!("Error fetching {} job {}: {}", queue.category(), id, e);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
