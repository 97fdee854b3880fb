#![allow(clippy::disallowed_methods)]

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use actors::Queue;
use api::{AppConfig, BANNER, JobSystem, init_job_queue, jobs, router};
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use broker::{Broker, BrokerError, BrokerFuture, MemoryBroker};
use queue_core::{Fields, JobCategory, JobId, JobOutcome, JobRecord};
use serde_json::{Value, json};
use tower::ServiceExt;

async fn start() -> Result<(JobSystem, Router), Box<dyn Error>> {
    let system = init_job_queue(&AppConfig::memory()).await?;
    let app = router(&system);
    Ok((system, app))
}

async fn send(app: &Router, request: Request<Body>) -> Result<(StatusCode, Vec<u8>), Box<dyn Error>> {
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok((status, body.to_vec()))
}

async fn post_json(app: &Router, uri: &str, body: Value) -> Result<(StatusCode, Value), Box<dyn Error>> {
    let request = Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))?;
    let (status, bytes) = send(app, request).await?;
    Ok((status, serde_json::from_slice(&bytes)?))
}

async fn get_json(app: &Router, uri: &str) -> Result<(StatusCode, Value), Box<dyn Error>> {
    let (status, bytes) = send(app, Request::get(uri).body(Body::empty())?).await?;
    Ok((status, serde_json::from_slice(&bytes)?))
}

/// Poll a job route until the job leaves the waiting/active states.
async fn wait_finished(app: &Router, uri: &str) -> Result<Value, Box<dyn Error>> {
    for _ in 0..500 {
        let (status, body) = get_json(app, uri).await?;
        assert_eq!(status, StatusCode::OK);
        if body["state"] == "completed" || body["state"] == "failed" {
            return Ok(body);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Err(format!("{} did not finish", uri).into())
}

#[tokio::test]
async fn test_banner() -> Result<(), Box<dyn Error>> {
    let (system, app) = start().await?;

    let (status, body) = send(&app, Request::get("/").body(Body::empty())?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8(body)?, BANNER);

    system.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_admin_job_lifecycle() -> Result<(), Box<dyn Error>> {
    let (system, app) = start().await?;

    let (status, body) = post_json(&app, "/admin/jobs", json!({"action": "grant"})).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let id = body["jobId"].as_str().expect("job id").to_string();

    let uri = format!("/admin/jobs/{}", id);
    let (status, snapshot) = get_json(&app, &uri).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["id"], id.as_str());
    assert_eq!(snapshot["data"]["action"], "grant");
    assert!(snapshot["state"] == "waiting" || snapshot["state"] == "active");

    let done = wait_finished(&app, &uri).await?;
    assert_eq!(done["state"], "completed");
    assert_eq!(done["result"]["processed"], true);
    assert_eq!(done["result"]["type"], "admin");
    assert_eq!(done["result"]["jobId"], id.as_str());
    assert!(done.get("failedReason").is_none());

    system.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_user_job_completes() -> Result<(), Box<dyn Error>> {
    let (system, app) = start().await?;

    let (status, body) = post_json(&app, "/user/jobs", json!({"email": "a@b.c"})).await?;
    assert_eq!(status, StatusCode::OK);
    let id = body["jobId"].as_str().expect("job id").to_string();

    let done = wait_finished(&app, &format!("/user/jobs/{}", id)).await?;
    assert_eq!(done["state"], "completed");
    assert_eq!(done["data"]["email"], "a@b.c");
    assert_eq!(done["result"]["type"], "user");

    // A user id is unknown to the admin queue
    let (status, body) = get_json(&app, &format!("/admin/jobs/{}", id)).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Admin job not found");

    system.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_unknown_and_malformed_ids() -> Result<(), Box<dyn Error>> {
    let (system, app) = start().await?;

    let (status, body) = get_json(&app, &format!("/user/jobs/{}", api::JobId::new())).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "User job not found");

    let (status, body) = get_json(&app, "/admin/jobs/not-a-job").await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Admin job not found");

    system.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_rejects_non_json_body() -> Result<(), Box<dyn Error>> {
    let (system, app) = start().await?;

    let request = Request::post("/user/jobs")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))?;
    let (status, _) = send(&app, request).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    system.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_failed_job_reports_reason() -> Result<(), Box<dyn Error>> {
    let broker = Arc::new(MemoryBroker::default());
    let app = Router::new().nest(
        "/user/jobs",
        jobs::routes(Queue::new(JobCategory::User, broker.clone())),
    );

    let (status, body) = post_json(&app, "/user/jobs", json!({"n": 1})).await?;
    assert_eq!(status, StatusCode::OK);
    let id = JobId::parse(body["jobId"].as_str().expect("job id"))?;

    broker
        .claim_next(JobCategory::User, "worker-user-1")
        .await?
        .expect("claimed");
    broker
        .finish_job(JobCategory::User, id, JobOutcome::Failed("boom".into()))
        .await?;

    let (status, snapshot) = get_json(&app, &format!("/user/jobs/{}", id)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["id"], id.to_string());
    assert_eq!(snapshot["state"], "failed");
    assert_eq!(snapshot["failedReason"], "boom");
    assert_eq!(snapshot["result"], Value::Null);
    assert_eq!(snapshot["data"]["n"], 1);
    Ok(())
}

/// Memory broker that refuses to store new jobs.
struct RejectingBroker(MemoryBroker);

impl Broker for RejectingBroker {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn hset<'a>(&'a self, key: &'a str, fields: Fields) -> BrokerFuture<'a, ()> {
        self.0.hset(key, fields)
    }

    fn hgetall<'a>(&'a self, key: &'a str) -> BrokerFuture<'a, Option<Fields>> {
        self.0.hgetall(key)
    }

    fn expire<'a>(&'a self, key: &'a str, seconds: i64) -> BrokerFuture<'a, bool> {
        self.0.expire(key, seconds)
    }

    fn ttl<'a>(&'a self, key: &'a str) -> BrokerFuture<'a, Option<i64>> {
        self.0.ttl(key)
    }

    fn push_job<'a>(&'a self, _job: &'a JobRecord) -> BrokerFuture<'a, ()> {
        let result: Result<(), BrokerError> =
            Err(BrokerError::InvalidEndpoint("writes disabled".into()));
        Box::pin(async move { result })
    }

    fn claim_next<'a>(
        &'a self,
        category: JobCategory,
        worker_id: &'a str,
    ) -> BrokerFuture<'a, Option<JobRecord>> {
        self.0.claim_next(category, worker_id)
    }

    fn finish_job<'a>(
        &'a self,
        category: JobCategory,
        id: JobId,
        outcome: JobOutcome,
    ) -> BrokerFuture<'a, JobRecord> {
        self.0.finish_job(category, id, outcome)
    }

    fn active_jobs<'a>(&'a self, category: JobCategory) -> BrokerFuture<'a, Vec<JobRecord>> {
        self.0.active_jobs(category)
    }

    fn get_job<'a>(
        &'a self,
        category: JobCategory,
        id: JobId,
    ) -> BrokerFuture<'a, Option<JobRecord>> {
        self.0.get_job(category, id)
    }
}

#[tokio::test]
async fn test_enqueue_failure_is_server_error() -> Result<(), Box<dyn Error>> {
    let broker = Arc::new(RejectingBroker(MemoryBroker::default()));
    let app = Router::new().nest(
        "/admin/jobs",
        jobs::routes(Queue::new(JobCategory::Admin, broker)),
    );

    let (status, body) = post_json(&app, "/admin/jobs", json!({"action": "grant"})).await?;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let error = body["error"].as_str().expect("error message");
    assert!(error.starts_with("Failed to enqueue job on admin-queue"), "{}", error);
    assert!(body.get("jobId").is_none());
    Ok(())
}
