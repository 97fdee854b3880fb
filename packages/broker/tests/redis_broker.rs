//! Integration tests for the Redis backend.
//!
//! These tests talk to a real Redis server.
//! Run with: REDIS_URL=redis://127.0.0.1:6379 cargo test -p broker --test redis_broker -- --ignored

#![allow(clippy::disallowed_methods)]

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use broker::{Broker, BrokerConfig, BrokerError, RedisBroker};
use queue_core::{Fields, JobCategory, JobId, JobOutcome, JobRecord, JobState, RecordError};
use serde_json::json;

fn redis_url() -> String {
    std::env::var("REDIS_URL")
        .expect("REDIS_URL environment variable must be set for integration tests")
}

/// Connect with a fresh key prefix so runs never see each other's queues.
async fn connect() -> RedisBroker {
    let config = BrokerConfig {
        endpoint: redis_url(),
        ..BrokerConfig::memory()
    }
    .with_prefix(format!("jobq-test-{}", JobId::new()));

    RedisBroker::connect(config)
        .await
        .expect("Redis should accept connections")
}

fn fields(pairs: &[(&str, &str)]) -> Fields {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test]
#[ignore] // Run with: cargo test -p broker --test redis_broker -- --ignored
async fn test_hash_merge_and_expire() -> Result<(), Box<dyn Error>> {
    let broker = connect().await;
    let key = format!("job:{}:tracking", JobId::new());

    assert!(broker.hgetall(&key).await?.is_none());
    assert!(!broker.expire(&key, 60).await?);

    broker
        .hset(&key, fields(&[("status", "failed"), ("error", "boom")]))
        .await?;
    broker.hset(&key, fields(&[("error", "bang")])).await?;

    let stored = broker.hgetall(&key).await?.expect("hash exists");
    assert_eq!(stored["status"], "failed");
    assert_eq!(stored["error"], "bang");
    assert_eq!(broker.ttl(&key).await?, None);

    assert!(broker.expire(&key, 60).await?);
    let ttl = broker.ttl(&key).await?.expect("expiry set");
    assert!(ttl > 0 && ttl <= 60, "unexpected ttl {}", ttl);

    assert!(broker.expire(&key, 1).await?);
    tokio::time::sleep(Duration::from_millis(2100)).await;
    assert!(broker.hgetall(&key).await?.is_none());
    assert_eq!(broker.ttl(&key).await?, None);
    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_claim_is_fifo_per_queue() -> Result<(), Box<dyn Error>> {
    let broker = connect().await;

    let first = JobRecord::new(JobCategory::User, json!({"n": 1}));
    let second = JobRecord::new(JobCategory::User, json!({"n": 2}));
    let admin = JobRecord::new(JobCategory::Admin, json!({"action": "grant"}));
    broker.push_job(&first).await?;
    broker.push_job(&admin).await?;
    broker.push_job(&second).await?;

    let stored = broker
        .get_job(JobCategory::User, first.id)
        .await?
        .expect("stored on push");
    assert_eq!(stored.state, JobState::Waiting);
    assert_eq!(stored.payload, json!({"n": 1}));

    let claimed = broker
        .claim_next(JobCategory::User, "worker-user-1")
        .await?
        .expect("first job");
    assert_eq!(claimed.id, first.id);
    assert_eq!(claimed.state, JobState::Active);
    assert_eq!(claimed.worker_id.as_deref(), Some("worker-user-1"));
    assert!(claimed.processed_on.is_some());

    let active = broker.active_jobs(JobCategory::User).await?;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, first.id);

    let claimed = broker
        .claim_next(JobCategory::User, "worker-user-1")
        .await?
        .expect("second job");
    assert_eq!(claimed.id, second.id);

    assert!(broker.claim_next(JobCategory::User, "worker-user-1").await?.is_none());

    let claimed = broker
        .claim_next(JobCategory::Admin, "worker-admin-1")
        .await?
        .expect("admin job");
    assert_eq!(claimed.id, admin.id);
    assert_eq!(claimed.payload["action"], "grant");
    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_concurrent_claims_never_share_a_job() -> Result<(), Box<dyn Error>> {
    let broker = Arc::new(connect().await);
    let mut ids = Vec::new();
    for n in 0..20 {
        let job = JobRecord::new(JobCategory::User, json!({ "n": n }));
        ids.push(job.id);
        broker.push_job(&job).await?;
    }

    let mut tasks = Vec::new();
    for w in 0..4 {
        let broker = broker.clone();
        tasks.push(tokio::spawn(async move {
            let worker = format!("worker-{}", w);
            let mut mine = Vec::new();
            while let Some(job) = broker.claim_next(JobCategory::User, &worker).await.unwrap() {
                mine.push(job.id);
            }
            mine
        }));
    }

    let mut claimed: Vec<JobId> = Vec::new();
    for task in tasks {
        claimed.extend(task.await?);
    }
    claimed.sort();
    ids.sort();
    assert_eq!(claimed, ids);
    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_finish_only_from_active() -> Result<(), Box<dyn Error>> {
    let broker = connect().await;
    let job = JobRecord::new(JobCategory::Admin, json!({"action": "grant"}));
    broker.push_job(&job).await?;

    let early = broker
        .finish_job(JobCategory::Admin, job.id, JobOutcome::Completed(json!(1)))
        .await;
    assert!(matches!(
        early,
        Err(BrokerError::Record(RecordError::InvalidTransition {
            from: JobState::Waiting,
            ..
        }))
    ));

    broker.claim_next(JobCategory::Admin, "worker-admin-1").await?;
    let done = broker
        .finish_job(
            JobCategory::Admin,
            job.id,
            JobOutcome::Completed(json!({"processed": true})),
        )
        .await?;
    assert_eq!(done.state, JobState::Completed);
    assert_eq!(done.result, Some(json!({"processed": true})));
    assert!(done.finished_on.is_some());
    assert!(broker.active_jobs(JobCategory::Admin).await?.is_empty());

    let again = broker
        .finish_job(JobCategory::Admin, job.id, JobOutcome::Failed("late".into()))
        .await;
    assert!(matches!(
        again,
        Err(BrokerError::Record(RecordError::InvalidTransition {
            from: JobState::Completed,
            ..
        }))
    ));

    let snapshot = broker.get_job(JobCategory::Admin, job.id).await?.expect("stored");
    assert_eq!(snapshot.state, JobState::Completed);
    assert!(snapshot.failed_reason.is_none());
    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_unknown_job_lookups() -> Result<(), Box<dyn Error>> {
    let broker = connect().await;
    let job = JobRecord::new(JobCategory::User, json!({}));
    broker.push_job(&job).await?;

    assert!(broker.get_job(JobCategory::User, JobId::new()).await?.is_none());
    // Ids are scoped to their queue
    assert!(broker.get_job(JobCategory::Admin, job.id).await?.is_none());

    let missing = JobId::new();
    let err = broker
        .finish_job(JobCategory::User, missing, JobOutcome::Failed("x".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::JobNotFound(id) if id == missing));

    assert!(broker.claim_next(JobCategory::Admin, "worker-admin-1").await?.is_none());
    Ok(())
}
