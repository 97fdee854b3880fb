use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use actors::{
    ActorRef, JobHandlerRegistry, Queue, SupervisorArgs, SupervisorMessage, WorkerConfig,
    WorkerStatus, start_supervisor,
};
use broker::{Broker, BrokerError, BrokerFuture, MemoryBroker, SharedBroker};
use queue_core::{
    Fields, JobCategory, JobEvent, JobId, JobOutcome, JobRecord, RecordError, keys,
};
use tokio::sync::broadcast;

/// A running supervisor with producer handles for both queues.
pub struct Harness {
    pub broker: SharedBroker,
    pub admin: Queue,
    pub user: Queue,
    pub events: broadcast::Sender<JobEvent>,
    pub supervisor: ActorRef<SupervisorMessage>,
    pub handle: tokio::task::JoinHandle<()>,
}

impl Harness {
    pub async fn start(
        broker: SharedBroker,
        handlers: JobHandlerRegistry,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let (events, _) = broadcast::channel(1024);
        let admin = Queue::new(JobCategory::Admin, broker.clone()).with_events(events.clone());
        let user = Queue::new(JobCategory::User, broker.clone()).with_events(events.clone());

        let (supervisor, handle) = start_supervisor(SupervisorArgs {
            broker: broker.clone(),
            handlers,
            config: WorkerConfig::fast(),
            events: events.clone(),
        })
        .await?;

        Ok(Self {
            broker,
            admin,
            user,
            events,
            supervisor,
            handle,
        })
    }

    pub async fn stop(self) {
        let _ = self.supervisor.send_message(SupervisorMessage::Shutdown);
        let _ = self.handle.await;
    }
}

/// Status of every live worker, sorted by worker id.
pub async fn list_workers(supervisor: &ActorRef<SupervisorMessage>) -> Vec<WorkerStatus> {
    match ractor::rpc::call(
        supervisor,
        |reply| SupervisorMessage::ListWorkers { reply },
        Some(Duration::from_secs(5)),
    )
    .await
    .expect("supervisor reachable")
    {
        ractor::rpc::CallResult::Success(workers) => workers,
        other => panic!("ListWorkers failed: {:?}", other),
    }
}

pub fn memory_broker() -> SharedBroker {
    Arc::new(MemoryBroker::default())
}

/// Poll `queue` until job `id` reaches a terminal state.
pub async fn wait_terminal(queue: &Queue, id: JobId) -> JobRecord {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Some(job) = queue.get_job(id).await.unwrap()
                && job.state.is_terminal()
            {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("job did not finish in time")
}

/// Broker that refuses writes to dashboard records.
pub struct ReadOnlyDashboard {
    inner: MemoryBroker,
}

impl ReadOnlyDashboard {
    pub fn new() -> Self {
        Self {
            inner: MemoryBroker::default(),
        }
    }
}

/// Broker whose first claim on the user queue fails with a decode error.
pub struct CorruptFirstClaim {
    inner: MemoryBroker,
    tripped: AtomicBool,
}

impl CorruptFirstClaim {
    pub fn new() -> Self {
        Self {
            inner: MemoryBroker::default(),
            tripped: AtomicBool::new(false),
        }
    }
}

/// Broker whose first finish on the user queue fails with a decode error.
pub struct RejectFirstFinish {
    inner: MemoryBroker,
    tripped: AtomicBool,
}

impl RejectFirstFinish {
    pub fn new() -> Self {
        Self {
            inner: MemoryBroker::default(),
            tripped: AtomicBool::new(false),
        }
    }
}

macro_rules! delegate_broker {
    ($ty:ty, $hset:expr, $claim:expr, $finish:expr) => {
        impl Broker for $ty {
            fn backend(&self) -> &'static str {
                "memory"
            }

            fn hset<'a>(&'a self, key: &'a str, fields: Fields) -> BrokerFuture<'a, ()> {
                let guard: fn(&Self, &str) -> Option<BrokerError> = $hset;
                if let Some(err) = guard(self, key) {
                    let result: Result<(), BrokerError> = Err(err);
                    return Box::pin(async move { result });
                }
                self.inner.hset(key, fields)
            }

            fn hgetall<'a>(&'a self, key: &'a str) -> BrokerFuture<'a, Option<Fields>> {
                self.inner.hgetall(key)
            }

            fn expire<'a>(&'a self, key: &'a str, seconds: i64) -> BrokerFuture<'a, bool> {
                self.inner.expire(key, seconds)
            }

            fn ttl<'a>(&'a self, key: &'a str) -> BrokerFuture<'a, Option<i64>> {
                self.inner.ttl(key)
            }

            fn push_job<'a>(&'a self, job: &'a JobRecord) -> BrokerFuture<'a, ()> {
                self.inner.push_job(job)
            }

            fn claim_next<'a>(
                &'a self,
                category: JobCategory,
                worker_id: &'a str,
            ) -> BrokerFuture<'a, Option<JobRecord>> {
                let guard: fn(&Self, JobCategory) -> Option<BrokerError> = $claim;
                if let Some(err) = guard(self, category) {
                    let result: Result<Option<JobRecord>, BrokerError> = Err(err);
                    return Box::pin(async move { result });
                }
                self.inner.claim_next(category, worker_id)
            }

            fn finish_job<'a>(
                &'a self,
                category: JobCategory,
                id: JobId,
                outcome: JobOutcome,
            ) -> BrokerFuture<'a, JobRecord> {
                let guard: fn(&Self, JobCategory) -> Option<BrokerError> = $finish;
                if let Some(err) = guard(self, category) {
                    let result: Result<JobRecord, BrokerError> = Err(err);
                    return Box::pin(async move { result });
                }
                self.inner.finish_job(category, id, outcome)
            }

            fn active_jobs<'a>(
                &'a self,
                category: JobCategory,
            ) -> BrokerFuture<'a, Vec<JobRecord>> {
                self.inner.active_jobs(category)
            }

            fn get_job<'a>(
                &'a self,
                category: JobCategory,
                id: JobId,
            ) -> BrokerFuture<'a, Option<JobRecord>> {
                self.inner.get_job(category, id)
            }
        }
    };
}

delegate_broker!(
    ReadOnlyDashboard,
    |_, key| {
        key.starts_with("dashboard:")
            .then(|| BrokerError::InvalidEndpoint("dashboard store is read-only".into()))
    },
    |_, _| None,
    |_, _| None
);

delegate_broker!(
    CorruptFirstClaim,
    |_, _| None,
    |broker, category| {
        (category == JobCategory::User && !broker.tripped.swap(true, Ordering::SeqCst))
            .then(|| RecordError::MissingField("state").into())
    },
    |_, _| None
);

delegate_broker!(
    RejectFirstFinish,
    |_, _| None,
    |_, _| None,
    |broker, category| {
        (category == JobCategory::User && !broker.tripped.swap(true, Ordering::SeqCst))
            .then(|| RecordError::MissingField("state").into())
    }
);

/// Seconds left on the tracking record of `id`.
pub async fn tracking_ttl(broker: &SharedBroker, id: JobId) -> Option<i64> {
    broker.ttl(&keys::tracking_key(id)).await.unwrap()
}
