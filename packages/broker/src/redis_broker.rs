//! Redis broker backend.
//!
//! Layout per queue:
//!
//! - `{prefix}:{queue}:{id}` - hash holding the job record
//! - `{prefix}:{queue}:wait` - list of waiting ids (LPUSH on enqueue, RPOP on claim)
//! - `{prefix}:{queue}:active` - set of claimed ids (SADD on claim, SREM on finish)
//!
//! Claim and finish run as Lua scripts so that the state check and the
//! write happen in one step on the server.

use std::future::Future;

use chrono::Utc;
use queue_core::{Fields, JobCategory, JobId, JobOutcome, JobRecord, JobState, RecordError, field, keys};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError, RedisResult, Script};

use crate::{Broker, BrokerConfig, BrokerError, BrokerFuture, RetryPolicy};

/// Pops waiting ids until one with a stored record is found, marks it
/// active and returns the full hash.
///
/// KEYS[1] wait list, KEYS[2] active set, ARGV[1] job key prefix,
/// ARGV[2] worker id, ARGV[3] claim timestamp.
const CLAIM_SCRIPT: &str = r#"
while true do
  local id = redis.call('RPOP', KEYS[1])
  if not id then
    return false
  end
  local key = ARGV[1] .. id
  if redis.call('EXISTS', key) == 1 then
    redis.call('HSET', key, 'state', 'active', 'workerId', ARGV[2], 'processedOn', ARGV[3])
    redis.call('SADD', KEYS[2], id)
    return redis.call('HGETALL', key)
  end
end
"#;

/// Moves an active record to a terminal state.
///
/// KEYS[1] job key, KEYS[2] active set, ARGV[1] terminal state,
/// ARGV[2] outcome field, ARGV[3] outcome value, ARGV[4] finish timestamp,
/// ARGV[5] job id.
/// Returns "ok", "missing", or the state that blocked the transition.
const FINISH_SCRIPT: &str = r#"
local state = redis.call('HGET', KEYS[1], 'state')
if not state then
  return 'missing'
end
if state ~= 'active' then
  return state
end
redis.call('HSET', KEYS[1], 'state', ARGV[1], ARGV[2], ARGV[3], 'finishedOn', ARGV[4])
redis.call('SREM', KEYS[2], ARGV[5])
return 'ok'
"#;

/// Broker backed by a Redis server.
///
/// Commands go through a [`ConnectionManager`], which re-establishes the
/// connection after it drops. On top of that, every command that fails
/// with a transport error is retried after [`RetryPolicy::delay`] and never
/// abandoned; the attempt counter starts over on the next command.
pub struct RedisBroker {
    conn: ConnectionManager,
    prefix: String,
    retry: RetryPolicy,
    claim: Script,
    finish: Script,
}

fn is_transient(err: &RedisError) -> bool {
    err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() || err.is_timeout()
}

impl RedisBroker {
    /// Connect, retrying with backoff until the server answers.
    pub async fn connect(config: BrokerConfig) -> Result<Self, BrokerError> {
        tracing::info!("Connecting to Redis at {}", config.endpoint);

        let client = redis::Client::open(config.endpoint.as_str())?;

        let mut attempt = 0u32;
        let conn = loop {
            match ConnectionManager::new(client.clone()).await {
                Ok(conn) => break conn,
                Err(e) if is_transient(&e) => {
                    attempt = attempt.saturating_add(1);
                    let delay = config.retry.delay(attempt);
                    tracing::warn!(
                        "Redis unreachable (attempt {}), retrying in {:?}: {}",
                        attempt,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        };

        tracing::info!("Connected to Redis at {}", config.endpoint);

        Ok(Self {
            conn,
            prefix: config.prefix,
            retry: config.retry,
            claim: Script::new(CLAIM_SCRIPT),
            finish: Script::new(FINISH_SCRIPT),
        })
    }

    /// Run `op` on a fresh handle, retrying transport failures forever.
    async fn with_retry<T, F, Fut>(&self, name: &'static str, mut op: F) -> Result<T, BrokerError>
    where
        F: FnMut(ConnectionManager) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match op(self.conn.clone()).await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::info!("Redis {} recovered after {} retries", name, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if is_transient(&e) => {
                    attempt = attempt.saturating_add(1);
                    let delay = self.retry.delay(attempt);
                    tracing::warn!(
                        "Redis {} failed (attempt {}), retrying in {:?}: {}",
                        name,
                        attempt,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn record_prefix(&self, category: JobCategory) -> String {
        format!("{}:{}:", self.prefix, category.queue_name())
    }
}

fn pairs(fields: &Fields) -> Vec<(&str, &str)> {
    fields.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
}

impl Broker for RedisBroker {
    fn backend(&self) -> &'static str {
        "redis"
    }

    fn hset<'a>(&'a self, key: &'a str, fields: Fields) -> BrokerFuture<'a, ()> {
        Box::pin(async move {
            if fields.is_empty() {
                return Ok(());
            }
            let items = pairs(&fields);
            self.with_retry("HSET", |mut conn| {
                let items = &items;
                async move { conn.hset_multiple::<_, _, _, ()>(key, items.as_slice()).await }
            })
            .await
        })
    }

    fn hgetall<'a>(&'a self, key: &'a str) -> BrokerFuture<'a, Option<Fields>> {
        Box::pin(async move {
            let fields: Fields = self
                .with_retry("HGETALL", |mut conn| async move { conn.hgetall(key).await })
                .await?;
            Ok((!fields.is_empty()).then_some(fields))
        })
    }

    fn expire<'a>(&'a self, key: &'a str, seconds: i64) -> BrokerFuture<'a, bool> {
        Box::pin(async move {
            let applied: i64 = self
                .with_retry("EXPIRE", |mut conn| async move {
                    redis::cmd("EXPIRE")
                        .arg(key)
                        .arg(seconds)
                        .query_async(&mut conn)
                        .await
                })
                .await?;
            Ok(applied == 1)
        })
    }

    fn ttl<'a>(&'a self, key: &'a str) -> BrokerFuture<'a, Option<i64>> {
        Box::pin(async move {
            let ttl: i64 = self
                .with_retry("TTL", |mut conn| async move {
                    redis::cmd("TTL").arg(key).query_async(&mut conn).await
                })
                .await?;
            // -2: missing key, -1: no expiry
            Ok((ttl >= 0).then_some(ttl))
        })
    }

    fn push_job<'a>(&'a self, job: &'a JobRecord) -> BrokerFuture<'a, ()> {
        Box::pin(async move {
            let job_key = keys::job_key(&self.prefix, job.category, job.id);
            let wait_key = keys::wait_key(&self.prefix, job.category);
            let fields = job.to_fields();
            let items = pairs(&fields);
            let id = job.id.to_string();

            self.with_retry("enqueue", |mut conn| {
                let mut pipe = redis::pipe();
                pipe.atomic()
                    .hset_multiple(&job_key, items.as_slice())
                    .ignore()
                    .lpush(&wait_key, &id)
                    .ignore();
                async move { pipe.query_async::<_, ()>(&mut conn).await }
            })
            .await
        })
    }

    fn claim_next<'a>(
        &'a self,
        category: JobCategory,
        worker_id: &'a str,
    ) -> BrokerFuture<'a, Option<JobRecord>> {
        Box::pin(async move {
            let wait_key = keys::wait_key(&self.prefix, category);
            let active_key = keys::active_key(&self.prefix, category);
            let record_prefix = self.record_prefix(category);
            let now = Utc::now().to_rfc3339();

            let fields: Option<Fields> = self
                .with_retry("claim", |mut conn| {
                    let mut invocation = self.claim.key(&wait_key);
                    invocation
                        .key(&active_key)
                        .arg(&record_prefix)
                        .arg(worker_id)
                        .arg(&now);
                    async move { invocation.invoke_async(&mut conn).await }
                })
                .await?;

            match fields {
                Some(fields) => Ok(Some(JobRecord::from_fields(&fields)?)),
                None => Ok(None),
            }
        })
    }

    fn finish_job<'a>(
        &'a self,
        category: JobCategory,
        id: JobId,
        outcome: JobOutcome,
    ) -> BrokerFuture<'a, JobRecord> {
        Box::pin(async move {
            let job_key = keys::job_key(&self.prefix, category, id);
            let active_key = keys::active_key(&self.prefix, category);
            let raw_id = id.to_string();
            let target = outcome.state();
            let (outcome_field, outcome_value) = match &outcome {
                JobOutcome::Completed(value) => (field::RESULT, value.to_string()),
                JobOutcome::Failed(reason) => (field::FAILED_REASON, reason.clone()),
            };
            let now = Utc::now().to_rfc3339();

            let status: String = self
                .with_retry("finish", |mut conn| {
                    let mut invocation = self.finish.key(&job_key);
                    invocation
                        .key(&active_key)
                        .arg(target.as_str())
                        .arg(outcome_field)
                        .arg(&outcome_value)
                        .arg(&now)
                        .arg(&raw_id);
                    async move { invocation.invoke_async(&mut conn).await }
                })
                .await?;

            match status.as_str() {
                "ok" => {}
                "missing" => return Err(BrokerError::JobNotFound(id)),
                blocked => {
                    let from = blocked.parse::<JobState>()?;
                    return Err(RecordError::InvalidTransition {
                        id,
                        from,
                        to: target,
                    }
                    .into());
                }
            }

            self.get_job(category, id)
                .await?
                .ok_or(BrokerError::JobNotFound(id))
        })
    }

    fn active_jobs<'a>(&'a self, category: JobCategory) -> BrokerFuture<'a, Vec<JobRecord>> {
        Box::pin(async move {
            let active_key = keys::active_key(&self.prefix, category);
            let members: Vec<String> = self
                .with_retry("SMEMBERS", |mut conn| {
                    let active_key = &active_key;
                    async move { conn.smembers(active_key).await }
                })
                .await?;

            let mut ids: Vec<JobId> = members
                .iter()
                .filter_map(|raw| JobId::parse(raw).ok())
                .collect();
            ids.sort();

            let mut jobs = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(job) = self.get_job(category, id).await? {
                    jobs.push(job);
                }
            }
            Ok(jobs)
        })
    }

    fn get_job<'a>(
        &'a self,
        category: JobCategory,
        id: JobId,
    ) -> BrokerFuture<'a, Option<JobRecord>> {
        Box::pin(async move {
            let job_key = keys::job_key(&self.prefix, category, id);
            match self.hgetall(&job_key).await? {
                Some(fields) => Ok(Some(JobRecord::from_fields(&fields)?)),
                None => Ok(None),
            }
        })
    }
}
