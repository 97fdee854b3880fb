//! In-process broker backend.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::time::Duration;

use chrono::Utc;
use queue_core::{Fields, JobCategory, JobId, JobOutcome, JobRecord, keys, merge_fields};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::{Broker, BrokerError, BrokerFuture};

#[derive(Debug)]
struct Entry {
    fields: Fields,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Default)]
struct Store {
    hashes: HashMap<String, Entry>,
    lists: HashMap<String, VecDeque<String>>,
    sets: HashMap<String, BTreeSet<String>>,
}

impl Store {
    /// Live entry at `key`, dropping it first if its TTL has passed.
    fn entry(&mut self, key: &str) -> Option<&mut Entry> {
        let now = Instant::now();
        if self.hashes.get(key).is_some_and(|e| e.is_expired(now)) {
            self.hashes.remove(key);
        }
        self.hashes.get_mut(key)
    }

    fn put(&mut self, key: &str, fields: Fields) {
        match self.entry(key) {
            Some(entry) => merge_fields(&mut entry.fields, fields),
            None => {
                self.hashes.insert(
                    key.to_string(),
                    Entry {
                        fields,
                        expires_at: None,
                    },
                );
            }
        }
    }

    fn record(&mut self, key: &str) -> Result<Option<JobRecord>, BrokerError> {
        match self.entry(key) {
            Some(entry) => Ok(Some(JobRecord::from_fields(&entry.fields)?)),
            None => Ok(None),
        }
    }
}

/// Broker that keeps everything in process memory.
///
/// Semantics match the Redis backend, including lazy TTL expiry. Time is
/// measured with `tokio::time`, so paused test clocks apply.
#[derive(Debug)]
pub struct MemoryBroker {
    prefix: String,
    store: Mutex<Store>,
}

impl MemoryBroker {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            store: Mutex::new(Store::default()),
        }
    }

    /// Number of ids waiting in the queue of `category`.
    pub async fn waiting_len(&self, category: JobCategory) -> usize {
        let key = keys::wait_key(&self.prefix, category);
        self.store
            .lock()
            .await
            .lists
            .get(&key)
            .map_or(0, VecDeque::len)
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new("jobq")
    }
}

impl Broker for MemoryBroker {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn hset<'a>(&'a self, key: &'a str, fields: Fields) -> BrokerFuture<'a, ()> {
        Box::pin(async move {
            if !fields.is_empty() {
                self.store.lock().await.put(key, fields);
            }
            Ok(())
        })
    }

    fn hgetall<'a>(&'a self, key: &'a str) -> BrokerFuture<'a, Option<Fields>> {
        Box::pin(async move {
            let mut store = self.store.lock().await;
            Ok(store.entry(key).map(|e| e.fields.clone()))
        })
    }

    fn expire<'a>(&'a self, key: &'a str, seconds: i64) -> BrokerFuture<'a, bool> {
        Box::pin(async move {
            let mut store = self.store.lock().await;
            if seconds <= 0 {
                return Ok(store.hashes.remove(key).is_some());
            }
            match store.entry(key) {
                Some(entry) => {
                    entry.expires_at = Some(Instant::now() + Duration::from_secs(seconds as u64));
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    fn ttl<'a>(&'a self, key: &'a str) -> BrokerFuture<'a, Option<i64>> {
        Box::pin(async move {
            let mut store = self.store.lock().await;
            let now = Instant::now();
            Ok(store
                .entry(key)
                .and_then(|e| e.expires_at)
                .map(|at| at.saturating_duration_since(now).as_secs_f64().ceil() as i64))
        })
    }

    fn push_job<'a>(&'a self, job: &'a JobRecord) -> BrokerFuture<'a, ()> {
        Box::pin(async move {
            let job_key = keys::job_key(&self.prefix, job.category, job.id);
            let wait_key = keys::wait_key(&self.prefix, job.category);

            let mut store = self.store.lock().await;
            store.put(&job_key, job.to_fields());
            store
                .lists
                .entry(wait_key)
                .or_default()
                .push_front(job.id.to_string());
            Ok(())
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
            let mut store = self.store.lock().await;

            loop {
                let Some(raw_id) = store.lists.get_mut(&wait_key).and_then(VecDeque::pop_back)
                else {
                    return Ok(None);
                };

                let Ok(id) = JobId::parse(&raw_id) else {
                    tracing::warn!("Dropping malformed job id '{}' from {}", raw_id, wait_key);
                    continue;
                };

                let job_key = keys::job_key(&self.prefix, category, id);
                let Some(mut job) = store.record(&job_key)? else {
                    tracing::warn!("Job {} vanished before it was claimed", id);
                    continue;
                };

                job.activate(worker_id, Utc::now())?;
                store.put(&job_key, job.to_fields());
                store.sets.entry(active_key).or_default().insert(raw_id);
                return Ok(Some(job));
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
            let mut store = self.store.lock().await;

            let mut job = store.record(&job_key)?.ok_or(BrokerError::JobNotFound(id))?;
            job.finish(outcome, Utc::now())?;
            store.put(&job_key, job.to_fields());
            if let Some(active) = store.sets.get_mut(&keys::active_key(&self.prefix, category)) {
                active.remove(&id.to_string());
            }
            Ok(job)
        })
    }

    fn active_jobs<'a>(&'a self, category: JobCategory) -> BrokerFuture<'a, Vec<JobRecord>> {
        Box::pin(async move {
            let active_key = keys::active_key(&self.prefix, category);
            let mut store = self.store.lock().await;

            let ids: Vec<String> = store
                .sets
                .get(&active_key)
                .map(|set| set.iter().cloned().collect())
                .unwrap_or_default();

            let mut jobs = Vec::with_capacity(ids.len());
            for raw_id in ids {
                let record = match JobId::parse(&raw_id) {
                    Ok(id) => store.record(&keys::job_key(&self.prefix, category, id))?,
                    Err(_) => None,
                };
                match record {
                    Some(job) => jobs.push(job),
                    None => {
                        if let Some(active) = store.sets.get_mut(&active_key) {
                            active.remove(&raw_id);
                        }
                    }
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
            self.store.lock().await.record(&job_key)
        })
    }
}
