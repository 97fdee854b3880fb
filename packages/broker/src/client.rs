//! The broker contract shared by all backends.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use queue_core::{Fields, JobCategory, JobId, JobOutcome, JobRecord};

use crate::BrokerError;

/// Future type returned by broker operations.
pub type BrokerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BrokerError>> + Send + 'a>>;

/// Broker handle shared by every queue, worker and side-channel writer.
pub type SharedBroker = Arc<dyn Broker>;

/// A durable key/value and list store.
///
/// Single key operations are atomic. `push_job`, `claim_next` and
/// `finish_job` are each applied as one indivisible step, so several
/// workers may share a queue without double-processing a record.
pub trait Broker: Send + Sync + 'static {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    /// Merge `fields` into the hash at `key`, creating it if needed.
    fn hset<'a>(&'a self, key: &'a str, fields: Fields) -> BrokerFuture<'a, ()>;

    /// Read the whole hash at `key`. `None` when the key does not exist.
    fn hgetall<'a>(&'a self, key: &'a str) -> BrokerFuture<'a, Option<Fields>>;

    /// Expire `key` after `seconds`. Returns false when the key is missing.
    fn expire<'a>(&'a self, key: &'a str, seconds: i64) -> BrokerFuture<'a, bool>;

    /// Remaining time to live of `key` in seconds, `None` when the key is
    /// missing or does not expire.
    fn ttl<'a>(&'a self, key: &'a str) -> BrokerFuture<'a, Option<i64>>;

    /// Store a waiting record and append its id to the queue's wait list.
    fn push_job<'a>(&'a self, job: &'a JobRecord) -> BrokerFuture<'a, ()>;

    /// Pop the oldest waiting job of `category` and mark it active for
    /// `worker_id`. `None` when the queue is empty.
    fn claim_next<'a>(
        &'a self,
        category: JobCategory,
        worker_id: &'a str,
    ) -> BrokerFuture<'a, Option<JobRecord>>;

    /// Move an active record to its terminal state and return the result.
    ///
    /// Fails with [`BrokerError::Record`] if the record is not active.
    fn finish_job<'a>(
        &'a self,
        category: JobCategory,
        id: JobId,
        outcome: JobOutcome,
    ) -> BrokerFuture<'a, JobRecord>;

    /// Records of `category` currently claimed by a worker, oldest first.
    fn active_jobs<'a>(&'a self, category: JobCategory) -> BrokerFuture<'a, Vec<JobRecord>>;

    /// Snapshot of a job record.
    fn get_job<'a>(
        &'a self,
        category: JobCategory,
        id: JobId,
    ) -> BrokerFuture<'a, Option<JobRecord>>;
}
