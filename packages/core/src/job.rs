//! Job domain types for work items in the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use ulid::Ulid;

use crate::{Fields, JobCategory};

/// Unique identifier for a job, using ULID for chronological sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Create a new unique job ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a job ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a job.
///
/// Transitions are monotonic: `waiting -> active -> {completed | failed}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Stored and waiting for a worker.
    #[default]
    Waiting,
    /// Claimed by a worker and currently executing.
    Active,
    /// Handler returned normally.
    Completed,
    /// Handler raised an error.
    Failed,
}

impl JobState {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// Whether `next` is a legal successor of this state.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Waiting, JobState::Active)
                | (JobState::Active, JobState::Completed)
                | (JobState::Active, JobState::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobState {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(JobState::Waiting),
            "active" => Ok(JobState::Active),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            other => Err(RecordError::InvalidField {
                field: "state",
                value: other.to_string(),
            }),
        }
    }
}

/// Terminal outcome reported by a worker.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed(Value),
    Failed(String),
}

impl JobOutcome {
    /// The state a record lands in once this outcome is applied.
    pub fn state(&self) -> JobState {
        match self {
            JobOutcome::Completed(_) => JobState::Completed,
            JobOutcome::Failed(_) => JobState::Failed,
        }
    }
}

/// Errors raised while mutating or decoding a job record.
#[derive(Debug, Error, PartialEq)]
pub enum RecordError {
    #[error("invalid state transition for job {id}: {from} -> {to}")]
    InvalidTransition {
        id: JobId,
        from: JobState,
        to: JobState,
    },
    #[error("job record is missing field '{0}'")]
    MissingField(&'static str),
    #[error("job record field '{field}' has invalid value '{value}'")]
    InvalidField { field: &'static str, value: String },
}

/// Hash field names used when a record is stored in the broker.
pub mod field {
    pub const ID: &str = "id";
    pub const CATEGORY: &str = "category";
    pub const DATA: &str = "data";
    pub const STATE: &str = "state";
    pub const RESULT: &str = "returnvalue";
    pub const FAILED_REASON: &str = "failedReason";
    pub const WORKER_ID: &str = "workerId";
    pub const CREATED_AT: &str = "createdAt";
    pub const PROCESSED_ON: &str = "processedOn";
    pub const FINISHED_ON: &str = "finishedOn";
}

/// A job record: the persisted unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    /// Unique identifier assigned at enqueue time.
    pub id: JobId,
    /// Category, which also names the owning queue.
    pub category: JobCategory,
    /// Caller supplied payload.
    pub payload: Value,
    /// Current lifecycle state.
    pub state: JobState,
    /// Handler return value, present only once completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Handler error message, present only once failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<String>,
    /// Worker holding the claim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_on: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_on: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Create a new waiting job.
    pub fn new(category: JobCategory, payload: Value) -> Self {
        Self {
            id: JobId::new(),
            category,
            payload,
            state: JobState::Waiting,
            result: None,
            failed_reason: None,
            worker_id: None,
            created_at: Utc::now(),
            processed_on: None,
            finished_on: None,
        }
    }

    fn transition(&mut self, to: JobState) -> Result<(), RecordError> {
        if !self.state.can_transition_to(to) {
            return Err(RecordError::InvalidTransition {
                id: self.id,
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    /// Mark the job as claimed by `worker_id`.
    pub fn activate(
        &mut self,
        worker_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), RecordError> {
        self.transition(JobState::Active)?;
        self.worker_id = Some(worker_id.into());
        self.processed_on = Some(now);
        Ok(())
    }

    /// Apply a terminal outcome. Only legal from `active`.
    pub fn finish(&mut self, outcome: JobOutcome, now: DateTime<Utc>) -> Result<(), RecordError> {
        self.transition(outcome.state())?;
        match outcome {
            JobOutcome::Completed(value) => self.result = Some(value),
            JobOutcome::Failed(reason) => self.failed_reason = Some(reason),
        }
        self.finished_on = Some(now);
        Ok(())
    }

    /// Milliseconds between claim and finish, if both are known.
    pub fn duration_ms(&self) -> Option<u64> {
        let started = self.processed_on?;
        let finished = self.finished_on?;
        Some((finished - started).num_milliseconds().max(0) as u64)
    }

    /// Encode the record as broker hash fields.
    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert(field::ID.into(), self.id.to_string());
        fields.insert(field::CATEGORY.into(), self.category.as_str().into());
        fields.insert(field::DATA.into(), self.payload.to_string());
        fields.insert(field::STATE.into(), self.state.as_str().into());
        fields.insert(field::CREATED_AT.into(), self.created_at.to_rfc3339());
        if let Some(result) = &self.result {
            fields.insert(field::RESULT.into(), result.to_string());
        }
        if let Some(reason) = &self.failed_reason {
            fields.insert(field::FAILED_REASON.into(), reason.clone());
        }
        if let Some(worker_id) = &self.worker_id {
            fields.insert(field::WORKER_ID.into(), worker_id.clone());
        }
        if let Some(at) = self.processed_on {
            fields.insert(field::PROCESSED_ON.into(), at.to_rfc3339());
        }
        if let Some(at) = self.finished_on {
            fields.insert(field::FINISHED_ON.into(), at.to_rfc3339());
        }
        fields
    }

    /// Decode a record from broker hash fields.
    pub fn from_fields(fields: &Fields) -> Result<Self, RecordError> {
        let required = |name: &'static str| {
            fields
                .get(name)
                .map(String::as_str)
                .ok_or(RecordError::MissingField(name))
        };

        let id = required(field::ID)?;
        let id = JobId::parse(id).map_err(|_| RecordError::InvalidField {
            field: field::ID,
            value: id.to_string(),
        })?;
        let category = required(field::CATEGORY)?
            .parse::<JobCategory>()
            .map_err(|e| RecordError::InvalidField {
                field: field::CATEGORY,
                value: e.0,
            })?;
        let payload = parse_json(field::DATA, required(field::DATA)?)?;
        let state = required(field::STATE)?.parse::<JobState>()?;
        let created_at = parse_time(field::CREATED_AT, required(field::CREATED_AT)?)?;

        let result = fields
            .get(field::RESULT)
            .map(|raw| parse_json(field::RESULT, raw))
            .transpose()?;
        let processed_on = fields
            .get(field::PROCESSED_ON)
            .map(|raw| parse_time(field::PROCESSED_ON, raw))
            .transpose()?;
        let finished_on = fields
            .get(field::FINISHED_ON)
            .map(|raw| parse_time(field::FINISHED_ON, raw))
            .transpose()?;

        Ok(Self {
            id,
            category,
            payload,
            state,
            result,
            failed_reason: fields.get(field::FAILED_REASON).cloned(),
            worker_id: fields.get(field::WORKER_ID).cloned(),
            created_at,
            processed_on,
            finished_on,
        })
    }
}

fn parse_json(name: &'static str, raw: &str) -> Result<Value, RecordError> {
    serde_json::from_str(raw).map_err(|_| RecordError::InvalidField {
        field: name,
        value: raw.to_string(),
    })
}

fn parse_time(name: &'static str, raw: &str) -> Result<DateTime<Utc>, RecordError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| RecordError::InvalidField {
            field: name,
            value: raw.to_string(),
        })
}
