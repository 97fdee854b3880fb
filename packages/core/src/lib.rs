//! Core domain types for the job queue system.
//!
//! This crate contains shared types used across all packages:
//! - JobRecord and JobState for work items
//! - JobCategory for the fixed set of queues
//! - Broker key layout and hash field helpers
//! - Events for worker lifecycle notifications

mod events;
mod fields;
mod job;
pub mod keys;
mod queue;

pub use events::JobEvent;
pub use fields::{Fields, merge_fields, payload_fields};
pub use job::{JobId, JobOutcome, JobRecord, JobState, RecordError, field};
pub use queue::{JobCategory, UnknownCategory};
