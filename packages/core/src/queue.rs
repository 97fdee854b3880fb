//! Queue categories for job containers.

use serde::{Deserialize, Serialize};

/// The closed set of job categories. Each category owns exactly one queue
/// and one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobCategory {
    Admin,
    User,
}

impl JobCategory {
    /// Every category, in the order workers are started.
    pub const ALL: [JobCategory; 2] = [JobCategory::Admin, JobCategory::User];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobCategory::Admin => "admin",
            JobCategory::User => "user",
        }
    }

    /// Name of the queue holding jobs of this category.
    pub fn queue_name(&self) -> &'static str {
        match self {
            JobCategory::Admin => "admin-queue",
            JobCategory::User => "user-queue",
        }
    }

    /// Capitalised label for user facing messages.
    pub fn label(&self) -> &'static str {
        match self {
            JobCategory::Admin => "Admin",
            JobCategory::User => "User",
        }
    }
}

impl std::fmt::Display for JobCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing a string that names no category.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown job category: {0}")]
pub struct UnknownCategory(pub String);

impl std::str::FromStr for JobCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(JobCategory::Admin),
            "user" => Ok(JobCategory::User),
            other => Err(UnknownCategory(other.to_string())),
        }
    }
}
