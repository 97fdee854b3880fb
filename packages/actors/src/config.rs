//! Worker configuration.

use std::time::Duration;

use broker::ConfigError;
use queue_core::JobCategory;

/// Settings shared by the built-in workers.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Simulated processing time of admin jobs
    pub admin_work: Duration,
    /// Simulated processing time of user jobs
    pub user_work: Duration,
    /// Delay between polls of an empty queue
    pub poll_interval: Duration,
    /// Dashboard entity used when a payload names none
    pub default_entity_id: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            admin_work: Duration::from_millis(2000),
            user_work: Duration::from_millis(1000),
            poll_interval: Duration::from_millis(100),
            default_entity_id: "default".to_string(),
        }
    }
}

fn millis(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match lookup(name) {
        Some(raw) => raw
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::InvalidValue { name, value: raw }),
        None => Ok(default),
    }
}

impl WorkerConfig {
    /// Near-instant work, for tests.
    pub fn fast() -> Self {
        Self {
            admin_work: Duration::from_millis(5),
            user_work: Duration::from_millis(5),
            poll_interval: Duration::from_millis(10),
            ..Self::default()
        }
    }

    /// Set the simulated work time of `category`.
    pub fn with_work(mut self, category: JobCategory, work: Duration) -> Self {
        match category {
            JobCategory::Admin => self.admin_work = work,
            JobCategory::User => self.user_work = work,
        }
        self
    }

    /// Simulated work time of `category`.
    pub fn work_for(&self, category: JobCategory) -> Duration {
        match category {
            JobCategory::Admin => self.admin_work,
            JobCategory::User => self.user_work,
        }
    }

    /// Read `ADMIN_WORK_MS`, `USER_WORK_MS`, `WORKER_POLL_MS` and
    /// `DASHBOARD_ENTITY_ID` from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            admin_work: millis(&lookup, "ADMIN_WORK_MS", defaults.admin_work)?,
            user_work: millis(&lookup, "USER_WORK_MS", defaults.user_work)?,
            poll_interval: millis(&lookup, "WORKER_POLL_MS", defaults.poll_interval)?,
            default_entity_id: lookup("DASHBOARD_ENTITY_ID").unwrap_or(defaults.default_entity_id),
        })
    }
}
