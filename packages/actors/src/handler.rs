//! Job handler trait and registry.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use queue_core::{JobCategory, JobRecord};
use serde_json::Value;

/// Result type for job handlers. The error string becomes the job's
/// failure reason.
pub type HandlerResult = Result<Value, String>;

/// Future type for async job handlers.
pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// Trait for job handlers.
///
/// Implement this trait to define how the jobs of one queue are processed.
pub trait JobHandler: Send + Sync + 'static {
    /// The category whose queue this handler consumes.
    fn category(&self) -> JobCategory;

    /// Process a claimed job and return the result.
    fn handle(&self, job: &JobRecord) -> HandlerFuture;
}

/// Registry for job handlers.
///
/// Holds at most one handler per category; the supervisor starts a worker
/// for each entry.
#[derive(Default, Clone)]
pub struct JobHandlerRegistry {
    handlers: BTreeMap<JobCategory, Arc<dyn JobHandler>>,
}

impl JobHandlerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for its category.
    pub fn register<H: JobHandler>(&mut self, handler: H) {
        self.handlers.insert(handler.category(), Arc::new(handler));
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<H: JobHandler>(mut self, handler: H) -> Self {
        self.register(handler);
        self
    }

    pub fn get(&self, category: JobCategory) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(&category).cloned()
    }

    pub fn categories(&self) -> Vec<JobCategory> {
        self.handlers.keys().copied().collect()
    }
}

/// A simple function-based job handler.
pub struct FnHandler<F>
where
    F: Fn(&JobRecord) -> HandlerFuture + Send + Sync + 'static,
{
    category: JobCategory,
    handler: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&JobRecord) -> HandlerFuture + Send + Sync + 'static,
{
    /// Create a new function-based handler.
    pub fn new(category: JobCategory, handler: F) -> Self {
        Self { category, handler }
    }
}

impl<F> JobHandler for FnHandler<F>
where
    F: Fn(&JobRecord) -> HandlerFuture + Send + Sync + 'static,
{
    fn category(&self) -> JobCategory {
        self.category
    }

    fn handle(&self, job: &JobRecord) -> HandlerFuture {
        (self.handler)(job)
    }
}

/// Helper macro for creating job handlers from async blocks.
///
/// ```ignore
/// let boom = job_handler!(JobCategory::User, |job| Err("boom".to_string()));
/// ```
#[macro_export]
macro_rules! job_handler {
    ($category:expr, |$job:ident| $body:expr) => {
        $crate::FnHandler::new($category, |$job: &$crate::queue_core::JobRecord| {
            let $job = $job.clone();
            Box::pin(async move {
                let result: $crate::HandlerResult = $body;
                result
            }) as $crate::HandlerFuture
        })
    };
}
