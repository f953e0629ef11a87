//! Handler registry and per-job execution context.
//!
//! The registry maps job type strings (e.g. `"send-email"`) to handlers
//! that deserialize the payload and run the job logic. It is built once at
//! startup and never mutated afterwards; a claimed job whose type is absent
//! fails through the normal retry path.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use anyhow::anyhow;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::idempotency::{IdempotencyStore, RunOnce};
use crate::job::Job;

/// Context handed to every handler invocation.
///
/// Exposes the job's identity, its current retry count, and a job-scoped
/// [`run_once`](JobContext::run_once) binding of the idempotency gate.
#[derive(Clone)]
pub struct JobContext {
    pub job_id: Uuid,
    pub retry_count: i32,
    idempotency: IdempotencyStore,
}

impl JobContext {
    pub(crate) fn new(job_id: Uuid, retry_count: i32, idempotency: IdempotencyStore) -> Self {
        Self {
            job_id,
            retry_count,
            idempotency,
        }
    }

    /// Run `effect` at most once for this job under `label`.
    ///
    /// The durable key is `"<job_id>:<label>"`, so the same label in a
    /// retried run of this job is deduplicated, while other jobs using the
    /// same label are not.
    pub async fn run_once<F, Fut>(&self, label: &str, effect: F) -> Result<RunOnce>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let key = format!("{}:{}", self.job_id, label);
        self.idempotency.run_once(&key, effect).await
    }
}

/// Type-erased async handler. The payload arrives as raw JSON; the
/// registration closure deserializes it to the concrete type.
type BoxedHandler = Box<
    dyn Fn(serde_json::Value, JobContext) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>
        + Send
        + Sync,
>;

/// Registry mapping job type strings to handlers.
///
/// # Example
///
/// ```ignore
/// let mut registry = JobRegistry::new();
/// registry.register::<SendEmail, _, _>("send-email", |job, ctx| async move {
///     ctx.run_once("deliver", || send(&job.to)).await?;
///     Ok(())
/// });
/// ```
#[derive(Default)]
pub struct JobRegistry {
    handlers: HashMap<&'static str, BoxedHandler>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for `job_type`.
    ///
    /// The handler receives the deserialized payload and the per-job
    /// context. A payload that fails to deserialize is a handler failure
    /// (it counts against the job's retries).
    pub fn register<J, F, Fut>(&mut self, job_type: &'static str, handler: F)
    where
        J: DeserializeOwned + Send + 'static,
        F: Fn(J, JobContext) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let boxed: BoxedHandler = Box::new(move |payload, ctx| {
            let handler = handler.clone();
            Box::pin(async move {
                let job: J = serde_json::from_value(payload)
                    .map_err(|e| anyhow!("failed to deserialize {} payload: {}", job_type, e))?;
                handler(job, ctx).await
            })
        });

        self.handlers.insert(job_type, boxed);
    }

    /// Execute the handler registered for `job`'s type.
    pub async fn execute(&self, job: &Job, ctx: JobContext) -> Result<()> {
        let handler = self
            .handlers
            .get(job.job_type.as_str())
            .ok_or_else(|| Error::UnknownJobType(job.job_type.clone()))?;

        handler(job.payload.clone(), ctx)
            .await
            .map_err(Error::Handler)
    }

    pub fn is_registered(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }

    /// All registered job types.
    pub fn registered_types(&self) -> Vec<&'static str> {
        self.handlers.keys().copied().collect()
    }
}
