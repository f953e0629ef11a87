//! Durable, Postgres-backed work queue.
//!
//! Producers enqueue typed jobs; workers claim them under mutual exclusion,
//! hold a renewable lease while the handler runs, and transition each job to
//! completed, retryable-with-backoff, or dead-lettered. A per-job
//! idempotency gate lets a handler perform a side effect at most once even
//! across retries of the same job.
//!
//! # Example
//!
//! ```ignore
//! use jobwell::{EnqueueOptions, JobRegistry, Queue, Worker};
//! use serde::Deserialize;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[derive(Deserialize)]
//! struct SendEmail { to: String }
//!
//! let pool = sqlx::PgPool::connect(&database_url).await?;
//! jobwell::run_migrations(&pool).await?;
//!
//! let queue = Queue::new(pool.clone());
//! queue.enqueue("send-email", serde_json::json!({ "to": "a@b.com" }),
//!     EnqueueOptions::default()).await?;
//!
//! let mut registry = JobRegistry::new();
//! registry.register::<SendEmail, _, _>("send-email", |job, ctx| async move {
//!     ctx.run_once("deliver", || deliver(&job.to)).await?;
//!     Ok(())
//! });
//!
//! let worker = Worker::new(pool, Arc::new(registry));
//! worker.run(CancellationToken::new()).await?;
//! ```

pub mod config;
pub mod error;
pub mod idempotency;
pub mod job;
pub mod migrate;
pub mod queue;
pub mod registry;
pub mod store;
pub mod worker;

pub use config::Config;
pub use error::{Error, Result};
pub use idempotency::{IdempotencyStore, RunOnce};
pub use job::{Job, JobStatus};
pub use migrate::run_migrations;
pub use queue::{EnqueueOptions, Queue};
pub use registry::{JobContext, JobRegistry};
pub use store::JobStore;
pub use worker::{Worker, WorkerConfig};
