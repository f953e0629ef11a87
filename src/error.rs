//! Error types for queue, store, and worker operations.

use uuid::Uuid;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the job queue core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A store round-trip failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A job payload could not be (de)serialized.
    #[error("payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No handler is registered for the job's type. Routed through the
    /// normal failure path, so it counts against retries and can
    /// dead-letter a job whose type is never registered.
    #[error("no handler registered for job type {0:?}")]
    UnknownJobType(String),

    /// The handler returned an error; recorded as the job's `last_error`.
    #[error("handler failed: {0}")]
    Handler(#[source] anyhow::Error),

    /// An idempotent effect failed. The attempt marker was rolled back, so
    /// a retry under the same key will run the effect again.
    #[error("idempotent effect failed: {0}")]
    Effect(#[source] anyhow::Error),

    /// The worker's lease on a job was reassigned or vanished. Fatal to the
    /// worker: it must not keep executing a handler it no longer owns.
    #[error("lease lost on job {job_id}")]
    LeaseLost { job_id: Uuid },

    /// Schema provisioning failed.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}
