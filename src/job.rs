//! Job row model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle states of a job.
///
/// `Pending` and `Retryable` are claimable; `InProgress` is leased to a
/// worker; `Completed` and `DeadLetter` are terminal. Stored as text, so the
/// variants rename to the values the schema's CHECK constraint enumerates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    InProgress,
    Retryable,
    Completed,
    DeadLetter,
}

/// One unit of work, as stored in the `jobs` table.
///
/// Rows are created by [`Queue::enqueue`](crate::Queue::enqueue) and mutated
/// only through [`JobStore`](crate::JobStore) transitions; the core never
/// deletes them.
#[derive(FromRow, Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,

    /// Handler discriminator.
    #[sqlx(rename = "type")]
    pub job_type: String,

    /// Opaque payload, interpreted only by the handler for `job_type`.
    pub payload: serde_json::Value,

    pub status: JobStatus,

    /// Enqueue-time deduplication key, unique across all jobs when present.
    pub idempotency_key: Option<String>,

    pub retry_count: i32,
    pub max_retries: i32,

    /// Worker currently holding exclusive processing rights.
    pub lease_owner: Option<String>,
    /// Past this instant the lease no longer protects the job.
    pub lease_expires_at: Option<DateTime<Utc>>,

    /// Most recent failure message, diagnostics only.
    pub last_error: Option<String>,

    /// Earliest instant the job is eligible for claiming (backoff delay).
    pub next_run_at: DateTime<Utc>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Whether the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, JobStatus::Completed | JobStatus::DeadLetter)
    }
}
