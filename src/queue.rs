//! Producer side: inserting jobs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;

/// Options for [`Queue::enqueue`].
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    /// Deduplicates logically identical enqueue requests: if a job with this
    /// key already exists, the insert is suppressed.
    pub idempotency_key: Option<String>,
    /// Failure budget before dead-lettering. Defaults to 5.
    pub max_retries: Option<i32>,
    /// Earliest claim time. Defaults to now.
    pub run_at: Option<DateTime<Utc>>,
}

/// Producer handle for enqueueing jobs.
///
/// Enqueueing is a single insert; it never blocks on worker availability.
#[derive(Clone)]
pub struct Queue {
    pool: PgPool,
}

impl Queue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert a new `PENDING` job and return its id.
    ///
    /// When `options.idempotency_key` matches an existing job, the insert is
    /// a no-op and exactly one row remains in the store. The returned id is
    /// still the freshly generated one, so callers must not assume it names
    /// a stored row when a duplicate was suppressed.
    pub async fn enqueue<P: Serialize>(
        &self,
        job_type: &str,
        payload: P,
        options: EnqueueOptions,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let payload = serde_json::to_value(payload)?;
        let max_retries = options.max_retries.unwrap_or(5);

        let result = sqlx::query(
            r#"
            INSERT INTO jobs (
                id, type, payload, status,
                idempotency_key, max_retries, next_run_at
            )
            VALUES ($1, $2, $3, 'PENDING', $4, $5, COALESCE($6, NOW()))
            ON CONFLICT (idempotency_key) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(job_type)
        .bind(&payload)
        .bind(&options.idempotency_key)
        .bind(max_retries)
        .bind(options.run_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!(
                job_type,
                idempotency_key = ?options.idempotency_key,
                "enqueue suppressed by idempotency key"
            );
        } else {
            debug!(job_id = %id, job_type, "job enqueued");
        }

        Ok(id)
    }
}
