//! PostgreSQL-backed job store: claiming, lease renewal, and terminal
//! transitions.
//!
//! Every mutation here is a single conditional statement. The claim is the
//! sole mutual-exclusion primitive in the system (`FOR UPDATE SKIP LOCKED`
//! inside one atomic claim-and-mark), and every later transition is guarded
//! by `lease_owner` equality so a worker that lost its lease cannot touch a
//! job another worker has since claimed.

use std::time::Duration;

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;
use crate::job::{Job, JobStatus};

/// Store-side access to the `jobs` table.
#[derive(Clone)]
pub struct JobStore {
    pool: PgPool,
    lease_duration: Duration,
}

impl JobStore {
    /// Create a store with the default 30 second lease.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lease_duration: Duration::from_secs(30),
        }
    }

    /// Create a store with a custom lease duration.
    pub fn with_lease_duration(pool: PgPool, lease_duration: Duration) -> Self {
        Self {
            pool,
            lease_duration,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn lease_duration(&self) -> Duration {
        self.lease_duration
    }

    /// Atomically claim the oldest eligible job for `worker_id`.
    ///
    /// Eligible means `status IN (PENDING, RETRYABLE)` with `next_run_at`
    /// due; ordering is strictly FIFO by `created_at`. Jobs locked by a
    /// concurrent claim attempt are skipped. The selected job is marked
    /// `IN_PROGRESS` with a fresh lease in the same statement.
    ///
    /// Expired `IN_PROGRESS` leases are not reclaimed here; a job abandoned
    /// mid-lease stays `IN_PROGRESS` until an operator intervenes.
    pub async fn claim(&self, worker_id: &str) -> Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>(
            r#"
            WITH next_job AS (
                SELECT id
                FROM jobs
                WHERE status IN ('PENDING', 'RETRYABLE')
                  AND next_run_at <= NOW()
                ORDER BY created_at
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE jobs
            SET status = 'IN_PROGRESS',
                lease_owner = $1,
                lease_expires_at = NOW() + ($2 || ' milliseconds')::INTERVAL,
                updated_at = NOW()
            WHERE id IN (SELECT id FROM next_job)
            RETURNING id, type, payload, status, idempotency_key,
                      retry_count, max_retries, lease_owner, lease_expires_at,
                      last_error, next_run_at, created_at, updated_at
            "#,
        )
        .bind(worker_id)
        .bind(self.lease_duration.as_millis().to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    /// Extend the lease on a claimed job (heartbeat).
    ///
    /// Returns `false` when the conditional update matched no row: the lease
    /// was reassigned or the row vanished, and the caller no longer owns the
    /// job.
    pub async fn extend_lease(&self, job_id: Uuid, worker_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET lease_expires_at = NOW() + ($1 || ' milliseconds')::INTERVAL,
                updated_at = NOW()
            WHERE id = $2 AND lease_owner = $3
            "#,
        )
        .bind(self.lease_duration.as_millis().to_string())
        .bind(job_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Transition a job to `COMPLETED` and release its lease.
    ///
    /// Guarded by `lease_owner`; returns `false` if the caller no longer
    /// held the lease (no row was touched).
    pub async fn complete(&self, job_id: Uuid, worker_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'COMPLETED',
                lease_owner = NULL,
                lease_expires_at = NULL,
                updated_at = NOW()
            WHERE id = $1 AND lease_owner = $2
            "#,
        )
        .bind(job_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record a failure and release the lease.
    ///
    /// Increments `retry_count`; dead-letters when the incremented count
    /// reaches `max_retries`, otherwise re-queues as `RETRYABLE` with
    /// exponential backoff of `2^retry_count` seconds, exponent taken from
    /// the pre-increment count (1st failure 1s, 2nd 2s, 3rd 4s).
    ///
    /// Guarded by `lease_owner`; returns `false` if the caller no longer
    /// held the lease.
    pub async fn fail(&self, job_id: Uuid, worker_id: &str, error: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET retry_count = retry_count + 1,
                status = CASE
                    WHEN retry_count + 1 >= max_retries
                    THEN 'DEAD_LETTER'
                    ELSE 'RETRYABLE'
                END,
                next_run_at = NOW() + INTERVAL '1 second' * POWER(2, retry_count),
                last_error = $3,
                lease_owner = NULL,
                lease_expires_at = NULL,
                updated_at = NOW()
            WHERE id = $1 AND lease_owner = $2
            "#,
        )
        .bind(job_id)
        .bind(worker_id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Fetch a job by id.
    pub async fn find(&self, job_id: Uuid) -> Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>(
            r#"
            SELECT id, type, payload, status, idempotency_key,
                   retry_count, max_retries, lease_owner, lease_expires_at,
                   last_error, next_run_at, created_at, updated_at
            FROM jobs
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    /// Count jobs in a given status.
    pub async fn count_with_status(&self, status: JobStatus) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE status = $1")
            .bind(status)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
