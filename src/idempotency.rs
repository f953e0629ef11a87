//! Keyed claim-or-skip gate for running a side effect at most once.

use std::future::Future;

use sqlx::PgPool;
use tracing::debug;

use crate::error::{Error, Result};

/// Outcome of a [`run_once`](IdempotencyStore::run_once) call, so callers
/// and tests can tell "ran" from "skipped as duplicate". A failed effect is
/// reported as `Err`, never as an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOnce {
    /// First attempt under this key; the effect ran and the marker committed.
    Executed,
    /// A marker for this key already existed; the effect was not invoked.
    Skipped,
}

/// Durable at-most-one-attempt gate backed by the `idempotency_keys` table.
#[derive(Clone)]
pub struct IdempotencyStore {
    pool: PgPool,
}

impl IdempotencyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run `effect` at most once for `key`.
    ///
    /// Opens a transaction and inserts a marker for the key. If the marker
    /// already existed, the effect is skipped entirely. Otherwise the effect
    /// runs while the transaction is open; on success the marker commits, on
    /// failure the transaction rolls back, marker included, so a later call
    /// with the same key attempts the effect again.
    ///
    /// The "not committed twice" guarantee only covers effects transactional
    /// with the marker insert. An effect with external, non-transactional
    /// consequences (a network send, say) that succeeds before the commit
    /// fails for an unrelated reason can run again on retry; that residual
    /// at-least-once risk is inherent and not hidden here.
    pub async fn run_once<F, Fut>(&self, key: &str, effect: F) -> Result<RunOnce>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO idempotency_keys (key)
            VALUES ($1)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(key)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            tx.commit().await?;
            debug!(key, "effect skipped, key already attempted");
            return Ok(RunOnce::Skipped);
        }

        match effect().await {
            Ok(()) => {
                tx.commit().await?;
                Ok(RunOnce::Executed)
            }
            Err(e) => {
                tx.rollback().await?;
                Err(Error::Effect(e))
            }
        }
    }
}
