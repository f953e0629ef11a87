//! Worker loop: claim, lease renewal, dispatch, terminal transition.
//!
//! Each worker is an independent poll loop; any number of workers may run
//! against the same store, coordinated only through it. The loop claims one
//! job at a time, runs the registered handler while a spawned heartbeat task
//! renews the lease, then transitions the job to `COMPLETED`, `RETRYABLE`,
//! or `DEAD_LETTER`.
//!
//! Handler failures are caught per job and never crash the loop. Lease loss
//! is the one fatal condition: a heartbeat that matches no row means another
//! worker may already own the job, so [`Worker::run`] stops the handler and
//! returns [`Error::LeaseLost`]. The embedding process decides whether to
//! restart or abort; tests observe the error in-process.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::idempotency::IdempotencyStore;
use crate::job::Job;
use crate::registry::{JobContext, JobRegistry};
use crate::store::JobStore;

/// Configuration for a worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Identifier recorded as `lease_owner` on claimed jobs.
    pub worker_id: String,
    /// Sleep between empty claim attempts.
    pub poll_interval: Duration,
    /// Interval between lease renewals while a handler runs.
    pub heartbeat_interval: Duration,
    /// How far each claim or renewal pushes `lease_expires_at`.
    pub lease_duration: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", Uuid::new_v4()),
            poll_interval: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(10),
            lease_duration: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    /// Create a config with a specific worker ID.
    pub fn with_worker_id(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            ..Default::default()
        }
    }
}

/// A single-threaded job worker.
pub struct Worker {
    store: JobStore,
    registry: Arc<JobRegistry>,
    idempotency: IdempotencyStore,
    config: WorkerConfig,
}

impl Worker {
    /// Create a worker with default configuration.
    pub fn new(pool: PgPool, registry: Arc<JobRegistry>) -> Self {
        Self::with_config(pool, registry, WorkerConfig::default())
    }

    /// Create a worker with custom configuration.
    pub fn with_config(pool: PgPool, registry: Arc<JobRegistry>, config: WorkerConfig) -> Self {
        Self {
            store: JobStore::with_lease_duration(pool.clone(), config.lease_duration),
            registry,
            idempotency: IdempotencyStore::new(pool),
            config,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.config.worker_id
    }

    /// Run the claim-dispatch loop until `shutdown` is cancelled.
    ///
    /// Returns `Ok(())` on graceful shutdown and `Err(Error::LeaseLost)` if
    /// a heartbeat found the lease reassigned; the worker must not keep
    /// executing once it no longer holds exclusive rights.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        info!(worker_id = %self.config.worker_id, "worker starting");

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let claimed = match self.store.claim(&self.config.worker_id).await {
                Ok(claimed) => claimed,
                Err(e) => {
                    error!(error = %e, "failed to claim job");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                    continue;
                }
            };

            let Some(job) = claimed else {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
                continue;
            };

            self.process_job(job).await?;
        }

        info!(worker_id = %self.config.worker_id, "worker stopped");
        Ok(())
    }

    /// Execute one claimed job and apply its terminal transition.
    async fn process_job(&self, job: Job) -> Result<()> {
        let job_id = job.id;
        let job_type = job.job_type.clone();
        debug!(job_id = %job_id, job_type = %job_type, "claimed job");

        // lease_lost fires if a renewal matches no row; hb_stop ends the
        // heartbeat task on every exit path.
        let lease_lost = CancellationToken::new();
        let hb_stop = CancellationToken::new();
        let heartbeat = self.spawn_heartbeat(job_id, lease_lost.clone(), hb_stop.clone());

        let ctx = JobContext::new(job_id, job.retry_count, self.idempotency.clone());
        let outcome = tokio::select! {
            _ = lease_lost.cancelled() => {
                hb_stop.cancel();
                let _ = heartbeat.await;
                error!(job_id = %job_id, "lease lost mid-handler, stopping worker");
                return Err(Error::LeaseLost { job_id });
            }
            outcome = self.registry.execute(&job, ctx) => outcome,
        };

        hb_stop.cancel();
        let _ = heartbeat.await;

        // The renewal may have failed while the handler was finishing.
        if lease_lost.is_cancelled() {
            error!(job_id = %job_id, "lease lost, stopping worker");
            return Err(Error::LeaseLost { job_id });
        }

        match outcome {
            Ok(()) => {
                debug!(job_id = %job_id, job_type = %job_type, "job succeeded");
                match self.store.complete(job_id, &self.config.worker_id).await {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!(job_id = %job_id, "job no longer owned, completion skipped")
                    }
                    Err(e) => error!(job_id = %job_id, error = %e, "failed to mark job completed"),
                }
            }
            Err(e) => {
                // last_error records the handler's own message, not the
                // crate error wrapping.
                let message = match &e {
                    Error::Handler(source) | Error::Effect(source) => source.to_string(),
                    other => other.to_string(),
                };
                warn!(job_id = %job_id, job_type = %job_type, error = %message, "job failed");
                match self
                    .store
                    .fail(job_id, &self.config.worker_id, &message)
                    .await
                {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!(job_id = %job_id, "job no longer owned, failure transition skipped")
                    }
                    Err(e) => error!(job_id = %job_id, error = %e, "failed to mark job failed"),
                }
            }
        }

        Ok(())
    }

    /// Spawn the lease-renewal task for one job.
    ///
    /// Renews every `heartbeat_interval` until `hb_stop` fires. A renewal
    /// that matches no row cancels `lease_lost`; a renewal that errors is
    /// retried on the next tick (the lease is still valid until it expires).
    fn spawn_heartbeat(
        &self,
        job_id: Uuid,
        lease_lost: CancellationToken,
        hb_stop: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let store = self.store.clone();
        let worker_id = self.config.worker_id.clone();
        let interval = self.config.heartbeat_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // skip the immediate first tick

            loop {
                tokio::select! {
                    _ = hb_stop.cancelled() => break,
                    _ = ticker.tick() => {
                        match store.extend_lease(job_id, &worker_id).await {
                            Ok(true) => {}
                            Ok(false) => {
                                lease_lost.cancel();
                                break;
                            }
                            Err(e) => {
                                warn!(job_id = %job_id, error = %e, "heartbeat failed");
                            }
                        }
                    }
                }
            }
        })
    }
}
