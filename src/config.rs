//! Environment-backed configuration.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;

use crate::worker::WorkerConfig;

/// Configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub worker: WorkerConfig,
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// Reads a `.env` file if present. `DATABASE_URL` is required; worker
    /// knobs (`JOBWELL_WORKER_ID`, `JOBWELL_POLL_INTERVAL_MS`,
    /// `JOBWELL_HEARTBEAT_INTERVAL_MS`, `JOBWELL_LEASE_DURATION_MS`) fall
    /// back to the worker defaults.
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();

        let mut worker = match env::var("JOBWELL_WORKER_ID") {
            Ok(id) => WorkerConfig::with_worker_id(id),
            Err(_) => WorkerConfig::default(),
        };

        if let Some(ms) = duration_var("JOBWELL_POLL_INTERVAL_MS")? {
            worker.poll_interval = ms;
        }
        if let Some(ms) = duration_var("JOBWELL_HEARTBEAT_INTERVAL_MS")? {
            worker.heartbeat_interval = ms;
        }
        if let Some(ms) = duration_var("JOBWELL_LEASE_DURATION_MS")? {
            worker.lease_duration = ms;
        }

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            worker,
        })
    }
}

fn duration_var(name: &str) -> Result<Option<Duration>> {
    match env::var(name) {
        Ok(value) => {
            let ms: u64 = value
                .parse()
                .with_context(|| format!("{name} must be a number of milliseconds"))?;
            Ok(Some(Duration::from_millis(ms)))
        }
        Err(_) => Ok(None),
    }
}
