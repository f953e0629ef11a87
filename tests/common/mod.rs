//! Test harness with testcontainers for integration testing.
//!
//! One Postgres container is started on the first test and shared by the
//! whole run. Each test gets its own freshly created database so workers in
//! one test never claim jobs enqueued by another.

use anyhow::{Context, Result};
use sqlx::PgPool;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

/// Shared container infrastructure, initialized once per test run.
struct SharedTestInfra {
    admin_url: String,
    host: String,
    port: u16,
    // Keep the container alive for the entire test run
    _postgres: ContainerAsync<Postgres>,
}

static SHARED_INFRA: OnceCell<SharedTestInfra> = OnceCell::const_new();

impl SharedTestInfra {
    async fn init() -> Result<Self> {
        // Respect RUST_LOG; try_init avoids panicking if already set up.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let postgres = Postgres::default()
            .with_tag("16")
            .with_cmd(["-c", "max_connections=200"])
            .start()
            .await
            .context("Failed to start Postgres container")?;

        let host = postgres.get_host().await?.to_string();
        let port = postgres.get_host_port_ipv4(5432).await?;
        let admin_url = format!("postgresql://postgres:postgres@{host}:{port}/postgres");

        Ok(Self {
            admin_url,
            host,
            port,
            _postgres: postgres,
        })
    }

    async fn get() -> &'static Self {
        SHARED_INFRA
            .get_or_init(|| async {
                Self::init()
                    .await
                    .expect("Failed to initialize shared test infrastructure")
            })
            .await
    }
}

/// Per-test database with migrations applied.
pub struct TestDb {
    pub pool: PgPool,
}

impl TestDb {
    /// Create a fresh database in the shared container and migrate it.
    pub async fn new() -> Result<Self> {
        let infra = SharedTestInfra::get().await;

        let db_name = format!("jobwell_test_{}", Uuid::new_v4().simple());
        let admin = PgPool::connect(&infra.admin_url)
            .await
            .context("Failed to connect to admin database")?;
        sqlx::query(&format!(r#"CREATE DATABASE "{db_name}""#))
            .execute(&admin)
            .await
            .context("Failed to create test database")?;
        admin.close().await;

        let db_url = format!(
            "postgresql://postgres:postgres@{}:{}/{}",
            infra.host, infra.port, db_name
        );
        let pool = PgPool::connect(&db_url)
            .await
            .context("Failed to connect to test database")?;

        jobwell::run_migrations(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self { pool })
    }
}

/// Poll the store until the job reaches `status`, panicking on timeout.
#[allow(dead_code)]
pub async fn wait_for_status(
    store: &jobwell::JobStore,
    job_id: Uuid,
    status: jobwell::JobStatus,
    timeout: std::time::Duration,
) -> jobwell::Job {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(job) = store.find(job_id).await.unwrap() {
            if job.status == status {
                return job;
            }
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("job {job_id} did not reach {status:?} within {timeout:?}");
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
}

impl test_context::AsyncTestContext for TestDb {
    async fn setup() -> Self {
        Self::new().await.expect("Failed to create test database")
    }

    async fn teardown(self) {
        // Pool drops with the context; the database is left behind in the
        // shared container, which itself is discarded at the end of the run.
    }
}
