//! Schema provisioning.
//!
//! The core assumes the `jobs` and `idempotency_keys` relations exist and
//! never creates or alters them on its own; the embedding application calls
//! [`run_migrations`] before first use.

use sqlx::PgPool;

use crate::error::Result;

/// Apply the bundled schema migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
