//! Database connection management

pub mod schema;

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::config::DatabaseConfig;

const MAX_RETRY_DELAY_MS: u64 = 30_000;

/// PostgreSQL database connection pool
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool
    ///
    /// Retries up to `connect_retries` attempts with exponential backoff
    /// starting at `retry_delay_ms`.
    pub async fn connect(database_url: &str, config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let max_attempts = config.connect_retries.max(1);
        let mut delay_ms = config.retry_delay_ms;
        let mut attempt = 1;

        loop {
            let result = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .acquire_timeout(Duration::from_millis(config.acquire_timeout_ms))
                .connect(database_url)
                .await;

            match result {
                Ok(pool) => {
                    tracing::info!(
                        max_connections = config.max_connections,
                        attempt,
                        "PostgreSQL connection pool established"
                    );
                    return Ok(Self { pool });
                }
                Err(e) if attempt < max_attempts => {
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        retry_in_ms = delay_ms,
                        error = %e,
                        "PostgreSQL connection failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    delay_ms = delay_ms.saturating_mul(2).min(MAX_RETRY_DELAY_MS);
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(attempts = attempt, error = %e, "PostgreSQL connection failed");
                    return Err(e);
                }
            }
        }
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health
    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
