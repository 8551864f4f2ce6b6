use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::debug;

use hms_core::config::DatabaseConfig;
use hms_core::error::{MigrateError, Result};

/// Database connection wrapper providing connection pooling.
#[derive(Clone)]
pub struct Database {
    /// Connection pool.
    pool: Arc<PgPool>,

    /// Configuration.
    config: DatabaseConfig,
}

impl Database {
    /// Connect using the given configuration.
    ///
    /// Any failure here is a connection error: nothing has been sent to the
    /// database yet.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        debug!(url = %config.redacted_url(), "Connecting to database");

        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size.max(1))
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| {
                MigrateError::Connection(format!(
                    "Failed to connect to {}: {}",
                    config.redacted_url(),
                    e
                ))
            })?;

        Ok(Self {
            pool: Arc::new(pool),
            config: config.clone(),
        })
    }

    /// Get the pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get the configuration the pool was built from.
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Close all connections gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
