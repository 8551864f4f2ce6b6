//! Explicit PostgreSQL provisioning for integration tests.
//!
//! Only `TEST_DATABASE_URL` is read, never `DATABASE_URL`, so a test run can
//! not touch the database the migrator is normally pointed at.

use hms_core::config::{DatabaseConfig, MigrationConfig};
use hms_core::error::{MigrateError, Result};
use hms_core::schema::is_identifier;

use crate::db::Database;

/// Environment variable naming the test database.
pub const TEST_DATABASE_URL_VAR: &str = "TEST_DATABASE_URL";

/// Explicit database access for tests.
///
/// # Examples
///
/// ```ignore
/// let db = TestDatabase::from_env().await?;
/// let config = db.fresh_schema("apply_is_idempotent").await?;
/// migrate(db.database(), &target, &config, MigrationMode::Apply).await?;
/// ```
pub struct TestDatabase {
    database: Database,
}

impl TestDatabase {
    /// Connect to the database at the given URL.
    pub async fn from_url(url: &str) -> Result<Self> {
        let config = DatabaseConfig {
            pool_size: 5,
            ..DatabaseConfig::new(url)
        };
        let database = Database::connect(&config).await?;

        Ok(Self { database })
    }

    /// Connect using `TEST_DATABASE_URL`.
    pub async fn from_env() -> Result<Self> {
        let url = std::env::var(TEST_DATABASE_URL_VAR).map_err(|_| {
            MigrateError::Config(format!(
                "{} not set. Set it explicitly for database tests.",
                TEST_DATABASE_URL_VAR
            ))
        })?;
        Self::from_url(&url).await
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Run raw SQL to set up test data or schema.
    pub async fn execute(&self, sql: &str) -> Result<()> {
        sqlx::query(sql)
            .execute(self.database.pool())
            .await
            .map_err(|e| MigrateError::sql("Test setup failed", e))?;
        Ok(())
    }

    /// Create an empty schema for a single test and return the migration
    /// config pointing at it. Any schema left over from an earlier run of
    /// the same test is dropped first.
    pub async fn fresh_schema(&self, test_name: &str) -> Result<MigrationConfig> {
        let schema = format!("hms_test_{}", sanitize_name(test_name));
        if !is_identifier(&schema) {
            return Err(MigrateError::Config(format!(
                "cannot derive a schema name from '{}'",
                test_name
            )));
        }

        self.execute(&format!("DROP SCHEMA IF EXISTS {} CASCADE", schema))
            .await?;
        self.execute(&format!("CREATE SCHEMA {}", schema)).await?;

        Ok(MigrationConfig {
            schema,
            ..MigrationConfig::default()
        })
    }

    /// Drop a schema created by [`TestDatabase::fresh_schema`].
    pub async fn drop_schema(&self, config: &MigrationConfig) -> Result<()> {
        self.execute(&format!("DROP SCHEMA IF EXISTS {} CASCADE", config.schema))
            .await
    }
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .take(40)
        .collect()
}
