mod database;

pub use database::DatabaseConfig;

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::{MigrateError, Result};
use crate::schema::is_identifier;

/// Environment variable holding the connection string.
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";

/// Root configuration for a migration run.
///
/// Built once by the caller and handed to the runner; nothing reads the
/// process environment behind its back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrateConfig {
    /// Database configuration.
    pub database: DatabaseConfig,

    /// Migration behaviour.
    #[serde(default)]
    pub migration: MigrationConfig,
}

impl MigrateConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        debug!(path = %path.as_ref().display(), "Loading configuration");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| MigrateError::Config(format!("Failed to read config file: {}", e)))?;

        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_toml(content: &str) -> Result<Self> {
        // Substitute environment variables
        let content = substitute_env_vars(content);

        let config: Self = toml::from_str(&content)
            .map_err(|e| MigrateError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from `DATABASE_URL`.
    pub fn from_env() -> Result<Self> {
        let url = std::env::var(DATABASE_URL_VAR).map_err(|_| {
            MigrateError::Config(format!(
                "{} is not set. Export it or add it to .env",
                DATABASE_URL_VAR
            ))
        })?;
        Self::with_database_url(&url)
    }

    /// Configuration with defaults for the given database URL.
    pub fn with_database_url(url: &str) -> Result<Self> {
        let config = Self {
            database: DatabaseConfig::new(url),
            migration: MigrationConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Replace the database URL, keeping everything else.
    pub fn override_database_url(mut self, url: &str) -> Result<Self> {
        self.database.url = url.to_string();
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        let url = self.database.url.trim();
        if url.is_empty() {
            return Err(MigrateError::Config("database url is empty".to_string()));
        }
        if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
            return Err(MigrateError::Config(format!(
                "database url must use the postgres:// scheme, got {}",
                self.database.redacted_url()
            )));
        }
        if !is_identifier(&self.migration.schema) {
            return Err(MigrateError::Config(format!(
                "invalid migration schema name '{}'",
                self.migration.schema
            )));
        }
        Ok(())
    }
}

/// Migration behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// PostgreSQL schema the tables live in.
    #[serde(default = "default_schema")]
    pub schema: String,

    /// How long to wait for table locks before giving up, in seconds.
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_secs: u64,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            schema: default_schema(),
            lock_timeout_secs: default_lock_timeout(),
        }
    }
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_lock_timeout() -> u64 {
    30
}

/// Substitute environment variables in the format ${VAR_NAME}.
fn substitute_env_vars(content: &str) -> String {
    let mut result = content.to_string();
    let re = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("valid env var pattern");

    for cap in re.captures_iter(content) {
        let var_name = &cap[1];
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}
