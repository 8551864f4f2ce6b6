use std::future::Future;
use std::pin::Pin;

use sqlx::{Postgres, Transaction};
use tracing::{debug, info};

use hms_core::config::MigrationConfig;
use hms_core::error::{MigrateError, Result};

use super::diff::{DatabaseSchema, DiffEntry};
use super::introspect;
use crate::db::Database;

/// Lock ID for the migration advisory lock ("HMSMIG" in ASCII).
const MIGRATION_LOCK_ID: i64 = 0x484D_534D_4947;

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// The database side of a migration run.
///
/// Everything between the first call and `commit` is one unit of work:
/// dropping a store without committing discards all of it.
pub trait SchemaStore: Send {
    /// Confirm the database answers and the role may run DDL.
    fn verify(&mut self) -> StoreFuture<'_, ()>;

    /// Read the current state of the named tables.
    fn introspect<'a>(&'a mut self, tables: &'a [String]) -> StoreFuture<'a, DatabaseSchema>;

    /// Drop the named tables, in the order given, with everything that
    /// depends on them.
    fn drop_tables<'a>(&'a mut self, tables: &'a [String]) -> StoreFuture<'a, ()>;

    /// Apply one schema change.
    fn execute<'a>(&'a mut self, entry: &'a DiffEntry) -> StoreFuture<'a, ()>;

    /// Make all changes permanent.
    fn commit(self) -> StoreFuture<'static, ()>
    where
        Self: Sized;
}

/// PostgreSQL store backed by a single transaction.
///
/// PostgreSQL DDL is transactional, so a failure at any point leaves the
/// schema exactly as it was before the run.
pub struct PgSchemaStore {
    tx: Transaction<'static, Postgres>,
    schema: String,
}

impl PgSchemaStore {
    /// Open the transaction and take the migration lock.
    ///
    /// The lock is transaction-scoped: it is released on commit, on
    /// rollback, and if the connection dies.
    pub async fn begin(db: &Database, config: &MigrationConfig) -> Result<Self> {
        let mut tx = db
            .pool()
            .begin()
            .await
            .map_err(|e| MigrateError::sql("Failed to open transaction", e))?;

        sqlx::query(&format!("SET LOCAL search_path TO {}", config.schema))
            .execute(&mut *tx)
            .await
            .map_err(|e| MigrateError::sql("Failed to set search path", e))?;

        sqlx::query(&format!(
            "SET LOCAL lock_timeout = '{}s'",
            config.lock_timeout_secs
        ))
        .execute(&mut *tx)
        .await
        .map_err(|e| MigrateError::sql("Failed to set lock timeout", e))?;

        sqlx::query(&format!(
            "SET LOCAL statement_timeout = '{}s'",
            db.config().statement_timeout_secs
        ))
        .execute(&mut *tx)
        .await
        .map_err(|e| MigrateError::sql("Failed to set statement timeout", e))?;

        debug!("Acquiring migration lock...");
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(MIGRATION_LOCK_ID)
            .execute(&mut *tx)
            .await
            .map_err(|e| MigrateError::sql("Failed to acquire migration lock", e))?;
        debug!("Migration lock acquired");

        Ok(Self {
            tx,
            schema: config.schema.clone(),
        })
    }

    fn qualified(&self, table: &str) -> String {
        format!("{}.{}", self.schema, table)
    }
}

impl SchemaStore for PgSchemaStore {
    fn verify(&mut self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query("SELECT 1")
                .execute(&mut *self.tx)
                .await
                .map_err(|e| MigrateError::sql("Database did not answer", e))?;

            if !introspect::can_create_in_schema(&mut self.tx, &self.schema).await? {
                return Err(MigrateError::Permission(format!(
                    "current role may not create objects in schema '{}'",
                    self.schema
                )));
            }
            Ok(())
        })
    }

    fn introspect<'a>(&'a mut self, tables: &'a [String]) -> StoreFuture<'a, DatabaseSchema> {
        Box::pin(async move { introspect::introspect(&mut self.tx, &self.schema, tables).await })
    }

    fn drop_tables<'a>(&'a mut self, tables: &'a [String]) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            for table in tables {
                let sql = format!("DROP TABLE IF EXISTS {} CASCADE", self.qualified(table));
                sqlx::query(&sql)
                    .execute(&mut *self.tx)
                    .await
                    .map_err(|e| MigrateError::sql(&format!("Failed to drop {}", table), e))?;
                info!("Dropped table {}", table);
            }
            Ok(())
        })
    }

    fn execute<'a>(&'a mut self, entry: &'a DiffEntry) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            debug!(sql = %entry.sql, "Executing");
            sqlx::query(&entry.sql)
                .execute(&mut *self.tx)
                .await
                .map_err(|e| MigrateError::sql(&format!("{} failed", entry.details), e))?;
            Ok(())
        })
    }

    fn commit(self) -> StoreFuture<'static, ()> {
        Box::pin(async move {
            self.tx
                .commit()
                .await
                .map_err(|e| MigrateError::sql("Failed to commit migration", e))
        })
    }
}
