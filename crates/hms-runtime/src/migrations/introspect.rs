//! Reads the live schema of the tables a target schema names.

use std::collections::HashSet;

use sqlx::PgConnection;
use tracing::debug;

use hms_core::error::{MigrateError, Result};
use hms_core::schema::SqlType;

use super::diff::{DatabaseColumn, DatabaseSchema, DatabaseTable};

/// `information_schema.columns` row.
type ColumnRow = (
    String,
    String,
    String,
    Option<i32>,
    Option<i32>,
    Option<i32>,
    String,
    Option<String>,
);

/// Introspect `tables` in `schema`. Tables that do not exist are absent from
/// the result.
pub async fn introspect(
    conn: &mut PgConnection,
    schema: &str,
    tables: &[String],
) -> Result<DatabaseSchema> {
    let existing: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT table_name::text
        FROM information_schema.tables
        WHERE table_schema = $1
          AND table_type = 'BASE TABLE'
          AND table_name = ANY($2)
        "#,
    )
    .bind(schema)
    .bind(tables)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| MigrateError::sql("Failed to list tables", e))?;

    let mut result: Vec<DatabaseTable> = existing
        .into_iter()
        .map(|(name,)| DatabaseTable::new(&name))
        .collect();

    if result.is_empty() {
        debug!(schema, "No target tables exist yet");
        return Ok(DatabaseSchema::new(result));
    }

    let columns: Vec<ColumnRow> = sqlx::query_as(
        r#"
        SELECT table_name::text,
               column_name::text,
               data_type::text,
               character_maximum_length::int,
               numeric_precision::int,
               numeric_scale::int,
               is_nullable::text,
               column_default::text
        FROM information_schema.columns
        WHERE table_schema = $1
          AND table_name = ANY($2)
        ORDER BY table_name, ordinal_position
        "#,
    )
    .bind(schema)
    .bind(tables)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| MigrateError::sql("Failed to read columns", e))?;

    let unique: HashSet<(String, String)> = sqlx::query_as::<_, (String, String)>(
        r#"
        SELECT t.relname::text, a.attname::text
        FROM pg_index i
        JOIN pg_class t ON t.oid = i.indrelid
        JOIN pg_namespace n ON n.oid = t.relnamespace
        JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = i.indkey[0]
        WHERE n.nspname = $1
          AND t.relname = ANY($2)
          AND i.indisunique
          AND i.indnatts = 1
          AND i.indpred IS NULL
        "#,
    )
    .bind(schema)
    .bind(tables)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| MigrateError::sql("Failed to read unique constraints", e))?
    .into_iter()
    .collect();

    let indexes: Vec<(String, String)> = sqlx::query_as(
        r#"
        SELECT tablename::text, indexname::text
        FROM pg_indexes
        WHERE schemaname = $1
          AND tablename = ANY($2)
        ORDER BY tablename, indexname
        "#,
    )
    .bind(schema)
    .bind(tables)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| MigrateError::sql("Failed to read indexes", e))?;

    for (table, name, data_type, char_len, precision, scale, is_nullable, default) in columns {
        let Some(target) = result.iter_mut().find(|t| t.name == table) else {
            continue;
        };
        let sql_type = SqlType::from_information_schema(
            &data_type,
            char_len,
            precision,
            scale,
            default.as_deref(),
        );
        let is_unique = unique.contains(&(table.clone(), name.clone()));
        target.columns.push(DatabaseColumn {
            name,
            sql_type,
            nullable: is_nullable == "YES",
            default,
            unique: is_unique,
        });
    }

    for (table, index) in indexes {
        if let Some(target) = result.iter_mut().find(|t| t.name == table) {
            target.indexes.push(index);
        }
    }

    debug!(
        schema,
        tables = result.len(),
        "Introspected existing target tables"
    );
    Ok(DatabaseSchema::new(result))
}

/// Whether the session's role may create objects in `schema`.
pub async fn can_create_in_schema(conn: &mut PgConnection, schema: &str) -> Result<bool> {
    let (exists,): (bool,) =
        sqlx::query_as("SELECT EXISTS (SELECT 1 FROM pg_namespace WHERE nspname = $1)")
            .bind(schema)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| MigrateError::sql("Failed to look up schema", e))?;

    if !exists {
        return Err(MigrateError::Config(format!(
            "schema '{}' does not exist",
            schema
        )));
    }

    let (allowed,): (bool,) =
        sqlx::query_as("SELECT has_schema_privilege(current_user, $1, 'CREATE')")
            .bind(schema)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| MigrateError::sql("Failed to check schema privileges", e))?;

    Ok(allowed)
}
