use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::table::TableDef;
use super::types::SqlType;
use crate::error::{MigrateError, Result};

/// PostgreSQL truncates identifiers longer than this.
const MAX_IDENTIFIER_LEN: usize = 63;

/// The set of tables the application declares it needs.
///
/// Immutable once built. Tables are kept in creation order: every table
/// comes after the tables its foreign keys reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetSchema {
    tables: Vec<TableDef>,
}

/// On-disk form of a target schema.
#[derive(Debug, Deserialize)]
struct SchemaFile {
    tables: Vec<TableDef>,
}

/// One declared column, flattened for data-driven checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnRow<'a> {
    pub table: &'a str,
    pub column: &'a str,
    pub sql_type: &'a SqlType,
    pub nullable: bool,
    pub default: Option<&'a str>,
}

impl TargetSchema {
    /// Validate the tables and order them for creation.
    pub fn new(tables: Vec<TableDef>) -> Result<Self> {
        validate(&tables)?;
        let tables = creation_order(tables)?;
        Ok(Self { tables })
    }

    /// Parse a schema from TOML (`[[tables]]` with `[[tables.columns]]`).
    pub fn from_toml(content: &str) -> Result<Self> {
        let file: SchemaFile = toml::from_str(content)
            .map_err(|e| MigrateError::InvalidSchema(format!("Failed to parse schema: {}", e)))?;
        Self::new(file.tables)
    }

    /// Load a schema file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            MigrateError::InvalidSchema(format!(
                "Failed to read schema file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let schema = Self::from_toml(&content)?;
        debug!(
            path = %path.as_ref().display(),
            tables = schema.len(),
            "Loaded target schema"
        );
        Ok(schema)
    }

    /// Tables in creation order.
    pub fn tables(&self) -> &[TableDef] {
        &self.tables
    }

    /// Get a table by name.
    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Table names in creation order.
    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.name.clone()).collect()
    }

    /// Tables in the order they can be dropped (dependents first).
    pub fn drop_order(&self) -> Vec<&TableDef> {
        self.tables.iter().rev().collect()
    }

    /// Every declared column as a flat row.
    pub fn column_rows(&self) -> Vec<ColumnRow<'_>> {
        self.tables
            .iter()
            .flat_map(|table| {
                table.columns.iter().map(move |column| ColumnRow {
                    table: table.name.as_str(),
                    column: column.name.as_str(),
                    sql_type: &column.sql_type,
                    nullable: column.is_nullable(),
                    default: column.default.as_deref(),
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Lowercase SQL identifier that needs no quoting.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };

    name.len() <= MAX_IDENTIFIER_LEN
        && (first.is_ascii_lowercase() || first == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn invalid(message: String) -> MigrateError {
    MigrateError::InvalidSchema(message)
}

fn validate(tables: &[TableDef]) -> Result<()> {
    if tables.is_empty() {
        return Err(invalid("schema declares no tables".to_string()));
    }

    let mut table_names = HashSet::new();
    let mut index_names = HashSet::new();

    for table in tables {
        if !is_identifier(&table.name) {
            return Err(invalid(format!("invalid table name '{}'", table.name)));
        }
        if !table_names.insert(table.name.as_str()) {
            return Err(invalid(format!("duplicate table '{}'", table.name)));
        }
        if table.columns.is_empty() {
            return Err(invalid(format!("table '{}' has no columns", table.name)));
        }

        let mut column_names = HashSet::new();
        for column in &table.columns {
            if !is_identifier(&column.name) {
                return Err(invalid(format!(
                    "invalid column name '{}.{}'",
                    table.name, column.name
                )));
            }
            if !column_names.insert(column.name.as_str()) {
                return Err(invalid(format!(
                    "duplicate column '{}.{}'",
                    table.name, column.name
                )));
            }
            if matches!(column.sql_type, SqlType::Other(_)) {
                return Err(invalid(format!(
                    "unsupported type for '{}.{}'",
                    table.name, column.name
                )));
            }
        }

        if table.columns.iter().filter(|c| c.primary_key).count() > 1 {
            return Err(invalid(format!(
                "table '{}' declares more than one primary key column",
                table.name
            )));
        }

        for index in table.all_indexes() {
            if !is_identifier(&index.name) {
                return Err(invalid(format!("invalid index name '{}'", index.name)));
            }
            if !index_names.insert(index.name.clone()) {
                return Err(invalid(format!("duplicate index '{}'", index.name)));
            }
            if index.columns.is_empty() {
                return Err(invalid(format!("index '{}' has no columns", index.name)));
            }
            if let Some(missing) = index
                .columns
                .iter()
                .find(|c| table.get_column(c).is_none())
            {
                return Err(invalid(format!(
                    "index '{}' references unknown column '{}.{}'",
                    index.name, table.name, missing
                )));
            }
        }
    }

    for table in tables {
        for column in &table.columns {
            let Some(ref fk) = column.references else {
                continue;
            };
            let target = tables.iter().find(|t| t.name == fk.table).ok_or_else(|| {
                invalid(format!(
                    "'{}.{}' references undeclared table '{}'",
                    table.name, column.name, fk.table
                ))
            })?;
            if target.get_column(&fk.column).is_none() {
                return Err(invalid(format!(
                    "'{}.{}' references undeclared column '{}.{}'",
                    table.name, column.name, fk.table, fk.column
                )));
            }
        }
    }

    Ok(())
}

/// Stable topological sort: declaration order is kept wherever foreign keys
/// allow it.
fn creation_order(tables: Vec<TableDef>) -> Result<Vec<TableDef>> {
    let mut remaining: HashMap<String, usize> = tables
        .iter()
        .map(|t| (t.name.clone(), t.dependencies().len()))
        .collect();

    let mut ordered: Vec<TableDef> = Vec::with_capacity(tables.len());
    let mut pending: Vec<TableDef> = tables;

    while !pending.is_empty() {
        let Some(pos) = pending
            .iter()
            .position(|t| remaining.get(&t.name).copied() == Some(0))
        else {
            let cycle: Vec<&str> = pending.iter().map(|t| t.name.as_str()).collect();
            return Err(invalid(format!(
                "foreign key cycle between tables: {}",
                cycle.join(", ")
            )));
        };

        let table = pending.remove(pos);
        for other in &pending {
            if other.dependencies().contains(&table.name.as_str()) {
                if let Some(count) = remaining.get_mut(&other.name) {
                    *count -= 1;
                }
            }
        }
        ordered.push(table);
    }

    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::column::ColumnDef;
    use crate::schema::table::IndexDef;

    fn users() -> TableDef {
        TableDef::new("users")
            .column(ColumnDef::id())
            .column(ColumnDef::new("phone", SqlType::Varchar(Some(20))).not_null())
    }

    fn appointments() -> TableDef {
        TableDef::new("appointments")
            .column(ColumnDef::id())
            .column(
                ColumnDef::new("patient_id", SqlType::Integer)
                    .not_null()
                    .references("users", "id"),
            )
    }

    #[test]
    fn test_creation_order_follows_foreign_keys() {
        let schema = TargetSchema::new(vec![appointments(), users()]).unwrap();
        assert_eq!(schema.table_names(), vec!["users", "appointments"]);

        let drop: Vec<&str> = schema.drop_order().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(drop, vec!["appointments", "users"]);
    }

    #[test]
    fn test_declaration_order_kept_without_dependencies() {
        let services = TableDef::new("services").column(ColumnDef::id());
        let schema = TargetSchema::new(vec![services, users()]).unwrap();
        assert_eq!(schema.table_names(), vec!["services", "users"]);
    }

    #[test]
    fn test_rejects_duplicate_table() {
        let err = TargetSchema::new(vec![users(), users()]).unwrap_err();
        assert!(err.to_string().contains("duplicate table 'users'"));
    }

    #[test]
    fn test_rejects_duplicate_column() {
        let table = users().column(ColumnDef::new("phone", SqlType::Text));
        let err = TargetSchema::new(vec![table]).unwrap_err();
        assert!(err.to_string().contains("duplicate column 'users.phone'"));
    }

    #[test]
    fn test_rejects_dangling_foreign_key() {
        let err = TargetSchema::new(vec![appointments()]).unwrap_err();
        assert!(err.to_string().contains("undeclared table 'users'"));
    }

    #[test]
    fn test_rejects_cycle() {
        let a = TableDef::new("a")
            .column(ColumnDef::id())
            .column(ColumnDef::new("b_id", SqlType::Integer).references("b", "id"));
        let b = TableDef::new("b")
            .column(ColumnDef::id())
            .column(ColumnDef::new("a_id", SqlType::Integer).references("a", "id"));

        let err = TargetSchema::new(vec![a, b]).unwrap_err();
        assert!(err.to_string().contains("foreign key cycle"));
    }

    #[test]
    fn test_self_reference_is_not_a_cycle() {
        let staff = TableDef::new("staff")
            .column(ColumnDef::id())
            .column(ColumnDef::new("manager_id", SqlType::Integer).references("staff", "id"));
        assert!(TargetSchema::new(vec![staff]).is_ok());
    }

    #[test]
    fn test_rejects_index_on_unknown_column() {
        let table = users().index(IndexDef::new("idx_users_missing", &["missing"]));
        let err = TargetSchema::new(vec![table]).unwrap_err();
        assert!(err.to_string().contains("unknown column 'users.missing'"));
    }

    #[test]
    fn test_rejects_bad_identifiers() {
        let table = TableDef::new("Users").column(ColumnDef::id());
        assert!(TargetSchema::new(vec![table]).is_err());

        let table = TableDef::new("users").column(ColumnDef::new("drop table", SqlType::Text));
        assert!(TargetSchema::new(vec![table]).is_err());
    }

    #[test]
    fn test_rejects_empty_schema_and_table() {
        assert!(TargetSchema::new(vec![]).is_err());
        assert!(TargetSchema::new(vec![TableDef::new("empty")]).is_err());
    }

    #[test]
    fn test_column_rows() {
        let schema = TargetSchema::new(vec![users()]).unwrap();
        let rows = schema.column_rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].column, "id");
        assert!(!rows[0].nullable);
        assert_eq!(rows[1].sql_type, &SqlType::Varchar(Some(20)));
        assert_eq!(rows[1].default, None);
    }

    #[test]
    fn test_from_toml() {
        let toml = r#"
            [[tables]]
            name = "eye_products"

            [[tables.columns]]
            name = "id"
            type = "SERIAL"
            primary_key = true

            [[tables.columns]]
            name = "category"
            type = "VARCHAR(100)"
            nullable = false
            indexed = true

            [[tables.columns]]
            name = "stock_quantity"
            type = "INTEGER"
            nullable = false
            default = "0"
        "#;

        let schema = TargetSchema::from_toml(toml).unwrap();
        let table = schema.table("eye_products").unwrap();
        assert_eq!(table.columns.len(), 3);
        assert_eq!(table.all_indexes()[0].name, "ix_eye_products_category");
        assert_eq!(
            table.get_column("stock_quantity").unwrap().default.as_deref(),
            Some("0")
        );
    }

    #[test]
    fn test_from_toml_rejects_unknown_type() {
        let toml = r#"
            [[tables]]
            name = "places"

            [[tables.columns]]
            name = "shape"
            type = "GEOMETRY"
        "#;
        let err = TargetSchema::from_toml(toml).unwrap_err();
        assert!(matches!(err, MigrateError::InvalidSchema(_)));
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("emergency_contact_phone"));
        assert!(is_identifier("_private"));
        assert!(!is_identifier("9lives"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("users; drop"));
        assert!(!is_identifier(&"a".repeat(64)));
    }
}
