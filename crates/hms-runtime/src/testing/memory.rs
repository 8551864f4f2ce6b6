//! In-memory database for exercising the runner without PostgreSQL.
//!
//! Behaves like a PostgreSQL schema that supports transactional DDL: a
//! [`MemoryStore`] works on a private copy of the tables and only publishes
//! it on commit.

use std::collections::BTreeMap;
use std::future;
use std::sync::{Arc, RwLock};

use hms_core::error::{MigrateError, Result};
use hms_core::schema::{ColumnDef, SqlType};

use crate::migrations::{
    DatabaseColumn, DatabaseSchema, DatabaseTable, DiffEntry, SchemaChange, SchemaStore,
    StoreFuture,
};

/// One stored row: column name to value, `None` for NULL.
pub type Row = BTreeMap<String, Option<String>>;

#[derive(Debug, Clone)]
struct MemoryTable {
    table: DatabaseTable,
    rows: Vec<Row>,
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: Vec<MemoryTable>,
    unreachable: bool,
    ddl_denied: bool,
    fail_on: Option<usize>,
    attempted: usize,
    committed: Vec<String>,
}

/// Shared handle to an in-memory database.
///
/// # Example
///
/// ```ignore
/// let db = MemoryDatabase::new();
/// MigrationRunner::new(&target).run(db.store(), MigrationMode::Apply).await?;
/// assert!(db.table("users").is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryDatabase {
    /// Create an empty, reachable database.
    pub fn new() -> Self {
        Self::default()
    }

    /// A database that refuses every connection.
    pub fn unreachable() -> Self {
        let db = Self::new();
        db.state.write().unwrap().unreachable = true;
        db
    }

    /// Connections succeed but the role may not run DDL.
    pub fn without_ddl_privilege(self) -> Self {
        self.state.write().unwrap().ddl_denied = true;
        self
    }

    /// The `n`-th statement a store runs (1-based) fails.
    pub fn fail_on_statement(self, n: usize) -> Self {
        self.state.write().unwrap().fail_on = Some(n);
        self
    }

    /// Stop injecting statement failures.
    pub fn clear_failure(&self) {
        self.state.write().unwrap().fail_on = None;
    }

    /// Open a new unit of work.
    pub fn store(&self) -> MemoryStore {
        let staged = self.state.read().unwrap().tables.clone();
        MemoryStore {
            state: Arc::clone(&self.state),
            staged,
            executed: Vec::new(),
        }
    }

    /// Insert a row, filling unspecified columns from their defaults.
    ///
    /// Panics if the table does not exist.
    pub fn insert_row(&self, table: &str, values: &[(&str, &str)]) {
        let mut state = self.state.write().unwrap();
        let target = state
            .tables
            .iter_mut()
            .find(|t| t.table.name == table)
            .unwrap_or_else(|| panic!("table {} does not exist", table));

        let next_id = target.rows.len() + 1;
        let row: Row = target
            .table
            .columns
            .iter()
            .map(|column| {
                let value = values
                    .iter()
                    .find(|(name, _)| *name == column.name)
                    .map(|(_, value)| value.to_string())
                    .or_else(|| column_default(column, next_id));
                (column.name.clone(), value)
            })
            .collect();
        target.rows.push(row);
    }

    /// Committed state of one table.
    pub fn table(&self, name: &str) -> Option<DatabaseTable> {
        self.state
            .read()
            .unwrap()
            .tables
            .iter()
            .find(|t| t.table.name == name)
            .map(|t| t.table.clone())
    }

    /// Names of all committed tables, in creation order.
    pub fn table_names(&self) -> Vec<String> {
        self.state
            .read()
            .unwrap()
            .tables
            .iter()
            .map(|t| t.table.name.clone())
            .collect()
    }

    /// Committed schema of every table.
    pub fn snapshot(&self) -> DatabaseSchema {
        DatabaseSchema::new(
            self.state
                .read()
                .unwrap()
                .tables
                .iter()
                .map(|t| t.table.clone())
                .collect(),
        )
    }

    /// Committed rows of a table, empty if it does not exist.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state
            .read()
            .unwrap()
            .tables
            .iter()
            .find(|t| t.table.name == table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.rows(table).len()
    }

    /// Statements any store has tried to run, committed or not.
    pub fn statements_attempted(&self) -> usize {
        self.state.read().unwrap().attempted
    }

    /// SQL of every committed statement, in order.
    pub fn committed_statements(&self) -> Vec<String> {
        self.state.read().unwrap().committed.clone()
    }
}

/// A unit of work against a [`MemoryDatabase`].
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
    staged: Vec<MemoryTable>,
    executed: Vec<String>,
}

impl MemoryStore {
    fn ensure_reachable(&self) -> Result<()> {
        if self.state.read().unwrap().unreachable {
            return Err(MigrateError::Connection(
                "connection refused (in-memory database is unreachable)".to_string(),
            ));
        }
        Ok(())
    }

    /// Count a statement and fail it if a failure was injected for it.
    fn begin_statement(&mut self, sql: &str) -> Result<()> {
        self.ensure_reachable()?;

        let mut state = self.state.write().unwrap();
        state.attempted += 1;
        let position = self.executed.len() + 1;
        if state.fail_on == Some(position) {
            return Err(MigrateError::Database(format!(
                "injected failure at statement {}: {}",
                position, sql
            )));
        }
        Ok(())
    }

    fn staged_table(&mut self, name: &str) -> Result<&mut MemoryTable> {
        self.staged
            .iter_mut()
            .find(|t| t.table.name == name)
            .ok_or_else(|| MigrateError::Database(format!("relation \"{}\" does not exist", name)))
    }

    fn apply(&mut self, entry: &DiffEntry) -> Result<()> {
        self.begin_statement(&entry.sql)?;

        match &entry.change {
            SchemaChange::CreateTable(def) => {
                if !self.staged.iter().any(|t| t.table.name == def.name) {
                    let mut table = DatabaseTable::new(&def.name);
                    for column in &def.columns {
                        add_column(&mut table, column);
                    }
                    self.staged.push(MemoryTable {
                        table,
                        rows: Vec::new(),
                    });
                }
            }
            SchemaChange::AddColumn(def) => {
                let target = self.staged_table(&entry.table_name)?;
                if target.table.column(&def.name).is_none() {
                    if !def.is_nullable() && def.default.is_none() && !target.rows.is_empty() {
                        return Err(MigrateError::Database(format!(
                            "column \"{}\" of relation \"{}\" contains null values",
                            def.name, entry.table_name
                        )));
                    }
                    add_column(&mut target.table, def);
                    let column = DatabaseColumn::from_def(def);
                    for (i, row) in target.rows.iter_mut().enumerate() {
                        row.insert(def.name.clone(), column_default(&column, i + 1));
                    }
                }
            }
            SchemaChange::CreateIndex(index) => {
                let target = self.staged_table(&entry.table_name)?;
                if !target.table.indexes.contains(&index.name) {
                    target.table.indexes.push(index.name.clone());
                }
                if let (true, [only]) = (index.unique, index.columns.as_slice()) {
                    if let Some(column) = target.table.columns.iter_mut().find(|c| c.name == *only)
                    {
                        column.unique = true;
                    }
                }
            }
            SchemaChange::DropTable => {
                self.staged.retain(|t| t.table.name != entry.table_name);
            }
        }

        self.executed.push(entry.sql.clone());
        Ok(())
    }
}

impl SchemaStore for MemoryStore {
    fn verify(&mut self) -> StoreFuture<'_, ()> {
        let result = self.ensure_reachable().and_then(|_| {
            if self.state.read().unwrap().ddl_denied {
                Err(MigrateError::Permission(
                    "permission denied for schema public".to_string(),
                ))
            } else {
                Ok(())
            }
        });
        Box::pin(future::ready(result))
    }

    fn introspect<'a>(&'a mut self, tables: &'a [String]) -> StoreFuture<'a, DatabaseSchema> {
        let result = self.ensure_reachable().map(|_| {
            DatabaseSchema::new(
                tables
                    .iter()
                    .filter_map(|name| self.staged.iter().find(|t| t.table.name == *name))
                    .map(|t| t.table.clone())
                    .collect(),
            )
        });
        Box::pin(future::ready(result))
    }

    fn drop_tables<'a>(&'a mut self, tables: &'a [String]) -> StoreFuture<'a, ()> {
        let result: Result<()> = tables.iter().try_for_each(|name| {
            let sql = format!("DROP TABLE IF EXISTS {} CASCADE;", name);
            self.begin_statement(&sql)?;
            self.staged.retain(|t| t.table.name != *name);
            self.executed.push(sql);
            Ok(())
        });
        Box::pin(future::ready(result))
    }

    fn execute<'a>(&'a mut self, entry: &'a DiffEntry) -> StoreFuture<'a, ()> {
        Box::pin(future::ready(self.apply(entry)))
    }

    fn commit(self) -> StoreFuture<'static, ()> {
        if let Err(e) = self.ensure_reachable() {
            return Box::pin(future::ready(Err(e)));
        }

        let mut state = self.state.write().unwrap();
        state.tables = self.staged;
        state.committed.extend(self.executed);
        Box::pin(future::ready(Ok(())))
    }
}

/// Add a column the way PostgreSQL would, including the index backing a
/// primary key or unique constraint.
fn add_column(table: &mut DatabaseTable, def: &ColumnDef) {
    let constraint = if def.primary_key {
        Some(format!("{}_pkey", table.name))
    } else if def.unique {
        Some(format!("{}_{}_key", table.name, def.name))
    } else {
        None
    };
    table.columns.push(DatabaseColumn::from_def(def));
    table.indexes.extend(constraint);
}

/// Value a new row (or an existing row gaining the column) gets.
fn column_default(column: &DatabaseColumn, ordinal: usize) -> Option<String> {
    if column.sql_type == SqlType::Serial {
        return Some(ordinal.to_string());
    }
    column.default.as_ref().map(|expr| {
        expr.strip_prefix('\'')
            .and_then(|rest| rest.split_once('\''))
            .map(|(literal, _)| literal.to_string())
            .unwrap_or_else(|| expr.clone())
    })
}
