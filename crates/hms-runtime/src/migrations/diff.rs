use std::fmt;

use serde::Serialize;

use hms_core::schema::{ColumnDef, IndexDef, SqlType, TableDef, TargetSchema};

/// Represents the difference between the target schema and the database.
///
/// Only ever additive: tables and columns the target does not mention are
/// reported as untracked and left alone.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchemaDiff {
    /// Changes to be applied, in execution order.
    pub entries: Vec<DiffEntry>,
    /// Existing columns the target declares incompatibly.
    pub conflicts: Vec<SchemaConflict>,
    /// Differences that are tolerated but worth telling the operator about.
    pub warnings: Vec<String>,
    /// Database columns the target does not declare (`table.column`).
    pub untracked: Vec<String>,
}

impl SchemaDiff {
    /// Create an empty diff.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare the target schema to an introspected database schema.
    pub fn from_comparison(target: &TargetSchema, actual: &DatabaseSchema) -> Self {
        let mut diff = Self::new();

        for table in target.tables() {
            match actual.table(&table.name) {
                None => {
                    diff.entries.push(DiffEntry::create_table(table));
                    for index in table.all_indexes() {
                        diff.entries.push(DiffEntry::create_index(&table.name, index));
                    }
                }
                Some(db) => diff.compare_table(table, db),
            }
        }

        diff
    }

    /// Everything a reset would do: drop the target tables that exist, then
    /// recreate the whole target on the emptied schema.
    pub fn from_reset(target: &TargetSchema, actual: &DatabaseSchema) -> Self {
        let emptied = actual.without_tables(&target.table_names());
        let mut diff = Self::from_comparison(target, &emptied);

        let mut entries = Self::reset_drops(target, actual);
        entries.append(&mut diff.entries);
        diff.entries = entries;
        diff
    }

    /// `DropTable` entries for the target tables present in the database,
    /// dependents first.
    pub fn reset_drops(target: &TargetSchema, actual: &DatabaseSchema) -> Vec<DiffEntry> {
        target
            .drop_order()
            .into_iter()
            .filter(|t| actual.table(&t.name).is_some())
            .map(|t| DiffEntry::drop_table(&t.name))
            .collect()
    }

    fn compare_table(&mut self, table: &TableDef, db: &DatabaseTable) {
        for column in &table.columns {
            match db.column(&column.name) {
                None if repeats_fill_value(column) => self.conflicts.push(SchemaConflict {
                    table: table.name.clone(),
                    column: column.name.clone(),
                    kind: ConflictKind::UniqueWithoutDefault,
                }),
                None => self
                    .entries
                    .push(DiffEntry::add_column(&table.name, column)),
                Some(db_col) => self.compare_column(&table.name, column, db_col),
            }
        }

        for index in table.all_indexes() {
            if !db.indexes.iter().any(|name| *name == index.name) {
                self.entries.push(DiffEntry::create_index(&table.name, index));
            }
        }

        for db_col in &db.columns {
            if table.get_column(&db_col.name).is_none() {
                self.untracked.push(format!("{}.{}", table.name, db_col.name));
            }
        }
    }

    fn compare_column(&mut self, table: &str, column: &ColumnDef, db_col: &DatabaseColumn) {
        if !column.sql_type.accepts(&db_col.sql_type) {
            self.conflicts.push(SchemaConflict {
                table: table.to_string(),
                column: column.name.clone(),
                kind: ConflictKind::TypeMismatch {
                    expected: column.sql_type.to_sql(),
                    actual: db_col.sql_type.to_sql(),
                },
            });
        }

        if column.is_nullable() && !db_col.nullable {
            self.conflicts.push(SchemaConflict {
                table: table.to_string(),
                column: column.name.clone(),
                kind: ConflictKind::NotNullInDatabase,
            });
        }

        if column.unique && !column.primary_key && !db_col.unique {
            self.conflicts.push(SchemaConflict {
                table: table.to_string(),
                column: column.name.clone(),
                kind: ConflictKind::MissingUnique,
            });
        }

        if !column.is_nullable() && db_col.nullable {
            self.warnings.push(format!(
                "{}.{} is declared NOT NULL but the database allows NULL",
                table, column.name
            ));
        }
    }

    /// Check if there are any changes.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    /// Number of entries with the given action.
    pub fn count(&self, action: DiffAction) -> usize {
        self.entries.iter().filter(|e| e.action() == action).count()
    }

    /// One-line description such as `create 2 table(s), add 11 column(s)`.
    pub fn summary(&self) -> String {
        if self.entries.is_empty() {
            return "up to date".to_string();
        }

        let parts: Vec<String> = [
            (DiffAction::DropTable, "drop", "table(s)"),
            (DiffAction::CreateTable, "create", "table(s)"),
            (DiffAction::AddColumn, "add", "column(s)"),
            (DiffAction::CreateIndex, "create", "index(es)"),
        ]
        .iter()
        .filter_map(|(action, verb, noun)| match self.count(*action) {
            0 => None,
            n => Some(format!("{} {} {}", verb, n, noun)),
        })
        .collect();

        parts.join(", ")
    }
}

/// A single diff entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffEntry {
    /// The typed change.
    pub change: SchemaChange,
    /// Affected table name.
    pub table_name: String,
    /// Human-readable description.
    pub details: String,
    /// SQL to apply.
    pub sql: String,
}

impl DiffEntry {
    fn create_table(table: &TableDef) -> Self {
        Self {
            change: SchemaChange::CreateTable(table.clone()),
            table_name: table.name.clone(),
            details: format!("Create table {}", table.name),
            sql: table.to_create_table_sql(),
        }
    }

    fn add_column(table_name: &str, declared: &ColumnDef) -> Self {
        let column = additive_column(declared);
        Self {
            details: format!("Add column {}.{}", table_name, column.name),
            sql: format!(
                "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {};",
                table_name,
                column.to_sql_column()
            ),
            change: SchemaChange::AddColumn(column),
            table_name: table_name.to_string(),
        }
    }

    fn create_index(table_name: &str, index: IndexDef) -> Self {
        Self {
            details: format!("Create index {} on {}", index.name, table_name),
            sql: index.to_create_index_sql(table_name),
            change: SchemaChange::CreateIndex(index),
            table_name: table_name.to_string(),
        }
    }

    fn drop_table(table_name: &str) -> Self {
        Self {
            change: SchemaChange::DropTable,
            table_name: table_name.to_string(),
            details: format!("Drop table {}", table_name),
            sql: format!("DROP TABLE IF EXISTS {} CASCADE;", table_name),
        }
    }

    pub fn action(&self) -> DiffAction {
        match self.change {
            SchemaChange::CreateTable(_) => DiffAction::CreateTable,
            SchemaChange::AddColumn(_) => DiffAction::AddColumn,
            SchemaChange::CreateIndex(_) => DiffAction::CreateIndex,
            SchemaChange::DropTable => DiffAction::DropTable,
        }
    }
}

/// The column as it will be added to a table that may hold rows: a NOT NULL
/// column without a default gets its type's zero value.
fn additive_column(declared: &ColumnDef) -> ColumnDef {
    let mut column = declared.clone();
    if !column.is_nullable() && column.default.is_none() && column.sql_type != SqlType::Serial {
        column.default = column.sql_type.zero_value().map(str::to_string);
    }
    column
}

/// Whether adding the column to a populated table would write one zero
/// value into every row of a column that must stay unique.
fn repeats_fill_value(declared: &ColumnDef) -> bool {
    (declared.unique || declared.primary_key)
        && !declared.is_nullable()
        && declared.default.is_none()
        && !matches!(declared.sql_type, SqlType::Serial | SqlType::Uuid)
}

/// Typed payload of a diff entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "definition", rename_all = "snake_case")]
pub enum SchemaChange {
    CreateTable(TableDef),
    AddColumn(ColumnDef),
    CreateIndex(IndexDef),
    DropTable,
}

/// Type of schema change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffAction {
    CreateTable,
    AddColumn,
    CreateIndex,
    DropTable,
}

/// An existing column the target schema cannot use as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaConflict {
    pub table: String,
    pub column: String,
    pub kind: ConflictKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConflictKind {
    /// The stored type cannot hold what the application writes.
    TypeMismatch { expected: String, actual: String },
    /// Declared nullable, but the database rejects NULL.
    NotNullInDatabase,
    /// Declared unique, but the database does not enforce it.
    MissingUnique,
    /// New NOT NULL unique column without a default: existing rows would
    /// all get the same value.
    UniqueWithoutDefault,
}

impl fmt::Display for SchemaConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ConflictKind::TypeMismatch {
                ref expected,
                ref actual,
            } => write!(
                f,
                "{}.{} is {} in the database but declared {}",
                self.table, self.column, actual, expected
            ),
            ConflictKind::NotNullInDatabase => write!(
                f,
                "{}.{} is NOT NULL in the database but declared nullable",
                self.table, self.column
            ),
            ConflictKind::MissingUnique => write!(
                f,
                "{}.{} is declared UNIQUE but has no unique constraint",
                self.table, self.column
            ),
            ConflictKind::UniqueWithoutDefault => write!(
                f,
                "{}.{} is a new NOT NULL UNIQUE column without a default",
                self.table, self.column
            ),
        }
    }
}

/// Introspected state of the tables a target schema names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatabaseSchema {
    pub tables: Vec<DatabaseTable>,
}

impl DatabaseSchema {
    pub fn new(tables: Vec<DatabaseTable>) -> Self {
        Self { tables }
    }

    pub fn table(&self, name: &str) -> Option<&DatabaseTable> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.name.clone()).collect()
    }

    /// The same schema with the named tables removed.
    pub fn without_tables(&self, names: &[String]) -> Self {
        Self {
            tables: self
                .tables
                .iter()
                .filter(|t| !names.contains(&t.name))
                .cloned()
                .collect(),
        }
    }
}

/// Representation of a database table (from introspection).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseTable {
    pub name: String,
    pub columns: Vec<DatabaseColumn>,
    /// Index names, including constraint-backed ones.
    pub indexes: Vec<String>,
}

impl DatabaseTable {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn column(&self, name: &str) -> Option<&DatabaseColumn> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Representation of a database column (from introspection).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseColumn {
    pub name: String,
    pub sql_type: SqlType,
    pub nullable: bool,
    pub default: Option<String>,
    /// Covered by a single-column unique index or primary key.
    pub unique: bool,
}

impl DatabaseColumn {
    /// The column PostgreSQL ends up with after `ColumnDef` DDL runs.
    pub fn from_def(def: &ColumnDef) -> Self {
        Self {
            name: def.name.clone(),
            sql_type: def.sql_type.clone(),
            nullable: def.is_nullable(),
            default: def.default.clone(),
            unique: def.unique || def.primary_key,
        }
    }
}
