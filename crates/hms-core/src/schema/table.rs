use serde::{Deserialize, Serialize};

use super::column::ColumnDef;

/// Definition of a database table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    /// Table name in SQL.
    pub name: String,

    /// Columns, in declaration order.
    pub columns: Vec<ColumnDef>,

    /// Explicit (usually composite) indexes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<IndexDef>,
}

impl TableDef {
    /// Create a new table definition with no columns.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    /// Get a column by name.
    pub fn get_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// All indexes: per-column `indexed` flags followed by explicit ones.
    pub fn all_indexes(&self) -> Vec<IndexDef> {
        let mut indexes: Vec<IndexDef> = self
            .columns
            .iter()
            .filter(|c| c.indexed && !c.primary_key)
            .map(|c| IndexDef::new(&format!("ix_{}_{}", self.name, c.name), &[c.name.as_str()]))
            .collect();
        indexes.extend(self.indexes.iter().cloned());
        indexes
    }

    /// Tables this one references through foreign keys, excluding itself.
    pub fn dependencies(&self) -> Vec<&str> {
        let mut deps: Vec<&str> = Vec::new();
        for column in &self.columns {
            if let Some(ref fk) = column.references {
                if fk.table != self.name && !deps.contains(&fk.table.as_str()) {
                    deps.push(fk.table.as_str());
                }
            }
        }
        deps
    }

    /// Generate CREATE TABLE SQL.
    pub fn to_create_table_sql(&self) -> String {
        let columns: Vec<String> = self.columns.iter().map(|c| c.to_sql_column()).collect();

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n);",
            self.name,
            columns.join(",\n    ")
        )
    }
}

/// Index definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    /// Index name (unique within the schema).
    pub name: String,
    /// Indexed columns, in order.
    pub columns: Vec<String>,
    /// Unique index.
    #[serde(default)]
    pub unique: bool,
}

impl IndexDef {
    pub fn new(name: &str, columns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Generate CREATE INDEX SQL for the given table.
    pub fn to_create_index_sql(&self, table: &str) -> String {
        format!(
            "CREATE {}INDEX IF NOT EXISTS {} ON {} ({});",
            if self.unique { "UNIQUE " } else { "" },
            self.name,
            table,
            self.columns.join(", ")
        )
    }
}
