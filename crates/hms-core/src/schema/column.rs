use serde::{Deserialize, Serialize};

use super::types::SqlType;

/// Definition of a table column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name in SQL.
    pub name: String,

    /// SQL type.
    #[serde(rename = "type")]
    pub sql_type: SqlType,

    /// Whether the column accepts NULL. Primary keys never do.
    #[serde(default = "default_nullable")]
    pub nullable: bool,

    /// Default value expression (SQL).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    /// Unique constraint.
    #[serde(default)]
    pub unique: bool,

    /// Primary key.
    #[serde(default)]
    pub primary_key: bool,

    /// Create a single-column index named `ix_<table>_<column>`.
    #[serde(default)]
    pub indexed: bool,

    /// Foreign key target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<ForeignKey>,
}

fn default_nullable() -> bool {
    true
}

impl ColumnDef {
    /// Create a nullable column with no constraints.
    pub fn new(name: &str, sql_type: SqlType) -> Self {
        Self {
            name: name.to_string(),
            sql_type,
            nullable: true,
            default: None,
            unique: false,
            primary_key: false,
            indexed: false,
            references: None,
        }
    }

    /// Auto-incrementing integer primary key named `id`.
    pub fn id() -> Self {
        Self::new("id", SqlType::Serial).primary_key()
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    pub fn default_sql(mut self, expr: &str) -> Self {
        self.default = Some(expr.to_string());
        self
    }

    pub fn references(mut self, table: &str, column: &str) -> Self {
        self.references = Some(ForeignKey::new(table, column));
        self
    }

    /// Whether NULL is allowed once the column exists.
    pub fn is_nullable(&self) -> bool {
        self.nullable && !self.primary_key
    }

    /// Generate SQL column definition.
    pub fn to_sql_column(&self) -> String {
        let mut parts = vec![self.name.clone(), self.sql_type.to_sql()];

        if self.primary_key {
            parts.push("PRIMARY KEY".to_string());
        }

        if !self.is_nullable() && !self.primary_key {
            parts.push("NOT NULL".to_string());
        }

        if self.unique && !self.primary_key {
            parts.push("UNIQUE".to_string());
        }

        if let Some(ref default) = self.default {
            parts.push(format!("DEFAULT {}", default));
        }

        if let Some(ref fk) = self.references {
            parts.push(fk.to_sql());
        }

        parts.join(" ")
    }
}

/// Foreign key reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Referenced table.
    pub table: String,
    /// Referenced column.
    pub column: String,
    /// `ON DELETE` action (`CASCADE`, `SET NULL`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<String>,
}

impl ForeignKey {
    pub fn new(table: &str, column: &str) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
            on_delete: None,
        }
    }

    fn to_sql(&self) -> String {
        match self.on_delete {
            Some(ref action) => format!(
                "REFERENCES {}({}) ON DELETE {}",
                self.table, self.column, action
            ),
            None => format!("REFERENCES {}({})", self.table, self.column),
        }
    }
}
