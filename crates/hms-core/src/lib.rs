//! Schema model, configuration and error types for the hospital backend
//! migrator.

pub mod catalog;
pub mod config;
pub mod error;
pub mod schema;

pub use catalog::hospital_schema;
pub use config::{DatabaseConfig, MigrateConfig, MigrationConfig};
pub use error::{MigrateError, Result};
pub use schema::{ColumnDef, IndexDef, SqlType, TableDef, TargetSchema};
