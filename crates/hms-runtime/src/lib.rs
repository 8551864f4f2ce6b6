pub mod db;
pub mod migrations;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use db::Database;
pub use migrations::{
    migrate, plan, MigrationMode, MigrationPhase, MigrationReport, MigrationRunner,
    PgSchemaStore, SchemaDiff, SchemaStore,
};
