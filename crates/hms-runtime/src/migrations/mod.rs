mod diff;
mod introspect;
mod runner;
mod store;

pub use diff::{
    ConflictKind, DatabaseColumn, DatabaseSchema, DatabaseTable, DiffAction, DiffEntry,
    SchemaChange, SchemaConflict, SchemaDiff,
};
pub use introspect::{can_create_in_schema, introspect};
pub use runner::{
    migrate, plan, MigrationMode, MigrationPhase, MigrationReport, MigrationRunner,
};
pub use store::{PgSchemaStore, SchemaStore, StoreFuture};
