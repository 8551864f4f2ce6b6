mod column;
mod table;
mod target;
mod types;

pub use column::{ColumnDef, ForeignKey};
pub use table::{IndexDef, TableDef};
pub use target::{is_identifier, ColumnRow, TargetSchema};
pub use types::SqlType;
