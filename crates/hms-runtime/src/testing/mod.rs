//! Testing utilities.
//!
//! [`MemoryDatabase`] stands in for PostgreSQL in unit tests of the runner;
//! [`TestDatabase`] connects to a real server for the ignored integration
//! tests.

mod db;
mod memory;

pub use db::{TestDatabase, TEST_DATABASE_URL_VAR};
pub use memory::{MemoryDatabase, MemoryStore, Row};
