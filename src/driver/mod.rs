//! The database execution interface the engine consumes.
//!
//! Parameters are bound by name, including the leading `:` (`":age"`).
//! A connection is used from one thread; statements borrow nothing from it.

pub mod logging;
pub mod memory;

use crate::core::{DbResult, SqlValue};

pub use logging::{Execution, LoggingConnection};
pub use memory::{ColumnDef, MemoryConnection, TableDef};

/// A ready-to-use database handle.
pub trait Connection {
    /// Prepare `sql` for repeated execution.
    fn prepare(&self, sql: &str) -> DbResult<Box<dyn Statement>>;

    /// Key generated by the most recent auto-increment insert on this connection.
    fn last_insert_id(&self) -> DbResult<SqlValue>;
}

/// A prepared statement.
pub trait Statement {
    fn sql(&self) -> &str;

    fn bind_value(&mut self, name: &str, value: SqlValue) -> DbResult<()>;

    /// Run the statement with the current bindings. Re-executing a query
    /// reopens its result cursor.
    fn execute(&mut self) -> DbResult<bool>;

    /// Fetch the next row of the open cursor into `target`, column by column.
    /// Returns `Ok(false)` once the cursor is exhausted.
    fn fetch_into(&mut self, target: &mut dyn FetchTarget) -> DbResult<bool>;
}

/// Receives fetched columns directly, without an intermediate row type.
pub trait FetchTarget {
    fn assign_column(&mut self, column: &str, value: SqlValue) -> DbResult<()>;
}
