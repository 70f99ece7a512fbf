use std::fmt;
use thiserror::Error;

/// Errors raised by a database driver while preparing, binding, executing
/// or fetching a statement.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DbError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Column '{0}' not found in table '{1}'")]
    ColumnNotFound(String, String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),
}

pub type DbResult<T> = std::result::Result<T, DbError>;

/// The persistence operation an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Insert,
    Update,
    Delete,
    Thaw,
    Find,
    FindNext,
    ListTables,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Thaw => "thaw",
            Self::Find => "find",
            Self::FindNext => "find next",
            Self::ListTables => "list tables",
        };
        f.write_str(name)
    }
}

/// Engine level error taxonomy.
///
/// Every variant names the table it concerns. "Not found" is never an error:
/// lookups report it as `Ok(None)` / `Ok(false)`.
#[derive(Error, Debug)]
pub enum PersistError {
    /// Unknown field, wrong-kind value, or malformed filter/order input.
    /// Raised before any SQL is built.
    #[error("Validation error on {table}: {message}")]
    Validation { table: String, message: String },

    /// Write or key lookup attempted on an entity without a primary key.
    #[error("Entity {table} has no primary key and is read-only: cannot {operation}")]
    ReadOnly { table: String, operation: Operation },

    /// A table or column could not be described during introspection.
    #[error("Schema error on {table}: {message}")]
    Schema { table: String, message: String },

    /// Preparation or execution of SQL failed.
    #[error("Could not {operation} {table}: {source} [{sql}]")]
    Statement {
        table: String,
        operation: Operation,
        sql: String,
        #[source]
        source: DbError,
    },

    /// No next-key strategy exists for a non auto-increment primary key.
    #[error("Cannot generate key for {table}: {message}")]
    KeyGeneration { table: String, message: String },

    /// Descriptor catalog could not be read, written or decoded.
    #[error("Catalog error: {0}")]
    Catalog(String),
}

impl PersistError {
    pub fn validation(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            table: table.into(),
            message: message.into(),
        }
    }

    pub fn schema(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Schema {
            table: table.into(),
            message: message.into(),
        }
    }

    pub fn statement(
        table: impl Into<String>,
        operation: Operation,
        sql: impl Into<String>,
        source: DbError,
    ) -> Self {
        Self::Statement {
            table: table.into(),
            operation,
            sql: sql.into(),
            source,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::ReadOnly { .. })
    }

    /// Name of the table the error concerns, if any.
    pub fn table(&self) -> Option<&str> {
        match self {
            Self::Validation { table, .. }
            | Self::ReadOnly { table, .. }
            | Self::Schema { table, .. }
            | Self::Statement { table, .. }
            | Self::KeyGeneration { table, .. } => Some(table),
            Self::Catalog(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PersistError>;
