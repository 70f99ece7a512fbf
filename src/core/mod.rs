pub mod error;
pub mod value;

pub use error::{DbError, DbResult, Operation, PersistError, Result};
pub use value::SqlValue;
