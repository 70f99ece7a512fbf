// ============================================================================
// PersistDB Library
// ============================================================================

//! Schema-driven persistence for relational tables.
//!
//! The schema introspector describes tables as [`EntityMeta`]; a generic
//! [`Record`] then creates, reads, updates, deletes and traverses rows using
//! nothing but that metadata.
//!
//! ```
//! use persistdb::{ColumnDef, FieldValue, MemoryConnection, PersistConfig, Record, SchemaIntrospector, TableDef};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let conn = MemoryConnection::new().with_table(
//!     TableDef::new("users")
//!         .column(ColumnDef::new("id", "int(11)").primary_key().auto_increment())
//!         .column(ColumnDef::new("name", "varchar(50)")),
//! )?;
//!
//! let meta = Arc::new(SchemaIntrospector::new(&conn, PersistConfig::default()).entity_meta("users")?);
//!
//! let mut user = Record::new(&conn, Arc::clone(&meta));
//! user.set("name", "Ada")?;
//! user.insert()?;
//!
//! let loaded = Record::load(&conn, meta, user.key().cloned())?.expect("row exists");
//! assert_eq!(loaded.get("name")?, &FieldValue::from("Ada"));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod driver;
pub mod dsl;
pub mod engine;
pub mod entity;
pub mod schema;
pub mod sql;

// Re-export main types for convenience
pub use config::{PersistConfig, SetColumnMode};
pub use core::{DbError, DbResult, Operation, PersistError, Result, SqlValue};
pub use engine::{FindAll, Record, RecordState};
pub use entity::{
    Entity, EntityCatalog, EntityMeta, FieldValue, KeyGenerator, PrimaryKey, SequenceKey,
    TablePrefixedKey, UuidKey,
};
pub use schema::{FieldDescriptor, FieldKind, SchemaIntrospector};

// Re-export the driver interface
pub use driver::{
    ColumnDef, Connection, FetchTarget, LoggingConnection, MemoryConnection, Statement, TableDef,
};

// Re-export the query language
pub use dsl::{Direction, FilterSpec, OrderSpec};
