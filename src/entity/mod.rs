pub mod catalog;
pub mod coerce;
pub mod meta;
pub mod value;

pub use catalog::EntityCatalog;
pub use meta::{Entity, EntityMeta, KeyGenerator, PrimaryKey, SequenceKey, TablePrefixedKey, UuidKey};
pub use value::FieldValue;
