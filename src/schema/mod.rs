pub mod descriptor;
pub mod introspector;
pub mod type_mapper;

pub use descriptor::{FieldDescriptor, FieldKind};
pub use introspector::{ColumnInfo, SchemaIntrospector, SchemaScan};
pub use type_mapper::{ColumnType, kind_of, map_column, parse_column_type};
