use super::FieldValue;
use crate::config::PersistConfig;
use crate::core::{PersistError, Result};
use crate::schema::{FieldDescriptor, FieldKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use uuid::Uuid;

/// Primary key of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKey {
    pub name: String,
    pub auto_increment: bool,
}

impl PrimaryKey {
    pub fn new(name: impl Into<String>, auto_increment: bool) -> Self {
        Self {
            name: name.into(),
            auto_increment,
        }
    }
}

/// Supplies the key of a new row when the database does not assign one.
pub trait KeyGenerator: fmt::Debug + Send + Sync {
    fn next_key(&self, meta: &EntityMeta) -> Result<FieldValue>;
}

/// `<table><separator><hex random bytes>` string keys.
#[derive(Debug, Clone)]
pub struct TablePrefixedKey {
    separator: String,
    random_bytes: usize,
}

impl TablePrefixedKey {
    pub fn new(separator: impl Into<String>, random_bytes: usize) -> Self {
        Self {
            separator: separator.into(),
            random_bytes: random_bytes.max(1),
        }
    }

    pub fn from_config(config: &PersistConfig) -> Self {
        Self::new(config.key_separator.clone(), config.key_random_bytes)
    }
}

impl Default for TablePrefixedKey {
    fn default() -> Self {
        Self::new("-", 12)
    }
}

impl KeyGenerator for TablePrefixedKey {
    fn next_key(&self, meta: &EntityMeta) -> Result<FieldValue> {
        let mut random = String::with_capacity(self.random_bytes * 2);
        while random.len() < self.random_bytes * 2 {
            for byte in Uuid::new_v4().as_bytes() {
                if random.len() == self.random_bytes * 2 {
                    break;
                }
                random.push_str(&format!("{:02x}", byte));
            }
        }
        Ok(FieldValue::Text(format!(
            "{}{}{}",
            meta.table_name(),
            self.separator,
            random
        )))
    }
}

/// Canonical UUID v4 string keys.
#[derive(Debug, Clone, Default)]
pub struct UuidKey;

impl KeyGenerator for UuidKey {
    fn next_key(&self, _meta: &EntityMeta) -> Result<FieldValue> {
        Ok(FieldValue::Text(Uuid::new_v4().to_string()))
    }
}

/// Monotonic integer keys for tables without auto-increment.
///
/// The counter lives in the process; callers sharing a table across processes
/// need a database sequence instead.
#[derive(Debug)]
pub struct SequenceKey {
    next: AtomicI64,
}

impl SequenceKey {
    pub fn starting_at(first: i64) -> Self {
        Self {
            next: AtomicI64::new(first),
        }
    }
}

impl KeyGenerator for SequenceKey {
    fn next_key(&self, _meta: &EntityMeta) -> Result<FieldValue> {
        Ok(FieldValue::Int(self.next.fetch_add(1, Ordering::SeqCst)))
    }
}

/// Static description of an entity: the sole contract between the schema
/// introspector (or a hand-written definition) and the persistence engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityMeta {
    table_name: String,
    fields: Vec<FieldDescriptor>,
    #[serde(default)]
    primary_key: Option<PrimaryKey>,
    #[serde(skip)]
    key_generator: Option<Arc<dyn KeyGenerator>>,
}

impl EntityMeta {
    /// Build and validate entity metadata.
    ///
    /// Field names must be unique and the primary key, if any, must be one of them.
    pub fn new(
        table_name: impl Into<String>,
        fields: Vec<FieldDescriptor>,
        primary_key: Option<PrimaryKey>,
    ) -> Result<Self> {
        let meta = Self {
            table_name: table_name.into(),
            fields,
            primary_key,
            key_generator: None,
        };
        meta.validate()?;
        Ok(meta)
    }

    /// Re-check the invariants, e.g. after deserializing a descriptor.
    pub fn validate(&self) -> Result<()> {
        if self.table_name.is_empty() {
            return Err(PersistError::schema("", "table name is empty"));
        }
        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.is_empty() {
                return Err(PersistError::schema(&self.table_name, "field with empty name"));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(PersistError::schema(
                    &self.table_name,
                    format!("duplicate field {}", field.name),
                ));
            }
        }
        if let Some(pk) = &self.primary_key
            && !seen.contains(pk.name.as_str())
        {
            return Err(PersistError::schema(
                &self.table_name,
                format!("primary key {} is not a field", pk.name),
            ));
        }
        Ok(())
    }

    /// Attach the strategy used to key new rows of a non auto-increment table.
    pub fn with_key_generator(mut self, generator: Arc<dyn KeyGenerator>) -> Self {
        self.key_generator = Some(generator);
        self
    }

    /// Attach the default generator for string keys unless one is already set.
    pub fn with_default_key_generator(self, config: &PersistConfig) -> Self {
        let wants_default = self.key_generator.is_none()
            && self
                .key_field()
                .is_some_and(|f| f.kind == FieldKind::String)
            && self.primary_key.as_ref().is_some_and(|pk| !pk.auto_increment);
        if wants_default {
            self.with_key_generator(Arc::new(TablePrefixedKey::from_config(config)))
        } else {
            self
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// PascalCase name derived from the table name (`order-items` → `OrderItems`).
    pub fn type_name(&self) -> String {
        self.table_name
            .replace('-', "_")
            .split('_')
            .filter(|part| !part.is_empty())
            .map(|part| {
                let mut chars = part.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect()
    }

    /// Fields in column order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field_index(name).is_some()
    }

    pub fn primary_key(&self) -> Option<&PrimaryKey> {
        self.primary_key.as_ref()
    }

    pub fn key_index(&self) -> Option<usize> {
        self.primary_key
            .as_ref()
            .and_then(|pk| self.field_index(&pk.name))
    }

    pub fn key_field(&self) -> Option<&FieldDescriptor> {
        self.key_index().map(|idx| &self.fields[idx])
    }

    pub fn is_auto_increment(&self) -> bool {
        self.primary_key.as_ref().is_some_and(|pk| pk.auto_increment)
    }

    /// Entities without a primary key can be read but not written.
    pub fn is_read_only(&self) -> bool {
        self.primary_key.is_none()
    }

    /// Produce the key for a new row of a non auto-increment table.
    ///
    /// The generated value must match the key field's kind. Integer keys have
    /// no default: a real sequence has to be attached.
    pub fn next_key(&self) -> Result<FieldValue> {
        let key_field = self.key_field().ok_or_else(|| PersistError::KeyGeneration {
            table: self.table_name.clone(),
            message: "entity has no primary key".to_string(),
        })?;

        let key = match &self.key_generator {
            Some(generator) => generator.next_key(self)?,
            None if key_field.kind == FieldKind::String => TablePrefixedKey::default().next_key(self)?,
            None => {
                return Err(PersistError::KeyGeneration {
                    table: self.table_name.clone(),
                    message: format!(
                        "{} key {} is not auto-increment and no key generator is attached",
                        key_field.kind, key_field.name
                    ),
                });
            }
        };

        let matches_kind = matches!(
            (key_field.kind, &key),
            (FieldKind::Int, FieldValue::Int(_)) | (FieldKind::String, FieldValue::Text(_))
        );
        if !matches_kind {
            return Err(PersistError::validation(
                &self.table_name,
                format!(
                    "key generator returned {} for {} key {}",
                    key.type_name(),
                    key_field.kind,
                    key_field.name
                ),
            ));
        }
        tracing::trace!(table = %self.table_name, key = %key, "generated primary key");
        Ok(key)
    }
}

/// A type that supplies its own entity metadata, e.g. a generated struct.
pub trait Entity {
    fn meta() -> Arc<EntityMeta>;
}
