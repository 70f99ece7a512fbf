//! Data-only entity descriptors: the generated form of the metadata contract,
//! stored as JSON and loaded without recompiling anything.

use super::EntityMeta;
use crate::config::PersistConfig;
use crate::core::{PersistError, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityCatalog {
    pub namespace: String,
    pub entities: Vec<EntityMeta>,
}

impl EntityCatalog {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            entities: Vec::new(),
        }
    }

    /// Add or replace the descriptor of `meta.table_name()`.
    pub fn insert(&mut self, meta: EntityMeta) {
        match self
            .entities
            .iter_mut()
            .find(|existing| existing.table_name() == meta.table_name())
        {
            Some(existing) => *existing = meta,
            None => self.entities.push(meta),
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn get(&self, table: &str) -> Option<&EntityMeta> {
        self.entities.iter().find(|meta| meta.table_name() == table)
    }

    pub fn by_type_name(&self, type_name: &str) -> Option<&EntityMeta> {
        self.entities.iter().find(|meta| meta.type_name() == type_name)
    }

    /// Shared handle for constructing records of `table`.
    pub fn meta(&self, table: &str) -> Option<Arc<EntityMeta>> {
        self.get(table).cloned().map(Arc::new)
    }

    /// Type names a request layer may route to, in catalog order.
    pub fn endpoints(&self) -> Vec<String> {
        self.entities.iter().map(EntityMeta::type_name).collect()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| PersistError::Catalog(format!("Failed to serialize catalog: {}", e)))
    }

    /// Decode a catalog, re-validating every descriptor and attaching the
    /// default key generators described by `config`.
    pub fn from_json(json: &str, config: &PersistConfig) -> Result<Self> {
        let catalog: Self = serde_json::from_str(json)
            .map_err(|e| PersistError::Catalog(format!("Failed to parse catalog: {}", e)))?;

        let mut entities = Vec::with_capacity(catalog.entities.len());
        for meta in catalog.entities {
            meta.validate()?;
            entities.push(meta.with_default_key_generator(config));
        }
        Ok(Self {
            namespace: catalog.namespace,
            entities,
        })
    }

    /// Write the catalog through a temporary file so readers never see a
    /// partially written document.
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                PersistError::Catalog(format!("Failed to create catalog directory: {}", e))
            })?;
        }

        let json = self.to_json()?;
        let temp_path = path.with_extension("tmp");
        let temp_file = File::create(&temp_path)
            .map_err(|e| PersistError::Catalog(format!("Failed to create temp file: {}", e)))?;
        let mut writer = BufWriter::new(temp_file);
        writer
            .write_all(json.as_bytes())
            .map_err(|e| PersistError::Catalog(format!("Failed to write catalog: {}", e)))?;
        writer
            .flush()
            .map_err(|e| PersistError::Catalog(format!("Failed to flush catalog: {}", e)))?;
        writer
            .get_mut()
            .sync_all()
            .map_err(|e| PersistError::Catalog(format!("Failed to sync catalog: {}", e)))?;
        fs::rename(&temp_path, path)
            .map_err(|e| PersistError::Catalog(format!("Failed to rename catalog: {}", e)))?;

        tracing::debug!(path = %path.display(), entities = self.entities.len(), "catalog written");
        Ok(())
    }

    pub fn read_from<P: AsRef<Path>>(path: P, config: &PersistConfig) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| {
            PersistError::Catalog(format!("Failed to read catalog {}: {}", path.display(), e))
        })?;
        Self::from_json(&json, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::PrimaryKey;
    use crate::schema::{FieldDescriptor, FieldKind};
    use tempfile::TempDir;

    fn catalog() -> EntityCatalog {
        let mut catalog = EntityCatalog::new("shop");
        catalog.insert(
            EntityMeta::new(
                "order_items",
                vec![
                    FieldDescriptor::new("id", FieldKind::Int).with_length(11),
                    FieldDescriptor::new("status", FieldKind::Set).with_labels(["new", "paid"]),
                ],
                Some(PrimaryKey::new("id", true)),
            )
            .unwrap(),
        );
        catalog.insert(
            EntityMeta::new(
                "tokens",
                vec![FieldDescriptor::new("token", FieldKind::String).with_length(40)],
                Some(PrimaryKey::new("token", false)),
            )
            .unwrap(),
        );
        catalog
    }

    #[test]
    fn test_lookup_and_endpoints() {
        let catalog = catalog();
        assert_eq!(catalog.endpoints(), vec!["OrderItems", "Tokens"]);
        assert!(catalog.by_type_name("OrderItems").is_some());
        assert!(catalog.get("missing").is_none());
        assert!(catalog.meta("tokens").unwrap().primary_key().is_some());
    }

    #[test]
    fn test_insert_replaces_same_table() {
        let mut catalog = catalog();
        catalog.insert(EntityMeta::new("tokens", vec![], None).unwrap());
        assert_eq!(catalog.len(), 2);
        assert!(catalog.get("tokens").unwrap().is_read_only());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("meta").join("catalog.json");
        catalog().write_to(&path).unwrap();
        assert!(!path.with_extension("tmp").exists());

        let config = PersistConfig::new().key_separator(":");
        let loaded = EntityCatalog::read_from(&path, &config).unwrap();
        assert_eq!(loaded.namespace, "shop");
        assert_eq!(loaded.get("order_items").unwrap().fields()[1].labels, vec!["new", "paid"]);

        let key = loaded.get("tokens").unwrap().next_key().unwrap();
        assert!(key.as_text().unwrap().starts_with("tokens:"));
    }

    #[test]
    fn test_invalid_descriptor_rejected() {
        let json = r#"{
            "namespace": "x",
            "entities": [{
                "table_name": "t",
                "fields": [{ "name": "a", "kind": "int" }],
                "primary_key": { "name": "b", "auto_increment": true }
            }]
        }"#;
        let err = EntityCatalog::from_json(json, &PersistConfig::default()).unwrap_err();
        assert!(matches!(err, PersistError::Schema { .. }));
        assert!(matches!(
            EntityCatalog::from_json("not json", &PersistConfig::default()),
            Err(PersistError::Catalog(_))
        ));
    }
}
