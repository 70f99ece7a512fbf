use crate::core::{PersistError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How `set(...)` columns are exposed to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetColumnMode {
    /// `set` kind, values are integer bitmasks over the declared labels
    #[default]
    Bitmask,
    /// Plain `string` kind, labels are dropped
    PlainString,
}

/// Persistence configuration
///
/// Passed explicitly to the schema introspector and the descriptor catalog;
/// there is no process-wide configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistConfig {
    /// Namespace the generated descriptors belong to
    pub namespace: String,

    /// Representation of `set` columns
    pub set_columns: SetColumnMode,

    /// Random bytes in generated string keys
    pub key_random_bytes: usize,

    /// Separator between the table prefix and the random part of generated keys
    pub key_separator: String,
}

impl PersistConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self {
            namespace: "app".to_string(),
            set_columns: SetColumnMode::Bitmask,
            key_random_bytes: 12,
            key_separator: "-".to_string(),
        }
    }

    /// Set the descriptor namespace
    pub fn namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.to_string();
        self
    }

    /// Set how `set` columns are mapped
    pub fn set_columns(mut self, mode: SetColumnMode) -> Self {
        self.set_columns = mode;
        self
    }

    /// Set the number of random bytes in generated string keys
    pub fn key_random_bytes(mut self, bytes: usize) -> Self {
        self.key_random_bytes = bytes;
        self
    }

    /// Set the generated key separator
    pub fn key_separator(mut self, separator: &str) -> Self {
        self.key_separator = separator.to_string();
        self
    }

    /// Parse a JSON settings document. Missing keys keep their defaults.
    ///
    /// ```
    /// use persistdb::{PersistConfig, SetColumnMode};
    ///
    /// let config = PersistConfig::from_json_str(r#"{ "namespace": "shop", "set_columns": "plain_string" }"#).unwrap();
    /// assert_eq!(config.namespace, "shop");
    /// assert_eq!(config.set_columns, SetColumnMode::PlainString);
    /// assert_eq!(config.key_random_bytes, 12);
    /// ```
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| PersistError::Catalog(format!("Invalid settings: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON settings file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            PersistError::Catalog(format!("Failed to read settings {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    fn validate(&self) -> Result<()> {
        if self.key_random_bytes == 0 {
            return Err(PersistError::Catalog(
                "key_random_bytes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builder() {
        let config = PersistConfig::new()
            .namespace("kingsoft/api")
            .set_columns(SetColumnMode::PlainString)
            .key_random_bytes(8)
            .key_separator("_");

        assert_eq!(config.namespace, "kingsoft/api");
        assert_eq!(config.set_columns, SetColumnMode::PlainString);
        assert_eq!(config.key_random_bytes, 8);
        assert_eq!(config.key_separator, "_");
    }

    #[test]
    fn test_rejects_zero_random_bytes() {
        assert!(PersistConfig::from_json_str(r#"{ "key_random_bytes": 0 }"#).is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "namespace": "crm" }"#).unwrap();

        let config = PersistConfig::from_json_file(&path).unwrap();
        assert_eq!(config.namespace, "crm");
        assert_eq!(config.set_columns, SetColumnMode::Bitmask);

        assert!(PersistConfig::from_json_file(dir.path().join("missing.json")).is_err());
    }
}
