//! Store configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::db::{default_database_path, validate_identifier};
use crate::error::ConfigError;
use crate::reconcile::{DEFAULT_DELETE_BATCH_SIZE, MAX_DELETE_BATCH_SIZE};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite file; falls back to `~/.kbstore/data/kbstore.db`.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// Root schema name. Prefixes every table.
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_delete_batch_size")]
    pub delete_batch_size: usize,
}

fn default_schema() -> String {
    "knowledge_base".to_string()
}

fn default_delete_batch_size() -> usize {
    DEFAULT_DELETE_BATCH_SIZE
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            schema: default_schema(),
            delete_batch_size: default_delete_batch_size(),
        }
    }
}

impl StoreConfig {
    pub fn with_schema(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            ..Self::default()
        }
    }

    /// The configured database path, or the platform default.
    pub fn resolved_database_path(&self) -> Option<PathBuf> {
        self.database_path.clone().or_else(default_database_path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !validate_identifier(&self.schema) {
            return Err(ConfigError::Validation {
                message: format!(
                    "schema '{}' must match [A-Za-z_][A-Za-z0-9_]*",
                    self.schema
                ),
            });
        }
        if !(1..=MAX_DELETE_BATCH_SIZE).contains(&self.delete_batch_size) {
            return Err(ConfigError::Validation {
                message: format!(
                    "delete_batch_size must be between 1 and {}, got {}",
                    MAX_DELETE_BATCH_SIZE, self.delete_batch_size
                ),
            });
        }
        Ok(())
    }
}

/// Loads a config file. `.json` files are parsed as JSON, anything else
/// as YAML.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<StoreConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let config: StoreConfig = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&content)?,
        _ => serde_yaml::from_str(&content)?,
    };
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.schema, "knowledge_base");
        assert_eq!(config.delete_batch_size, DEFAULT_DELETE_BATCH_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "schema: plant\ndelete_batch_size: 50\ndatabase_path: /tmp/plant.db").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.schema, "plant");
        assert_eq!(config.delete_batch_size, 50);
        assert_eq!(config.resolved_database_path(), Some(PathBuf::from("/tmp/plant.db")));
    }

    #[test]
    fn test_load_json_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, r#"{"schema": "plant"}"#).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.schema, "plant");
        assert_eq!(config.delete_batch_size, DEFAULT_DELETE_BATCH_SIZE);
        assert!(config.database_path.is_none());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.yaml");

        std::fs::write(&path, "schema: \"drop table\"\n").unwrap();
        assert!(matches!(
            load_config(&path),
            Err(ConfigError::Validation { .. })
        ));

        std::fs::write(&path, "delete_batch_size: 0\n").unwrap();
        assert!(matches!(
            load_config(&path),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn test_delete_batch_size_bounds() {
        let mut config = StoreConfig {
            delete_batch_size: MAX_DELETE_BATCH_SIZE,
            ..StoreConfig::default()
        };
        assert!(config.validate().is_ok());

        config.delete_batch_size = MAX_DELETE_BATCH_SIZE + 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation { .. })
        ));

        config.delete_batch_size = 100_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_keyword_schema_accepted() {
        assert!(StoreConfig::with_schema("order").validate().is_ok());
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load_config("/nonexistent/store.yaml"),
            Err(ConfigError::ReadFile { .. })
        ));
    }
}
