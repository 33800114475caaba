// SPDX-License-Identifier: Apache-2.0

//! Runtime configuration
//!
//! Loaded from a JSON file (every field optional) with `POLYSTORE_*`
//! environment overrides for the schema engine dbids.

use std::path::Path;

use polystore_core::{DataFormat, DbId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

const DEFAULT_PIPE_CAPACITY_BYTES: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {message}")]
    Read { path: String, message: String },

    #[error("Failed to parse config: {message}")]
    Parse { message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidEnv { key: String, value: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolystoreConfig {
    pub schema_engines: SchemaEngineConfig,
    pub migration: MigrationConfig,
}

/// Canonical schema instances per island, plus the instances that execute
/// pass-through islands directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaEngineConfig {
    pub relational: DbId,
    pub array: DbId,
    pub text: DbId,
    pub stream: Option<DbId>,
    pub dataflow: Option<DbId>,
}

impl Default for SchemaEngineConfig {
    fn default() -> Self {
        Self {
            relational: DbId(0),
            array: DbId(1),
            text: DbId(2),
            stream: None,
            dataflow: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    pub pipe_capacity_bytes: usize,
    /// Deadline for the joint completion of export and load.
    pub timeout_ms: Option<u64>,
    pub drop_existing_destination: bool,
    pub row_count_policy: RowCountPolicy,
    pub default_format: DataFormat,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            pipe_capacity_bytes: DEFAULT_PIPE_CAPACITY_BYTES,
            timeout_ms: None,
            drop_existing_destination: true,
            row_count_policy: RowCountPolicy::default(),
            default_format: DataFormat::Csv,
        }
    }
}

/// What to do when fewer rows were loaded than extracted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RowCountPolicy {
    Ignore,
    #[default]
    Warn,
    /// Fail the migration when more than `max_missing` rows went missing.
    Fail { max_missing: u64 },
}

impl PolystoreConfig {
    /// Loads the config file at `path`; a missing file yields defaults.
    /// Environment overrides are applied afterwards.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
            let config: PolystoreConfig =
                serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
                    message: e.to_string(),
                })?;
            info!("Loaded polystore configuration from {:?}", path);
            config
        } else {
            debug!("No config file at {:?}, using defaults", path);
            PolystoreConfig::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let parse = |key: &str| -> Result<Option<DbId>, ConfigError> {
            match lookup(key) {
                Some(value) => value
                    .trim()
                    .parse::<u32>()
                    .map(|id| Some(DbId(id)))
                    .map_err(|_| ConfigError::InvalidEnv {
                        key: key.to_string(),
                        value,
                    }),
                None => Ok(None),
            }
        };

        let engines = &mut self.schema_engines;
        if let Some(id) = parse("POLYSTORE_RELATIONAL_SCHEMA_DBID")? {
            engines.relational = id;
        }
        if let Some(id) = parse("POLYSTORE_ARRAY_SCHEMA_DBID")? {
            engines.array = id;
        }
        if let Some(id) = parse("POLYSTORE_TEXT_SCHEMA_DBID")? {
            engines.text = id;
        }
        if let Some(id) = parse("POLYSTORE_STREAM_DBID")? {
            engines.stream = Some(id);
        }
        if let Some(id) = parse("POLYSTORE_DATAFLOW_DBID")? {
            engines.dataflow = Some(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = PolystoreConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.migration.pipe_capacity_bytes, DEFAULT_PIPE_CAPACITY_BYTES);
        assert_eq!(config.migration.row_count_policy, RowCountPolicy::Warn);
        assert!(config.migration.drop_existing_destination);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("polystore.json");
        std::fs::write(
            &path,
            r#"{
                "schema_engines": { "array": 6, "stream": 9 },
                "migration": { "row_count_policy": { "mode": "fail", "max_missing": 0 } }
            }"#,
        )
        .unwrap();

        let config = PolystoreConfig::load(&path).unwrap();
        assert_eq!(config.schema_engines.array, DbId(6));
        assert_eq!(config.schema_engines.relational, DbId(0));
        assert_eq!(config.schema_engines.stream, Some(DbId(9)));
        assert_eq!(
            config.migration.row_count_policy,
            RowCountPolicy::Fail { max_missing: 0 }
        );
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("POLYSTORE_RELATIONAL_SCHEMA_DBID", "4"),
            ("POLYSTORE_DATAFLOW_DBID", "12"),
        ]
        .into_iter()
        .collect();

        let mut config = PolystoreConfig::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.schema_engines.relational, DbId(4));
        assert_eq!(config.schema_engines.dataflow, Some(DbId(12)));

        let err = PolystoreConfig::default()
            .apply_env(|key| (key == "POLYSTORE_TEXT_SCHEMA_DBID").then(|| "x".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }
}
