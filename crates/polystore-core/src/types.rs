// SPDX-License-Identifier: Apache-2.0

//! Shared data types for connections, object schemas, and migration records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scope::{DbId, Engine};
use crate::sensitive::Sensitive;

/// Engine-specific connection parameters, built on demand from catalog rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    pub dbid: DbId,
    pub engine: Engine,
    pub host: String,
    pub port: u16,
    pub database: Option<String>,
    pub user: String,
    pub password: Sensitive<String>,
    /// Location of engine client binaries, for engines driven through a CLI.
    pub bin_path: Option<String>,
}

impl ConnectionDescriptor {
    /// Credential-free one-line description for logs.
    pub fn simple_string(&self) -> String {
        format!(
            "{}[dbid={}] {}@{}:{}/{}",
            self.engine,
            self.dbid,
            self.user,
            self.host,
            self.port,
            self.database.as_deref().unwrap_or("-")
        )
    }
}

/// Wire framing used by bulk export/load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    #[default]
    Csv,
    Binary,
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataFormat::Csv => f.write_str("csv"),
            DataFormat::Binary => f.write_str("binary"),
        }
    }
}

/// Transaction behavior requested when a session is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub read_only: bool,
    pub auto_commit: bool,
}

impl SessionOptions {
    /// Source side of a migration: read-only, manual commit.
    pub fn source() -> Self {
        Self {
            read_only: true,
            auto_commit: false,
        }
    }

    /// Destination side of a migration: manual commit.
    pub fn destination() -> Self {
        Self {
            read_only: false,
            auto_commit: false,
        }
    }

    pub fn auto_commit() -> Self {
        Self {
            read_only: false,
            auto_commit: true,
        }
    }
}

/// Engine-neutral column type, used to translate definitions between engines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataType {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Numeric {
        precision: Option<u32>,
        scale: Option<u32>,
    },
    Char {
        length: u32,
    },
    Varchar {
        length: Option<u32>,
    },
    Text,
    Date,
    Timestamp,
    Bytes,
}

impl DataType {
    /// Relational (PostgreSQL) spelling.
    pub fn sql_name(&self) -> String {
        match self {
            DataType::Boolean => "boolean".into(),
            DataType::SmallInt => "smallint".into(),
            DataType::Integer => "integer".into(),
            DataType::BigInt => "bigint".into(),
            DataType::Real => "real".into(),
            DataType::Double => "double precision".into(),
            DataType::Numeric {
                precision: Some(p),
                scale: Some(s),
            } => format!("numeric({},{})", p, s),
            DataType::Numeric {
                precision: Some(p),
                scale: None,
            } => format!("numeric({})", p),
            DataType::Numeric { .. } => "numeric".into(),
            DataType::Char { length } => format!("char({})", length),
            DataType::Varchar { length: Some(n) } => format!("varchar({})", n),
            DataType::Varchar { length: None } => "varchar".into(),
            DataType::Text => "text".into(),
            DataType::Date => "date".into(),
            DataType::Timestamp => "timestamp".into(),
            DataType::Bytes => "bytea".into(),
        }
    }

    /// Array-engine attribute type.
    pub fn array_name(&self) -> &'static str {
        match self {
            DataType::Boolean => "bool",
            DataType::SmallInt => "int16",
            DataType::Integer => "int32",
            DataType::BigInt => "int64",
            DataType::Real => "float",
            DataType::Double | DataType::Numeric { .. } => "double",
            DataType::Char { .. } | DataType::Varchar { .. } | DataType::Text => "string",
            DataType::Date | DataType::Timestamp => "datetime",
            DataType::Bytes => "binary",
        }
    }

    /// Parses a type name as reported by an engine catalog. Unknown names map
    /// to `Text` so that data can still be moved as strings.
    pub fn parse(raw: &str) -> DataType {
        let lower = raw.trim().to_ascii_lowercase();
        let (base, args) = match lower.find('(') {
            Some(open) => {
                let close = lower.rfind(')').unwrap_or(lower.len());
                let args: Vec<u32> = lower[open + 1..close.max(open + 1)]
                    .split(',')
                    .filter_map(|a| a.trim().parse().ok())
                    .collect();
                (lower[..open].trim().to_string(), args)
            }
            None => (lower.clone(), Vec::new()),
        };

        match base.as_str() {
            "bool" | "boolean" => DataType::Boolean,
            "smallint" | "int2" | "int16" => DataType::SmallInt,
            "integer" | "int" | "int4" | "int32" => DataType::Integer,
            "bigint" | "int8" | "int64" => DataType::BigInt,
            "real" | "float4" | "float" => DataType::Real,
            "double precision" | "float8" | "double" => DataType::Double,
            "numeric" | "decimal" => DataType::Numeric {
                precision: args.first().copied(),
                scale: args.get(1).copied(),
            },
            "char" | "character" | "bpchar" => DataType::Char {
                length: args.first().copied().unwrap_or(1),
            },
            "varchar" | "character varying" => DataType::Varchar {
                length: args.first().copied(),
            },
            "date" => DataType::Date,
            "datetime" => DataType::Timestamp,
            "bytea" | "binary" => DataType::Bytes,
            other if other.starts_with("timestamp") => DataType::Timestamp,
            _ => DataType::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Ordered column list of a stored object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSchema {
    pub columns: Vec<ColumnDef>,
}

impl ObjectSchema {
    pub fn new(columns: Vec<ColumnDef>) -> Self {
        Self { columns }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Record forwarded to the monitoring collaborator after every migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationStatistics {
    pub migration_id: Uuid,
    pub source: String,
    pub destination: String,
    pub source_object: String,
    pub destination_object: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub rows_extracted: u64,
    pub rows_loaded: u64,
    pub bytes_transferred: u64,
    pub format: DataFormat,
    pub migrator: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_catalog_type_names() {
        assert_eq!(DataType::parse("integer"), DataType::Integer);
        assert_eq!(
            DataType::parse("character varying(25)"),
            DataType::Varchar { length: Some(25) }
        );
        assert_eq!(
            DataType::parse("numeric(15,2)"),
            DataType::Numeric {
                precision: Some(15),
                scale: Some(2)
            }
        );
        assert_eq!(
            DataType::parse("timestamp without time zone"),
            DataType::Timestamp
        );
        assert_eq!(DataType::parse("int64"), DataType::BigInt);
        assert_eq!(DataType::parse("tsvector"), DataType::Text);
    }

    #[test]
    fn test_type_spellings() {
        let varchar = DataType::Varchar { length: Some(152) };
        assert_eq!(varchar.sql_name(), "varchar(152)");
        assert_eq!(varchar.array_name(), "string");
        assert_eq!(DataType::BigInt.array_name(), "int64");
        assert_eq!(DataType::Double.sql_name(), "double precision");
    }

    #[test]
    fn test_descriptor_hides_password() {
        let descriptor = ConnectionDescriptor {
            dbid: DbId(0),
            engine: Engine::RelationalEngine,
            host: "localhost".into(),
            port: 5431,
            database: Some("tpch".into()),
            user: "pguser".into(),
            password: Sensitive::new("secret".into()),
            bin_path: None,
        };
        let line = descriptor.simple_string();
        assert_eq!(line, "RelationalEngine[dbid=0] pguser@localhost:5431/tpch");
        assert!(!format!("{:?}", descriptor).contains("secret"));
        assert!(!serde_json::to_string(&descriptor).unwrap().contains("secret"));
    }
}
