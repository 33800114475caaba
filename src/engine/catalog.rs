// SPDX-License-Identifier: Apache-2.0

//! In-process catalog backed by a fixed set of connection descriptors.

use std::collections::HashMap;

use async_trait::async_trait;
use polystore_core::{Catalog, CatalogError, CatalogResult, ConnectionDescriptor, DbId, Engine};
use serde::Deserialize;

#[derive(Debug, Default, Clone)]
pub struct StaticCatalog {
    databases: HashMap<DbId, ConnectionDescriptor>,
}

/// Catalog row as stored in JSON files: the engine is named the way the
/// catalog database names it (e.g. `PostgreSQL 9.4`).
#[derive(Debug, Deserialize)]
struct CatalogRow {
    dbid: DbId,
    engine: String,
    host: String,
    port: u16,
    #[serde(default)]
    database: Option<String>,
    user: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    bin_path: Option<String>,
}

impl StaticCatalog {
    pub fn new(descriptors: impl IntoIterator<Item = ConnectionDescriptor>) -> Self {
        Self {
            databases: descriptors.into_iter().map(|d| (d.dbid, d)).collect(),
        }
    }

    /// Parses a JSON array of catalog rows.
    pub fn from_json(raw: &str) -> CatalogResult<Self> {
        let rows: Vec<CatalogRow> = serde_json::from_str(raw)
            .map_err(|e| CatalogError::unavailable(format!("invalid catalog JSON: {}", e)))?;
        let descriptors = rows
            .into_iter()
            .map(|row| {
                let engine = Engine::from_catalog_name(&row.engine)
                    .ok_or(CatalogError::UnknownEngine { name: row.engine })?;
                Ok(ConnectionDescriptor {
                    dbid: row.dbid,
                    engine,
                    host: row.host,
                    port: row.port,
                    database: row.database,
                    user: row.user,
                    password: row.password.into(),
                    bin_path: row.bin_path,
                })
            })
            .collect::<CatalogResult<Vec<_>>>()?;
        Ok(Self::new(descriptors))
    }

    pub fn insert(&mut self, descriptor: ConnectionDescriptor) {
        self.databases.insert(descriptor.dbid, descriptor);
    }

    pub fn len(&self) -> usize {
        self.databases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.databases.is_empty()
    }
}

#[async_trait]
impl Catalog for StaticCatalog {
    async fn engine_of(&self, dbid: DbId) -> CatalogResult<Engine> {
        self.databases
            .get(&dbid)
            .map(|d| d.engine)
            .ok_or(CatalogError::unknown_database(dbid))
    }

    async fn connection_info(&self, dbid: DbId) -> CatalogResult<ConnectionDescriptor> {
        self.databases
            .get(&dbid)
            .cloned()
            .ok_or(CatalogError::unknown_database(dbid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_json_maps_engine_names() {
        let catalog = StaticCatalog::from_json(
            r#"[
                {"dbid": 0, "engine": "PostgreSQL 9.4", "host": "db0", "port": 5431,
                 "database": "polystore_schemas", "user": "pguser", "password": "secret"},
                {"dbid": 1, "engine": "SciDB 14.12", "host": "db1", "port": 1239,
                 "user": "scidb", "bin_path": "/opt/scidb/14.12/bin/"}
            ]"#,
        )
        .unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.engine_of(DbId(0)).await.unwrap(), Engine::RelationalEngine);
        assert_eq!(catalog.engine_of(DbId(1)).await.unwrap(), Engine::ArrayEngine);
        let info = catalog.connection_info(DbId(0)).await.unwrap();
        assert_eq!(info.password.expose(), "secret");
        assert!(matches!(
            catalog.connection_info(DbId(9)).await,
            Err(CatalogError::UnknownDatabase { dbid: DbId(9) })
        ));
    }

    #[test]
    fn test_unknown_engine_name_is_rejected() {
        let err = StaticCatalog::from_json(
            r#"[{"dbid": 4, "engine": "Vertica", "host": "h", "port": 1, "user": "u"}]"#,
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::UnknownEngine { .. }));
    }
}
