// SPDX-License-Identifier: Apache-2.0

// Polystore - island-aware federation over heterogeneous data engines
// Core library

pub mod config;
pub mod engine;
pub mod error;
pub mod federation;
pub mod islands;
pub mod metrics;
pub mod migration;
pub mod observability;
pub mod operators;
pub mod signature;

use std::sync::Arc;

use polystore_core::{Catalog, CatalogResult, DbId};
use tracing::instrument;

use config::PolystoreConfig;
use engine::drivers::PostgresConnector;
use engine::ConnectorRegistry;
use error::IslandResult;
use federation::{IslandDispatch, TransitionManager};
use islands::CapabilityRegistry;
use migration::{MigrationOrchestrator, MigrationOutcome, MigrationStatsStore, MigrationTask};

/// Shared federation services, built once from configuration.
pub struct Polystore {
    pub config: PolystoreConfig,
    pub registry: Arc<CapabilityRegistry>,
    pub catalog: Arc<dyn Catalog>,
    pub connectors: Arc<ConnectorRegistry>,
    pub transitions: TransitionManager,
    pub orchestrator: MigrationOrchestrator,
    pub stats: Arc<MigrationStatsStore>,
}

impl Polystore {
    pub fn new(
        config: PolystoreConfig,
        catalog: Arc<dyn Catalog>,
        connectors: ConnectorRegistry,
    ) -> Self {
        let registry = Arc::new(CapabilityRegistry::new(config.schema_engines.clone()));
        let connectors = Arc::new(connectors);
        let stats = Arc::new(MigrationStatsStore::default());
        let transitions = TransitionManager::new(
            Arc::clone(&registry),
            Arc::clone(&catalog),
            Arc::clone(&connectors),
        );
        let orchestrator =
            MigrationOrchestrator::new(Arc::clone(&connectors), config.migration.clone())
                .with_monitor(stats.clone());

        Self {
            config,
            registry,
            catalog,
            connectors,
            transitions,
            orchestrator,
            stats,
        }
    }

    /// Registers the built-in PostgreSQL connector for relational engines.
    pub fn with_default_connectors(config: PolystoreConfig, catalog: Arc<dyn Catalog>) -> Self {
        let mut connectors = ConnectorRegistry::new();
        connectors.register(Arc::new(PostgresConnector::new()));
        Self::new(config, catalog, connectors)
    }

    pub fn plan(&self, query: &str) -> IslandResult<IslandDispatch> {
        federation::plan_dispatch(&self.registry, query)
    }

    /// Builds a migration task from catalog entries, in the configured
    /// default format.
    #[instrument(skip_all, fields(source = %source, destination = %destination))]
    pub async fn migration_task(
        &self,
        source: DbId,
        source_object: &str,
        destination: DbId,
        destination_object: &str,
    ) -> CatalogResult<MigrationTask> {
        let source = self.catalog.connection_info(source).await?;
        let destination = self.catalog.connection_info(destination).await?;
        Ok(
            MigrationTask::new(source, source_object, destination, destination_object)
                .with_format(self.config.migration.default_format),
        )
    }

    pub async fn migrate(&self, task: &MigrationTask) -> MigrationOutcome {
        self.orchestrator.migrate(task).await
    }
}
