// SPDX-License-Identifier: Apache-2.0

//! Connector Registry
//!
//! Maps each engine family onto the connector that opens its sessions.

use std::collections::HashMap;
use std::sync::Arc;

use polystore_core::{
    ConnectionDescriptor, Engine, EngineConnector, EngineError, EngineResult, EngineSession,
    SessionOptions,
};

/// Registry that holds one connector per engine family
pub struct ConnectorRegistry {
    connectors: HashMap<Engine, Arc<dyn EngineConnector>>,
}

impl ConnectorRegistry {
    /// Creates a new empty registry
    pub fn new() -> Self {
        Self {
            connectors: HashMap::new(),
        }
    }

    /// Registers a connector, replacing any previous one for its engine.
    pub fn register(&mut self, connector: Arc<dyn EngineConnector>) {
        self.connectors.insert(connector.engine(), connector);
    }

    pub fn get(&self, engine: Engine) -> Option<Arc<dyn EngineConnector>> {
        self.connectors.get(&engine).cloned()
    }

    pub fn connector(&self, engine: Engine) -> EngineResult<Arc<dyn EngineConnector>> {
        self.get(engine).ok_or_else(|| {
            EngineError::not_supported(format!("No connector registered for {}", engine))
        })
    }

    /// Opens a session on the connector owning `descriptor.engine`.
    pub async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
        options: SessionOptions,
    ) -> EngineResult<Box<dyn EngineSession>> {
        self.connector(descriptor.engine)?
            .connect(descriptor, options)
            .await
    }

    /// Registered engines, sorted.
    pub fn list(&self) -> Vec<Engine> {
        let mut engines: Vec<Engine> = self.connectors.keys().copied().collect();
        engines.sort();
        engines
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
