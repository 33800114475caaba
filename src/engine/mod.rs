// SPDX-License-Identifier: Apache-2.0

// Engine Module
// Connectors, sessions, and the catalog that locates database instances

pub mod catalog;
pub mod drivers;
pub mod registry;

pub use catalog::StaticCatalog;
pub use registry::ConnectorRegistry;
