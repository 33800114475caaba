// SPDX-License-Identifier: Apache-2.0

//! Polystore Core
//!
//! Engine-neutral vocabulary shared by every island: scopes, engines,
//! connection descriptors, and the collaborator traits the federation
//! core talks to (catalog, engine connectors, monitoring).

pub mod error;
pub mod scope;
pub mod sensitive;
pub mod traits;
pub mod types;

pub use error::{CatalogError, CatalogResult, EngineError, EngineResult};
pub use scope::{DbId, Engine, Scope};
pub use sensitive::Sensitive;
pub use traits::{
    Catalog, EngineConnector, EngineSession, ExportSink, LoadSource, MigrationMonitor,
};
pub use types::{
    ColumnDef, ConnectionDescriptor, DataFormat, DataType, MigrationStatistics, ObjectSchema,
    SessionOptions,
};
