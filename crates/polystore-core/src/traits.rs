// SPDX-License-Identifier: Apache-2.0

//! Collaborator traits
//!
//! The federation core never talks to a concrete database directly. Engines
//! are reached through an `EngineConnector` that opens `EngineSession`
//! handles, metadata comes from a `Catalog`, and migration records go to a
//! `MigrationMonitor`.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{CatalogResult, EngineResult};
use crate::scope::{DbId, Engine};
use crate::types::{
    ConnectionDescriptor, DataFormat, MigrationStatistics, ObjectSchema, SessionOptions,
};

/// Byte sink handed to `EngineSession::bulk_export`.
pub type ExportSink<'a> = &'a mut (dyn AsyncWrite + Send + Unpin);

/// Byte source handed to `EngineSession::bulk_load`.
pub type LoadSource<'a> = &'a mut (dyn AsyncRead + Send + Unpin);

/// Read access to the catalog of registered database instances.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Returns the engine that owns `dbid`.
    async fn engine_of(&self, dbid: DbId) -> CatalogResult<Engine>;

    /// Returns the connection parameters of `dbid`.
    async fn connection_info(&self, dbid: DbId) -> CatalogResult<ConnectionDescriptor>;
}

/// Opens sessions against one engine family.
#[async_trait]
pub trait EngineConnector: Send + Sync {
    fn engine(&self) -> Engine;

    /// Human-readable connector name, recorded in migration statistics.
    fn name(&self) -> &'static str;

    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
        options: SessionOptions,
    ) -> EngineResult<Box<dyn EngineSession>>;
}

/// An open connection to one database instance.
///
/// Sessions opened with `SessionOptions::auto_commit() == false` keep every
/// change pending until `commit`; `abort` discards them.
#[async_trait]
pub trait EngineSession: Send {
    fn engine(&self) -> Engine;

    /// Executes a native statement, returning the affected row count when the
    /// engine reports one.
    async fn execute(&mut self, statement: &str) -> EngineResult<u64>;

    /// Creates an empty object by name only, for engines whose objects carry
    /// no declared schema.
    async fn create_object_by_name(&mut self, name: &str) -> EngineResult<()>;

    /// Drops `name`; an absent object is not an error.
    async fn drop_object_if_exists(&mut self, name: &str) -> EngineResult<()>;

    async fn object_exists(&mut self, name: &str) -> EngineResult<bool>;

    /// Creates the namespace (schema) if it is missing.
    async fn ensure_namespace(&mut self, namespace: &str) -> EngineResult<()>;

    /// Reads the native definition of an object.
    async fn describe_object(&mut self, name: &str) -> EngineResult<ObjectSchema>;

    /// Streams every row of `object` into `sink`, returning the rows written.
    async fn bulk_export(
        &mut self,
        object: &str,
        format: DataFormat,
        sink: ExportSink<'_>,
    ) -> EngineResult<u64>;

    /// Loads rows from `source` until end of stream, returning the rows the
    /// engine accepted.
    async fn bulk_load(
        &mut self,
        object: &str,
        format: DataFormat,
        source: LoadSource<'_>,
    ) -> EngineResult<u64>;

    async fn commit(&mut self) -> EngineResult<()>;

    async fn abort(&mut self) -> EngineResult<()>;

    async fn close(&mut self) -> EngineResult<()>;
}

/// Receives migration records. Fire-and-forget: implementations must not
/// block the caller.
pub trait MigrationMonitor: Send + Sync {
    fn record_migration(&self, stats: MigrationStatistics);
}
