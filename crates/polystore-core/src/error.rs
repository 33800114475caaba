// SPDX-License-Identifier: Apache-2.0

//! Normalized error types for engine handles and the catalog
//!
//! Driver-specific failures are mapped to `EngineError` so the federation
//! core can reason about them without knowing the concrete engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scope::DbId;

/// Unified error type for all engine session operations
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum EngineError {
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Statement execution error: {message}")]
    ExecutionError { message: String },

    #[error("Object not found: {name}")]
    ObjectNotFound { name: String },

    #[error("Object already exists: {name}")]
    ObjectExists { name: String },

    #[error("I/O error: {message}")]
    Io { message: String },

    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Transaction error: {message}")]
    TransactionError { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Feature not supported: {message}")]
    NotSupported { message: String },
}

impl EngineError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed { message: msg.into() }
    }

    pub fn execution_error(msg: impl Into<String>) -> Self {
        Self::ExecutionError { message: msg.into() }
    }

    pub fn object_not_found(name: impl Into<String>) -> Self {
        Self::ObjectNotFound { name: name.into() }
    }

    pub fn object_exists(name: impl Into<String>) -> Self {
        Self::ObjectExists { name: name.into() }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io { message: msg.into() }
    }

    pub fn transaction_error(msg: impl Into<String>) -> Self {
        Self::TransactionError { message: msg.into() }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal { message: msg.into() }
    }

    pub fn not_supported(msg: impl Into<String>) -> Self {
        Self::NotSupported { message: msg.into() }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Failures reported by the catalog collaborator.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum CatalogError {
    #[error("No database registered under dbid {dbid}")]
    UnknownDatabase { dbid: DbId },

    #[error("Unknown engine name in catalog: {name}")]
    UnknownEngine { name: String },

    #[error("Catalog unavailable: {message}")]
    Unavailable { message: String },
}

impl CatalogError {
    pub fn unknown_database(dbid: DbId) -> Self {
        Self::UnknownDatabase { dbid }
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable { message: msg.into() }
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;
