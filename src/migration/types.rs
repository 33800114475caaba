// SPDX-License-Identifier: Apache-2.0

//! Migration task, result, and error types.

use std::fmt;

use chrono::{DateTime, Utc};
use polystore_core::{ConnectionDescriptor, DataFormat, EngineError};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Lifecycle of one migration invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationState {
    Init,
    Connecting,
    SchemaPrep,
    Streaming,
    Done,
    Failed,
}

impl MigrationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, MigrationState::Done | MigrationState::Failed)
    }
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MigrationState::Init => "INIT",
            MigrationState::Connecting => "CONNECTING",
            MigrationState::SchemaPrep => "SCHEMA_PREP",
            MigrationState::Streaming => "STREAMING",
            MigrationState::Done => "DONE",
            MigrationState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// One object to move between two database instances.
#[derive(Debug, Clone)]
pub struct MigrationTask {
    pub source: ConnectionDescriptor,
    pub source_object: String,
    pub destination: ConnectionDescriptor,
    pub destination_object: String,
    /// Complete creation statement for the destination object. When absent
    /// the source definition is translated into the destination dialect.
    pub ddl: Option<String>,
    pub format: DataFormat,
}

impl MigrationTask {
    pub fn new(
        source: ConnectionDescriptor,
        source_object: impl Into<String>,
        destination: ConnectionDescriptor,
        destination_object: impl Into<String>,
    ) -> Self {
        Self {
            source,
            source_object: source_object.into(),
            destination,
            destination_object: destination_object.into(),
            ddl: None,
            format: DataFormat::default(),
        }
    }

    pub fn with_ddl(mut self, ddl: impl Into<String>) -> Self {
        self.ddl = Some(ddl.into());
        self
    }

    pub fn with_format(mut self, format: DataFormat) -> Self {
        self.format = format;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationResult {
    pub migration_id: Uuid,
    pub rows_extracted: u64,
    pub rows_loaded: u64,
    pub bytes_transferred: u64,
    pub duration_ms: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl MigrationResult {
    /// Rows exported but not accepted by the destination.
    pub fn rows_missing(&self) -> u64 {
        self.rows_extracted.saturating_sub(self.rows_loaded)
    }

    pub fn is_complete(&self) -> bool {
        self.rows_loaded == self.rows_extracted
    }
}

#[derive(Debug, Error)]
pub enum MigrationCause {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Pipe I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("{task} task panicked")]
    TaskPanicked { task: &'static str },

    #[error("{loaded} of {extracted} rows loaded, more than {max_missing} missing")]
    RowCountRejected {
        extracted: u64,
        loaded: u64,
        max_missing: u64,
    },

    #[error("Unsupported migration target: {message}")]
    UnsupportedTarget { message: String },
}

impl MigrationCause {
    pub fn unsupported_target(msg: impl Into<String>) -> Self {
        Self::UnsupportedTarget {
            message: msg.into(),
        }
    }
}

/// A failed migration, tagged with the state it failed in.
#[derive(Debug, Error)]
#[error("Migration {migration_id} failed in {state}: {cause}")]
pub struct MigrationError {
    pub migration_id: Uuid,
    pub state: MigrationState,
    #[source]
    pub cause: MigrationCause,
}

impl MigrationError {
    pub fn is_timeout(&self) -> bool {
        matches!(self.cause, MigrationCause::Timeout { .. })
    }
}

pub type MigrationOutcome = Result<MigrationResult, MigrationError>;
