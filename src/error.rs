// SPDX-License-Identifier: Apache-2.0

//! Error types for island resolution and cross-island dispatch.

use polystore_core::{CatalogError, DbId, Engine, EngineError, Scope};
use thiserror::Error;

/// Failures surfaced by the tagger, the capability registry, operator tree
/// construction, and the transition manager.
#[derive(Debug, Error)]
pub enum IslandError {
    #[error("Island {scope} does not support {operation}")]
    UnsupportedIsland {
        scope: Scope,
        operation: &'static str,
    },

    #[error("Unrecognized island tag in query: {text}")]
    UnrecognizedTag { text: String },

    #[error("Malformed query: {message}")]
    MalformedQuery { message: String },

    #[error("No shim registered for island {scope} on {engine} (dbid {dbid})")]
    NoShim {
        scope: Scope,
        engine: Engine,
        dbid: DbId,
    },

    #[error("Island {scope} has no {setting} configured")]
    NotConfigured {
        scope: Scope,
        setting: &'static str,
    },

    #[error("Operator tree error: {message}")]
    OperatorTree { message: String },

    #[error("Catalog lookup failed: {0}")]
    CatalogLookup(#[from] CatalogError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl IslandError {
    pub fn unsupported(scope: Scope, operation: &'static str) -> Self {
        Self::UnsupportedIsland { scope, operation }
    }

    pub fn unrecognized_tag(text: &str) -> Self {
        const PREVIEW: usize = 64;
        let text = match text.char_indices().nth(PREVIEW) {
            Some((idx, _)) => format!("{}...", &text[..idx]),
            None => text.to_string(),
        };
        Self::UnrecognizedTag { text }
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedQuery {
            message: msg.into(),
        }
    }

    pub fn operator_tree(msg: impl Into<String>) -> Self {
        Self::OperatorTree {
            message: msg.into(),
        }
    }

    /// Returns `(scope, operation)` when this is an unsupported-island error.
    pub fn unsupported_context(&self) -> Option<(Scope, &'static str)> {
        match self {
            Self::UnsupportedIsland { scope, operation } => Some((*scope, operation)),
            _ => None,
        }
    }
}

pub type IslandResult<T> = Result<T, IslandError>;
