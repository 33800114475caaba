// SPDX-License-Identifier: Apache-2.0

//! Types for island dispatch.

use polystore_core::{DbId, Scope};
use serde::Serialize;

/// A parsed island-tagged query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TaggedQuery {
    Island { scope: Scope, body: String },
    Cast(CastSpec),
}

impl TaggedQuery {
    pub fn scope(&self) -> Scope {
        match self {
            TaggedQuery::Island { scope, .. } => *scope,
            TaggedQuery::Cast(_) => Scope::Cast,
        }
    }
}

/// `bdcast(<inner>, ['<namespace>',] [<object>,] ['<ddl>',] <destination>)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CastSpec {
    /// Tagged query whose result is cast.
    pub inner: String,
    pub inner_scope: Scope,
    pub destination: Scope,
    /// Namespace (schema) the destination object is created in.
    pub namespace: Option<String>,
    pub object: Option<String>,
    /// Schema-creation clause for the destination object.
    pub ddl: Option<String>,
}

/// Where a tagged query goes next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum IslandDispatch {
    /// Compile into an operator tree against the island's schema instance.
    OperatorTree {
        scope: Scope,
        schema_dbid: DbId,
        query: String,
    },
    /// Hand the query text to the island's engine unchanged.
    PassThrough {
        scope: Scope,
        dbid: DbId,
        query: String,
    },
    Cast(CastSpec),
}
