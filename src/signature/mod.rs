// SPDX-License-Identifier: Apache-2.0

//! Query fingerprints.
//!
//! A signature pairs the set of referenced data objects with the list of
//! literal tokens in the query. Monitoring and caching collaborators compare
//! signatures to recognize repeated or structurally similar queries
//! regardless of constant values or join order.

pub mod afl;
pub mod sql;
pub mod text;

use std::collections::BTreeSet;

use polystore_core::Scope;
use serde::Serialize;

use crate::error::IslandResult;

/// Extraction rules an island uses for its query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureDialect {
    Sql,
    Afl,
    TextScan,
}

impl SignatureDialect {
    pub fn objects(self, query: &str) -> IslandResult<BTreeSet<String>> {
        match self {
            SignatureDialect::Sql => sql::objects(query),
            SignatureDialect::Afl => afl::objects(query),
            SignatureDialect::TextScan => text::objects(query),
        }
    }

    pub fn literals(self, query: &str) -> IslandResult<Vec<String>> {
        match self {
            SignatureDialect::Sql => sql::literals(query),
            SignatureDialect::Afl => afl::literals(query),
            SignatureDialect::TextScan => Ok(text::literals(query)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuerySignature {
    pub scope: Scope,
    pub objects: BTreeSet<String>,
    pub literals: Vec<String>,
    /// Operator tree shape, when the query was compiled into a tree.
    pub tree_shape: Option<String>,
}

impl QuerySignature {
    /// True when both queries touch the same objects with the same plan
    /// shape, whatever their constants.
    pub fn same_shape(&self, other: &QuerySignature) -> bool {
        self.scope == other.scope
            && self.objects == other.objects
            && self.tree_shape == other.tree_shape
    }
}
