// SPDX-License-Identifier: Apache-2.0

//! Per-island capability records.
//!
//! `IslandCapabilities::for_scope` is the single place that decides what an
//! island can do. A capability left at `None` (or empty) is unsupported, and
//! the registry reports it as such instead of falling back to a default.

use polystore_core::Scope;

use super::predicates::PredicateSyntax;
use super::shims::{Shim, ARRAY_SHIMS, RELATIONAL_SHIMS, TEXT_SHIMS};
use crate::operators::{
    ArrayOperatorFactory, OperatorFactory, RelationalOperatorFactory, TextOperatorFactory,
};
use crate::signature::SignatureDialect;

/// Which configured schema instance holds an island's objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaSlot {
    Relational,
    Array,
    Text,
}

/// Which configured instance executes a pass-through island.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassthroughSlot {
    Stream,
    Dataflow,
}

/// Shape of a creation statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreationStyle {
    /// `CREATE TABLE name body`
    Table,
    /// `CREATE ARRAY name body`
    Array,
    /// Recorded by name, created when first written.
    Deferred,
}

#[derive(Clone, Copy)]
pub struct IslandCapabilities {
    pub scope: Scope,
    pub operator_tree: bool,
    pub catalog_island: Option<&'static str>,
    pub schema_slot: Option<SchemaSlot>,
    pub passthrough_slot: Option<PassthroughSlot>,
    pub join_syntax: Option<PredicateSyntax>,
    pub predicate_syntax: Option<PredicateSyntax>,
    pub signature: Option<SignatureDialect>,
    pub wrap_tag: Option<&'static str>,
    pub creation: Option<CreationStyle>,
    pub factory: Option<&'static dyn OperatorFactory>,
    pub shims: &'static [&'static dyn Shim],
    pub accepts_immigration: bool,
}

impl IslandCapabilities {
    const fn unsupported(scope: Scope) -> Self {
        Self {
            scope,
            operator_tree: false,
            catalog_island: None,
            schema_slot: None,
            passthrough_slot: None,
            join_syntax: None,
            predicate_syntax: None,
            signature: None,
            wrap_tag: None,
            creation: None,
            factory: None,
            shims: &[],
            accepts_immigration: false,
        }
    }

    pub fn for_scope(scope: Scope) -> Self {
        let base = Self::unsupported(scope);
        match scope {
            Scope::Relational => Self {
                operator_tree: true,
                catalog_island: Some("RELATIONAL"),
                schema_slot: Some(SchemaSlot::Relational),
                join_syntax: Some(PredicateSyntax::Relational),
                predicate_syntax: Some(PredicateSyntax::Relational),
                signature: Some(SignatureDialect::Sql),
                wrap_tag: Some(scope.tag()),
                creation: Some(CreationStyle::Table),
                factory: Some(&RelationalOperatorFactory),
                shims: &RELATIONAL_SHIMS,
                accepts_immigration: true,
                ..base
            },
            Scope::Array => Self {
                operator_tree: true,
                catalog_island: Some("ARRAY"),
                schema_slot: Some(SchemaSlot::Array),
                join_syntax: Some(PredicateSyntax::Array),
                predicate_syntax: Some(PredicateSyntax::Array),
                signature: Some(SignatureDialect::Afl),
                wrap_tag: Some(scope.tag()),
                creation: Some(CreationStyle::Array),
                factory: Some(&ArrayOperatorFactory),
                shims: &ARRAY_SHIMS,
                accepts_immigration: true,
                ..base
            },
            Scope::Text => Self {
                operator_tree: true,
                catalog_island: Some("TEXT"),
                schema_slot: Some(SchemaSlot::Text),
                signature: Some(SignatureDialect::TextScan),
                wrap_tag: Some(scope.tag()),
                creation: Some(CreationStyle::Deferred),
                factory: Some(&TextOperatorFactory),
                shims: &TEXT_SHIMS,
                accepts_immigration: true,
                ..base
            },
            Scope::Stream => Self {
                catalog_island: Some("STREAM"),
                passthrough_slot: Some(PassthroughSlot::Stream),
                wrap_tag: Some(scope.tag()),
                ..base
            },
            Scope::Myria => Self {
                catalog_island: Some("MYRIA"),
                passthrough_slot: Some(PassthroughSlot::Dataflow),
                wrap_tag: Some(scope.tag()),
                ..base
            },
            Scope::KeyValue | Scope::Graph | Scope::Document | Scope::Cast => base,
        }
    }
}
