// SPDX-License-Identifier: Apache-2.0

//! Capability Registry
//!
//! Read-only dispatch over the per-island capability table. Each operation
//! returns a definite value for islands that support it and
//! `IslandError::UnsupportedIsland` naming the island and the operation for
//! the rest. The registry is immutable after construction and safe to share
//! across threads without locking.

use std::collections::BTreeSet;

use polystore_core::{Catalog, DbId, Scope};
use tracing::{debug, instrument};

use super::capabilities::{CreationStyle, IslandCapabilities, PassthroughSlot, SchemaSlot};
use super::shims::Shim;
use crate::config::SchemaEngineConfig;
use crate::error::{IslandError, IslandResult};
use crate::operators::{build_tree, BlockerSequence, JoinSpec, JoinType, Operator, PlanNode};
use crate::signature::QuerySignature;

/// Creation statement for a staging or migration target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreationStatement {
    /// Native statement to execute now.
    Immediate(String),
    /// Object to create by name when first written.
    Deferred { name: String },
}

pub struct CapabilityRegistry {
    table: [IslandCapabilities; 9],
    schema_engines: SchemaEngineConfig,
}

impl CapabilityRegistry {
    pub fn new(schema_engines: SchemaEngineConfig) -> Self {
        Self {
            table: Scope::ALL.map(IslandCapabilities::for_scope),
            schema_engines,
        }
    }

    pub fn capabilities(&self, scope: Scope) -> &IslandCapabilities {
        &self.table[scope as usize]
    }

    pub fn is_operator_tree_island(&self, scope: Scope) -> bool {
        self.capabilities(scope).operator_tree
    }

    /// Island name used for catalog lookups.
    pub fn catalog_island_name(&self, scope: Scope) -> IslandResult<&'static str> {
        self.capabilities(scope)
            .catalog_island
            .ok_or_else(|| IslandError::unsupported(scope, "catalogIslandName"))
    }

    /// Finds the engine behind `dbid` and returns the generator for that
    /// island/engine pair.
    #[instrument(skip_all, fields(scope = %scope, dbid = %dbid))]
    pub async fn resolve_shim(
        &self,
        scope: Scope,
        dbid: DbId,
        catalog: &dyn Catalog,
    ) -> IslandResult<&'static dyn Shim> {
        let caps = self.capabilities(scope);
        if caps.shims.is_empty() {
            return Err(IslandError::unsupported(scope, "resolveShim"));
        }

        let engine = catalog.engine_of(dbid).await?;
        let shim = caps
            .shims
            .iter()
            .copied()
            .find(|shim| shim.engine() == engine)
            .ok_or(IslandError::NoShim {
                scope,
                engine,
                dbid,
            })?;

        debug!(shim = shim.name(), engine = %engine, "Resolved shim");
        Ok(shim)
    }

    /// Dbid of the canonical schema instance of an island.
    pub fn schema_engine_id(&self, scope: Scope) -> IslandResult<DbId> {
        match self.capabilities(scope).schema_slot {
            Some(SchemaSlot::Relational) => Ok(self.schema_engines.relational),
            Some(SchemaSlot::Array) => Ok(self.schema_engines.array),
            Some(SchemaSlot::Text) => Ok(self.schema_engines.text),
            None => Err(IslandError::unsupported(scope, "schemaEngineId")),
        }
    }

    /// Dbid that executes a pass-through island's queries directly.
    pub fn passthrough_dbid(&self, scope: Scope) -> IslandResult<DbId> {
        let configured = match self.capabilities(scope).passthrough_slot {
            Some(PassthroughSlot::Stream) => self.schema_engines.stream,
            Some(PassthroughSlot::Dataflow) => self.schema_engines.dataflow,
            None => return Err(IslandError::unsupported(scope, "passthroughDbid")),
        };
        configured.ok_or(IslandError::NotConfigured {
            scope,
            setting: "pass-through dbid",
        })
    }

    /// Join node in the island's own predicate syntax. An empty predicate
    /// list yields an unconditional join.
    pub fn build_join(
        &self,
        scope: Scope,
        left: Operator,
        right: Operator,
        join_type: JoinType,
        predicates: &[String],
        is_filter: bool,
    ) -> IslandResult<Operator> {
        let syntax = self
            .capabilities(scope)
            .join_syntax
            .ok_or_else(|| IslandError::unsupported(scope, "buildJoin"))?;

        Ok(Operator::join(
            scope,
            JoinSpec {
                join_type,
                predicate: syntax.conjunction(predicates),
                is_filter,
            },
            left,
            right,
        ))
    }

    /// Translates a native plan with the island's operator factory.
    pub fn build_operator_tree(
        &self,
        scope: Scope,
        plan: &PlanNode,
        blockers: &mut BlockerSequence,
    ) -> IslandResult<Operator> {
        let factory = self
            .capabilities(scope)
            .factory
            .ok_or_else(|| IslandError::unsupported(scope, "buildOperatorTree"))?;
        build_tree(factory, plan, blockers)
    }

    pub fn object_signature(&self, scope: Scope, query: &str) -> IslandResult<BTreeSet<String>> {
        self.capabilities(scope)
            .signature
            .ok_or_else(|| IslandError::unsupported(scope, "objectSignature"))?
            .objects(query)
    }

    pub fn literal_signature(&self, scope: Scope, query: &str) -> IslandResult<Vec<String>> {
        self.capabilities(scope)
            .signature
            .ok_or_else(|| IslandError::unsupported(scope, "literalSignature"))?
            .literals(query)
    }

    /// Two-part fingerprint, plus the tree shape when a tree is available.
    pub fn signature(
        &self,
        scope: Scope,
        query: &str,
        tree: Option<&Operator>,
    ) -> IslandResult<QuerySignature> {
        Ok(QuerySignature {
            scope,
            objects: self.object_signature(scope, query)?,
            literals: self.literal_signature(scope, query)?,
            tree_shape: tree.map(Operator::tree_representation),
        })
    }

    /// Reconstructs the tagged form, e.g. `bdarray(scan(x));`.
    pub fn island_style_wrap(&self, scope: Scope, inner: &str) -> IslandResult<String> {
        let tag = self
            .capabilities(scope)
            .wrap_tag
            .ok_or_else(|| IslandError::unsupported(scope, "islandStyleWrap"))?;
        Ok(format!("{}({});", tag, inner))
    }

    pub fn creation_statement(
        &self,
        scope: Scope,
        name: &str,
        ddl_body: &str,
    ) -> IslandResult<CreationStatement> {
        let style = self
            .capabilities(scope)
            .creation
            .ok_or_else(|| IslandError::unsupported(scope, "creationStatement"))?;
        Ok(match style {
            CreationStyle::Table => {
                CreationStatement::Immediate(format!("CREATE TABLE {} {}", name, ddl_body))
            }
            CreationStyle::Array => {
                CreationStatement::Immediate(format!("CREATE ARRAY {} {}", name, ddl_body))
            }
            CreationStyle::Deferred => CreationStatement::Deferred {
                name: name.to_string(),
            },
        })
    }

    pub fn split_predicates(&self, scope: Scope, text: &str) -> IslandResult<BTreeSet<String>> {
        let syntax = self
            .capabilities(scope)
            .predicate_syntax
            .ok_or_else(|| IslandError::unsupported(scope, "splitPredicates"))?;
        Ok(syntax.split(text))
    }

    /// Fails for islands that cannot hold staged data from other islands.
    pub fn ensure_accepts_immigration(
        &self,
        scope: Scope,
        operation: &'static str,
    ) -> IslandResult<()> {
        if self.capabilities(scope).accepts_immigration {
            Ok(())
        } else {
            Err(IslandError::unsupported(scope, operation))
        }
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new(SchemaEngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use polystore_core::{CatalogError, CatalogResult, ConnectionDescriptor, Engine};

    struct EngineCatalog;

    #[async_trait]
    impl Catalog for EngineCatalog {
        async fn engine_of(&self, dbid: DbId) -> CatalogResult<Engine> {
            match dbid.0 {
                0 => Ok(Engine::RelationalEngine),
                1 => Ok(Engine::ArrayEngine),
                2 => Ok(Engine::WideColumnEngine),
                3 => Ok(Engine::StreamEngine),
                _ => Err(CatalogError::unknown_database(dbid)),
            }
        }

        async fn connection_info(&self, dbid: DbId) -> CatalogResult<ConnectionDescriptor> {
            Err(CatalogError::unknown_database(dbid))
        }
    }

    fn assert_unsupported<T: std::fmt::Debug>(
        result: IslandResult<T>,
        scope: Scope,
        operation: &str,
    ) {
        match result {
            Err(IslandError::UnsupportedIsland {
                scope: s,
                operation: op,
            }) => {
                assert_eq!(s, scope);
                assert_eq!(op, operation);
            }
            other => panic!("expected unsupported {} for {}, got {:?}", operation, scope, other),
        }
    }

    fn scan(scope: Scope, object: &str) -> Operator {
        let plan = PlanNode::new(if scope == Scope::Text { "Scan" } else { "Seq Scan" })
            .with_param("Relation Name", object)
            .with_param("Array Name", object)
            .with_param("Table", object);
        let registry = CapabilityRegistry::default();
        registry
            .build_operator_tree(scope, &plan, &mut BlockerSequence::new())
            .unwrap()
    }

    #[test]
    fn test_table_is_indexed_by_scope() {
        let registry = CapabilityRegistry::default();
        for scope in Scope::ALL {
            assert_eq!(registry.capabilities(scope).scope, scope);
        }
    }

    #[test]
    fn test_operator_tree_islands() {
        let registry = CapabilityRegistry::default();
        for scope in Scope::ALL {
            let expected = matches!(scope, Scope::Relational | Scope::Array | Scope::Text);
            assert_eq!(registry.is_operator_tree_island(scope), expected, "{}", scope);
        }
    }

    #[test]
    fn test_every_operation_is_total() {
        let registry = CapabilityRegistry::default();
        for scope in Scope::ALL {
            let caps = registry.capabilities(scope);

            let result = registry.schema_engine_id(scope);
            if caps.schema_slot.is_none() {
                assert_unsupported(result, scope, "schemaEngineId");
            } else {
                assert!(result.is_ok());
            }

            let result = registry.island_style_wrap(scope, "q");
            if caps.wrap_tag.is_none() {
                assert_unsupported(result, scope, "islandStyleWrap");
            } else {
                assert_eq!(result.unwrap(), format!("{}(q);", scope.tag()));
            }

            let result = registry.creation_statement(scope, "t", "(a int)");
            if caps.creation.is_none() {
                assert_unsupported(result, scope, "creationStatement");
            } else {
                assert!(result.is_ok());
            }

            let result = registry.split_predicates(scope, "(a=b)");
            if caps.predicate_syntax.is_none() {
                assert_unsupported(result, scope, "splitPredicates");
            } else {
                assert_eq!(result.unwrap().len(), 1);
            }

            if caps.signature.is_none() {
                assert_unsupported(registry.object_signature(scope, "x"), scope, "objectSignature");
                assert_unsupported(
                    registry.literal_signature(scope, "x"),
                    scope,
                    "literalSignature",
                );
            }

            if caps.catalog_island.is_none() {
                assert_unsupported(registry.catalog_island_name(scope), scope, "catalogIslandName");
            }

            if caps.factory.is_none() {
                assert_unsupported(
                    registry.build_operator_tree(
                        scope,
                        &PlanNode::new("Seq Scan"),
                        &mut BlockerSequence::new(),
                    ),
                    scope,
                    "buildOperatorTree",
                );
            }

            if caps.passthrough_slot.is_none() {
                assert_unsupported(registry.passthrough_dbid(scope), scope, "passthroughDbid");
            }
        }
    }

    #[test]
    fn test_schema_engine_ids() {
        let registry = CapabilityRegistry::new(SchemaEngineConfig {
            relational: DbId(10),
            array: DbId(11),
            text: DbId(12),
            stream: Some(DbId(13)),
            dataflow: None,
        });
        assert_eq!(registry.schema_engine_id(Scope::Relational).unwrap(), DbId(10));
        assert_eq!(registry.schema_engine_id(Scope::Array).unwrap(), DbId(11));
        assert_eq!(registry.schema_engine_id(Scope::Text).unwrap(), DbId(12));
        assert_unsupported(registry.schema_engine_id(Scope::Stream), Scope::Stream, "schemaEngineId");
        assert_unsupported(registry.schema_engine_id(Scope::Myria), Scope::Myria, "schemaEngineId");

        assert_eq!(registry.passthrough_dbid(Scope::Stream).unwrap(), DbId(13));
        assert!(matches!(
            registry.passthrough_dbid(Scope::Myria),
            Err(IslandError::NotConfigured { .. })
        ));
    }

    #[test]
    fn test_island_style_wrap() {
        let registry = CapabilityRegistry::default();
        assert_eq!(
            registry.island_style_wrap(Scope::Array, "scan(x)").unwrap(),
            "bdarray(scan(x));"
        );
        assert_eq!(
            registry.island_style_wrap(Scope::Relational, "select 1").unwrap(),
            "bdrel(select 1);"
        );
    }

    #[test]
    fn test_creation_statements() {
        let registry = CapabilityRegistry::default();
        assert_eq!(
            registry
                .creation_statement(Scope::Relational, "t1", "(a int, b text)")
                .unwrap(),
            CreationStatement::Immediate("CREATE TABLE t1 (a int, b text)".into())
        );
        assert_eq!(
            registry
                .creation_statement(Scope::Array, "a1", "<v:int64>[i=0:*,1000000,0]")
                .unwrap(),
            CreationStatement::Immediate("CREATE ARRAY a1 <v:int64>[i=0:*,1000000,0]".into())
        );
        assert_eq!(
            registry.creation_statement(Scope::Text, "notes", "").unwrap(),
            CreationStatement::Deferred {
                name: "notes".into()
            }
        );
    }

    #[test]
    fn test_build_join_per_island() {
        let registry = CapabilityRegistry::default();
        let predicates = vec!["l.a = r.a".to_string(), "l.b = r.b".to_string()];

        let join = registry
            .build_join(
                Scope::Relational,
                scan(Scope::Relational, "l"),
                scan(Scope::Relational, "r"),
                JoinType::Inner,
                &predicates,
                false,
            )
            .unwrap();
        match join.kind() {
            crate::operators::OperatorKind::Join(spec) => {
                assert_eq!(spec.predicate.as_deref(), Some("l.a = r.a AND l.b = r.b"));
            }
            other => panic!("expected join, got {:?}", other),
        }

        let join = registry
            .build_join(
                Scope::Array,
                scan(Scope::Array, "l"),
                scan(Scope::Array, "r"),
                JoinType::Cross,
                &predicates,
                false,
            )
            .unwrap();
        match join.kind() {
            crate::operators::OperatorKind::Join(spec) => {
                assert_eq!(spec.predicate.as_deref(), Some("l.a, r.a, l.b, r.b"));
            }
            other => panic!("expected join, got {:?}", other),
        }

        let unconditional = registry
            .build_join(
                Scope::Relational,
                scan(Scope::Relational, "l"),
                scan(Scope::Relational, "r"),
                JoinType::Cross,
                &[],
                false,
            )
            .unwrap();
        match unconditional.kind() {
            crate::operators::OperatorKind::Join(spec) => assert!(spec.predicate.is_none()),
            other => panic!("expected join, got {:?}", other),
        }

        for scope in [Scope::Stream, Scope::Text, Scope::Myria] {
            let result = registry.build_join(
                scope,
                scan(Scope::Text, "l"),
                scan(Scope::Text, "r"),
                JoinType::Inner,
                &predicates,
                false,
            );
            assert_unsupported(result, scope, "buildJoin");
        }
    }

    #[tokio::test]
    async fn test_resolve_shim() {
        let registry = CapabilityRegistry::default();
        let catalog = EngineCatalog;

        let shim = registry
            .resolve_shim(Scope::Relational, DbId(0), &catalog)
            .await
            .unwrap();
        assert_eq!(shim.name(), "postgres-sql");

        let shim = registry
            .resolve_shim(Scope::Relational, DbId(1), &catalog)
            .await
            .unwrap();
        assert_eq!(shim.name(), "array-aql");

        let shim = registry.resolve_shim(Scope::Text, DbId(2), &catalog).await.unwrap();
        assert_eq!(shim.engine(), polystore_core::Engine::WideColumnEngine);

        let err = registry
            .resolve_shim(Scope::Array, DbId(0), &catalog)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, IslandError::NoShim { .. }));

        let err = registry
            .resolve_shim(Scope::Relational, DbId(99), &catalog)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, IslandError::CatalogLookup(_)));

        let err = registry
            .resolve_shim(Scope::Myria, DbId(3), &catalog)
            .await
            .err()
            .unwrap();
        assert_eq!(err.unsupported_context(), Some((Scope::Myria, "resolveShim")));
    }

    #[test]
    fn test_signatures() {
        let registry = CapabilityRegistry::default();
        let a = registry
            .signature(Scope::Relational, "SELECT * FROM region WHERE r_regionkey = 1", None)
            .unwrap();
        let b = registry
            .signature(Scope::Relational, "SELECT * FROM region WHERE r_regionkey = 4", None)
            .unwrap();
        assert!(a.same_shape(&b));
        assert_ne!(a.literals, b.literals);

        let text = r#"{"op": "scan", "table": "notes"}"#;
        assert_eq!(registry.literal_signature(Scope::Text, text).unwrap(), vec![text]);
    }
}
