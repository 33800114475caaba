// SPDX-License-Identifier: Apache-2.0

//! Island dispatch planning.
//!
//! Decides whether a tagged query compiles into an operator tree, runs
//! verbatim on a pass-through engine, or starts a cast.

use polystore_core::Scope;
use tracing::debug;

use super::tagger;
use super::types::{IslandDispatch, TaggedQuery};
use crate::error::IslandResult;
use crate::islands::CapabilityRegistry;
use crate::operators::{BlockerSequence, JoinType, Operator, PlanNode};
use crate::signature::QuerySignature;

/// Parses `query` and routes it by its island's capabilities.
pub fn plan_dispatch(registry: &CapabilityRegistry, query: &str) -> IslandResult<IslandDispatch> {
    let dispatch = match tagger::parse(query)? {
        TaggedQuery::Cast(cast) => IslandDispatch::Cast(cast),
        TaggedQuery::Island { scope, body } if registry.is_operator_tree_island(scope) => {
            IslandDispatch::OperatorTree {
                scope,
                schema_dbid: registry.schema_engine_id(scope)?,
                query: body,
            }
        }
        TaggedQuery::Island { scope, body } => IslandDispatch::PassThrough {
            scope,
            dbid: registry.passthrough_dbid(scope)?,
            query: body,
        },
    };
    debug!(?dispatch, "Planned island dispatch");
    Ok(dispatch)
}

/// Per-query compilation state.
///
/// Blocker ids are unique within one context, so a context must not be
/// shared between queries.
pub struct CompilationContext<'r> {
    registry: &'r CapabilityRegistry,
    blockers: BlockerSequence,
}

impl<'r> CompilationContext<'r> {
    pub fn new(registry: &'r CapabilityRegistry) -> Self {
        Self {
            registry,
            blockers: BlockerSequence::new(),
        }
    }

    pub fn build_tree(&mut self, scope: Scope, plan: &PlanNode) -> IslandResult<Operator> {
        self.registry
            .build_operator_tree(scope, plan, &mut self.blockers)
    }

    /// Joins two subtrees using predicates split out of `predicate_text`.
    pub fn build_join(
        &mut self,
        scope: Scope,
        left: Operator,
        right: Operator,
        join_type: JoinType,
        predicate_text: Option<&str>,
    ) -> IslandResult<Operator> {
        let predicates: Vec<String> = match predicate_text {
            Some(text) => self
                .registry
                .split_predicates(scope, text)?
                .into_iter()
                .collect(),
            None => Vec::new(),
        };
        self.registry
            .build_join(scope, left, right, join_type, &predicates, false)
    }

    pub fn signature(
        &self,
        scope: Scope,
        query: &str,
        tree: Option<&Operator>,
    ) -> IslandResult<QuerySignature> {
        self.registry.signature(scope, query, tree)
    }

    pub fn blockers_issued(&self) -> u32 {
        self.blockers.issued()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchemaEngineConfig;
    use crate::error::IslandError;
    use crate::federation::CastSpec;
    use crate::operators::test_support::scan;
    use crate::operators::OperatorKind;
    use polystore_core::DbId;
    use serde_json::json;

    fn registry_with_stream() -> CapabilityRegistry {
        CapabilityRegistry::new(SchemaEngineConfig {
            stream: Some(DbId(7)),
            ..SchemaEngineConfig::default()
        })
    }

    #[test]
    fn test_operator_tree_islands_use_schema_dbid() {
        let registry = registry_with_stream();
        let dispatch = plan_dispatch(&registry, "bdarray(scan(myarray))").unwrap();
        assert_eq!(
            dispatch,
            IslandDispatch::OperatorTree {
                scope: Scope::Array,
                schema_dbid: DbId(1),
                query: "scan(myarray)".into()
            }
        );
    }

    #[test]
    fn test_stream_passes_through() {
        let registry = registry_with_stream();
        let dispatch = plan_dispatch(&registry, "bdstream(select * from ticks);").unwrap();
        assert_eq!(
            dispatch,
            IslandDispatch::PassThrough {
                scope: Scope::Stream,
                dbid: DbId(7),
                query: "select * from ticks".into()
            }
        );
    }

    #[test]
    fn test_unconfigured_or_unsupported_islands_fail() {
        let registry = CapabilityRegistry::default();
        assert!(matches!(
            plan_dispatch(&registry, "bdmyria(scan(x))"),
            Err(IslandError::NotConfigured { scope: Scope::Myria, .. })
        ));
        let err = plan_dispatch(&registry, "bdkv(get k1)").unwrap_err();
        assert_eq!(
            err.unsupported_context(),
            Some((Scope::KeyValue, "passthroughDbid"))
        );
    }

    #[test]
    fn test_cast_dispatch() {
        let registry = CapabilityRegistry::default();
        let dispatch =
            plan_dispatch(&registry, "bdcast(bdrel(select * from region), region_arr, array)")
                .unwrap();
        let IslandDispatch::Cast(CastSpec {
            destination,
            object,
            ..
        }) = dispatch
        else {
            panic!("expected cast");
        };
        assert_eq!(destination, Scope::Array);
        assert_eq!(object.as_deref(), Some("region_arr"));
    }

    #[test]
    fn test_context_issues_unique_blockers() {
        let registry = CapabilityRegistry::default();
        let mut context = CompilationContext::new(&registry);
        let plan = PlanNode::from_postgres_explain(
            &json!([{
            "Plan": {
                "Node Type": "Sort",
                "Output": ["r_name"],
                "Sort Key": ["r_name"],
                "Plans": [{
                    "Node Type": "Aggregate",
                    "Output": ["r_name", "count(*)"],
                    "Group Key": ["r_name"],
                    "Plans": [{
                        "Node Type": "Seq Scan",
                        "Relation Name": "region",
                        "Schema": "public",
                        "Output": ["r_name"]
                    }]
                }]
            }
        }])
            .to_string(),
        )
        .unwrap();
        let tree = context.build_tree(Scope::Relational, &plan).unwrap();
        let inner = &tree.children()[0];
        assert!(tree.blocker().is_some() && inner.blocker().is_some());
        assert_ne!(tree.blocker(), inner.blocker());
        assert_eq!(context.blockers_issued(), 2);
    }

    #[test]
    fn test_context_join_splits_predicates() {
        let registry = CapabilityRegistry::default();
        let mut context = CompilationContext::new(&registry);
        let left = scan(Scope::Relational, "nation", None, &["n_regionkey"]);
        let right = scan(Scope::Relational, "region", None, &["r_regionkey"]);
        let join = context
            .build_join(
                Scope::Relational,
                left,
                right,
                JoinType::Inner,
                Some("(region.r_regionkey = nation.n_regionkey)"),
            )
            .unwrap();
        let OperatorKind::Join(spec) = join.kind() else {
            panic!("expected join");
        };
        assert_eq!(
            spec.predicate.as_deref(),
            Some("nation.n_regionkey=region.r_regionkey")
        );
        assert!(context
            .build_join(
                Scope::Text,
                scan(Scope::Text, "a", None, &[]),
                scan(Scope::Text, "b", None, &[]),
                JoinType::Cross,
                None,
            )
            .is_err());
    }
}
