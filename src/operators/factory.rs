// SPDX-License-Identifier: Apache-2.0

//! Per-island operator factories.
//!
//! A factory maps a native plan-node label plus its already translated
//! children onto an `Operator`. Labels a factory does not know are treated
//! as schema-preserving steps (materialize, hash build, gather) and return
//! their sole child; any other arity is an error.

use polystore_core::Scope;
use tracing::trace;

use super::{
    AggregateSpec, BlockerSequence, JoinSpec, JoinType, LimitSpec, MergeSpec, Operator,
    OperatorKind, OutputSchema, PlanNode, ScanSpec, SortSpec, WindowSpec,
};
use crate::error::{IslandError, IslandResult};

pub trait OperatorFactory: Send + Sync {
    fn island(&self) -> Scope;

    fn create(
        &self,
        node: &PlanNode,
        children: Vec<Operator>,
        blockers: &mut BlockerSequence,
    ) -> IslandResult<Operator>;

    /// Nodes whose inputs are an engine detail and are not translated.
    fn skips_children(&self, _node: &PlanNode) -> bool {
        false
    }
}

/// Translates a whole plan bottom-up.
pub fn build_tree(
    factory: &dyn OperatorFactory,
    plan: &PlanNode,
    blockers: &mut BlockerSequence,
) -> IslandResult<Operator> {
    let mut children = Vec::with_capacity(plan.children.len());
    if !factory.skips_children(plan) {
        for child in &plan.children {
            children.push(build_tree(factory, child, blockers)?);
        }
    }
    factory.create(plan, children, blockers)
}

fn pass_through(island: Scope, node: &PlanNode, mut children: Vec<Operator>) -> IslandResult<Operator> {
    if children.len() == 1 {
        trace!(island = %island, label = %node.label, "Passing plan node through");
        if let Some(child) = children.pop() {
            return Ok(child);
        }
    }
    Err(IslandError::operator_tree(format!(
        "unsupported {} plan node '{}' with {} inputs",
        island,
        node.label,
        children.len()
    )))
}

fn declared_schema(node: &PlanNode) -> Option<OutputSchema> {
    (!node.output.is_empty()).then(|| OutputSchema::from_expressions(node.output.iter().cloned()))
}

fn scan(
    island: Scope,
    node: &PlanNode,
    object: Option<&str>,
    filter: Option<&str>,
    children: Vec<Operator>,
    blockers: &mut BlockerSequence,
) -> IslandResult<Operator> {
    let object = object.ok_or_else(|| {
        IslandError::operator_tree(format!("'{}' node names no object", node.label))
    })?;
    Operator::new(
        island,
        OperatorKind::Scan(ScanSpec {
            object: object.to_string(),
            alias: node.param_str("Alias").map(str::to_string),
            filter: filter.map(str::to_string),
        }),
        declared_schema(node),
        children,
        blockers,
    )
}

fn merge(
    island: Scope,
    node: &PlanNode,
    children: Vec<Operator>,
    blockers: &mut BlockerSequence,
) -> IslandResult<Operator> {
    Operator::new(
        island,
        OperatorKind::Merge(MergeSpec::default()),
        declared_schema(node),
        children,
        blockers,
    )
}

fn sort(
    island: Scope,
    node: &PlanNode,
    children: Vec<Operator>,
    blockers: &mut BlockerSequence,
) -> IslandResult<Operator> {
    Operator::new(
        island,
        OperatorKind::Sort(SortSpec {
            keys: node.param_list("Sort Key"),
        }),
        declared_schema(node),
        children,
        blockers,
    )
}

fn window(
    island: Scope,
    node: &PlanNode,
    children: Vec<Operator>,
    blockers: &mut BlockerSequence,
) -> IslandResult<Operator> {
    Operator::new(
        island,
        OperatorKind::WindowAggregate(WindowSpec {
            partition_by: node.param_list("Partition Key"),
            order_by: node.param_list("Order Key"),
            functions: node
                .output
                .iter()
                .filter(|o| o.contains("OVER") || o.contains("over"))
                .cloned()
                .collect(),
        }),
        declared_schema(node),
        children,
        blockers,
    )
}

fn two_children(node: &PlanNode, children: Vec<Operator>) -> IslandResult<(Operator, Operator)> {
    let count = children.len();
    let mut iter = children.into_iter();
    match (iter.next(), iter.next(), iter.next()) {
        (Some(left), Some(right), None) => Ok((left, right)),
        _ => Err(IslandError::operator_tree(format!(
            "'{}' needs exactly two inputs, got {}",
            node.label, count
        ))),
    }
}

fn aggregate_functions(node: &PlanNode) -> Vec<String> {
    node.output.iter().filter(|o| o.contains('(')).cloned().collect()
}

/// Relational island, fed by PostgreSQL plans.
pub struct RelationalOperatorFactory;

impl OperatorFactory for RelationalOperatorFactory {
    fn island(&self) -> Scope {
        Scope::Relational
    }

    fn skips_children(&self, node: &PlanNode) -> bool {
        node.label == "Bitmap Heap Scan"
    }

    fn create(
        &self,
        node: &PlanNode,
        mut children: Vec<Operator>,
        blockers: &mut BlockerSequence,
    ) -> IslandResult<Operator> {
        let island = Scope::Relational;
        match node.label.as_str() {
            "Seq Scan" | "Index Scan" | "Index Only Scan" | "Bitmap Heap Scan" => {
                let object = match (node.param_str("Schema"), node.param_str("Relation Name")) {
                    (Some(schema), Some(relation)) if schema != "public" => {
                        Some(format!("{}.{}", schema, relation))
                    }
                    (_, relation) => relation.map(str::to_string),
                };
                let filter = node.first_param(&["Filter", "Index Cond", "Recheck Cond"]);
                scan(island, node, object.as_deref(), filter, children, blockers)
            }
            "Subquery Scan" | "CTE Scan" => {
                let object = node.first_param(&["CTE Name", "Alias"]);
                scan(island, node, object, node.param_str("Filter"), children, blockers)
            }
            "Hash Join" | "Nested Loop" | "Merge Join" => {
                let (left, right) = two_children(node, children)?;
                let condition = node.first_param(&["Hash Cond", "Merge Cond"]);
                let join_filter = node.param_str("Join Filter");
                let join_type = match (node.param_str("Join Type"), condition, join_filter) {
                    (Some("Inner") | None, None, None) => JoinType::Cross,
                    (label, _, _) => JoinType::from_label(label.unwrap_or("Inner")),
                };
                let mut join = Operator::join(
                    island,
                    JoinSpec {
                        join_type,
                        predicate: condition.or(join_filter).map(str::to_string),
                        is_filter: condition.is_none() && join_filter.is_some(),
                    },
                    left,
                    right,
                );
                if let Some(schema) = declared_schema(node) {
                    join.schema = schema;
                }
                Ok(join)
            }
            "Unique" | "Aggregate" | "HashAggregate" | "GroupAggregate" => {
                let functions = aggregate_functions(node);
                let dedupes_union = node.label == "Unique" || functions.is_empty();
                if dedupes_union && children.len() == 1 && children[0].is_merge() {
                    if let Some(mut merged) = children.pop() {
                        merged.set_union_all(false)?;
                        return Ok(merged);
                    }
                }
                let distinct = node.label == "Unique";
                let group_by = if distinct {
                    node.output.clone()
                } else {
                    node.param_list("Group Key")
                };
                Operator::new(
                    island,
                    OperatorKind::Aggregate(AggregateSpec {
                        group_by,
                        aggregates: functions,
                        distinct,
                    }),
                    declared_schema(node),
                    children,
                    blockers,
                )
            }
            "Sort" | "Incremental Sort" => sort(island, node, children, blockers),
            "WindowAgg" => window(island, node, children, blockers),
            "Limit" => Operator::new(
                island,
                OperatorKind::Limit(LimitSpec {
                    count: node.param_u64("Limit Count"),
                }),
                declared_schema(node),
                children,
                blockers,
            ),
            "Append" | "Merge Append" => merge(island, node, children, blockers),
            _ => pass_through(island, node, children),
        }
    }
}

/// Array island, fed by the array engine's plan dump.
pub struct ArrayOperatorFactory;

impl OperatorFactory for ArrayOperatorFactory {
    fn island(&self) -> Scope {
        Scope::Array
    }

    fn create(
        &self,
        node: &PlanNode,
        children: Vec<Operator>,
        blockers: &mut BlockerSequence,
    ) -> IslandResult<Operator> {
        let island = Scope::Array;
        match node.label.as_str() {
            "Seq Scan" => {
                let object = node.first_param(&["Array Name", "Relation Name"]);
                scan(island, node, object, node.param_str("Filter"), children, blockers)
            }
            "Cross Join" => {
                let (left, right) = two_children(node, children)?;
                let predicate = node.param_str("Join Predicate").map(str::to_string);
                let mut join = Operator::join(
                    island,
                    JoinSpec {
                        join_type: JoinType::Cross,
                        is_filter: false,
                        predicate,
                    },
                    left,
                    right,
                );
                if let Some(schema) = declared_schema(node) {
                    join.schema = schema;
                }
                Ok(join)
            }
            "Aggregate" => Operator::new(
                island,
                OperatorKind::Aggregate(AggregateSpec {
                    group_by: node.param_list("Group Key"),
                    aggregates: aggregate_functions(node),
                    distinct: false,
                }),
                declared_schema(node),
                children,
                blockers,
            ),
            "Sort" => sort(island, node, children, blockers),
            "WindowAgg" => window(island, node, children, blockers),
            "Merge" => merge(island, node, children, blockers),
            _ => pass_through(island, node, children),
        }
    }
}

/// Text island: scans over wide-column tables.
pub struct TextOperatorFactory;

impl OperatorFactory for TextOperatorFactory {
    fn island(&self) -> Scope {
        Scope::Text
    }

    fn create(
        &self,
        node: &PlanNode,
        children: Vec<Operator>,
        blockers: &mut BlockerSequence,
    ) -> IslandResult<Operator> {
        match node.label.as_str() {
            "Scan" => scan(
                Scope::Text,
                node,
                node.param_str("Table"),
                node.param_str("Range"),
                children,
                blockers,
            ),
            _ => pass_through(Scope::Text, node, children),
        }
    }
}
