// SPDX-License-Identifier: Apache-2.0

//! Engine-agnostic operator tree.
//!
//! One `Operator` sum type covers every island; the `island` field and the
//! per-kind payload carry island-specific details. Trees
//! are built bottom-up from a native plan by an island's `OperatorFactory`
//! and are read-only afterwards, except for the union flag of a merge node,
//! which its parent may set once during construction.

pub mod factory;
pub mod plan;
pub mod signature_map;
pub mod tree_repr;
pub mod visitor;

use std::fmt;

use polystore_core::Scope;
use serde::Serialize;

use crate::error::{IslandError, IslandResult};

pub use factory::{
    build_tree, ArrayOperatorFactory, OperatorFactory, RelationalOperatorFactory,
    TextOperatorFactory,
};
pub use plan::PlanNode;
pub use signature_map::{ObjectExpressionMap, SignatureMapping};
pub use tree_repr::TreeRepresentation;
pub use visitor::OperatorVisitor;

/// Materialization boundary id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BlockerId(pub u32);

impl fmt::Display for BlockerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blocker{}", self.0)
    }
}

/// Hands out monotonically increasing blocker ids for one compilation.
#[derive(Debug, Default)]
pub struct BlockerSequence {
    next: u32,
}

impl BlockerSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> BlockerId {
        let id = BlockerId(self.next);
        self.next += 1;
        id
    }

    /// Number of ids issued so far.
    pub fn issued(&self) -> u32 {
        self.next
    }
}

/// One output column: its name and the expression that produces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attribute {
    pub name: String,
    pub expression: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
        }
    }

    /// Attribute whose expression is the (possibly qualified) column itself.
    pub fn column(expression: impl Into<String>) -> Self {
        let expression = expression.into();
        let name = expression
            .rsplit('.')
            .next()
            .unwrap_or(&expression)
            .to_string();
        Self { name, expression }
    }
}

/// Ordered attribute list produced by an operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutputSchema {
    attributes: Vec<Attribute>,
}

impl OutputSchema {
    pub fn new(attributes: Vec<Attribute>) -> Self {
        Self { attributes }
    }

    pub fn from_expressions<I, S>(expressions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(expressions.into_iter().map(Attribute::column).collect())
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|a| a.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    fn concat(left: &OutputSchema, right: &OutputSchema) -> Self {
        let mut attributes = left.attributes.clone();
        attributes.extend(right.attributes.iter().cloned());
        Self { attributes }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
    Semi,
    Anti,
}

impl JoinType {
    /// Parses a plan's join type label; unknown labels are treated as inner.
    pub fn from_label(label: &str) -> JoinType {
        match label.trim().to_ascii_lowercase().as_str() {
            "left" => JoinType::Left,
            "right" => JoinType::Right,
            "full" => JoinType::Full,
            "cross" => JoinType::Cross,
            "semi" => JoinType::Semi,
            "anti" => JoinType::Anti,
            _ => JoinType::Inner,
        }
    }

    pub fn sql_keyword(self) -> &'static str {
        match self {
            JoinType::Inner | JoinType::Semi | JoinType::Anti => "JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Full => "FULL JOIN",
            JoinType::Cross => "CROSS JOIN",
        }
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JoinType::Inner => "inner",
            JoinType::Left => "left",
            JoinType::Right => "right",
            JoinType::Full => "full",
            JoinType::Cross => "cross",
            JoinType::Semi => "semi",
            JoinType::Anti => "anti",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSpec {
    pub object: String,
    pub alias: Option<String>,
    pub filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSpec {
    pub join_type: JoinType,
    /// `None` means an unconditional join.
    pub predicate: Option<String>,
    /// The predicate filters the joined rows rather than driving the match.
    pub is_filter: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateSpec {
    pub group_by: Vec<String>,
    pub aggregates: Vec<String>,
    pub distinct: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortSpec {
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowSpec {
    pub partition_by: Vec<String>,
    pub order_by: Vec<String>,
    pub functions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSpec {
    union_all: Option<bool>,
}

impl MergeSpec {
    /// Defaults to `UNION ALL` semantics until a parent says otherwise.
    pub fn is_union_all(&self) -> bool {
        self.union_all.unwrap_or(true)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LimitSpec {
    pub count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorKind {
    Scan(ScanSpec),
    Join(JoinSpec),
    Aggregate(AggregateSpec),
    Sort(SortSpec),
    WindowAggregate(WindowSpec),
    Merge(MergeSpec),
    Limit(LimitSpec),
}

impl OperatorKind {
    pub fn label(&self) -> &'static str {
        match self {
            OperatorKind::Scan(_) => "scan",
            OperatorKind::Join(_) => "join",
            OperatorKind::Aggregate(_) => "aggregate",
            OperatorKind::Sort(_) => "sort",
            OperatorKind::WindowAggregate(_) => "window",
            OperatorKind::Merge(_) => "union",
            OperatorKind::Limit(_) => "limit",
        }
    }

    /// Blocking operators must consume all input before producing output.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            OperatorKind::Aggregate(_)
                | OperatorKind::Sort(_)
                | OperatorKind::WindowAggregate(_)
                | OperatorKind::Merge(_)
        )
    }

    fn accepts_children(&self, count: usize) -> bool {
        match self {
            OperatorKind::Scan(_) => count <= 1,
            OperatorKind::Join(_) => count == 2,
            OperatorKind::Merge(_) => count >= 1,
            OperatorKind::Aggregate(_)
            | OperatorKind::Sort(_)
            | OperatorKind::WindowAggregate(_)
            | OperatorKind::Limit(_) => count == 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operator {
    island: Scope,
    kind: OperatorKind,
    schema: OutputSchema,
    children: Vec<Operator>,
    blocker: Option<BlockerId>,
}

impl Operator {
    /// Builds a node, validating its arity. When `schema` is `None` the
    /// output is derived from the children: the single child, the first
    /// child of a merge, or left followed by right for a join. Blocking
    /// kinds draw a blocker id from `blockers`.
    pub fn new(
        island: Scope,
        kind: OperatorKind,
        schema: Option<OutputSchema>,
        children: Vec<Operator>,
        blockers: &mut BlockerSequence,
    ) -> IslandResult<Self> {
        if !kind.accepts_children(children.len()) {
            return Err(IslandError::operator_tree(format!(
                "{} operator cannot take {} children",
                kind.label(),
                children.len()
            )));
        }

        let schema = match schema {
            Some(schema) => schema,
            None => match (&kind, children.as_slice()) {
                (OperatorKind::Join(_), [left, right]) => {
                    OutputSchema::concat(&left.schema, &right.schema)
                }
                (_, [first, ..]) => first.schema.clone(),
                (_, []) => OutputSchema::default(),
            },
        };

        let blocker = kind.is_blocking().then(|| blockers.next_id());

        Ok(Self {
            island,
            kind,
            schema,
            children,
            blocker,
        })
    }

    /// Non-blocking join node; joins never draw a blocker id.
    pub fn join(island: Scope, spec: JoinSpec, left: Operator, right: Operator) -> Self {
        let schema = OutputSchema::concat(&left.schema, &right.schema);
        Self {
            island,
            kind: OperatorKind::Join(spec),
            schema,
            children: vec![left, right],
            blocker: None,
        }
    }

    pub fn island(&self) -> Scope {
        self.island
    }

    pub fn kind(&self) -> &OperatorKind {
        &self.kind
    }

    pub fn schema(&self) -> &OutputSchema {
        &self.schema
    }

    pub fn children(&self) -> &[Operator] {
        &self.children
    }

    pub fn blocker(&self) -> Option<BlockerId> {
        self.blocker
    }

    pub fn is_blocking(&self) -> bool {
        self.blocker.is_some()
    }

    pub fn is_merge(&self) -> bool {
        matches!(self.kind, OperatorKind::Merge(_))
    }

    /// Sets the union flag of a merge node. Allowed once per node.
    pub fn set_union_all(&mut self, union_all: bool) -> IslandResult<()> {
        match &mut self.kind {
            OperatorKind::Merge(spec) => {
                if spec.union_all.is_some() {
                    return Err(IslandError::operator_tree(
                        "union flag of merge operator already set",
                    ));
                }
                spec.union_all = Some(union_all);
                Ok(())
            }
            other => Err(IslandError::operator_tree(format!(
                "cannot set union flag on {} operator",
                other.label()
            ))),
        }
    }

    pub fn accept<V: OperatorVisitor>(&self, visitor: &mut V) -> Result<V::Output, V::Error> {
        match &self.kind {
            OperatorKind::Scan(spec) => visitor.visit_scan(self, spec),
            OperatorKind::Join(spec) => visitor.visit_join(self, spec),
            OperatorKind::Aggregate(spec) => visitor.visit_aggregate(self, spec),
            OperatorKind::Sort(spec) => visitor.visit_sort(self, spec),
            OperatorKind::WindowAggregate(spec) => visitor.visit_window(self, spec),
            OperatorKind::Merge(spec) => visitor.visit_merge(self, spec),
            OperatorKind::Limit(spec) => visitor.visit_limit(self, spec),
        }
    }

    /// Shape of the tree with literal values left out, e.g.
    /// `{union{scan:a}{scan:b}}`.
    pub fn tree_representation(&self) -> String {
        match self.accept(&mut TreeRepresentation) {
            Ok(repr) => repr,
            Err(never) => match never {},
        }
    }

    /// Referenced object to expression-set mapping, merged bottom-up.
    pub fn object_expression_mapping(&self) -> ObjectExpressionMap {
        match self.accept(&mut SignatureMapping::default()) {
            Ok(map) => map,
            Err(never) => match never {},
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn scan(island: Scope, object: &str, filter: Option<&str>, columns: &[&str]) -> Operator {
        let mut blockers = BlockerSequence::new();
        Operator::new(
            island,
            OperatorKind::Scan(ScanSpec {
                object: object.to_string(),
                alias: None,
                filter: filter.map(str::to_string),
            }),
            Some(OutputSchema::from_expressions(columns.iter().copied())),
            vec![],
            &mut blockers,
        )
        .unwrap()
    }
}
