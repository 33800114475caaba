// SPDX-License-Identifier: Apache-2.0

use std::convert::Infallible;

use super::{
    AggregateSpec, JoinSpec, LimitSpec, MergeSpec, Operator, OperatorVisitor, ScanSpec, SortSpec,
    WindowSpec,
};

/// Serializes the tree shape: operator labels, scanned objects, and nesting.
/// Filters, predicates, and other literal-bearing text are omitted so that
/// queries differing only in constants share a representation.
pub struct TreeRepresentation;

impl TreeRepresentation {
    fn wrap(&mut self, head: &str, op: &Operator) -> String {
        let mut out = String::from("{");
        out.push_str(head);
        for child in op.children() {
            out.push_str(&child.tree_representation());
        }
        out.push('}');
        out
    }
}

impl OperatorVisitor for TreeRepresentation {
    type Output = String;
    type Error = Infallible;

    fn visit_scan(&mut self, op: &Operator, scan: &ScanSpec) -> Result<String, Infallible> {
        Ok(self.wrap(&format!("scan:{}", scan.object), op))
    }

    fn visit_join(&mut self, op: &Operator, join: &JoinSpec) -> Result<String, Infallible> {
        Ok(self.wrap(&format!("join:{}", join.join_type), op))
    }

    fn visit_aggregate(
        &mut self,
        op: &Operator,
        aggregate: &AggregateSpec,
    ) -> Result<String, Infallible> {
        let head = if aggregate.distinct {
            "distinct"
        } else {
            "aggregate"
        };
        Ok(self.wrap(head, op))
    }

    fn visit_sort(&mut self, op: &Operator, _sort: &SortSpec) -> Result<String, Infallible> {
        Ok(self.wrap("sort", op))
    }

    fn visit_window(&mut self, op: &Operator, _window: &WindowSpec) -> Result<String, Infallible> {
        Ok(self.wrap("window", op))
    }

    fn visit_merge(&mut self, op: &Operator, _merge: &MergeSpec) -> Result<String, Infallible> {
        Ok(self.wrap("union", op))
    }

    fn visit_limit(&mut self, op: &Operator, _limit: &LimitSpec) -> Result<String, Infallible> {
        Ok(self.wrap("limit", op))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::scan;
    use super::super::{BlockerSequence, MergeSpec, OperatorKind};
    use super::*;
    use polystore_core::Scope;

    #[test]
    fn test_union_representation() {
        let mut blockers = BlockerSequence::new();
        let merge = Operator::new(
            Scope::Relational,
            OperatorKind::Merge(MergeSpec::default()),
            None,
            vec![
                scan(Scope::Relational, "region", Some("r_regionkey > 2"), &[]),
                scan(Scope::Relational, "nation", None, &[]),
            ],
            &mut blockers,
        )
        .unwrap();

        assert_eq!(
            merge.tree_representation(),
            "{union{scan:region}{scan:nation}}"
        );
    }

    #[test]
    fn test_literals_do_not_change_shape() {
        let a = scan(Scope::Relational, "region", Some("r_regionkey > 2"), &[]);
        let b = scan(Scope::Relational, "region", Some("r_regionkey > 4"), &[]);
        assert_eq!(a.tree_representation(), b.tree_representation());
    }
}
