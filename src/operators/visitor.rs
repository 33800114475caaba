// SPDX-License-Identifier: Apache-2.0

//! Visitor contract over the operator tree.
//!
//! Consumers (tree dumps, signature extraction, engine text generation)
//! implement one method per operator kind and recurse into children through
//! `Operator::accept`, instead of branching on the kind themselves.

use super::{
    AggregateSpec, JoinSpec, LimitSpec, MergeSpec, Operator, ScanSpec, SortSpec, WindowSpec,
};

pub trait OperatorVisitor {
    type Output;
    type Error;

    fn visit_scan(&mut self, op: &Operator, scan: &ScanSpec) -> Result<Self::Output, Self::Error>;

    fn visit_join(&mut self, op: &Operator, join: &JoinSpec) -> Result<Self::Output, Self::Error>;

    fn visit_aggregate(
        &mut self,
        op: &Operator,
        aggregate: &AggregateSpec,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_sort(&mut self, op: &Operator, sort: &SortSpec) -> Result<Self::Output, Self::Error>;

    fn visit_window(
        &mut self,
        op: &Operator,
        window: &WindowSpec,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_merge(&mut self, op: &Operator, merge: &MergeSpec)
        -> Result<Self::Output, Self::Error>;

    fn visit_limit(&mut self, op: &Operator, limit: &LimitSpec)
        -> Result<Self::Output, Self::Error>;
}
