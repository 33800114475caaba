// SPDX-License-Identifier: Apache-2.0

//! AFL generation for the array engine.

use polystore_core::Engine;

use super::Shim;
use crate::error::{IslandError, IslandResult};
use crate::operators::{
    AggregateSpec, JoinSpec, LimitSpec, MergeSpec, Operator, OperatorVisitor, ScanSpec, SortSpec,
    WindowSpec,
};

pub struct AflShim;

impl Shim for AflShim {
    fn name(&self) -> &'static str {
        "array-afl"
    }

    fn engine(&self) -> Engine {
        Engine::ArrayEngine
    }

    fn render(&self, root: &Operator) -> IslandResult<String> {
        root.accept(&mut AflGenerator)
    }
}

struct AflGenerator;

impl AflGenerator {
    fn call(name: &str, args: impl IntoIterator<Item = String>) -> String {
        format!("{}({})", name, args.into_iter().collect::<Vec<_>>().join(", "))
    }

    fn input(&mut self, op: &Operator) -> IslandResult<String> {
        match op.children() {
            [child] => child.accept(self),
            _ => Err(IslandError::operator_tree("AFL operator expects a single input")),
        }
    }
}

impl OperatorVisitor for AflGenerator {
    type Output = String;
    type Error = IslandError;

    fn visit_scan(&mut self, op: &Operator, scan: &ScanSpec) -> IslandResult<String> {
        let base = match op.children() {
            [] => Self::call("scan", [scan.object.clone()]),
            [child] => child.accept(self)?,
            _ => return Err(IslandError::operator_tree("scan with several inputs")),
        };
        Ok(match &scan.filter {
            Some(filter) => Self::call("filter", [base, filter.clone()]),
            None => base,
        })
    }

    fn visit_join(&mut self, op: &Operator, join: &JoinSpec) -> IslandResult<String> {
        let mut args = Vec::with_capacity(3);
        for child in op.children() {
            args.push(child.accept(self)?);
        }
        if let Some(predicate) = &join.predicate {
            args.push(predicate.clone());
        }
        Ok(Self::call("cross_join", args))
    }

    fn visit_aggregate(&mut self, op: &Operator, aggregate: &AggregateSpec) -> IslandResult<String> {
        if aggregate.aggregates.is_empty() {
            return Err(IslandError::operator_tree("AFL aggregate needs at least one function"));
        }
        let mut args = vec![self.input(op)?];
        args.extend(aggregate.aggregates.iter().cloned());
        args.extend(aggregate.group_by.iter().cloned());
        Ok(Self::call("aggregate", args))
    }

    fn visit_sort(&mut self, op: &Operator, sort: &SortSpec) -> IslandResult<String> {
        let mut args = vec![self.input(op)?];
        args.extend(sort.keys.iter().cloned());
        Ok(Self::call("sort", args))
    }

    fn visit_window(&mut self, op: &Operator, window: &WindowSpec) -> IslandResult<String> {
        let mut args = vec![self.input(op)?];
        args.extend(window.functions.iter().cloned());
        Ok(Self::call("window", args))
    }

    fn visit_merge(&mut self, op: &Operator, _merge: &MergeSpec) -> IslandResult<String> {
        let mut rendered = op.children().iter();
        let first = match rendered.next() {
            Some(child) => child.accept(self)?,
            None => return Err(IslandError::operator_tree("merge without inputs")),
        };
        rendered.try_fold(first, |acc, child| -> IslandResult<String> {
            Ok(Self::call("merge", [acc, child.accept(self)?]))
        })
    }

    fn visit_limit(&mut self, op: &Operator, limit: &LimitSpec) -> IslandResult<String> {
        let input = self.input(op)?;
        Ok(match limit.count {
            Some(count) => Self::call("limit", [input, count.to_string()]),
            None => input,
        })
    }
}
