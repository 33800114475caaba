// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::convert::Infallible;

use super::{
    AggregateSpec, JoinSpec, LimitSpec, MergeSpec, Operator, OperatorVisitor, ScanSpec, SortSpec,
    WindowSpec,
};

/// Referenced object name to the set of expressions evaluated against it.
pub type ObjectExpressionMap = BTreeMap<String, BTreeSet<String>>;

/// Folds `source` into `target`; expression sets of shared keys are unioned.
pub fn merge_mappings(target: &mut ObjectExpressionMap, source: ObjectExpressionMap) {
    for (object, expressions) in source {
        target.entry(object).or_default().extend(expressions);
    }
}

/// Builds the object-to-expression mapping bottom-up.
#[derive(Default)]
pub struct SignatureMapping {
    aliases: HashMap<String, String>,
}

impl SignatureMapping {
    fn children(&mut self, op: &Operator) -> ObjectExpressionMap {
        let mut map = ObjectExpressionMap::new();
        for child in op.children() {
            match child.accept(self) {
                Ok(child_map) => merge_mappings(&mut map, child_map),
                Err(never) => match never {},
            }
        }
        map
    }

    /// Objects whose name or alias qualifies a column in `predicate`.
    fn referenced_objects(&self, predicate: &str, map: &ObjectExpressionMap) -> Vec<String> {
        let qualifiers: BTreeSet<&str> = predicate
            .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '.'))
            .filter_map(|token| token.rsplit_once('.').map(|(q, _)| q))
            .collect();

        map.keys()
            .filter(|object| {
                qualifiers.iter().any(|q| {
                    *q == object.as_str()
                        || self.aliases.get(*q).map(String::as_str) == Some(object.as_str())
                })
            })
            .cloned()
            .collect()
    }
}

impl OperatorVisitor for SignatureMapping {
    type Output = ObjectExpressionMap;
    type Error = Infallible;

    fn visit_scan(
        &mut self,
        op: &Operator,
        scan: &ScanSpec,
    ) -> Result<ObjectExpressionMap, Infallible> {
        let mut map = self.children(op);
        if let Some(alias) = &scan.alias {
            self.aliases.insert(alias.clone(), scan.object.clone());
        }
        let entry = map.entry(scan.object.clone()).or_default();
        if let Some(filter) = &scan.filter {
            entry.insert(filter.clone());
        }
        Ok(map)
    }

    fn visit_join(
        &mut self,
        op: &Operator,
        join: &JoinSpec,
    ) -> Result<ObjectExpressionMap, Infallible> {
        let mut map = self.children(op);
        if let Some(predicate) = &join.predicate {
            let mut targets = self.referenced_objects(predicate, &map);
            if targets.is_empty() {
                targets = map.keys().cloned().collect();
            }
            for object in targets {
                map.entry(object).or_default().insert(predicate.clone());
            }
        }
        Ok(map)
    }

    fn visit_aggregate(
        &mut self,
        op: &Operator,
        _aggregate: &AggregateSpec,
    ) -> Result<ObjectExpressionMap, Infallible> {
        Ok(self.children(op))
    }

    fn visit_sort(
        &mut self,
        op: &Operator,
        _sort: &SortSpec,
    ) -> Result<ObjectExpressionMap, Infallible> {
        Ok(self.children(op))
    }

    fn visit_window(
        &mut self,
        op: &Operator,
        _window: &WindowSpec,
    ) -> Result<ObjectExpressionMap, Infallible> {
        Ok(self.children(op))
    }

    fn visit_merge(
        &mut self,
        op: &Operator,
        _merge: &MergeSpec,
    ) -> Result<ObjectExpressionMap, Infallible> {
        Ok(self.children(op))
    }

    fn visit_limit(
        &mut self,
        op: &Operator,
        _limit: &LimitSpec,
    ) -> Result<ObjectExpressionMap, Infallible> {
        Ok(self.children(op))
    }
}
