// SPDX-License-Identifier: Apache-2.0

//! SQL-family text generation.
//!
//! Scans and joins of scans are rendered as plain `FROM` items so that
//! qualified column references keep resolving; every other input becomes a
//! derived table.

use polystore_core::Engine;

use super::Shim;
use crate::error::{IslandError, IslandResult};
use crate::operators::{
    AggregateSpec, JoinSpec, JoinType, LimitSpec, MergeSpec, Operator, OperatorKind,
    OperatorVisitor, ScanSpec, SortSpec, WindowSpec,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    /// PostgreSQL on the relational engine.
    Postgres,
    /// AQL on the array engine.
    Aql,
}

pub struct SqlShim {
    dialect: SqlDialect,
}

impl SqlShim {
    pub const fn new(dialect: SqlDialect) -> Self {
        Self { dialect }
    }
}

impl Shim for SqlShim {
    fn name(&self) -> &'static str {
        match self.dialect {
            SqlDialect::Postgres => "postgres-sql",
            SqlDialect::Aql => "array-aql",
        }
    }

    fn engine(&self) -> Engine {
        match self.dialect {
            SqlDialect::Postgres => Engine::RelationalEngine,
            SqlDialect::Aql => Engine::ArrayEngine,
        }
    }

    fn render(&self, root: &Operator) -> IslandResult<String> {
        root.accept(&mut SqlGenerator {
            dialect: self.dialect,
            next_alias: 0,
        })
    }
}

struct SqlGenerator {
    dialect: SqlDialect,
    next_alias: u32,
}

/// A `FROM` clause plus the filters that belong in its `WHERE`.
struct FromItem {
    from: String,
    filters: Vec<String>,
}

impl SqlGenerator {
    fn unsupported(&self, what: &str) -> IslandError {
        IslandError::operator_tree(format!("{} cannot be expressed in {:?}", what, self.dialect))
    }

    fn from_item(&mut self, op: &Operator) -> IslandResult<FromItem> {
        match op.kind() {
            OperatorKind::Scan(scan) if op.children().is_empty() => {
                let from = match &scan.alias {
                    Some(alias) if alias != &scan.object => format!("{} AS {}", scan.object, alias),
                    _ => scan.object.clone(),
                };
                Ok(FromItem {
                    from,
                    filters: scan.filter.iter().cloned().collect(),
                })
            }
            OperatorKind::Join(join) => {
                let [left, right] = op.children() else {
                    return Err(IslandError::operator_tree("join without two inputs"));
                };
                let left = self.from_item(left)?;
                let right = self.from_item(right)?;
                let mut filters = left.filters;
                filters.extend(right.filters);

                let on_clause = match (&join.predicate, join.is_filter, join.join_type) {
                    (Some(predicate), false, kind) if kind != JoinType::Cross => {
                        Some(predicate.clone())
                    }
                    (Some(predicate), _, _) => {
                        filters.push(predicate.clone());
                        None
                    }
                    (None, _, _) => None,
                };

                let from = match on_clause {
                    Some(on) => format!(
                        "{} {} {} ON {}",
                        left.from,
                        join.join_type.sql_keyword(),
                        right.from,
                        on
                    ),
                    None => format!("{} CROSS JOIN {}", left.from, right.from),
                };
                Ok(FromItem { from, filters })
            }
            _ => {
                let inner = op.accept(self)?;
                let alias = format!("sub{}", self.next_alias);
                self.next_alias += 1;
                Ok(FromItem {
                    from: format!("({}) AS {}", inner, alias),
                    filters: Vec::new(),
                })
            }
        }
    }

    fn single_input(&mut self, op: &Operator) -> IslandResult<FromItem> {
        match op.children() {
            [child] => self.from_item(child),
            _ => Err(IslandError::operator_tree("operator expects a single input")),
        }
    }

    fn select(columns: &str, item: &FromItem) -> String {
        let mut sql = format!("SELECT {} FROM {}", columns, item.from);
        if !item.filters.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&item.filters.join(" AND "));
        }
        sql
    }

    fn projection(op: &Operator) -> String {
        if op.schema().is_empty() {
            "*".to_string()
        } else {
            op.schema()
                .attributes()
                .iter()
                .map(|a| a.expression.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        }
    }
}

impl OperatorVisitor for SqlGenerator {
    type Output = String;
    type Error = IslandError;

    fn visit_scan(&mut self, op: &Operator, scan: &ScanSpec) -> IslandResult<String> {
        let item = match op.children() {
            [] => self.from_item(op)?,
            [child] => {
                let inner = self.from_item(child)?;
                let alias = scan.alias.clone().unwrap_or_else(|| scan.object.clone());
                FromItem {
                    from: format!("({}) AS {}", Self::select("*", &inner), alias),
                    filters: scan.filter.iter().cloned().collect(),
                }
            }
            _ => return Err(IslandError::operator_tree("scan with several inputs")),
        };
        Ok(Self::select(&Self::projection(op), &item))
    }

    fn visit_join(&mut self, op: &Operator, _join: &JoinSpec) -> IslandResult<String> {
        let item = self.from_item(op)?;
        Ok(Self::select(&Self::projection(op), &item))
    }

    fn visit_aggregate(&mut self, op: &Operator, aggregate: &AggregateSpec) -> IslandResult<String> {
        if aggregate.distinct && self.dialect == SqlDialect::Aql {
            return Err(self.unsupported("DISTINCT"));
        }
        let item = self.single_input(op)?;
        let mut columns: Vec<&str> = aggregate.group_by.iter().map(String::as_str).collect();
        columns.extend(aggregate.aggregates.iter().map(String::as_str));
        let columns = if columns.is_empty() {
            "*".to_string()
        } else {
            columns.join(", ")
        };
        let columns = if aggregate.distinct {
            format!("DISTINCT {}", columns)
        } else {
            columns
        };

        let mut sql = Self::select(&columns, &item);
        if !aggregate.distinct && !aggregate.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&aggregate.group_by.join(", "));
        }
        Ok(sql)
    }

    fn visit_sort(&mut self, op: &Operator, sort: &SortSpec) -> IslandResult<String> {
        let item = self.single_input(op)?;
        let mut sql = Self::select(&Self::projection(op), &item);
        if !sort.keys.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&sort.keys.join(", "));
        }
        Ok(sql)
    }

    fn visit_window(&mut self, op: &Operator, _window: &WindowSpec) -> IslandResult<String> {
        let item = self.single_input(op)?;
        Ok(Self::select(&Self::projection(op), &item))
    }

    fn visit_merge(&mut self, op: &Operator, merge: &MergeSpec) -> IslandResult<String> {
        if self.dialect == SqlDialect::Aql {
            return Err(self.unsupported("UNION"));
        }
        let separator = if merge.is_union_all() {
            " UNION ALL "
        } else {
            " UNION "
        };
        let mut parts = Vec::with_capacity(op.children().len());
        for child in op.children() {
            parts.push(child.accept(self)?);
        }
        Ok(parts.join(separator))
    }

    fn visit_limit(&mut self, op: &Operator, limit: &LimitSpec) -> IslandResult<String> {
        if self.dialect == SqlDialect::Aql {
            return Err(self.unsupported("LIMIT"));
        }
        let item = self.single_input(op)?;
        let mut sql = Self::select(&Self::projection(op), &item);
        if let Some(count) = limit.count {
            sql.push_str(&format!(" LIMIT {}", count));
        }
        Ok(sql)
    }
}
