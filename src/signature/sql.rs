// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeSet;
use std::ops::ControlFlow;

use sqlparser::ast::{visit_expressions, visit_relations, Expr, Statement, Value};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

use crate::error::{IslandError, IslandResult};

fn parse(query: &str) -> IslandResult<Vec<Statement>> {
    Parser::parse_sql(&PostgreSqlDialect {}, query)
        .map_err(|e| IslandError::malformed(format!("relational query: {}", e)))
}

/// Relations referenced anywhere in the statement, subqueries included.
pub fn objects(query: &str) -> IslandResult<BTreeSet<String>> {
    let statements = parse(query)?;
    let mut objects = BTreeSet::new();
    let _ = visit_relations(&statements, |relation| {
        objects.insert(relation.to_string());
        ControlFlow::<()>::Continue(())
    });
    Ok(objects)
}

/// Constant values in the order they appear.
pub fn literals(query: &str) -> IslandResult<Vec<String>> {
    let statements = parse(query)?;
    let mut literals = Vec::new();
    let _ = visit_expressions(&statements, |expr| {
        if let Expr::Value(value) = expr {
            if let Some(text) = literal_text(&value.value) {
                literals.push(text);
            }
        }
        ControlFlow::<()>::Continue(())
    });
    Ok(literals)
}

fn literal_text(value: &Value) -> Option<String> {
    match value {
        Value::Number(number, _) => Some(number.clone()),
        Value::SingleQuotedString(s)
        | Value::DoubleQuotedString(s)
        | Value::EscapedStringLiteral(s)
        | Value::NationalStringLiteral(s) => Some(s.clone()),
        Value::Boolean(b) => Some(b.to_string()),
        Value::Null | Value::Placeholder(_) => None,
        other => Some(other.to_string()),
    }
}
