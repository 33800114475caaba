// SPDX-License-Identifier: Apache-2.0

//! Text island fingerprints. Text queries are scan descriptors such as
//! `{ 'op' : 'scan', 'table' : 'notes', 'range' : ['a', 'f'] }`.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::error::{IslandError, IslandResult};

fn parse(query: &str) -> IslandResult<Value> {
    serde_json::from_str(query)
        .or_else(|_| serde_json::from_str(&query.replace('\'', "\"")))
        .map_err(|e| IslandError::malformed(format!("text query: {}", e)))
}

pub fn objects(query: &str) -> IslandResult<BTreeSet<String>> {
    let descriptor = parse(query)?;
    let table = descriptor
        .get("table")
        .and_then(Value::as_str)
        .ok_or_else(|| IslandError::malformed("text query names no table"))?;
    Ok(BTreeSet::from([table.to_string()]))
}

/// The whole descriptor is the literal signature.
pub fn literals(query: &str) -> Vec<String> {
    vec![query.to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_quoted_descriptor() {
        let objs = objects("{ 'op' : 'scan', 'table' : 'mimic_logs', 'range' : ['r_0001','r_0015'] }")
            .unwrap();
        assert!(objs.contains("mimic_logs"));
    }

    #[test]
    fn test_missing_table() {
        assert!(objects(r#"{"op": "scan"}"#).is_err());
        assert!(objects("scan notes").is_err());
    }
}
