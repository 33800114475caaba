// SPDX-License-Identifier: Apache-2.0

//! Parsed native execution plans.
//!
//! Plan-parser collaborators hand the core a `PlanNode` tree: a node label
//! as the engine prints it (`Hash Join`, `Seq Scan`, `Cross Join`), the
//! node's raw parameters, its output expressions, and its inputs.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{IslandError, IslandResult};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanNode {
    pub label: String,
    pub parameters: BTreeMap<String, Value>,
    pub output: Vec<String>,
    pub children: Vec<PlanNode>,
}

impl PlanNode {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_output<I, S>(mut self, output: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output = output.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_child(mut self, child: PlanNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(Value::as_str)
    }

    /// First present string parameter among `keys`.
    pub fn first_param(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|key| self.param_str(key))
    }

    /// A list parameter; a single string is treated as a one-element list.
    pub fn param_list(&self, key: &str) -> Vec<String> {
        match self.parameters.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(Value::String(s)) => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    pub fn param_u64(&self, key: &str) -> Option<u64> {
        self.parameters.get(key).and_then(Value::as_u64)
    }

    /// Reads the output of PostgreSQL `EXPLAIN (VERBOSE, FORMAT JSON)`.
    pub fn from_postgres_explain(json: &str) -> IslandResult<PlanNode> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| IslandError::malformed(format!("invalid plan JSON: {}", e)))?;

        let root = match &value {
            Value::Array(items) => items.first(),
            other => Some(other),
        }
        .and_then(|entry| entry.get("Plan"))
        .ok_or_else(|| IslandError::malformed("plan JSON has no \"Plan\" entry"))?;

        Self::from_postgres_node(root)
    }

    fn from_postgres_node(node: &Value) -> IslandResult<PlanNode> {
        let object = node
            .as_object()
            .ok_or_else(|| IslandError::malformed("plan node is not an object"))?;

        let label = object
            .get("Node Type")
            .and_then(Value::as_str)
            .ok_or_else(|| IslandError::malformed("plan node without \"Node Type\""))?;

        let mut plan = PlanNode::new(label);
        for (key, value) in object {
            match key.as_str() {
                "Node Type" => {}
                "Output" => {
                    plan.output = value
                        .as_array()
                        .map(|items| {
                            items
                                .iter()
                                .filter_map(|v| v.as_str().map(str::to_string))
                                .collect()
                        })
                        .unwrap_or_default();
                }
                "Plans" => {
                    if let Some(children) = value.as_array() {
                        for child in children {
                            plan.children.push(Self::from_postgres_node(child)?);
                        }
                    }
                }
                _ => {
                    plan.parameters.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPLAIN: &str = r#"[
      {
        "Plan": {
          "Node Type": "Hash Join",
          "Join Type": "Inner",
          "Output": ["nation.n_name", "region.r_name"],
          "Hash Cond": "(nation.n_regionkey = region.r_regionkey)",
          "Plans": [
            {
              "Node Type": "Seq Scan",
              "Relation Name": "nation",
              "Schema": "public",
              "Alias": "nation",
              "Output": ["nation.n_name", "nation.n_regionkey"]
            },
            {
              "Node Type": "Hash",
              "Output": ["region.r_name", "region.r_regionkey"],
              "Plans": [
                {
                  "Node Type": "Seq Scan",
                  "Relation Name": "region",
                  "Alias": "region",
                  "Filter": "(region.r_regionkey > 1)",
                  "Output": ["region.r_name", "region.r_regionkey"]
                }
              ]
            }
          ]
        }
      }
    ]"#;

    #[test]
    fn test_reads_postgres_explain() {
        let plan = PlanNode::from_postgres_explain(EXPLAIN).unwrap();
        assert_eq!(plan.label, "Hash Join");
        assert_eq!(plan.param_str("Join Type"), Some("Inner"));
        assert_eq!(plan.output, vec!["nation.n_name", "region.r_name"]);
        assert_eq!(plan.children.len(), 2);
        assert_eq!(plan.children[1].label, "Hash");
        assert_eq!(
            plan.children[1].children[0].param_str("Filter"),
            Some("(region.r_regionkey > 1)")
        );
    }

    #[test]
    fn test_rejects_plan_without_node_type() {
        let err = PlanNode::from_postgres_explain(r#"[{"Plan": {"Plans": []}}]"#).unwrap_err();
        assert!(matches!(err, IslandError::MalformedQuery { .. }));
        assert!(PlanNode::from_postgres_explain("[]").is_err());
    }

    #[test]
    fn test_param_list_accepts_scalar() {
        let node = PlanNode::new("Sort")
            .with_param("Sort Key", "r_name")
            .with_param("Plan Rows", 5);
        assert_eq!(node.param_list("Sort Key"), vec!["r_name"]);
        assert_eq!(node.param_u64("Plan Rows"), Some(5));
    }
}
