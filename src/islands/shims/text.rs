// SPDX-License-Identifier: Apache-2.0

use polystore_core::Engine;
use serde_json::json;

use super::Shim;
use crate::error::{IslandError, IslandResult};
use crate::operators::{Operator, OperatorKind};

/// Renders a text-island scan as the wide-column engine's JSON descriptor.
pub struct TextScanShim;

impl Shim for TextScanShim {
    fn name(&self) -> &'static str {
        "text-scan"
    }

    fn engine(&self) -> Engine {
        Engine::WideColumnEngine
    }

    fn render(&self, root: &Operator) -> IslandResult<String> {
        match root.kind() {
            OperatorKind::Scan(scan) if root.children().is_empty() => {
                let mut descriptor = json!({ "op": "scan", "table": scan.object });
                if let Some(range) = &scan.filter {
                    descriptor["range"] = json!(range);
                }
                Ok(descriptor.to_string())
            }
            other => Err(IslandError::operator_tree(format!(
                "text engine only executes plain scans, got {}",
                other.label()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::islands::shims::TEXT_SCAN;
    use crate::operators::{build_tree, BlockerSequence, PlanNode, TextOperatorFactory};
    use crate::signature::text;

    #[test]
    fn test_scan_descriptor_round_trips_through_signature() {
        let plan = PlanNode::new("Scan").with_param("Table", "notes");
        let tree = build_tree(&TextOperatorFactory, &plan, &mut BlockerSequence::new()).unwrap();
        let rendered = TEXT_SCAN.render(&tree).unwrap();
        assert!(text::objects(&rendered).unwrap().contains("notes"));
    }
}
