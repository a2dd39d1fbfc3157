//! Pure set algebra behind tool reconciliation.

use std::collections::HashSet;

use serde_json::Value;

use crate::domain::{DiscoveredTool, ToolRecord, ToolShapeError};

/// Adds and removes needed to bring a stored tool set in line with discovery.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    /// Discovered tools with no stored record, in discovery order.
    pub to_add: Vec<DiscoveredTool>,
    /// Stored tool names that were not discovered, sorted.
    pub to_remove: Vec<String>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// New metadata for a tool that already has a record.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataUpdate {
    pub tool_name: String,
    pub description: String,
    pub schema: Option<Value>,
}

/// Drop repeated names, keeping the first occurrence.
pub fn dedup_discovered(discovered: &[DiscoveredTool]) -> Vec<&DiscoveredTool> {
    let mut seen = HashSet::new();
    discovered
        .iter()
        .filter(|tool| seen.insert(tool.name.as_str()))
        .collect()
}

/// Validate every discovered entry and drop duplicate names.
pub fn validate_discovered(
    discovered: Vec<DiscoveredTool>,
) -> Result<Vec<DiscoveredTool>, ToolShapeError> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(discovered.len());
    for tool in discovered {
        tool.validate()?;
        if seen.insert(tool.name.clone()) {
            out.push(tool);
        }
    }
    Ok(out)
}

/// `to_add = discovered − existing`, `to_remove = existing − discovered`.
///
/// Names on both sides appear in neither list.
pub fn plan_reconcile<'a, I>(existing_names: I, discovered: &[DiscoveredTool]) -> ReconcilePlan
where
    I: IntoIterator<Item = &'a str>,
{
    let existing: HashSet<&str> = existing_names.into_iter().collect();
    let unique = dedup_discovered(discovered);
    let discovered_names: HashSet<&str> = unique.iter().map(|t| t.name.as_str()).collect();

    let to_add = unique
        .into_iter()
        .filter(|tool| !existing.contains(tool.name.as_str()))
        .cloned()
        .collect();

    let mut to_remove: Vec<String> = existing
        .into_iter()
        .filter(|name| !discovered_names.contains(name))
        .map(str::to_string)
        .collect();
    to_remove.sort();

    ReconcilePlan { to_add, to_remove }
}

/// Metadata changes for tools present both in `existing` and `discovered`.
pub fn plan_refresh(existing: &[ToolRecord], discovered: &[DiscoveredTool]) -> Vec<MetadataUpdate> {
    dedup_discovered(discovered)
        .into_iter()
        .filter_map(|tool| {
            let record = existing.iter().find(|r| r.tool_name == tool.name)?;
            let changed = record.description != tool.description || record.schema != tool.schema;
            changed.then(|| MetadataUpdate {
                tool_name: tool.name.clone(),
                description: tool.description.clone(),
                schema: tool.schema.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ServerId, full_tool_name};
    use chrono::Utc;
    use serde_json::json;

    fn tool(name: &str) -> DiscoveredTool {
        DiscoveredTool::new(name)
    }

    fn record(name: &str, description: &str) -> ToolRecord {
        let server_id = ServerId::new("0a1b2c3d");
        ToolRecord {
            id: 1,
            full_tool_name: full_tool_name(&server_id, name),
            server_id,
            tool_name: name.to_string(),
            description: description.to_string(),
            schema: None,
            is_enabled: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn adds_into_empty_set() {
        let plan = plan_reconcile([], &[tool("a")]);
        assert_eq!(plan.to_add, vec![tool("a")]);
        assert!(plan.to_remove.is_empty());
    }

    #[test]
    fn same_set_is_a_noop() {
        let plan = plan_reconcile(["a", "b"], &[tool("b"), tool("a")]);
        assert!(plan.is_empty());
    }

    #[test]
    fn empty_discovery_removes_everything() {
        let plan = plan_reconcile(["b", "a"], &[]);
        assert!(plan.to_add.is_empty());
        assert_eq!(plan.to_remove, ["a", "b"]);
    }

    #[test]
    fn mixed_changes() {
        let plan = plan_reconcile(["keep", "drop"], &[tool("keep"), tool("new")]);
        assert_eq!(plan.to_add, vec![tool("new")]);
        assert_eq!(plan.to_remove, ["drop"]);
    }

    #[test]
    fn duplicate_discoveries_keep_first() {
        let first = tool("a").with_description("first");
        let plan = plan_reconcile([], &[first.clone(), tool("a").with_description("second")]);
        assert_eq!(plan.to_add, vec![first]);
    }

    #[test]
    fn validate_discovered_rejects_empty_names() {
        assert!(validate_discovered(vec![tool("ok"), tool("")]).is_err());
        assert_eq!(
            validate_discovered(vec![tool("a"), tool("a")]).unwrap(),
            vec![tool("a")]
        );
    }

    #[test]
    fn refresh_only_touches_changed_known_tools() {
        let existing = vec![record("a", "old"), record("b", "same")];
        let discovered = vec![
            tool("a").with_description("new").with_schema(json!({"type": "object"})),
            tool("b").with_description("same"),
            tool("c").with_description("unknown"),
        ];
        let updates = plan_refresh(&existing, &discovered);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].tool_name, "a");
        assert_eq!(updates[0].description, "new");
        assert_eq!(updates[0].schema, Some(json!({"type": "object"})));
    }
}
