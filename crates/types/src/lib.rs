//! Shared type definitions for Nodeflow.
//!
//! The graph model lives in [`workflow`]; this module holds the values produced while a
//! graph executes: per-node results, the execution-scoped outputs map consumed by data
//! references, and the audit log entry persisted for each node visit.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod workflow;

pub use workflow::{
    ACTION_TYPE_KEY, ActionKind, CONDITION_KEY, Edge, Graph, GraphIssue, GraphLoadError, MOCK_PAYLOAD_KEY, Node, NodeKind,
    TRIGGER_TYPE_KEY, TriggerKind, sanitize_node_id,
};

/// Outcome of executing a single node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn succeeded(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    /// Failure that still carries whatever the step produced.
    pub fn failed_with_data(error: impl Into<String>, data: Value) -> Self {
        Self {
            success: false,
            data: Some(data),
            error: Some(error.into()),
        }
    }
}

/// Data a node produced, as visible to later references.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeOutput {
    pub label: String,
    pub data: Value,
}

/// Execution-scoped store of node outputs keyed by sanitized node id.
///
/// Each key is written at most once per execution; iteration follows write order,
/// which is also the order used when resolving legacy label references.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct OutputsMap {
    entries: IndexMap<String, NodeOutput>,
}

impl OutputsMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a node output. Returns `false` (and keeps the first value) when the node
    /// already has an entry.
    pub fn insert(&mut self, node_id: &str, label: impl Into<String>, data: Value) -> bool {
        let key = sanitize_node_id(node_id);
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, NodeOutput { label: label.into(), data });
        true
    }

    /// Looks up an output by (raw or sanitized) node id.
    pub fn get(&self, node_id: &str) -> Option<&NodeOutput> {
        self.entries.get(&sanitize_node_id(node_id))
    }

    /// Finds the first output whose label matches case-insensitively.
    pub fn find_by_label(&self, label: &str) -> Option<&NodeOutput> {
        let wanted = label.trim().to_lowercase();
        self.entries.values().find(|output| output.label.trim().to_lowercase() == wanted)
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.entries.contains_key(&sanitize_node_id(node_id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &NodeOutput)> {
        self.entries.iter()
    }
}

/// Lifecycle status of an execution log entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Success,
    Error,
}

impl ExecutionStatus {
    pub fn from_success(success: bool) -> Self {
        if success { Self::Success } else { Self::Error }
    }
}

/// Persisted audit record of one node visit (or of the whole workflow run).
///
/// Payloads are redacted before an entry is built; entries are created when a visit
/// starts and finalized once when it completes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionLogEntry {
    pub entry_id: String,
    pub execution_id: String,
    pub node_id: String,
    pub node_name: String,
    pub node_type: String,
    pub status: ExecutionStatus,
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl ExecutionLogEntry {
    pub fn is_finished(&self) -> bool {
        self.status != ExecutionStatus::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn outputs_map_is_write_once_and_sanitizes_ids() {
        let mut outputs = OutputsMap::new();
        assert!(outputs.insert("node-1", "Fetch", json!({"value": 1})));
        assert!(!outputs.insert("node_1", "Other", json!(null)));

        let output = outputs.get("node-1").expect("output");
        assert_eq!(output.label, "Fetch");
        assert_eq!(outputs.get("node_1"), Some(output));
        assert_eq!(outputs.find_by_label("fetch").map(|o| &o.data), Some(&json!({"value": 1})));
    }

    #[test]
    fn execution_result_serializes_camel_case_without_empty_fields() {
        let value = serde_json::to_value(ExecutionResult::failed("boom")).expect("serialize");
        assert_eq!(value, json!({"success": false, "error": "boom"}));
    }
}
