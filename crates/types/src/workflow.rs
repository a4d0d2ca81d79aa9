//! Strongly typed workflow graph definitions shared across the engine and CLI.
//!
//! A workflow is authored in an external editor as a directed graph of trigger and
//! action nodes. The engine treats the graph as read-only input: nodes carry a free-form
//! `config` map whose string values may embed `{{...}}` data references, and edges
//! describe which nodes run after which. Edge order is significant for condition
//! nodes (first outgoing edge is the "true" branch, second the "false" branch), so the
//! edge list preserves authoring order.

use std::{fmt, fs, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use thiserror::Error;

pub mod validation;

pub use validation::{GraphIssue, validate_graph};

/// Config key holding the action type of an action node.
pub const ACTION_TYPE_KEY: &str = "actionType";
/// Config key holding the trigger type of a trigger node.
pub const TRIGGER_TYPE_KEY: &str = "triggerType";
/// Config key holding the boolean expression of a condition node.
pub const CONDITION_KEY: &str = "condition";
/// Config key holding the payload used by webhook triggers without live input.
pub const MOCK_PAYLOAD_KEY: &str = "mockPayload";

/// Whether a node starts a run or performs work inside it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Entry point of a run.
    Trigger,
    /// Unit of work dispatched to a step or evaluated as a condition.
    Action,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Trigger => "trigger",
            NodeKind::Action => "action",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single trigger or action unit in a workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique node identifier within the graph.
    pub id: String,
    /// Trigger or action.
    #[serde(alias = "type")]
    pub kind: NodeKind,
    /// Human-readable label shown in the editor and used by legacy references.
    #[serde(default)]
    pub label: String,
    /// Disabled nodes are passed through without executing.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Free-form configuration; string leaves may contain template references.
    #[serde(default)]
    pub config: JsonMap<String, JsonValue>,
}

fn default_enabled() -> bool {
    true
}

impl Node {
    /// Creates an enabled trigger node with an empty config.
    pub fn trigger(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: NodeKind::Trigger,
            label: label.into(),
            enabled: true,
            config: JsonMap::new(),
        }
    }

    /// Creates an enabled action node of the given action type.
    pub fn action(id: impl Into<String>, label: impl Into<String>, action_type: impl Into<String>) -> Self {
        let mut config = JsonMap::new();
        config.insert(ACTION_TYPE_KEY.to_string(), JsonValue::String(action_type.into()));
        Self {
            id: id.into(),
            kind: NodeKind::Action,
            label: label.into(),
            enabled: true,
            config,
        }
    }

    /// Builder-style config insertion.
    pub fn with_config(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    /// Builder-style toggle for the `enabled` flag.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Returns the raw `actionType` string, if configured.
    pub fn action_type(&self) -> Option<&str> {
        self.config.get(ACTION_TYPE_KEY).and_then(JsonValue::as_str)
    }

    /// Returns the parsed action kind, if this node carries an `actionType`.
    pub fn action_kind(&self) -> Option<ActionKind> {
        self.action_type().map(ActionKind::from_type_name)
    }

    /// Returns true when this is an action node configured as a condition.
    pub fn is_condition(&self) -> bool {
        self.kind == NodeKind::Action && matches!(self.action_kind(), Some(ActionKind::Condition))
    }

    /// Returns the configured trigger kind (defaults to manual).
    pub fn trigger_kind(&self) -> TriggerKind {
        self.config
            .get(TRIGGER_TYPE_KEY)
            .and_then(JsonValue::as_str)
            .map(TriggerKind::from_type_name)
            .unwrap_or_default()
    }
}

/// Directed connection from one node to another.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Edge {
    /// Edge identifier.
    #[serde(default)]
    pub id: String,
    /// Source node id.
    pub source: String,
    /// Target node id.
    pub target: String,
}

impl Edge {
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
        }
    }
}

/// A complete workflow graph: nodes plus ordered edges.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Graph {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// Errors raised while loading a graph document.
#[derive(Debug, Error)]
pub enum GraphLoadError {
    #[error("failed to read graph file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse graph document: {0}")]
    Parse(String),
}

impl Graph {
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self { nodes, edges }
    }

    /// Parses a graph from a JSON document.
    pub fn from_json_str(content: &str) -> Result<Self, GraphLoadError> {
        serde_json::from_str(content).map_err(|error| GraphLoadError::Parse(error.to_string()))
    }

    /// Loads a graph from disk. Files ending in `.yaml`/`.yml` are parsed as YAML,
    /// everything else as JSON.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, GraphLoadError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| GraphLoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let is_yaml = path
            .extension()
            .and_then(|extension| extension.to_str())
            .map(|extension| extension.eq_ignore_ascii_case("yaml") || extension.eq_ignore_ascii_case("yml"))
            .unwrap_or(false);
        if is_yaml {
            serde_yaml::from_str(&content).map_err(|error| GraphLoadError::Parse(error.to_string()))
        } else {
            Self::from_json_str(&content)
        }
    }

    /// Looks up a node by id.
    pub fn node(&self, node_id: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id == node_id)
    }

    /// Returns the entry points of the graph: trigger nodes with no incoming edge.
    ///
    /// Edges whose source does not exist are ignored, matching how traversal drops them.
    pub fn trigger_nodes(&self) -> Vec<&Node> {
        self.nodes
            .iter()
            .filter(|node| node.kind == NodeKind::Trigger)
            .filter(|node| !self.incoming_edges(&node.id).any(|edge| self.node(&edge.source).is_some()))
            .collect()
    }

    /// Outgoing edges of a node, in authoring order.
    pub fn outgoing_edges<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |edge| edge.source == node_id)
    }

    /// Incoming edges of a node, in authoring order.
    pub fn incoming_edges<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |edge| edge.target == node_id)
    }
}

/// Enumerable action kinds with an open variant for externally contributed steps.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum ActionKind {
    /// Branches on a boolean expression; handled by the engine itself.
    Condition,
    HttpRequest,
    SendEmail,
    CreateTicket,
    GenerateText,
    GenerateImage,
    /// Any other registered step kind, keyed by its display name.
    Custom(String),
}

impl ActionKind {
    /// Parses the human-readable `actionType` string.
    ///
    /// Matching ignores case, spaces, dashes and underscores, so `"HTTP Request"`,
    /// `"http_request"` and `"HttpRequest"` all map to [`ActionKind::HttpRequest`].
    pub fn from_type_name(name: &str) -> Self {
        let normalized: String = name
            .chars()
            .filter(|character| !matches!(character, ' ' | '-' | '_'))
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "condition" => ActionKind::Condition,
            "httprequest" | "http" => ActionKind::HttpRequest,
            "sendemail" | "email" => ActionKind::SendEmail,
            "createticket" | "ticket" => ActionKind::CreateTicket,
            "generatetext" => ActionKind::GenerateText,
            "generateimage" => ActionKind::GenerateImage,
            _ => ActionKind::Custom(name.trim().to_string()),
        }
    }

    /// Display name used in the editor and in logs.
    pub fn display_name(&self) -> &str {
        match self {
            ActionKind::Condition => "Condition",
            ActionKind::HttpRequest => "HTTP Request",
            ActionKind::SendEmail => "Send Email",
            ActionKind::CreateTicket => "Create Ticket",
            ActionKind::GenerateText => "Generate Text",
            ActionKind::GenerateImage => "Generate Image",
            ActionKind::Custom(name) => name,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for ActionKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_type_name(s))
    }
}

impl From<String> for ActionKind {
    fn from(value: String) -> Self {
        Self::from_type_name(&value)
    }
}

impl From<ActionKind> for String {
    fn from(value: ActionKind) -> Self {
        value.display_name().to_string()
    }
}

/// How a trigger node receives its input.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum TriggerKind {
    /// Invoked by a user with an explicit payload.
    #[default]
    Manual,
    /// Invoked by an inbound HTTP call; falls back to a mock payload when run by hand.
    Webhook,
    /// Invoked on a schedule with a placeholder payload.
    Schedule,
}

impl TriggerKind {
    pub fn from_type_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "webhook" => TriggerKind::Webhook,
            "schedule" | "scheduled" | "cron" => TriggerKind::Schedule,
            _ => TriggerKind::Manual,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Manual => "Manual",
            TriggerKind::Webhook => "Webhook",
            TriggerKind::Schedule => "Schedule",
        }
    }
}

/// Maps a node id to the key used in the outputs map.
///
/// Every character outside `[A-Za-z0-9_]` becomes `_`, so ids produced by the editor
/// (`node-1`, `a7f3:b`) are usable inside reference expressions.
pub fn sanitize_node_id(node_id: &str) -> String {
    node_id
        .chars()
        .map(|character| if character.is_ascii_alphanumeric() || character == '_' { character } else { '_' })
        .collect()
}
