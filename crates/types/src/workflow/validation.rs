//! Structural checks for user-authored graphs.
//!
//! The engine tolerates malformed graphs (dangling edges are dropped, extra condition
//! branches are ignored), so these checks report issues rather than reject the graph.
//! Hosts surface them before a run; the engine logs the same conditions as it walks.

use std::{collections::HashSet, fmt};

use super::{Graph, NodeKind};

/// A structural problem found in a graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphIssue {
    /// No trigger node is free of incoming edges, so the graph has no entry point.
    NoTriggerNodes,
    /// Two nodes share the same id.
    DuplicateNodeId { node_id: String },
    /// An edge references a node id that does not exist.
    DanglingEdge { edge_id: String, missing_node_id: String },
    /// A trigger node has an incoming edge.
    TriggerWithIncomingEdge { node_id: String, edge_id: String },
    /// An action node has no `actionType`.
    MissingActionType { node_id: String },
    /// A condition node has more than two outgoing edges; the extra ones never run.
    ExtraConditionBranches { node_id: String, edge_count: usize },
}

impl fmt::Display for GraphIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphIssue::NoTriggerNodes => write!(f, "graph has no trigger without incoming edges"),
            GraphIssue::DuplicateNodeId { node_id } => write!(f, "node id '{node_id}' is used more than once"),
            GraphIssue::DanglingEdge { edge_id, missing_node_id } => {
                write!(f, "edge '{edge_id}' references unknown node '{missing_node_id}'")
            }
            GraphIssue::TriggerWithIncomingEdge { node_id, edge_id } => {
                write!(f, "trigger '{node_id}' has incoming edge '{edge_id}'")
            }
            GraphIssue::MissingActionType { node_id } => write!(f, "action '{node_id}' has no actionType"),
            GraphIssue::ExtraConditionBranches { node_id, edge_count } => write!(
                f,
                "condition '{node_id}' has {edge_count} outgoing edges; only the first two are used"
            ),
        }
    }
}

/// Collects every structural issue in the graph, in a stable order.
pub fn validate_graph(graph: &Graph) -> Vec<GraphIssue> {
    let mut issues = Vec::new();

    if graph.trigger_nodes().is_empty() {
        issues.push(GraphIssue::NoTriggerNodes);
    }

    let mut seen = HashSet::new();
    for node in &graph.nodes {
        if !seen.insert(node.id.as_str()) {
            issues.push(GraphIssue::DuplicateNodeId { node_id: node.id.clone() });
        }
    }

    for edge in &graph.edges {
        for endpoint in [&edge.source, &edge.target] {
            if !seen.contains(endpoint.as_str()) {
                issues.push(GraphIssue::DanglingEdge {
                    edge_id: edge.id.clone(),
                    missing_node_id: endpoint.clone(),
                });
            }
        }
    }

    for node in &graph.nodes {
        match node.kind {
            NodeKind::Trigger => {
                if let Some(edge) = graph
                    .incoming_edges(&node.id)
                    .find(|edge| seen.contains(edge.source.as_str()))
                {
                    issues.push(GraphIssue::TriggerWithIncomingEdge {
                        node_id: node.id.clone(),
                        edge_id: edge.id.clone(),
                    });
                }
            }
            NodeKind::Action => {
                if node.action_type().is_none() {
                    issues.push(GraphIssue::MissingActionType { node_id: node.id.clone() });
                }
                if node.is_condition() {
                    let edge_count = graph.outgoing_edges(&node.id).count();
                    if edge_count > 2 {
                        issues.push(GraphIssue::ExtraConditionBranches {
                            node_id: node.id.clone(),
                            edge_count,
                        });
                    }
                }
            }
        }
    }

    issues
}

impl Graph {
    /// Convenience wrapper around [`validate_graph`].
    pub fn validate(&self) -> Vec<GraphIssue> {
        validate_graph(self)
    }
}
