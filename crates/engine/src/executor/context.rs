//! Per-execution traversal state.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use indexmap::IndexMap;
use nodeflow_types::{ExecutionResult, Graph, Node, OutputsMap};
use nodeflow_util::CredentialBroker;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::warn;

use crate::{logging::ExecutionLogger, registry::StepRegistry};

/// Everything one execution reads and writes, shared by every branch of the traversal.
///
/// The mutable maps are each behind their own lock and only held for a single lookup or
/// insert, never across an await on a step.
pub(crate) struct ExecutionContext {
    pub(crate) execution_id: String,
    pub(crate) trigger_input: Value,
    nodes: HashMap<String, Node>,
    successors: HashMap<String, Vec<String>>,
    pub(crate) registry: Arc<StepRegistry>,
    pub(crate) logger: ExecutionLogger,
    pub(crate) credentials: Arc<dyn CredentialBroker>,
    visited: Mutex<HashSet<String>>,
    pub(crate) outputs: Mutex<OutputsMap>,
    results: Mutex<IndexMap<String, ExecutionResult>>,
}

impl ExecutionContext {
    pub(crate) fn new(
        graph: &Graph,
        execution_id: String,
        trigger_input: Value,
        registry: Arc<StepRegistry>,
        logger: ExecutionLogger,
        credentials: Arc<dyn CredentialBroker>,
    ) -> Self {
        let mut nodes = HashMap::with_capacity(graph.nodes.len());
        for node in &graph.nodes {
            if nodes.contains_key(&node.id) {
                warn!(node_id = %node.id, "duplicate node id; keeping the first definition");
                continue;
            }
            nodes.insert(node.id.clone(), node.clone());
        }

        let mut successors: HashMap<String, Vec<String>> = HashMap::new();
        for edge in &graph.edges {
            if !nodes.contains_key(&edge.source) || !nodes.contains_key(&edge.target) {
                warn!(
                    edge_id = %edge.id,
                    source = %edge.source,
                    target = %edge.target,
                    "dropping edge that references an unknown node"
                );
                continue;
            }
            successors.entry(edge.source.clone()).or_default().push(edge.target.clone());
        }

        for (node_id, targets) in successors.iter_mut() {
            let is_condition = nodes.get(node_id).is_some_and(Node::is_condition);
            if is_condition && targets.len() > 2 {
                warn!(
                    node_id = %node_id,
                    edge_count = targets.len(),
                    "condition node has more than two outgoing edges; extra edges are ignored"
                );
                targets.truncate(2);
            }
        }

        Self {
            execution_id,
            trigger_input,
            nodes,
            successors,
            registry,
            logger,
            credentials,
            visited: Mutex::new(HashSet::new()),
            outputs: Mutex::new(OutputsMap::new()),
            results: Mutex::new(IndexMap::new()),
        }
    }

    pub(crate) fn node(&self, node_id: &str) -> Option<&Node> {
        self.nodes.get(node_id)
    }

    /// Outgoing targets in edge-list order.
    pub(crate) fn successors(&self, node_id: &str) -> &[String] {
        self.successors.get(node_id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Marks a node visited. Returns `false` when another path already claimed it.
    pub(crate) async fn claim(&self, node_id: &str) -> bool {
        self.visited.lock().await.insert(node_id.to_string())
    }

    pub(crate) async fn outputs_snapshot(&self) -> OutputsMap {
        self.outputs.lock().await.clone()
    }

    pub(crate) async fn record_output(&self, node: &Node, data: Value) {
        if !self.outputs.lock().await.insert(&node.id, node.label.clone(), data) {
            warn!(node_id = %node.id, "output key already written in this execution; keeping the first value");
        }
    }

    pub(crate) async fn record_result(&self, node_id: &str, result: ExecutionResult) {
        self.results.lock().await.insert(node_id.to_string(), result);
    }

    /// Consumes the shared state once every branch has finished.
    pub(crate) async fn into_parts(self: Arc<Self>) -> (IndexMap<String, ExecutionResult>, OutputsMap) {
        let results = std::mem::take(&mut *self.results.lock().await);
        let outputs = std::mem::take(&mut *self.outputs.lock().await);
        (results, outputs)
    }
}
