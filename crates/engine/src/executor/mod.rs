//! Graph traversal engine.
//!
//! [`WorkflowEngine::execute`] finds the trigger nodes of a graph and walks every path
//! from them:
//!
//! - each reachable node runs at most once per execution, even with cycles or diamonds
//! - a failed node ends its own path; sibling branches keep running
//! - a Condition node continues into its first outgoing edge when true and its second
//!   when false
//! - successors of any other node run concurrently on the caller's runtime
//!
//! All traversal state lives in one per-execution context shared by every branch.

mod context;
mod visit;

use std::{sync::Arc, time::Instant};

use indexmap::IndexMap;
use nodeflow_types::{ExecutionResult, ExecutionStatus, Graph, OutputsMap};
use nodeflow_util::{CredentialBroker, NullCredentialBroker};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::info;
use uuid::Uuid;

use crate::{error::GraphError, logging::ExecutionLogger, registry::StepRegistry};
use context::ExecutionContext;

/// Node id and type of the summary entry written when an execution finishes.
pub const WORKFLOW_LOG_NODE_ID: &str = "workflow";

/// Per-call execution options.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Payload handed to trigger nodes.
    pub trigger_input: Value,
    /// Correlates log entries; a UUID is generated when absent.
    pub execution_id: Option<String>,
}

impl ExecuteOptions {
    pub fn new(trigger_input: Value) -> Self {
        Self {
            trigger_input,
            execution_id: None,
        }
    }

    pub fn with_execution_id(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = Some(execution_id.into());
        self
    }
}

/// Outcome of one execution.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub execution_id: String,
    /// True when every executed node succeeded.
    pub success: bool,
    /// Results keyed by node id, in completion order.
    pub results: IndexMap<String, ExecutionResult>,
    pub outputs: OutputsMap,
}

impl ExecutionReport {
    /// First failure in completion order.
    pub fn first_error(&self) -> Option<(&str, &str)> {
        self.results
            .iter()
            .find_map(|(node_id, result)| result.error.as_deref().filter(|_| !result.success).map(|error| (node_id.as_str(), error)))
    }
}

/// Executes workflow graphs against a step registry.
#[derive(Clone)]
pub struct WorkflowEngine {
    registry: Arc<StepRegistry>,
    logger: ExecutionLogger,
    credentials: Arc<dyn CredentialBroker>,
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("registry", &self.registry)
            .field("logger", &self.logger)
            .finish_non_exhaustive()
    }
}

impl WorkflowEngine {
    /// Engine without persistent logging or credential access.
    pub fn new(registry: StepRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            logger: ExecutionLogger::default(),
            credentials: Arc::new(NullCredentialBroker),
        }
    }

    pub fn with_logger(mut self, logger: ExecutionLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialBroker>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    /// Runs `graph` to completion.
    ///
    /// Fails only when the graph has no trigger node; every node-level problem is
    /// reported through the returned [`ExecutionReport`] instead.
    pub async fn execute(&self, graph: &Graph, options: ExecuteOptions) -> Result<ExecutionReport, GraphError> {
        let trigger_ids: Vec<String> = graph.trigger_nodes().into_iter().map(|node| node.id.clone()).collect();
        if trigger_ids.is_empty() {
            return Err(GraphError::NoTriggerNodes);
        }

        let execution_id = options.execution_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let started = Instant::now();
        info!(
            execution_id = %execution_id,
            node_count = graph.nodes.len(),
            trigger_count = trigger_ids.len(),
            "starting workflow execution"
        );

        let workflow_handle = self
            .logger
            .log_start(
                &execution_id,
                WORKFLOW_LOG_NODE_ID,
                "Workflow",
                WORKFLOW_LOG_NODE_ID,
                &json!({ "triggerInput": options.trigger_input }),
            )
            .await;

        let context = Arc::new(ExecutionContext::new(
            graph,
            execution_id.clone(),
            options.trigger_input,
            self.registry.clone(),
            self.logger.clone(),
            self.credentials.clone(),
        ));
        visit::visit_all(context.clone(), trigger_ids).await;
        let (results, outputs) = context.into_parts().await;

        let report = ExecutionReport {
            success: results.values().all(|result| result.success),
            execution_id,
            results,
            outputs,
        };

        let first_error = report.first_error().map(|(node_id, error)| format!("{node_id}: {error}"));
        let last_output = report
            .results
            .values()
            .rev()
            .find(|result| result.success)
            .and_then(|result| result.data.clone());
        self.logger
            .log_complete(
                workflow_handle,
                ExecutionStatus::from_success(report.success),
                if report.success { last_output.as_ref() } else { None },
                first_error.as_deref(),
            )
            .await;

        info!(
            execution_id = %report.execution_id,
            success = report.success,
            executed_nodes = report.results.len(),
            duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "workflow execution finished"
        );
        Ok(report)
    }
}
