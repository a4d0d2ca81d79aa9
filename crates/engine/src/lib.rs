//! # Nodeflow Engine
//!
//! Executes workflow graphs: directed graphs of trigger and action nodes joined by edges.
//! Every node reachable from a trigger runs at most once per execution, with its
//! configuration resolved against the outputs of the nodes that ran before it.
//!
//! ## Usage
//!
//! ```rust
//! use nodeflow_engine::{ExecuteOptions, FnStep, StepError, StepOutput, StepRegistry, WorkflowEngine};
//! use nodeflow_types::{ActionKind, Edge, Graph, Node};
//! use serde_json::json;
//!
//! # let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
//! # runtime.block_on(async {
//! let registry = StepRegistry::new()
//!     .with_step(
//!         ActionKind::SendEmail,
//!         FnStep::new(|input, _context| async move { Ok::<_, StepError>(StepOutput::Success(json!({"sentTo": input["to"]}))) }),
//!     )?;
//! let graph = Graph::new(
//!     vec![
//!         Node::trigger("t1", "Trigger"),
//!         Node::action("a1", "Notify", "Send Email").with_config("to", json!("{{@t1:Trigger.email}}")),
//!     ],
//!     vec![Edge::new("e1", "t1", "a1")],
//! );
//!
//! let report = WorkflowEngine::new(registry)
//!     .execute(&graph, ExecuteOptions::new(json!({"email": "ops@example.com"})))
//!     .await?;
//! assert!(report.success);
//! assert_eq!(report.outputs.get("a1").map(|output| &output.data), Some(&json!({"sentTo": "ops@example.com"})));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # })?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - **`templates`**: `{{...}}` reference resolution against the outputs map
//! - **`condition`**: restricted boolean expressions for Condition nodes
//! - **`registry`**: the [`Step`] contract and the action-kind lookup table
//! - **`logging`**: redacted, two-phase execution log entries and their sinks
//! - **`executor`**: graph traversal
//! - **`steps`**: built-in step implementations
//! - **`config`**: host configuration file

pub mod condition;
pub mod config;
pub mod error;
pub mod executor;
pub mod field_paths;
pub mod logging;
pub mod registry;
pub mod steps;
pub mod templates;

pub use condition::{ConditionError, evaluate_condition, try_evaluate_condition, validate_condition, validate_graph_conditions};
pub use config::{EngineConfig, load_config, load_config_from_path};
pub use error::{ConfigurationError, GraphError, LoggingError, StepError};
pub use executor::{ExecuteOptions, ExecutionReport, WORKFLOW_LOG_NODE_ID, WorkflowEngine};
pub use logging::{
    ExecutionLogSink, ExecutionLogger, JsonlLogSink, LogHandle, LoggingObserver, MemoryLogSink, NullLogSink, TracingObserver,
};
pub use registry::{FnStep, Step, StepContext, StepOutput, StepRegistry};
pub use steps::{HttpRequestStep, builtin_registry};
pub use templates::{TemplateReference, format_value, resolve_config, resolve_string, resolve_value};
