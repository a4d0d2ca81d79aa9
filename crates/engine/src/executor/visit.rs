//! Node visitor: resolves input, dispatches, records, and recurses into successors.

use std::{any::Any, panic::AssertUnwindSafe, sync::Arc};

use chrono::Utc;
use futures_util::future::{BoxFuture, FutureExt, join_all};
use nodeflow_types::{CONDITION_KEY, ExecutionResult, ExecutionStatus, MOCK_PAYLOAD_KEY, Node, NodeKind, TriggerKind};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use super::context::ExecutionContext;
use crate::{
    condition::try_evaluate_condition,
    error::ConfigurationError,
    registry::{StepContext, StepOutput},
    templates::{collect_unresolved_references, resolve_config},
};

/// Key of the boolean a Condition node writes into its output.
const CONDITION_RESULT_KEY: &str = "condition";

/// Visits every target concurrently and waits for all of them.
pub(crate) async fn visit_all(context: Arc<ExecutionContext>, node_ids: Vec<String>) {
    join_all(node_ids.into_iter().map(|node_id| visit(context.clone(), node_id))).await;
}

pub(crate) fn visit(context: Arc<ExecutionContext>, node_id: String) -> BoxFuture<'static, ()> {
    async move {
        if !context.claim(&node_id).await {
            debug!(node_id = %node_id, "node already visited; skipping");
            return;
        }
        let Some(node) = context.node(&node_id) else {
            return;
        };

        if !node.enabled {
            debug!(node_id = %node_id, "node disabled; passing through");
            context.record_output(node, Value::Null).await;
            let successors = context.successors(&node_id).to_vec();
            visit_all(context.clone(), successors).await;
            return;
        }

        let input = {
            let outputs = context.outputs.lock().await;
            for unresolved in collect_unresolved_references(&node.config, &outputs) {
                debug!(
                    node_id = %node_id,
                    field = %unresolved.source_path,
                    expression = %unresolved.expression,
                    "template reference left unresolved"
                );
            }
            resolve_config(&node.config, &outputs)
        };
        let input_value = Value::Object(input.clone());

        let handle = context
            .logger
            .log_start(&context.execution_id, &node.id, &node.label, &node_type(node), &input_value)
            .await;
        debug!(node_id = %node_id, kind = node.kind.as_str(), "dispatching node");

        let result = dispatch(&context, node, &input).await;

        context.record_result(&node.id, result.clone()).await;
        context.record_output(node, result.data.clone().unwrap_or(Value::Null)).await;
        context
            .logger
            .log_complete(
                handle,
                ExecutionStatus::from_success(result.success),
                result.data.as_ref(),
                result.error.as_deref(),
            )
            .await;

        if !result.success {
            warn!(
                node_id = %node_id,
                error = result.error.as_deref().unwrap_or_default(),
                "node failed; not continuing this path"
            );
            return;
        }

        let next: Vec<String> = if node.is_condition() {
            let outcome = result
                .data
                .as_ref()
                .and_then(|data| data.get(CONDITION_RESULT_KEY))
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let branch = if outcome { 0 } else { 1 };
            debug!(node_id = %node_id, outcome, "condition evaluated");
            context.successors(&node_id).get(branch).cloned().into_iter().collect()
        } else {
            context.successors(&node_id).to_vec()
        };
        visit_all(context.clone(), next).await;
    }
    .boxed()
}

fn node_type(node: &Node) -> String {
    match node.kind {
        NodeKind::Trigger => format!("{} trigger", node.trigger_kind().as_str()),
        NodeKind::Action => node.action_type().unwrap_or("action").to_string(),
    }
}

async fn dispatch(context: &ExecutionContext, node: &Node, input: &Map<String, Value>) -> ExecutionResult {
    if node.kind == NodeKind::Trigger {
        return ExecutionResult::succeeded(trigger_data(node, input, &context.trigger_input));
    }
    if node.is_condition() {
        let outcome = evaluate_node_condition(context, node).await;
        return ExecutionResult::succeeded(json!({ CONDITION_RESULT_KEY: outcome }));
    }

    let (Some(action_type), Some(kind)) = (node.action_type(), node.action_kind()) else {
        return ExecutionResult::failed(ConfigurationError::MissingActionType.to_string());
    };
    let Some(step) = context.registry.get(&kind) else {
        return ExecutionResult::failed(ConfigurationError::UnknownActionType(action_type.to_string()).to_string());
    };

    let step_context = StepContext::new(context.execution_id.clone(), node.id.clone(), context.credentials.clone());
    match AssertUnwindSafe(step.run(input, &step_context)).catch_unwind().await {
        Ok(Ok(StepOutput::Success(data))) => match reported_failure(&data) {
            Some(message) => ExecutionResult::failed_with_data(message, data),
            None => ExecutionResult::succeeded(data),
        },
        Ok(Ok(StepOutput::Failure(message))) => ExecutionResult::failed(message),
        Ok(Err(error)) => ExecutionResult::failed(error.to_string()),
        Err(panic) => ExecutionResult::failed(format!("step panicked: {}", panic_message(panic.as_ref()))),
    }
}

async fn evaluate_node_condition(context: &ExecutionContext, node: &Node) -> bool {
    let expression = node.config.get(CONDITION_KEY).cloned().unwrap_or(Value::Null);
    let outputs = context.outputs_snapshot().await;
    match try_evaluate_condition(&expression, &outputs) {
        Ok(outcome) => outcome,
        Err(error) => {
            let error = ConfigurationError::UnsafeCondition(error);
            warn!(node_id = %node.id, error = %error, "condition rejected; taking the false branch");
            false
        }
    }
}

/// Steps may report failure in-band as `{"success": false, "error": ...}`.
fn reported_failure(data: &Value) -> Option<String> {
    let object = data.as_object()?;
    if object.get("success") != Some(&Value::Bool(false)) {
        return None;
    }
    let message = match object.get("error") {
        Some(Value::String(message)) => message.clone(),
        Some(Value::Null) | None => "step reported failure".to_string(),
        Some(other) => other.to_string(),
    };
    Some(message)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Builds a trigger node's output from the caller's input.
fn trigger_data(node: &Node, input: &Map<String, Value>, trigger_input: &Value) -> Value {
    let trigger_kind = node.trigger_kind();
    let mut data = Map::new();
    data.insert("triggered".into(), Value::Bool(true));
    data.insert("timestamp".into(), Value::String(Utc::now().to_rfc3339()));
    data.insert("triggerType".into(), Value::String(trigger_kind.as_str().to_string()));

    let payload = if trigger_input.is_null() && trigger_kind == TriggerKind::Webhook {
        mock_payload(node, input)
    } else {
        trigger_input.clone()
    };
    match payload {
        Value::Null => {}
        Value::Object(fields) => data.extend(fields),
        other => {
            data.insert("input".into(), other);
        }
    }
    Value::Object(data)
}

fn mock_payload(node: &Node, input: &Map<String, Value>) -> Value {
    match input.get(MOCK_PAYLOAD_KEY) {
        Some(Value::String(text)) if !text.trim().is_empty() => serde_json::from_str(text).unwrap_or_else(|error| {
            warn!(node_id = %node.id, error = %error, "webhook mock payload is not valid JSON; ignoring it");
            Value::Null
        }),
        Some(Value::Object(fields)) => Value::Object(fields.clone()),
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_data_merges_caller_input_over_envelope() {
        let node = Node::trigger("t1", "Start");
        let data = trigger_data(&node, &Map::new(), &json!({"value": 20, "triggerType": "custom"}));
        assert_eq!(data["triggered"], true);
        assert_eq!(data["value"], 20);
        assert_eq!(data["triggerType"], "custom");
        assert!(data["timestamp"].is_string());

        let data = trigger_data(&node, &Map::new(), &json!([1, 2]));
        assert_eq!(data["input"], json!([1, 2]));
    }

    #[test]
    fn webhook_without_input_uses_mock_payload() {
        let node = Node::trigger("t1", "Hook").with_config("triggerType", json!("Webhook"));
        let input = json!({"mockPayload": "{\"event\": \"push\"}"}).as_object().cloned().expect("object");
        let data = trigger_data(&node, &input, &Value::Null);
        assert_eq!(data["event"], "push");
        assert_eq!(data["triggerType"], "Webhook");

        let data = trigger_data(&node, &input, &json!({"event": "live"}));
        assert_eq!(data["event"], "live");
    }

    #[test]
    fn in_band_failures_are_detected() {
        assert_eq!(reported_failure(&json!({"success": false, "error": "quota"})), Some("quota".into()));
        assert_eq!(reported_failure(&json!({"success": false})), Some("step reported failure".into()));
        assert_eq!(reported_failure(&json!({"success": true, "error": "ignored"})), None);
        assert_eq!(reported_failure(&json!("text")), None);
    }

    #[test]
    fn node_types_describe_the_node() {
        assert_eq!(node_type(&Node::trigger("t1", "Start")), "Manual trigger");
        assert_eq!(node_type(&Node::action("a", "A", "Send Email")), "Send Email");
    }
}
