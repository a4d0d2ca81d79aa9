//! Step contract and the registry mapping action kinds to step implementations.
//!
//! Every action node other than a Condition is dispatched through a [`Step`]
//! registered for its [`ActionKind`]. Steps receive the node's resolved input and a
//! [`StepContext`]; the context is the only way a step reaches integration
//! credentials.

use std::{collections::HashMap, fmt, future::Future, sync::Arc};

use async_trait::async_trait;
use nodeflow_types::ActionKind;
use nodeflow_util::{CredentialBroker, NullCredentialBroker};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{ConfigurationError, StepError};

/// What a step produced.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutput {
    Success(Value),
    /// The step ran but reports failure, e.g. an upstream service rejected the request.
    Failure(String),
}

/// Per-invocation context handed to steps.
#[derive(Clone)]
pub struct StepContext {
    execution_id: String,
    node_id: String,
    credentials: Arc<dyn CredentialBroker>,
}

impl fmt::Debug for StepContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepContext")
            .field("execution_id", &self.execution_id)
            .field("node_id", &self.node_id)
            .finish_non_exhaustive()
    }
}

impl StepContext {
    pub fn new(execution_id: impl Into<String>, node_id: impl Into<String>, credentials: Arc<dyn CredentialBroker>) -> Self {
        Self {
            execution_id: execution_id.into(),
            node_id: node_id.into(),
            credentials,
        }
    }

    /// Context with no credential access, for tests and previews.
    pub fn detached(execution_id: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self::new(execution_id, node_id, Arc::new(NullCredentialBroker))
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Credential broker for this execution. Decrypted credentials must stay inside
    /// the step: never return them in the step output.
    pub fn credentials(&self) -> &dyn CredentialBroker {
        self.credentials.as_ref()
    }
}

/// A unit of work an action node delegates to.
#[async_trait]
pub trait Step: Send + Sync {
    async fn run(&self, input: &Map<String, Value>, context: &StepContext) -> Result<StepOutput, StepError>;
}

/// Adapts an async closure into a [`Step`].
pub struct FnStep<F> {
    handler: F,
}

impl<F, Fut> FnStep<F>
where
    F: Fn(Map<String, Value>, StepContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StepOutput, StepError>> + Send,
{
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl<F, Fut> Step for FnStep<F>
where
    F: Fn(Map<String, Value>, StepContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<StepOutput, StepError>> + Send + 'static,
{
    async fn run(&self, input: &Map<String, Value>, context: &StepContext) -> Result<StepOutput, StepError> {
        (self.handler)(input.clone(), context.clone()).await
    }
}

/// Lookup table from action kind to step implementation.
#[derive(Clone, Default)]
pub struct StepRegistry {
    steps: HashMap<ActionKind, Arc<dyn Step>>,
}

impl fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepRegistry").field("kinds", &self.kinds()).finish()
    }
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the step for `kind`. Condition nodes are evaluated by
    /// the engine and cannot be registered.
    pub fn register(&mut self, kind: ActionKind, step: Arc<dyn Step>) -> Result<(), ConfigurationError> {
        if kind == ActionKind::Condition {
            return Err(ConfigurationError::ReservedActionKind(kind.to_string()));
        }
        debug!(action_kind = %kind, "registering step");
        self.steps.insert(kind, step);
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_step(mut self, kind: ActionKind, step: impl Step + 'static) -> Result<Self, ConfigurationError> {
        self.register(kind, Arc::new(step))?;
        Ok(self)
    }

    pub fn get(&self, kind: &ActionKind) -> Option<Arc<dyn Step>> {
        self.steps.get(kind).cloned()
    }

    pub fn contains(&self, kind: &ActionKind) -> bool {
        self.steps.contains_key(kind)
    }

    /// Registered kinds, sorted by display name.
    pub fn kinds(&self) -> Vec<ActionKind> {
        let mut kinds: Vec<ActionKind> = self.steps.keys().cloned().collect();
        kinds.sort_by(|a, b| a.display_name().cmp(b.display_name()));
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo() -> FnStep<impl Fn(Map<String, Value>, StepContext) -> std::future::Ready<Result<StepOutput, StepError>> + Send + Sync> {
        FnStep::new(|input: Map<String, Value>, _context: StepContext| std::future::ready(Ok(StepOutput::Success(Value::Object(input)))))
    }

    #[tokio::test]
    async fn registered_steps_are_looked_up_by_kind() {
        let registry = StepRegistry::new()
            .with_step(ActionKind::SendEmail, echo())
            .expect("register")
            .with_step(ActionKind::Custom("Summarize".into()), echo())
            .expect("register");

        assert!(registry.contains(&ActionKind::from_type_name("send_email")));
        assert!(!registry.contains(&ActionKind::HttpRequest));
        assert_eq!(registry.kinds(), vec![ActionKind::SendEmail, ActionKind::Custom("Summarize".into())]);

        let step = registry.get(&ActionKind::SendEmail).expect("step");
        let input = json!({"to": "a@b"}).as_object().cloned().expect("object");
        let output = step.run(&input, &StepContext::detached("exec-1", "n1")).await.expect("run");
        assert_eq!(output, StepOutput::Success(json!({"to": "a@b"})));
    }

    #[test]
    fn condition_kind_is_reserved() {
        let mut registry = StepRegistry::new();
        let result = registry.register(ActionKind::Condition, Arc::new(echo()));
        assert!(matches!(result, Err(ConfigurationError::ReservedActionKind(_))));
        assert!(!registry.contains(&ActionKind::Condition));
    }

    #[tokio::test]
    async fn detached_context_has_no_credentials() {
        let context = StepContext::detached("exec-1", "n1");
        assert_eq!(context.execution_id(), "exec-1");
        assert!(context.credentials().get_credentials("int-1").await.is_err());
    }
}
