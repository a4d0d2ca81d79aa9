//! Error types for graph execution.

use nodeflow_types::GraphLoadError;
use nodeflow_util::CredentialError;
use thiserror::Error;

use crate::condition::ConditionError;

/// Errors that abort an execution before any node runs.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("graph has no trigger nodes")]
    NoTriggerNodes,

    #[error("failed to read graph file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse graph document: {0}")]
    Parse(String),
}

impl From<GraphLoadError> for GraphError {
    fn from(error: GraphLoadError) -> Self {
        match error {
            GraphLoadError::Io { path, source } => Self::Io { path, source },
            GraphLoadError::Parse(message) => Self::Parse(message),
        }
    }
}

/// Misconfiguration contained to a single node, or rejected at registration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("unknown action type: {0}")]
    UnknownActionType(String),

    #[error("missing action type")]
    MissingActionType,

    #[error("unsafe condition: {0}")]
    UnsafeCondition(#[from] ConditionError),

    #[error("action type '{0}' is handled by the engine and cannot be registered")]
    ReservedActionKind(String),
}

/// Errors returned by step implementations.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("{message}")]
    External { message: String },

    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    #[error("credential lookup failed: {0}")]
    Credentials(#[from] CredentialError),
}

impl StepError {
    pub fn external(message: impl Into<String>) -> Self {
        Self::External { message: message.into() }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput { message: message.into() }
    }
}

/// Failures of the execution log sink. Never fatal to an execution.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("log sink error: {message}")]
    Sink { message: String },

    #[error("log IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("log serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LoggingError {
    pub fn sink(message: impl Into<String>) -> Self {
        Self::Sink { message: message.into() }
    }
}
