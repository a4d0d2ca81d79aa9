//! # Execution Logging
//!
//! Records one [`ExecutionLogEntry`] per node visit: created at visit start with status
//! `running`, finalized once at completion with status, output or error, and timing.
//! Every payload and error message is redacted before it reaches a sink.
//!
//! Logging never fails an execution. Sink errors are handed to a [`LoggingObserver`]
//! (by default a `tracing` warning) and otherwise discarded.

mod sinks;

pub use sinks::{JsonlLogSink, MemoryLogSink, NullLogSink};

use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use chrono::Utc;
use nodeflow_types::{ExecutionLogEntry, ExecutionStatus};
use nodeflow_util::{redact_sensitive, redact_value};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::error::LoggingError;

/// Destination for execution log entries.
#[async_trait]
pub trait ExecutionLogSink: Send + Sync {
    /// Persists a freshly started (`running`) entry.
    async fn record_start(&self, entry: &ExecutionLogEntry) -> Result<(), LoggingError>;

    /// Persists the finalized state of an entry.
    async fn record_completion(&self, entry: &ExecutionLogEntry) -> Result<(), LoggingError>;
}

/// Receives logging failures.
pub trait LoggingObserver: Send + Sync {
    fn on_logging_error(&self, error: &LoggingError, entry: &ExecutionLogEntry);
}

/// Reports logging failures as `tracing` warnings.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl LoggingObserver for TracingObserver {
    fn on_logging_error(&self, error: &LoggingError, entry: &ExecutionLogEntry) {
        warn!(
            execution_id = %entry.execution_id,
            node_id = %entry.node_id,
            entry_id = %entry.entry_id,
            error = %error,
            "failed to write execution log entry"
        );
    }
}

/// An in-flight log entry returned by [`ExecutionLogger::log_start`].
#[derive(Debug)]
pub struct LogHandle {
    entry: ExecutionLogEntry,
    started: Instant,
}

/// Redacting front end over an [`ExecutionLogSink`].
#[derive(Clone)]
pub struct ExecutionLogger {
    sink: Arc<dyn ExecutionLogSink>,
    observer: Arc<dyn LoggingObserver>,
}

impl std::fmt::Debug for ExecutionLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionLogger").finish_non_exhaustive()
    }
}

impl Default for ExecutionLogger {
    fn default() -> Self {
        Self::new(Arc::new(NullLogSink))
    }
}

impl ExecutionLogger {
    pub fn new(sink: Arc<dyn ExecutionLogSink>) -> Self {
        Self {
            sink,
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn LoggingObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Records the start of a node visit.
    pub async fn log_start(&self, execution_id: &str, node_id: &str, node_name: &str, node_type: &str, input: &Value) -> LogHandle {
        let entry = ExecutionLogEntry {
            entry_id: Uuid::new_v4().to_string(),
            execution_id: execution_id.to_string(),
            node_id: node_id.to_string(),
            node_name: node_name.to_string(),
            node_type: node_type.to_string(),
            status: ExecutionStatus::Running,
            input: redact_value(input),
            output: None,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
        };
        if let Err(error) = self.sink.record_start(&entry).await {
            self.observer.on_logging_error(&error, &entry);
        }
        LogHandle {
            entry,
            started: Instant::now(),
        }
    }

    /// Finalizes a node visit and returns the entry as handed to the sink.
    pub async fn log_complete(
        &self,
        handle: LogHandle,
        status: ExecutionStatus,
        output: Option<&Value>,
        error: Option<&str>,
    ) -> ExecutionLogEntry {
        let LogHandle { mut entry, started } = handle;
        entry.status = status;
        entry.output = output.map(redact_value);
        entry.error = error.map(redact_sensitive);
        entry.completed_at = Some(Utc::now());
        entry.duration_ms = Some(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX));

        if let Err(error) = self.sink.record_completion(&entry).await {
            self.observer.on_logging_error(&error, &entry);
        }
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    struct FailingSink;

    #[async_trait]
    impl ExecutionLogSink for FailingSink {
        async fn record_start(&self, _entry: &ExecutionLogEntry) -> Result<(), LoggingError> {
            Err(LoggingError::sink("database unavailable"))
        }

        async fn record_completion(&self, _entry: &ExecutionLogEntry) -> Result<(), LoggingError> {
            Err(LoggingError::sink("database unavailable"))
        }
    }

    #[derive(Default)]
    struct CountingObserver {
        errors: Mutex<Vec<String>>,
    }

    impl LoggingObserver for CountingObserver {
        fn on_logging_error(&self, error: &LoggingError, _entry: &ExecutionLogEntry) {
            self.errors.lock().expect("observer lock").push(error.to_string());
        }
    }

    #[tokio::test]
    async fn start_and_complete_redact_payloads() {
        let sink = Arc::new(MemoryLogSink::new());
        let logger = ExecutionLogger::new(sink.clone());

        let handle = logger
            .log_start("exec-1", "n1", "Call API", "HTTP Request", &json!({"url": "https://x", "apiKey": "sk-1"}))
            .await;
        let running = sink.entries().await;
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].status, ExecutionStatus::Running);
        assert_eq!(running[0].input["apiKey"], "[REDACTED]");

        let entry = logger
            .log_complete(
                handle,
                ExecutionStatus::Error,
                Some(&json!({"token": "t-1", "status": 401})),
                Some("request failed: Authorization: Bearer abc"),
            )
            .await;
        assert_eq!(entry.output.as_ref().map(|o| &o["token"]), Some(&json!("[REDACTED]")));
        assert!(!entry.error.as_deref().unwrap_or_default().contains("abc"));
        assert!(entry.completed_at.is_some());
        assert!(entry.duration_ms.is_some());

        let entries = sink.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0], entry);
    }

    #[tokio::test]
    async fn sink_failures_are_reported_not_raised() {
        let observer = Arc::new(CountingObserver::default());
        let logger = ExecutionLogger::new(Arc::new(FailingSink)).with_observer(observer.clone());

        let handle = logger.log_start("exec-1", "n1", "Node", "Send Email", &json!({})).await;
        let entry = logger.log_complete(handle, ExecutionStatus::Success, Some(&json!({})), None).await;

        assert_eq!(entry.status, ExecutionStatus::Success);
        assert_eq!(observer.errors.lock().expect("observer lock").len(), 2);
    }
}
