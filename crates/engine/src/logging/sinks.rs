use std::path::{Path, PathBuf};

use async_trait::async_trait;
use indexmap::IndexMap;
use nodeflow_types::ExecutionLogEntry;
use tokio::{fs::OpenOptions, io::AsyncWriteExt, sync::Mutex};
use tracing::{debug, warn};

use super::ExecutionLogSink;
use crate::error::LoggingError;

/// Discards every entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLogSink;

#[async_trait]
impl ExecutionLogSink for NullLogSink {
    async fn record_start(&self, _entry: &ExecutionLogEntry) -> Result<(), LoggingError> {
        Ok(())
    }

    async fn record_completion(&self, _entry: &ExecutionLogEntry) -> Result<(), LoggingError> {
        Ok(())
    }
}

/// Keeps entries in memory, keyed by entry id in start order.
#[derive(Debug, Default)]
pub struct MemoryLogSink {
    entries: Mutex<IndexMap<String, ExecutionLogEntry>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every entry in its latest state.
    pub async fn entries(&self) -> Vec<ExecutionLogEntry> {
        self.entries.lock().await.values().cloned().collect()
    }

    pub async fn entries_for(&self, execution_id: &str) -> Vec<ExecutionLogEntry> {
        self.entries
            .lock()
            .await
            .values()
            .filter(|entry| entry.execution_id == execution_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ExecutionLogSink for MemoryLogSink {
    async fn record_start(&self, entry: &ExecutionLogEntry) -> Result<(), LoggingError> {
        self.entries.lock().await.insert(entry.entry_id.clone(), entry.clone());
        Ok(())
    }

    async fn record_completion(&self, entry: &ExecutionLogEntry) -> Result<(), LoggingError> {
        self.entries.lock().await.insert(entry.entry_id.clone(), entry.clone());
        Ok(())
    }
}

/// Append-only JSON lines file. Each entry is written once when it starts and once when
/// it completes; readers fold lines by entry id.
#[derive(Debug)]
pub struct JsonlLogSink {
    log_path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlLogSink {
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    async fn append(&self, entry: &ExecutionLogEntry) -> Result<(), LoggingError> {
        let mut json_line = serde_json::to_string(entry)?;
        json_line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.log_path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.log_path).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&self.log_path, std::fs::Permissions::from_mode(0o600)).await?;
        }

        file.write_all(json_line.as_bytes()).await?;
        file.flush().await?;
        debug!(entry_id = %entry.entry_id, status = ?entry.status, "appended execution log entry");
        Ok(())
    }

    /// Reads every entry of one execution in its latest state, in start order.
    /// Lines that fail to parse are skipped.
    pub async fn read_execution(&self, execution_id: &str) -> Result<Vec<ExecutionLogEntry>, LoggingError> {
        if !tokio::fs::try_exists(&self.log_path).await? {
            return Ok(Vec::new());
        }
        let content = tokio::fs::read_to_string(&self.log_path).await?;

        let mut folded: IndexMap<String, ExecutionLogEntry> = IndexMap::new();
        for (line_number, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ExecutionLogEntry>(line) {
                Ok(entry) if entry.execution_id == execution_id => {
                    folded.insert(entry.entry_id.clone(), entry);
                }
                Ok(_) => {}
                Err(error) => warn!(line = line_number + 1, error = %error, "skipping malformed execution log line"),
            }
        }
        Ok(folded.into_values().collect())
    }
}

#[async_trait]
impl ExecutionLogSink for JsonlLogSink {
    async fn record_start(&self, entry: &ExecutionLogEntry) -> Result<(), LoggingError> {
        self.append(entry).await
    }

    async fn record_completion(&self, entry: &ExecutionLogEntry) -> Result<(), LoggingError> {
        self.append(entry).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::ExecutionLogger;
    use nodeflow_types::ExecutionStatus;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn jsonl_sink_folds_start_and_completion_lines() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("logs").join("executions.jsonl");
        let sink = Arc::new(JsonlLogSink::new(&path));
        let logger = ExecutionLogger::new(sink.clone());

        let first = logger.log_start("exec-1", "n1", "Fetch", "HTTP Request", &json!({"password": "p"})).await;
        let other = logger.log_start("exec-2", "n1", "Fetch", "HTTP Request", &json!({})).await;
        logger.log_complete(first, ExecutionStatus::Success, Some(&json!({"ok": true})), None).await;
        logger.log_complete(other, ExecutionStatus::Error, None, Some("boom")).await;

        let content = std::fs::read_to_string(&path).expect("read log");
        assert_eq!(content.lines().count(), 4);
        assert!(!content.contains("\"p\""));

        let entries = sink.read_execution("exec-1").await.expect("read execution");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, ExecutionStatus::Success);
        assert_eq!(entries[0].input["password"], "[REDACTED]");
        assert_eq!(entries[0].output, Some(json!({"ok": true})));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn jsonl_sink_restricts_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("executions.jsonl");
        let logger = ExecutionLogger::new(Arc::new(JsonlLogSink::new(&path)));
        let handle = logger.log_start("exec-1", "n1", "Node", "trigger", &json!({})).await;
        logger.log_complete(handle, ExecutionStatus::Success, None, None).await;

        let mode = std::fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn reading_missing_file_yields_no_entries() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let sink = JsonlLogSink::new(temp_dir.path().join("absent.jsonl"));
        assert!(sink.read_execution("exec-1").await.expect("read").is_empty());
    }
}
