//! Credential storage and brokering for step implementations.
//!
//! Integration records are stored encrypted (`{id, type, encryptedConfig}`). The
//! [`CredentialBroker`] exchanges an integration id for the decrypted credential map,
//! which only ever lives in memory inside a step. Nothing in this module logs
//! credential values; lookups are traced by integration id only.

mod cipher;

pub use cipher::{CredentialCipher, ENCRYPTION_KEY_ENV_VAR};

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors raised while storing or resolving credentials.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("integration '{integration_id}' not found")]
    NotFound { integration_id: String },

    #[error("malformed encrypted value: {0}")]
    MalformedCiphertext(String),

    #[error("failed to decrypt credentials")]
    Decryption,

    #[error("failed to encrypt credentials")]
    Encryption,

    #[error("invalid encryption key: {0}")]
    InvalidKey(String),

    #[error("encryption key environment variable '{name}' is not set")]
    MissingKey { name: String },

    #[error("credential serialization error: {0}")]
    Serialization(String),

    #[error("credential store IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("credential lookups are not available")]
    Unavailable,
}

/// Integration credential record as stored at rest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub integration_type: String,
    /// `iv:authTag:ciphertext`, see [`CredentialCipher`].
    pub encrypted_config: String,
}

/// Exchanges an opaque integration reference for decrypted credentials.
#[async_trait]
pub trait CredentialBroker: Send + Sync {
    async fn get_credentials(&self, integration_id: &str) -> Result<HashMap<String, String>, CredentialError>;
}

/// Looks up encrypted integration records by id.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_record(&self, integration_id: &str) -> Result<Option<IntegrationRecord>, CredentialError>;
}

/// In-memory record store.
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    records: HashMap<String, IntegrationRecord>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(mut self, record: IntegrationRecord) -> Self {
        self.insert(record);
        self
    }

    pub fn insert(&mut self, record: IntegrationRecord) {
        self.records.insert(record.id.clone(), record);
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_record(&self, integration_id: &str) -> Result<Option<IntegrationRecord>, CredentialError> {
        Ok(self.records.get(integration_id).cloned())
    }
}

/// Record store backed by a JSON array file, re-read on every lookup so edits made by
/// other processes are picked up. A missing file behaves as an empty store.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<IntegrationRecord>, CredentialError> {
        if !tokio::fs::try_exists(&self.path).await? {
            return Ok(Vec::new());
        }
        let content = tokio::fs::read_to_string(&self.path).await?;
        serde_json::from_str(&content).map_err(|error| CredentialError::Serialization(error.to_string()))
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn find_record(&self, integration_id: &str) -> Result<Option<IntegrationRecord>, CredentialError> {
        let records = self.load().await?;
        Ok(records.into_iter().find(|record| record.id == integration_id))
    }
}

/// Broker that decrypts records from a [`CredentialStore`].
#[derive(Debug)]
pub struct StoreCredentialBroker<S> {
    store: S,
    cipher: CredentialCipher,
}

impl<S: CredentialStore> StoreCredentialBroker<S> {
    pub fn new(store: S, cipher: CredentialCipher) -> Self {
        Self { store, cipher }
    }
}

#[async_trait]
impl<S: CredentialStore> CredentialBroker for StoreCredentialBroker<S> {
    async fn get_credentials(&self, integration_id: &str) -> Result<HashMap<String, String>, CredentialError> {
        let record = self
            .store
            .find_record(integration_id)
            .await?
            .ok_or_else(|| CredentialError::NotFound {
                integration_id: integration_id.to_string(),
            })?;
        let credentials = self.cipher.decrypt_credentials(&record.encrypted_config)?;
        debug!(
            integration_id = %integration_id,
            integration_type = %record.integration_type,
            field_count = credentials.len(),
            "resolved integration credentials"
        );
        Ok(credentials)
    }
}

/// Broker used when no credential store is configured; every lookup fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCredentialBroker;

#[async_trait]
impl CredentialBroker for NullCredentialBroker {
    async fn get_credentials(&self, _integration_id: &str) -> Result<HashMap<String, String>, CredentialError> {
        Err(CredentialError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cipher() -> CredentialCipher {
        CredentialCipher::new([42u8; 32])
    }

    fn record(cipher: &CredentialCipher, id: &str) -> IntegrationRecord {
        IntegrationRecord {
            id: id.to_string(),
            integration_type: "smtp".to_string(),
            encrypted_config: cipher
                .encrypt_value(&json!({"username": "mailer", "password": "hunter2"}))
                .expect("encrypt"),
        }
    }

    #[tokio::test]
    async fn memory_broker_decrypts_known_integrations() {
        let cipher = cipher();
        let store = MemoryCredentialStore::new().with_record(record(&cipher, "int-1"));
        let broker = StoreCredentialBroker::new(store, cipher);

        let credentials = broker.get_credentials("int-1").await.expect("credentials");
        assert_eq!(credentials["username"], "mailer");
        assert_eq!(credentials["password"], "hunter2");

        let missing = broker.get_credentials("int-9").await;
        assert!(matches!(missing, Err(CredentialError::NotFound { .. })));
    }

    #[tokio::test]
    async fn file_store_reads_records_and_tolerates_missing_file() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("integrations.json");
        let store = FileCredentialStore::new(&path);
        assert!(store.find_record("int-1").await.expect("lookup").is_none());

        let cipher = cipher();
        let records = vec![record(&cipher, "int-1")];
        std::fs::write(&path, serde_json::to_string(&records).expect("serialize")).expect("write");

        let broker = StoreCredentialBroker::new(FileCredentialStore::new(&path), cipher);
        let credentials = broker.get_credentials("int-1").await.expect("credentials");
        assert_eq!(credentials["username"], "mailer");
    }

    #[tokio::test]
    async fn corrupted_records_fail_closed() {
        let cipher = cipher();
        let mut broken = record(&cipher, "int-1");
        broken.encrypted_config = "deadbeef".to_string();
        let broker = StoreCredentialBroker::new(MemoryCredentialStore::new().with_record(broken), cipher);

        let result = broker.get_credentials("int-1").await;
        assert!(matches!(result, Err(CredentialError::MalformedCiphertext(_))));
    }

    #[tokio::test]
    async fn null_broker_rejects_lookups() {
        assert!(NullCredentialBroker.get_credentials("any").await.is_err());
    }

    #[test]
    fn record_serializes_with_at_rest_field_names() {
        let value = serde_json::to_value(IntegrationRecord {
            id: "int-1".into(),
            integration_type: "jira".into(),
            encrypted_config: "a:b:c".into(),
        })
        .expect("serialize");
        assert_eq!(value, json!({"id": "int-1", "type": "jira", "encryptedConfig": "a:b:c"}));
    }
}
