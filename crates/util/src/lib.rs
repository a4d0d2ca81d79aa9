//! Utility functions shared by the Nodeflow engine and CLI.
//!
//! - [`redaction`]: masks secret-shaped data before it is logged
//! - [`keystore`]: encrypted integration credentials and the credential broker
//! - [`path_processing`]: `~` expansion and config-relative path resolution

pub mod keystore;
pub mod path_processing;
pub mod redaction;

pub use keystore::{
    CredentialBroker, CredentialCipher, CredentialError, CredentialStore, ENCRYPTION_KEY_ENV_VAR, FileCredentialStore, IntegrationRecord,
    MemoryCredentialStore, NullCredentialBroker, StoreCredentialBroker,
};
pub use path_processing::{expand_home, resolve_path};
pub use redaction::{REDACTED_PLACEHOLDER, is_sensitive_key, redact_sensitive, redact_sensitive_with, redact_value};
