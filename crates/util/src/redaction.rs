//! # Redaction
//!
//! Masks secret-shaped data before it is logged or persisted. Two layers apply:
//!
//! - **Key-based**: any object key whose name looks like a credential (`apiKey`,
//!   `access_token`, `password`, `Authorization`, ...) has its whole value replaced by
//!   [`REDACTED_PLACEHOLDER`], whatever the value's type.
//! - **Text-based**: remaining string leaves are scanned for inline credentials such
//!   as `Authorization: ...` headers, `Bearer`/`Basic` tokens, and `*_TOKEN=...`
//!   assignments.
//!
//! The rest of the structure is preserved so log entries stay useful for debugging.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Replacement written in place of secret values.
pub const REDACTED_PLACEHOLDER: &str = "[REDACTED]";

static SENSITIVE_KEY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)
        ^auth$
        | api[\s_-]?key
        | token
        | secret
        | passw(?:or)?d
        | passphrase
        | authorization
        | credential
        | private[\s_-]?key
        | cookie
        | session
        | signature",
    )
    .expect("sensitive key pattern")
});

static INLINE_SECRET_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(build_inline_secret_patterns);

fn build_inline_secret_patterns() -> Vec<Regex> {
    [
        r"(?i)(authorization:\s*)([^\r\n]+)()",
        r"(?i)((?:^|\b)Bearer\s+)([A-Za-z0-9\-._~+/]+=*)()",
        r"(?i)((?:^|\b)Basic\s+)([A-Za-z0-9+/]+=*)()",
        r"(?i)((?:export\s+)?[A-Z0-9_]*?(?:KEY|TOKEN|SECRET|PASSWORD)[A-Z0-9_]*\s*=\s*)([^\s]+)()",
        r"(?i)(DATABASE_URL=)([^\s]+)()",
        r"()(eyJ[A-Za-z0-9\-_]+\.[A-Za-z0-9\-_]+\.[A-Za-z0-9\-_.+/=]*)()",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("inline secret pattern"))
    .collect()
}

/// Returns true when a key name looks like it holds a credential.
///
/// ```rust
/// use nodeflow_util::redaction::is_sensitive_key;
///
/// assert!(is_sensitive_key("apiKey"));
/// assert!(is_sensitive_key("refresh_token"));
/// assert!(!is_sensitive_key("author"));
/// ```
pub fn is_sensitive_key(key: &str) -> bool {
    SENSITIVE_KEY_PATTERN.is_match(key.trim())
}

/// Redacts values that look like secrets in a string.
///
/// ```rust
/// use nodeflow_util::redaction::redact_sensitive;
///
/// assert_eq!(redact_sensitive("API_KEY=abc123"), "API_KEY=[REDACTED]");
/// assert_eq!(redact_sensitive("Authorization: Bearer secret123"), "Authorization: [REDACTED]");
/// ```
pub fn redact_sensitive(input: &str) -> String {
    redact_sensitive_with(input, REDACTED_PLACEHOLDER)
}

/// Redacts sensitive-looking values, using a custom replacement token.
pub fn redact_sensitive_with(input: &str, replacement: &str) -> String {
    let mut redacted = input.to_string();
    for pattern in INLINE_SECRET_PATTERNS.iter() {
        redacted = pattern
            .replace_all(&redacted, |captures: &regex::Captures| {
                let prefix = captures.get(1).map(|m| m.as_str()).unwrap_or("");
                let suffix = captures.get(3).map(|m| m.as_str()).unwrap_or("");
                format!("{prefix}{replacement}{suffix}")
            })
            .to_string();
    }
    redacted
}

/// Recursively redacts a JSON value.
///
/// Values under sensitive keys are replaced wholesale; other strings are scanned for
/// inline credentials. Arrays and objects keep their shape.
pub fn redact_value(value: &Value) -> Value {
    match value {
        Value::String(text) => Value::String(redact_sensitive(text)),
        Value::Array(items) => Value::Array(items.iter().map(redact_value).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, nested)| {
                    let redacted = if is_sensitive_key(key) {
                        Value::String(REDACTED_PLACEHOLDER.to_string())
                    } else {
                        redact_value(nested)
                    };
                    (key.clone(), redacted)
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn masks_secret_keys_at_any_depth() {
        let input = json!({
            "url": "https://api.example.com",
            "apiKey": "sk-live-123",
            "nested": {
                "password": 12345,
                "list": [{"access_token": "abc"}, {"name": "keep"}]
            },
            "headers": {"Authorization": {"scheme": "Bearer", "value": "xyz"}}
        });

        let redacted = redact_value(&input);

        assert_eq!(redacted["url"], "https://api.example.com");
        assert_eq!(redacted["apiKey"], REDACTED_PLACEHOLDER);
        assert_eq!(redacted["nested"]["password"], REDACTED_PLACEHOLDER);
        assert_eq!(redacted["nested"]["list"][0]["access_token"], REDACTED_PLACEHOLDER);
        assert_eq!(redacted["nested"]["list"][1]["name"], "keep");
        assert_eq!(redacted["headers"]["Authorization"], REDACTED_PLACEHOLDER);
    }

    #[test]
    fn key_matching_is_case_insensitive() {
        for key in ["APIKEY", "api_key", "X-Api-Key", "clientSecret", "Passwd", "sessionId", "auth"] {
            assert!(is_sensitive_key(key), "{key} should be sensitive");
        }
        for key in ["author", "authorName", "title", "integrationId"] {
            assert!(!is_sensitive_key(key), "{key} should not be sensitive");
        }
    }

    #[test]
    fn redacts_inline_credentials_in_strings() {
        let redacted = redact_sensitive("curl -H 'Authorization: Bearer abc.def'");
        assert!(!redacted.contains("abc.def"));

        let redacted = redact_sensitive("export GITHUB_TOKEN=ghp_secretvalue done");
        assert_eq!(redacted, "export GITHUB_TOKEN=[REDACTED] done");

        let redacted = redact_sensitive("plain message");
        assert_eq!(redacted, "plain message");
    }
}
