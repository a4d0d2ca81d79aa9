//! Authenticated encryption for integration credentials at rest.
//!
//! Stored values use the `iv:authTag:ciphertext` layout, each component lowercase hex:
//! a fresh 16-byte IV per write, the 16-byte GCM tag, then the AES-256-GCM ciphertext
//! of the JSON-serialized credential object. Anything not in exactly that shape is
//! rejected before any cryptography runs.

use std::{collections::HashMap, fmt};

use aes_gcm::{
    AeadCore, AeadInPlace, AesGcm, KeyInit,
    aead::{OsRng, consts::U16, generic_array::GenericArray},
    aes::Aes256,
};
use serde_json::Value;

use super::CredentialError;

/// Environment variable read by [`CredentialCipher::from_env`].
pub const ENCRYPTION_KEY_ENV_VAR: &str = "NODEFLOW_ENCRYPTION_KEY";

const KEY_LENGTH: usize = 32;
const IV_LENGTH: usize = 16;
const TAG_LENGTH: usize = 16;

/// AES-256-GCM with a 16-byte nonce.
type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// Encrypts and decrypts credential payloads with a 256-bit key.
#[derive(Clone)]
pub struct CredentialCipher {
    key: [u8; KEY_LENGTH],
}

impl fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCipher").field("key", &"[REDACTED]").finish()
    }
}

impl CredentialCipher {
    /// Creates a cipher from raw key bytes.
    pub fn new(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Creates a cipher from a 64-character hex key.
    pub fn from_hex_key(hex_key: &str) -> Result<Self, CredentialError> {
        let bytes = hex::decode(hex_key.trim()).map_err(|error| CredentialError::InvalidKey(error.to_string()))?;
        let key: [u8; KEY_LENGTH] = bytes
            .try_into()
            .map_err(|bytes: Vec<u8>| CredentialError::InvalidKey(format!("expected {KEY_LENGTH} bytes, got {}", bytes.len())))?;
        Ok(Self::new(key))
    }

    /// Reads the hex key from [`ENCRYPTION_KEY_ENV_VAR`].
    pub fn from_env() -> Result<Self, CredentialError> {
        Self::from_env_var(ENCRYPTION_KEY_ENV_VAR)
    }

    /// Reads the hex key from the named environment variable.
    pub fn from_env_var(name: &str) -> Result<Self, CredentialError> {
        let value = std::env::var(name).map_err(|_| CredentialError::MissingKey { name: name.to_string() })?;
        Self::from_hex_key(&value)
    }

    fn cipher(&self) -> Aes256Gcm16 {
        Aes256Gcm16::new(GenericArray::from_slice(&self.key))
    }

    /// Encrypts a plaintext string into `iv:authTag:ciphertext`.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CredentialError> {
        let iv = Aes256Gcm16::generate_nonce(&mut OsRng);
        let mut buffer = plaintext.as_bytes().to_vec();
        let tag = self
            .cipher()
            .encrypt_in_place_detached(&iv, b"", &mut buffer)
            .map_err(|_| CredentialError::Encryption)?;
        Ok(format!("{}:{}:{}", hex::encode(iv), hex::encode(tag), hex::encode(buffer)))
    }

    /// Decrypts an `iv:authTag:ciphertext` value. Fails closed on any malformed input.
    pub fn decrypt(&self, encoded: &str) -> Result<String, CredentialError> {
        let parts: Vec<&str> = encoded.trim().split(':').collect();
        let [iv_hex, tag_hex, ciphertext_hex] = parts.as_slice() else {
            return Err(CredentialError::MalformedCiphertext(format!(
                "expected 3 colon-separated parts, found {}",
                parts.len()
            )));
        };
        if iv_hex.is_empty() || tag_hex.is_empty() {
            return Err(CredentialError::MalformedCiphertext("empty iv or auth tag".to_string()));
        }

        let iv = decode_part(iv_hex, "iv")?;
        let tag = decode_part(tag_hex, "auth tag")?;
        let mut buffer = decode_part(ciphertext_hex, "ciphertext")?;
        if iv.len() != IV_LENGTH {
            return Err(CredentialError::MalformedCiphertext(format!("iv must be {IV_LENGTH} bytes")));
        }
        if tag.len() != TAG_LENGTH {
            return Err(CredentialError::MalformedCiphertext(format!("auth tag must be {TAG_LENGTH} bytes")));
        }

        self.cipher()
            .decrypt_in_place_detached(GenericArray::from_slice(&iv), b"", &mut buffer, GenericArray::from_slice(&tag))
            .map_err(|_| CredentialError::Decryption)?;
        String::from_utf8(buffer).map_err(|_| CredentialError::Decryption)
    }

    /// Serializes a credential object to JSON and encrypts it.
    pub fn encrypt_value(&self, credentials: &Value) -> Result<String, CredentialError> {
        let serialized = serde_json::to_string(credentials).map_err(|error| CredentialError::Serialization(error.to_string()))?;
        self.encrypt(&serialized)
    }

    /// Decrypts a stored credential object into a flat string map.
    pub fn decrypt_credentials(&self, encoded: &str) -> Result<HashMap<String, String>, CredentialError> {
        let plaintext = self.decrypt(encoded)?;
        let value: Value = serde_json::from_str(&plaintext).map_err(|error| CredentialError::Serialization(error.to_string()))?;
        flatten_credentials(value)
    }
}

fn decode_part(part: &str, name: &str) -> Result<Vec<u8>, CredentialError> {
    hex::decode(part).map_err(|error| CredentialError::MalformedCiphertext(format!("{name} is not valid hex: {error}")))
}

fn flatten_credentials(value: Value) -> Result<HashMap<String, String>, CredentialError> {
    let Value::Object(map) = value else {
        return Err(CredentialError::Serialization("credential payload must be a JSON object".to_string()));
    };
    Ok(map
        .into_iter()
        .filter_map(|(key, value)| {
            let text = match value {
                Value::Null => return None,
                Value::String(text) => text,
                Value::Bool(flag) => flag.to_string(),
                Value::Number(number) => number.to_string(),
                nested => nested.to_string(),
            };
            Some((key, text))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TEST_KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    fn cipher() -> CredentialCipher {
        CredentialCipher::from_hex_key(TEST_KEY).expect("valid key")
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let cipher = cipher();
        for original in ["", "hello", "Grüße, 世界! 🎉", "a:b:c"] {
            let encrypted = cipher.encrypt(original).expect("encrypt");
            assert_eq!(encrypted.split(':').count(), 3);
            assert_eq!(cipher.decrypt(&encrypted).expect("decrypt"), original);
        }
    }

    #[test]
    fn encryptions_use_fresh_ivs() {
        let cipher = cipher();
        let first = cipher.encrypt("same").expect("encrypt");
        let second = cipher.encrypt("same").expect("encrypt");
        assert_ne!(first, second);
        assert_eq!(first.split(':').next().map(str::len), Some(IV_LENGTH * 2));
    }

    #[test]
    fn rejects_values_without_three_parts() {
        let cipher = cipher();
        let encrypted = cipher.encrypt("secret").expect("encrypt");
        let mut parts = encrypted.split(':');
        let iv = parts.next().expect("iv");
        let tag = parts.next().expect("tag");

        let missing_ciphertext = format!("{iv}:{tag}");
        assert!(matches!(
            cipher.decrypt(&missing_ciphertext),
            Err(CredentialError::MalformedCiphertext(_))
        ));
        assert!(matches!(cipher.decrypt("plaintext"), Err(CredentialError::MalformedCiphertext(_))));
        assert!(matches!(
            cipher.decrypt(&format!("{encrypted}:extra")),
            Err(CredentialError::MalformedCiphertext(_))
        ));
    }

    #[test]
    fn rejects_tampered_ciphertext_and_wrong_key() {
        let cipher = cipher();
        let encrypted = cipher.encrypt("secret").expect("encrypt");
        let (prefix, ciphertext) = encrypted.rsplit_once(':').expect("parts");
        let flipped = if ciphertext.starts_with('0') { "1" } else { "0" };
        let tampered = format!("{prefix}:{flipped}{}", &ciphertext[1..]);
        assert!(matches!(cipher.decrypt(&tampered), Err(CredentialError::Decryption)));

        let other = CredentialCipher::new([7u8; KEY_LENGTH]);
        assert!(matches!(other.decrypt(&encrypted), Err(CredentialError::Decryption)));
    }

    #[test]
    fn decrypts_credential_objects_into_flat_maps() {
        let cipher = cipher();
        let encrypted = cipher
            .encrypt_value(&json!({"apiKey": "k-1", "port": 587, "tls": true, "scopes": ["a"], "unused": null}))
            .expect("encrypt");

        let credentials = cipher.decrypt_credentials(&encrypted).expect("decrypt");
        assert_eq!(credentials["apiKey"], "k-1");
        assert_eq!(credentials["port"], "587");
        assert_eq!(credentials["tls"], "true");
        assert_eq!(credentials["scopes"], r#"["a"]"#);
        assert!(!credentials.contains_key("unused"));
    }

    #[test]
    fn key_loading_validates_length_and_presence() {
        assert!(matches!(CredentialCipher::from_hex_key("abcd"), Err(CredentialError::InvalidKey(_))));
        temp_env::with_var("NODEFLOW_TEST_MISSING_KEY", None::<&str>, || {
            assert!(matches!(
                CredentialCipher::from_env_var("NODEFLOW_TEST_MISSING_KEY"),
                Err(CredentialError::MissingKey { .. })
            ));
        });
        temp_env::with_var(ENCRYPTION_KEY_ENV_VAR, Some(TEST_KEY), || {
            assert!(CredentialCipher::from_env().is_ok());
        });
    }

    #[test]
    fn debug_output_hides_key() {
        let rendered = format!("{:?}", cipher());
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("0001020304"));
    }
}
