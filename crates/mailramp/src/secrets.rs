//! Secret handling: environment/file resolution and at-rest encryption
//! for mailbox credentials.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use secrecy::{ExposeSecret, SecretString};

/// Error type for secret resolution and credential encryption failures.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Failed to read secret from file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Encryption error: {0}")]
    EncryptionError(String),

    #[error("Decryption error: {0}")]
    DecryptionError(String),

    #[error("Invalid encryption key: {0}")]
    InvalidKey(String),
}

/// Result type for secret operations.
pub type Result<T> = std::result::Result<T, SecretError>;

/// Resolves a secret named `name` from the environment.
///
/// Checks `NAME` first, then `NAME_FILE` (Docker secrets pattern, pointing
/// at a file whose trimmed contents are the secret). Values are trimmed
/// since environment variables and secret files often carry trailing
/// newlines.
pub fn resolve_env_secret(name: &str) -> Result<SecretString> {
    if let Ok(value) = std::env::var(name) {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return Ok(SecretString::from(trimmed));
        }
    }

    let file_var = format!("{}_FILE", name);
    if let Ok(path) = std::env::var(&file_var) {
        if !path.is_empty() {
            return match std::fs::read_to_string(&path) {
                Ok(content) => Ok(SecretString::from(content.trim().to_string())),
                Err(e) => Err(SecretError::FileReadError { path, source: e }),
            };
        }
    }

    Err(SecretError::EnvVarNotSet {
        name: name.to_string(),
    })
}

/// Like [`resolve_env_secret`], but missing secrets are `None` instead of
/// an error. Useful for optional credentials.
pub fn resolve_env_secret_optional(name: &str) -> Result<Option<SecretString>> {
    match resolve_env_secret(name) {
        Ok(secret) => Ok(Some(secret)),
        Err(SecretError::EnvVarNotSet { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Encryption key environment variable name.
pub const CREDENTIAL_KEY_ENV_VAR: &str = "MAILRAMP_CREDENTIAL_KEY";

/// Nonce size for AES-256-GCM (96 bits = 12 bytes).
const NONCE_SIZE: usize = 12;

/// Encrypts mailbox credentials at rest using AES-256-GCM.
///
/// The key comes from the `MAILRAMP_CREDENTIAL_KEY` environment variable
/// as a 64-character hex string (32 bytes).
pub struct CredentialCipher {
    cipher: Aes256Gcm,
}

impl CredentialCipher {
    /// Creates a cipher from the environment. The key may also be supplied
    /// through `MAILRAMP_CREDENTIAL_KEY_FILE`.
    pub fn from_env() -> Result<Self> {
        let key_hex = resolve_env_secret(CREDENTIAL_KEY_ENV_VAR).map_err(|_| {
            SecretError::InvalidKey(format!(
                "Environment variable {} not set",
                CREDENTIAL_KEY_ENV_VAR
            ))
        })?;

        Self::from_hex_key(key_hex.expose_secret())
    }

    /// Creates a cipher from a hex-encoded 32-byte key.
    pub fn from_hex_key(key_hex: &str) -> Result<Self> {
        let key_bytes = hex_decode(key_hex)
            .map_err(|e| SecretError::InvalidKey(format!("Invalid hex key: {}", e)))?;

        if key_bytes.len() != 32 {
            return Err(SecretError::InvalidKey(format!(
                "Key must be 32 bytes (64 hex chars), got {} bytes",
                key_bytes.len()
            )));
        }

        let cipher = Aes256Gcm::new_from_slice(&key_bytes)
            .map_err(|e| SecretError::InvalidKey(format!("Failed to create cipher: {}", e)))?;

        Ok(Self { cipher })
    }

    /// Encrypts plaintext and returns hex-encoded `<nonce><ciphertext>`.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| SecretError::EncryptionError(e.to_string()))?;

        let mut combined = nonce.to_vec();
        combined.extend(ciphertext);

        Ok(hex_encode(&combined))
    }

    /// Decrypts hex-encoded `<nonce><ciphertext>` back to plaintext.
    pub fn decrypt(&self, ciphertext_hex: &str) -> Result<String> {
        let combined = hex_decode(ciphertext_hex)
            .map_err(|e| SecretError::DecryptionError(format!("Invalid hex: {}", e)))?;

        if combined.len() < NONCE_SIZE {
            return Err(SecretError::DecryptionError(
                "Ciphertext too short".to_string(),
            ));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext_bytes = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| SecretError::DecryptionError(e.to_string()))?;

        String::from_utf8(plaintext_bytes)
            .map_err(|e| SecretError::DecryptionError(format!("Invalid UTF-8: {}", e)))
    }
}

/// Encodes bytes as lowercase hex.
fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut result = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(result, "{:02x}", byte);
    }
    result
}

/// Decodes a hex string to bytes.
fn hex_decode(hex: &str) -> std::result::Result<Vec<u8>, String> {
    if hex.len() % 2 != 0 {
        return Err("Hex string must have even length".to_string());
    }

    (0..hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|e| format!("Invalid hex at position {}: {}", i, e))
        })
        .collect()
}
