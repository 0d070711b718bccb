use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use tracing::warn;

/// Symmetric key length in bytes (AES-256).
pub const KEY_LENGTH: usize = 32;

/// Environment variable holding the hex-encoded store key.
pub const DEFAULT_KEY_VARIABLE: &str = "LECTERN_ENCRYPTION_KEY";

/// Key material used for encryption at rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    /// Identifier for logging/rotation (never log key bytes).
    pub id: String,
    /// 256-bit symmetric key.
    pub bytes: [u8; KEY_LENGTH],
}

impl KeyMaterial {
    /// Generate a fresh random key.
    pub fn random(id: impl Into<String>) -> Self {
        let mut bytes = [0u8; KEY_LENGTH];
        OsRng.fill_bytes(&mut bytes);
        Self {
            id: id.into(),
            bytes,
        }
    }

    /// Parse a 64-hex-character key, the format used in the environment
    /// variable and printed by `lectern keygen`.
    pub fn from_hex(id: impl Into<String>, encoded: &str) -> Result<Self, KeyError> {
        let decoded =
            hex::decode(encoded.trim()).map_err(|err| KeyError::Decode(err.to_string()))?;
        let bytes: [u8; KEY_LENGTH] = decoded.try_into().map_err(|rejected: Vec<u8>| {
            KeyError::Decode(format!(
                "expected {KEY_LENGTH} bytes, got {}",
                rejected.len()
            ))
        })?;
        Ok(Self {
            id: id.into(),
            bytes,
        })
    }

    /// Hex form suitable for the environment variable.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("keyring error: {0}")]
    Keyring(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("generation error: {0}")]
    Generation(String),
}

/// Provides the process-wide encryption key. Resolved once at startup; the
/// document store holds the resulting `KeyMaterial` for its lifetime and
/// shares it read-only across all operations.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError>;
}

/// Environment-backed provider. Reads a 64-hex-char key from the variable;
/// when it is absent or blank, generates a transient key for this process
/// only. Documents written under a transient key become unreadable after a
/// restart unless the key is captured first; that hazard is surfaced as a
/// warning, not hidden.
pub struct EnvKeyProvider {
    variable: String,
    transient: Arc<Mutex<Option<KeyMaterial>>>,
}

impl EnvKeyProvider {
    pub fn new(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            transient: Arc::new(Mutex::new(None)),
        }
    }
}

impl Default for EnvKeyProvider {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_VARIABLE)
    }
}

#[async_trait]
impl KeyProvider for EnvKeyProvider {
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError> {
        match std::env::var(&self.variable) {
            Ok(encoded) if !encoded.trim().is_empty() => KeyMaterial::from_hex("env", &encoded),
            _ => {
                let mut slot = self
                    .transient
                    .lock()
                    .map_err(|err| KeyError::Generation(format!("lock poisoned: {err}")))?;
                if let Some(existing) = slot.clone() {
                    return Ok(existing);
                }
                warn!(
                    variable = %self.variable,
                    "no encryption key configured; using a transient key. Documents \
                     written now become unreadable after restart unless the key is \
                     captured: run `lectern keygen` and set the variable"
                );
                let material = KeyMaterial::random("transient");
                *slot = Some(material.clone());
                Ok(material)
            }
        }
    }
}

/// OS keyring-backed provider. The key is created on first use and stored
/// base64-encoded under the given service/account pair.
pub struct KeyringProvider {
    service: String,
    account: String,
}

impl KeyringProvider {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }
}

#[async_trait]
impl KeyProvider for KeyringProvider {
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError> {
        // Keyring operations are synchronous; wrap in async for trait compatibility.
        let entry = keyring::Entry::new(&self.service, &self.account)
            .map_err(|err| KeyError::Keyring(err.to_string()))?;

        if let Ok(secret) = entry.get_password() {
            return decode_keyring_secret(&secret);
        }

        let material = KeyMaterial::random("keyring");
        entry
            .set_password(&general_purpose::STANDARD.encode(material.bytes))
            .map_err(|err| KeyError::Keyring(err.to_string()))?;
        Ok(material)
    }
}

fn decode_keyring_secret(secret: &str) -> Result<KeyMaterial, KeyError> {
    let decoded = general_purpose::STANDARD
        .decode(secret)
        .map_err(|err| KeyError::Decode(err.to_string()))?;
    let bytes: [u8; KEY_LENGTH] = decoded.try_into().map_err(|rejected: Vec<u8>| {
        KeyError::Decode(format!(
            "expected {KEY_LENGTH} bytes, got {}",
            rejected.len()
        ))
    })?;
    Ok(KeyMaterial {
        id: "keyring".to_string(),
        bytes,
    })
}

/// In-memory key provider for tests and ephemeral sessions.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKeyProvider {
    inner: Arc<Mutex<Option<KeyMaterial>>>,
}

#[async_trait]
impl KeyProvider for InMemoryKeyProvider {
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError> {
        let mut slot = self
            .inner
            .lock()
            .map_err(|err| KeyError::Generation(format!("lock poisoned: {err}")))?;

        if let Some(existing) = slot.clone() {
            return Ok(existing);
        }

        let material = KeyMaterial::random("memory");
        *slot = Some(material.clone());
        Ok(material)
    }
}
