use std::{fs, io::Write, path::Path};

use async_trait::async_trait;
use lectern_core::storage::{Document, DocumentStore, PathGuard, PathLockMap, StoreError};
use tempfile::NamedTempFile;
use tracing::instrument;

use crate::cipher::{self, Envelope};
use crate::key_provider::{KeyError, KeyMaterial, KeyProvider};

/// File-backed document store with transparent AES-CBC encryption.
///
/// Reads tolerate three on-disk states: no file (caller default), a
/// ciphertext envelope (decrypted), and legacy plaintext JSON (returned
/// as-is; re-encrypted only on the next explicit write). Writes always
/// produce envelope form.
pub struct EncryptedDocumentStore {
    key: KeyMaterial,
    locks: PathLockMap,
}

impl EncryptedDocumentStore {
    /// Build a store around an already-resolved key. The key is resolved
    /// once per process and shared read-only by every operation.
    pub fn new(key: KeyMaterial) -> Self {
        Self {
            key,
            locks: PathLockMap::new(),
        }
    }

    /// Resolve the key through a provider (once) and build the store.
    pub async fn from_provider<P: KeyProvider>(provider: &P) -> Result<Self, KeyError> {
        Ok(Self::new(provider.get_or_create().await?))
    }

    /// Identifier of the key in use, safe to log.
    pub fn key_id(&self) -> &str {
        &self.key.id
    }
}

#[async_trait]
impl DocumentStore for EncryptedDocumentStore {
    #[instrument(skip_all, fields(path = %path.display()))]
    async fn read(&self, path: &Path, default: Document) -> Result<Document, StoreError> {
        let raw = match fs::read(path) {
            Ok(bytes) => bytes,
            // Legitimate first use, not a failure.
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(default),
            Err(err) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    reason: err.to_string(),
                })
            }
        };

        let parsed: Document = serde_json::from_slice(&raw).map_err(|err| StoreError::Corrupt {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;

        match Envelope::detect(&parsed) {
            Some(envelope) => {
                cipher::decrypt(&self.key, &envelope).map_err(|err| StoreError::Decrypt {
                    path: path.to_path_buf(),
                    reason: err.to_string(),
                })
            }
            // Legacy plaintext: returned unchanged, never rewritten here.
            None => Ok(parsed),
        }
    }

    #[instrument(skip_all, fields(path = %path.display()))]
    async fn write(&self, path: &Path, document: &Document) -> Result<(), StoreError> {
        let envelope =
            cipher::encrypt(&self.key, document).map_err(|err| StoreError::Corrupt {
                path: path.to_path_buf(),
                reason: err.to_string(),
            })?;
        write_envelope(path, &envelope)
    }

    async fn begin(&self, path: &Path) -> Result<PathGuard, StoreError> {
        self.locks.acquire(path).await
    }
}

/// Write the envelope to a temp file in the target directory and rename it
/// into place: a concurrent reader sees the old file or the new one, never
/// a partial write. Parent directories are created as needed.
fn write_envelope(path: &Path, envelope: &Envelope) -> Result<(), StoreError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|err| io_err(path, err))?;

    let json = serde_json::to_vec_pretty(envelope).map_err(|err| io_err(path, err))?;
    let mut tmp = NamedTempFile::new_in(parent).map_err(|err| io_err(path, err))?;
    tmp.write_all(&json).map_err(|err| io_err(path, err))?;
    tmp.flush().map_err(|err| io_err(path, err))?;
    tmp.persist(path).map_err(|err| io_err(path, err.error))?;
    Ok(())
}

fn io_err(path: &Path, err: impl ToString) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}
