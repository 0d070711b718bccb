use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use super::path_lock::PathGuard;

/// A document is any JSON value persisted at a file path. Its top-level
/// shape (bare array, wrapped object, map keyed by id) is a convention
/// owned by the caller, never by the store.
pub type Document = serde_json::Value;

/// Errors produced by document store implementations.
///
/// A missing file is deliberately absent here: it represents legitimate
/// first use and surfaces as the caller-supplied default instead.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Filesystem failure: permissions, disk full, unreadable file.
    #[error("i/o failure at {path}: {reason}")]
    Io { path: PathBuf, reason: String },
    /// The file exists but does not hold valid JSON.
    #[error("corrupt document at {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    /// The file holds a ciphertext envelope that cannot be opened: wrong
    /// key, tampered ciphertext, or an unsupported envelope version.
    #[error("cannot decrypt document at {path}: {reason}")]
    Decrypt { path: PathBuf, reason: String },
}

impl StoreError {
    pub(crate) fn io(path: &Path, err: impl ToString) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            reason: err.to_string(),
        }
    }
}

/// Contract for encrypted-at-rest JSON document persistence used by every
/// collection accessor.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read the document at `path`. A missing file returns `default`
    /// unchanged. Corruption and decryption failures always propagate;
    /// masking them as `default` would silently discard user data.
    async fn read(&self, path: &Path, default: Document) -> Result<Document, StoreError>;

    /// Replace the document at `path` with `document`, encrypted at rest.
    /// Parent directories are created as needed and the file is swapped in
    /// atomically, so a concurrent `read` never observes a torn file.
    async fn write(&self, path: &Path, document: &Document) -> Result<(), StoreError>;

    /// Enter the mutual-exclusion scope for `path`.
    ///
    /// `read` and `write` are individually safe against torn files, but a
    /// read-modify-write sequence must hold the returned guard for its
    /// whole duration or a concurrent sequence on the same path can
    /// overwrite its effect (lost update). Distinct paths never contend.
    async fn begin(&self, path: &Path) -> Result<PathGuard, StoreError>;
}

/// Run a read-modify-write sequence against `path` under the per-path
/// guard: read (or default), apply the mutation in place, write back.
/// Returns the document as written. The guard is released on every exit,
/// including errors.
pub async fn update<S, F>(
    store: &S,
    path: &Path,
    default: Document,
    apply: F,
) -> Result<Document, StoreError>
where
    S: DocumentStore + ?Sized,
    F: FnOnce(&mut Document) + Send,
{
    let _guard = store.begin(path).await?;
    let mut document = store.read(path, default).await?;
    apply(&mut document);
    store.write(path, &document).await?;
    Ok(document)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::storage::InMemoryDocumentStore;

    #[tokio::test]
    async fn update_applies_mutation_and_persists() {
        let store = InMemoryDocumentStore::new();
        let path = Path::new("/data/users.json");

        let written = update(&store, path, json!([]), |doc| {
            doc.as_array_mut().unwrap().push(json!({"id": 1}));
        })
        .await
        .expect("update");

        assert_eq!(written, json!([{"id": 1}]));
        let read_back = store.read(path, json!([])).await.expect("read");
        assert_eq!(read_back, json!([{"id": 1}]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn guarded_sequences_lose_no_update() {
        let store = std::sync::Arc::new(InMemoryDocumentStore::new());
        let path = Path::new("/data/shelf.json");

        let mut handles = Vec::new();
        for id in 0..2 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let path = Path::new("/data/shelf.json");
                let _guard = store.begin(path).await.expect("begin");
                let mut doc = store.read(path, json!([])).await.expect("read");
                // Widen the race window while the guard is held.
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                doc.as_array_mut().unwrap().push(json!({ "id": id }));
                store.write(path, &doc).await.expect("write");
            }));
        }
        for handle in handles {
            handle.await.expect("join");
        }

        let merged = store.read(path, json!([])).await.expect("read");
        assert_eq!(merged.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unguarded_interleaving_demonstrates_lost_update() {
        let store = InMemoryDocumentStore::new();
        let path = Path::new("/data/shelf.json");

        // Both sequences read the same prior state before either writes.
        let mut first = store.read(path, json!([])).await.expect("read");
        let mut second = store.read(path, json!([])).await.expect("read");

        first.as_array_mut().unwrap().push(json!({"id": "a"}));
        store.write(path, &first).await.expect("write");

        second.as_array_mut().unwrap().push(json!({"id": "b"}));
        store.write(path, &second).await.expect("write");

        // The second write wins; the first mutation is silently discarded.
        let merged = store.read(path, json!([])).await.expect("read");
        assert_eq!(merged, json!([{"id": "b"}]));
    }
}
