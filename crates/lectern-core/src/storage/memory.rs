use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;

use super::document_store::{Document, DocumentStore, StoreError};
use super::path_lock::{normalize_path, PathGuard, PathLockMap};

/// In-memory document store for accessor tests and smoke runs. Honors the
/// same contract as the file-backed store (missing entry ⇒ default,
/// per-path guard) without encryption or disk.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDocumentStore {
    documents: Arc<Mutex<HashMap<PathBuf, Document>>>,
    locks: PathLockMap,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn read(&self, path: &Path, default: Document) -> Result<Document, StoreError> {
        let map = self
            .documents
            .lock()
            .map_err(|err| StoreError::io(path, format!("lock poisoned: {err}")))?;
        Ok(map.get(&normalize_path(path)).cloned().unwrap_or(default))
    }

    async fn write(&self, path: &Path, document: &Document) -> Result<(), StoreError> {
        let mut map = self
            .documents
            .lock()
            .map_err(|err| StoreError::io(path, format!("lock poisoned: {err}")))?;
        map.insert(normalize_path(path), document.clone());
        Ok(())
    }

    async fn begin(&self, path: &Path) -> Result<PathGuard, StoreError> {
        self.locks.acquire(path).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn missing_entry_returns_default() {
        let store = InMemoryDocumentStore::new();
        let value = store
            .read(Path::new("/data/users.json"), json!([]))
            .await
            .expect("read");
        assert_eq!(value, json!([]));

        let keyed = store
            .read(Path::new("/data/shelf.json"), json!({}))
            .await
            .expect("read");
        assert_eq!(keyed, json!({}));
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let store = InMemoryDocumentStore::new();
        let path = Path::new("/data/forums.json");
        store
            .write(path, &json!({"forums": [{"id": "f1"}]}))
            .await
            .expect("write");
        let value = store.read(path, json!({})).await.expect("read");
        assert_eq!(value, json!({"forums": [{"id": "f1"}]}));
    }
}
