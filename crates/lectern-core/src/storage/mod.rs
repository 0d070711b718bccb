mod document_store;
mod memory;
mod path_lock;

pub use document_store::{update, Document, DocumentStore, StoreError};
pub use memory::InMemoryDocumentStore;
pub use path_lock::{normalize_path, PathGuard, PathLockMap};
