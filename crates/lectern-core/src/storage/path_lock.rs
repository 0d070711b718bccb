use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::document_store::StoreError;

/// Registry of per-path mutexes serializing read-modify-write sequences.
/// One entry per distinct normalized path; collections address a small
/// fixed set of files, so entries are never reaped.
#[derive(Debug, Default, Clone)]
pub struct PathLockMap {
    inner: Arc<Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>>,
}

/// Holds the mutual-exclusion scope for one path. Dropping the guard
/// releases the path on every exit, including early error returns and
/// abandoned requests.
#[derive(Debug)]
pub struct PathGuard {
    _permit: OwnedMutexGuard<()>,
}

impl PathLockMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `path`, waiting if another sequence holds it.
    /// Locks on distinct paths are independent.
    pub async fn acquire(&self, path: &Path) -> Result<PathGuard, StoreError> {
        let slot = {
            let mut map = self
                .inner
                .lock()
                .map_err(|err| StoreError::io(path, format!("lock registry poisoned: {err}")))?;
            map.entry(normalize_path(path))
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        Ok(PathGuard {
            _permit: slot.lock_owned().await,
        })
    }
}

/// Normalize a path without touching the filesystem, so a path that does
/// not exist yet keys the same lock as its created form. `.` and `..` are
/// resolved lexically; symlinked aliases of the same file are not unified.
pub fn normalize_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_resolves_dot_segments() {
        assert_eq!(
            normalize_path(Path::new("/data/./forums/../users.json")),
            PathBuf::from("/data/users.json")
        );
    }

    #[test]
    fn normalize_anchors_relative_paths() {
        let normalized = normalize_path(Path::new("data/users.json"));
        assert!(normalized.is_absolute());
        assert!(normalized.ends_with("data/users.json"));
    }

    #[tokio::test]
    async fn same_path_spellings_share_one_lock() {
        let locks = PathLockMap::new();
        let guard = locks.acquire(Path::new("/data/users.json")).await.unwrap();

        // The alias must block behind the held guard.
        let locks2 = locks.clone();
        let contended = tokio::spawn(async move {
            locks2
                .acquire(Path::new("/data/./forums/../users.json"))
                .await
                .unwrap()
        });
        tokio::task::yield_now().await;
        assert!(!contended.is_finished());

        drop(guard);
        contended.await.expect("acquire after release");
    }

    #[tokio::test]
    async fn distinct_paths_do_not_contend() {
        let locks = PathLockMap::new();
        let _users = locks.acquire(Path::new("/data/users.json")).await.unwrap();
        // Must not wait on the users.json guard.
        let _forums = locks.acquire(Path::new("/data/forums.json")).await.unwrap();
    }
}
