use std::{
    fs,
    path::{Path, PathBuf},
};

use color_eyre::Result;
use lectern_core::storage::{update, Document};
use lectern_store::{cipher::Envelope, encrypted_store::EncryptedDocumentStore};
use serde_json::json;
use tracing::info;

/// Outcome of one migration pass over a data directory.
#[derive(Debug, Default)]
pub struct MigrationReport {
    pub migrated: Vec<PathBuf>,
    pub already_encrypted: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

/// Re-encrypt every legacy plaintext `.json` file directly under `dir`.
/// Envelope-form files are left alone; unreadable files are reported and
/// not touched. Each rewrite runs under the store's per-path guard, so a
/// live handler on the same file cannot interleave.
pub async fn run(store: &EncryptedDocumentStore, dir: &Path) -> Result<MigrationReport> {
    let mut report = MigrationReport::default();

    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("json"))
        .collect();
    paths.sort();

    for path in paths {
        let raw = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) => {
                report.failed.push((path, err.to_string()));
                continue;
            }
        };
        match serde_json::from_slice::<Document>(&raw) {
            Err(err) => report.failed.push((path, err.to_string())),
            Ok(parsed) if Envelope::detect(&parsed).is_some() => {
                report.already_encrypted.push(path);
            }
            Ok(_) => {
                // Rewriting the unchanged content leaves the file in
                // envelope form; the guard keeps live handlers out.
                match update(store, &path, json!(null), |_| {}).await {
                    Ok(_) => {
                        info!(path = %path.display(), "re-encrypted legacy file");
                        report.migrated.push(path);
                    }
                    Err(err) => report.failed.push((path, err.to_string())),
                }
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use lectern_core::storage::DocumentStore;
    use lectern_store::key_provider::KeyMaterial;

    use super::*;

    #[tokio::test]
    async fn migrates_only_legacy_plaintext_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = EncryptedDocumentStore::new(KeyMaterial::random("test"));

        let legacy = dir.path().join("users.json");
        fs::write(&legacy, r#"[{"id": 1, "username": "emilio"}]"#).expect("seed");

        let encrypted = dir.path().join("forums.json");
        store
            .write(&encrypted, &json!({"forums": []}))
            .await
            .expect("write");

        let broken = dir.path().join("stats.json");
        fs::write(&broken, "{oops").expect("seed");

        // Non-JSON files are outside the store's remit.
        fs::write(dir.path().join("notes.txt"), "ignore me").expect("seed");

        let report = run(&store, dir.path()).await.expect("migrate");
        assert_eq!(report.migrated, vec![legacy.clone()]);
        assert_eq!(report.already_encrypted, vec![encrypted]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, broken);

        // The migrated file is now an envelope and still readable.
        let on_disk: Document =
            serde_json::from_str(&fs::read_to_string(&legacy).expect("raw")).expect("json");
        assert!(Envelope::detect(&on_disk).is_some());
        let document = store.read(&legacy, json!([])).await.expect("read");
        assert_eq!(document, json!([{"id": 1, "username": "emilio"}]));
    }

    #[tokio::test]
    async fn second_pass_is_a_no_op() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = EncryptedDocumentStore::new(KeyMaterial::random("test"));
        fs::write(dir.path().join("shelf.json"), "{}").expect("seed");

        let first = run(&store, dir.path()).await.expect("migrate");
        assert_eq!(first.migrated.len(), 1);

        let second = run(&store, dir.path()).await.expect("migrate again");
        assert!(second.migrated.is_empty());
        assert_eq!(second.already_encrypted.len(), 1);
    }
}
