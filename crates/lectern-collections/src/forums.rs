use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use lectern_core::storage::DocumentStore;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

pub const MAX_NAME_LENGTH: usize = 100;
pub const MAX_DESCRIPTION_LENGTH: usize = 500;

/// A discussion forum.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Forum {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub description: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Top-level shape of `forums.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct BoardDocument {
    #[serde(default)]
    forums: Vec<Forum>,
}

/// Partial forum edit; `None` leaves the current value untouched.
#[derive(Debug, Clone, Default)]
pub struct ForumUpdate {
    pub name: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
}

/// Accessor for the forum board: `{ "forums": [...] }` in `forums.json`.
pub struct ForumBoard<S> {
    store: Arc<S>,
    path: PathBuf,
}

impl<S: DocumentStore> ForumBoard<S> {
    pub fn new(store: Arc<S>, path: impl Into<PathBuf>) -> Self {
        Self {
            store,
            path: path.into(),
        }
    }

    async fn load(&self) -> Result<BoardDocument> {
        let document = self.store.read(&self.path, json!({})).await?;
        Ok(serde_json::from_value(document)?)
    }

    /// All forums, newest first.
    pub async fn list(&self) -> Result<Vec<Forum>> {
        let mut forums = self.load().await?.forums;
        forums.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(forums)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Forum>> {
        Ok(self
            .load()
            .await?
            .forums
            .into_iter()
            .find(|forum| forum.id == id))
    }

    #[instrument(skip(self, description))]
    pub async fn create(
        &self,
        name: &str,
        category: &str,
        description: &str,
        created_by: &str,
    ) -> Result<Forum> {
        let name = name.trim();
        let category = category.trim();
        let description = description.trim();
        let created_by = created_by.trim();
        if name.is_empty() || category.is_empty() || description.is_empty() || created_by.is_empty()
        {
            bail!("name, category, description and creator are all required");
        }
        if name.chars().count() > MAX_NAME_LENGTH {
            bail!("forum name cannot exceed {MAX_NAME_LENGTH} characters");
        }
        if description.chars().count() > MAX_DESCRIPTION_LENGTH {
            bail!("forum description cannot exceed {MAX_DESCRIPTION_LENGTH} characters");
        }

        let now = Utc::now();
        let forum = Forum {
            id: Uuid::new_v4(),
            name: name.to_string(),
            category: category.to_string(),
            description: description.to_string(),
            created_by: created_by.to_string(),
            created_at: now,
            updated_at: now,
        };

        let _guard = self.store.begin(&self.path).await?;
        let mut board = self.load().await?;
        board.forums.push(forum.clone());
        self.store
            .write(&self.path, &serde_json::to_value(&board)?)
            .await?;
        Ok(forum)
    }

    /// Apply a partial edit and bump the update timestamp.
    #[instrument(skip(self, update))]
    pub async fn update(&self, id: Uuid, update: ForumUpdate) -> Result<Forum> {
        let _guard = self.store.begin(&self.path).await?;
        let mut board = self.load().await?;

        let Some(forum) = board.forums.iter_mut().find(|forum| forum.id == id) else {
            bail!("no forum with id {id}");
        };
        if let Some(name) = update.name {
            forum.name = name.trim().to_string();
        }
        if let Some(category) = update.category {
            forum.category = category.trim().to_string();
        }
        if let Some(description) = update.description {
            forum.description = description.trim().to_string();
        }
        forum.updated_at = Utc::now();
        let updated = forum.clone();

        self.store
            .write(&self.path, &serde_json::to_value(&board)?)
            .await?;
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let _guard = self.store.begin(&self.path).await?;
        let mut board = self.load().await?;

        let before = board.forums.len();
        board.forums.retain(|forum| forum.id != id);
        if board.forums.len() == before {
            bail!("no forum with id {id}");
        }

        self.store
            .write(&self.path, &serde_json::to_value(&board)?)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use lectern_core::storage::InMemoryDocumentStore;

    use super::*;

    fn board() -> ForumBoard<InMemoryDocumentStore> {
        ForumBoard::new(Arc::new(InMemoryDocumentStore::new()), "/data/forums.json")
    }

    #[tokio::test]
    async fn creates_and_fetches_forums() {
        let board = board();
        let forum = board
            .create("Club de poesía", "Poesía", "Lecturas semanales", "emilio")
            .await
            .expect("create");

        let fetched = board.get(forum.id).await.expect("get").expect("present");
        assert_eq!(fetched, forum);
        assert!(board.get(Uuid::new_v4()).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn rejects_blank_and_oversized_fields() {
        let board = board();
        board
            .create("  ", "Cat", "Desc", "emilio")
            .await
            .expect_err("blank name");
        board
            .create(&"n".repeat(MAX_NAME_LENGTH + 1), "Cat", "Desc", "emilio")
            .await
            .expect_err("name too long");
        board
            .create("Name", "Cat", &"d".repeat(MAX_DESCRIPTION_LENGTH + 1), "emilio")
            .await
            .expect_err("description too long");
    }

    #[tokio::test]
    async fn partial_update_bumps_timestamp_only() {
        let board = board();
        let forum = board
            .create("Club", "Poesía", "Lecturas", "emilio")
            .await
            .expect("create");

        let updated = board
            .update(
                forum.id,
                ForumUpdate {
                    description: Some("Lecturas y tertulias".to_string()),
                    ..ForumUpdate::default()
                },
            )
            .await
            .expect("update");

        assert_eq!(updated.name, "Club");
        assert_eq!(updated.description, "Lecturas y tertulias");
        assert!(updated.updated_at >= forum.updated_at);
    }

    #[tokio::test]
    async fn delete_removes_exactly_one_forum() {
        let board = board();
        let keep = board
            .create("Keep", "Cat", "Desc", "emilio")
            .await
            .expect("create");
        let doomed = board
            .create("Drop", "Cat", "Desc", "emilio")
            .await
            .expect("create");

        board.delete(doomed.id).await.expect("delete");
        board.delete(doomed.id).await.expect_err("already gone");

        let remaining = board.list().await.expect("list");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, keep.id);
    }
}
