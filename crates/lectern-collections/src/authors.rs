use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use lectern_core::storage::DocumentStore;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;

/// Public author profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthorProfile {
    pub user_id: String,
    pub username: String,
    pub name: String,
    pub short_bio: String,
    pub genre: String,
    pub publications: Vec<String>,
    /// Absent on profiles imported from the pre-timestamp data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// One redemption of an authorization code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CodeRedemption {
    pub username: String,
    pub date: DateTime<Utc>,
}

/// Invite code gating author registration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationCode {
    pub code: String,
    #[serde(default)]
    pub used_by: Vec<CodeRedemption>,
}

/// Top-level shape of `authors.json`: a wrapped object, not a bare array.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogDocument {
    #[serde(default)]
    authors: Vec<AuthorProfile>,
    #[serde(default)]
    authorization_codes: Vec<AuthorizationCode>,
}

/// Fields an author may change on their own profile; `None` leaves the
/// current value untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub short_bio: Option<String>,
    pub genre: Option<String>,
}

/// Accessor for the author catalog and its authorization codes.
pub struct AuthorCatalog<S> {
    store: Arc<S>,
    path: PathBuf,
}

impl<S: DocumentStore> AuthorCatalog<S> {
    pub fn new(store: Arc<S>, path: impl Into<PathBuf>) -> Self {
        Self {
            store,
            path: path.into(),
        }
    }

    async fn load(&self) -> Result<CatalogDocument> {
        let document = self.store.read(&self.path, json!({})).await?;
        Ok(serde_json::from_value(document)?)
    }

    pub async fn list(&self) -> Result<Vec<AuthorProfile>> {
        Ok(self.load().await?.authors)
    }

    pub async fn find(&self, user_id: &str) -> Result<Option<AuthorProfile>> {
        Ok(self
            .load()
            .await?
            .authors
            .into_iter()
            .find(|author| author.user_id == user_id))
    }

    /// Redeem an authorization code, recording who used it and when.
    /// Unknown codes are rejected; a code may be redeemed repeatedly, the
    /// usage trail is what matters.
    #[instrument(skip(self))]
    pub async fn redeem_code(&self, code: &str, username: &str) -> Result<()> {
        let _guard = self.store.begin(&self.path).await?;
        let mut catalog = self.load().await?;

        let Some(entry) = catalog
            .authorization_codes
            .iter_mut()
            .find(|candidate| candidate.code == code)
        else {
            bail!("invalid authorization code");
        };
        entry.used_by.push(CodeRedemption {
            username: username.to_string(),
            date: Utc::now(),
        });

        self.store
            .write(&self.path, &serde_json::to_value(&catalog)?)
            .await?;
        Ok(())
    }

    /// Create the initial, empty profile for a freshly registered author.
    #[instrument(skip(self))]
    pub async fn create_profile(&self, user_id: &str, username: &str) -> Result<AuthorProfile> {
        let _guard = self.store.begin(&self.path).await?;
        let mut catalog = self.load().await?;

        if catalog
            .authors
            .iter()
            .any(|author| author.user_id == user_id)
        {
            bail!("author profile already exists for user {user_id}");
        }

        let profile = AuthorProfile {
            user_id: user_id.to_string(),
            username: username.to_string(),
            name: String::new(),
            short_bio: String::new(),
            genre: String::new(),
            publications: Vec::new(),
            created_at: Some(Utc::now()),
        };
        catalog.authors.push(profile.clone());

        self.store
            .write(&self.path, &serde_json::to_value(&catalog)?)
            .await?;
        Ok(profile)
    }

    /// Apply a partial profile update.
    #[instrument(skip(self, update))]
    pub async fn update_profile(
        &self,
        user_id: &str,
        update: ProfileUpdate,
    ) -> Result<AuthorProfile> {
        let _guard = self.store.begin(&self.path).await?;
        let mut catalog = self.load().await?;

        let Some(author) = catalog
            .authors
            .iter_mut()
            .find(|author| author.user_id == user_id)
        else {
            bail!("no author profile for user {user_id}");
        };
        if let Some(name) = update.name {
            author.name = name;
        }
        if let Some(short_bio) = update.short_bio {
            author.short_bio = short_bio;
        }
        if let Some(genre) = update.genre {
            author.genre = genre;
        }
        let updated = author.clone();

        self.store
            .write(&self.path, &serde_json::to_value(&catalog)?)
            .await?;
        Ok(updated)
    }

    /// Link a publication id to an author's profile.
    #[instrument(skip(self))]
    pub async fn add_publication(&self, user_id: &str, publication_id: &str) -> Result<()> {
        let _guard = self.store.begin(&self.path).await?;
        let mut catalog = self.load().await?;

        let Some(author) = catalog
            .authors
            .iter_mut()
            .find(|author| author.user_id == user_id)
        else {
            bail!("no author profile for user {user_id}");
        };
        if !author
            .publications
            .iter()
            .any(|existing| existing == publication_id)
        {
            author.publications.push(publication_id.to_string());
        }

        self.store
            .write(&self.path, &serde_json::to_value(&catalog)?)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use lectern_core::storage::{DocumentStore, InMemoryDocumentStore};

    use super::*;

    fn catalog() -> AuthorCatalog<InMemoryDocumentStore> {
        AuthorCatalog::new(Arc::new(InMemoryDocumentStore::new()), "/data/authors.json")
    }

    async fn seed_code(catalog: &AuthorCatalog<InMemoryDocumentStore>, code: &str) {
        let document = json!({
            "authors": [],
            "authorizationCodes": [{"code": code, "usedBy": []}],
        });
        catalog
            .store
            .write(&catalog.path, &document)
            .await
            .expect("seed");
    }

    #[tokio::test]
    async fn empty_catalog_lists_nothing() {
        assert!(catalog().list().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn redeems_known_codes_and_rejects_unknown_ones() {
        let catalog = catalog();
        seed_code(&catalog, "FERIA2024").await;

        catalog
            .redeem_code("FERIA2024", "emilio")
            .await
            .expect("redeem");
        let err = catalog
            .redeem_code("NOPE", "emilio")
            .await
            .expect_err("unknown code");
        assert!(err.to_string().contains("invalid authorization code"));

        let raw = catalog
            .store
            .read(&catalog.path, json!({}))
            .await
            .expect("read");
        assert_eq!(raw["authorizationCodes"][0]["usedBy"][0]["username"], "emilio");
    }

    #[tokio::test]
    async fn creates_then_updates_a_profile() {
        let catalog = catalog();
        let created = catalog
            .create_profile("1", "emilio")
            .await
            .expect("create");
        assert_eq!(created.name, "");

        let updated = catalog
            .update_profile(
                "1",
                ProfileUpdate {
                    name: Some("Emilio Sánchez".to_string()),
                    genre: Some("Poesía".to_string()),
                    ..ProfileUpdate::default()
                },
            )
            .await
            .expect("update");
        assert_eq!(updated.name, "Emilio Sánchez");
        assert_eq!(updated.genre, "Poesía");
        // Untouched fields survive the partial update.
        assert_eq!(updated.username, "emilio");
    }

    #[tokio::test]
    async fn duplicate_profiles_are_rejected() {
        let catalog = catalog();
        catalog.create_profile("1", "emilio").await.expect("create");
        catalog
            .create_profile("1", "emilio")
            .await
            .expect_err("duplicate profile");
    }

    #[tokio::test]
    async fn publication_links_are_deduplicated() {
        let catalog = catalog();
        catalog.create_profile("1", "emilio").await.expect("create");
        catalog.add_publication("1", "p1").await.expect("add");
        catalog.add_publication("1", "p1").await.expect("add again");

        let profile = catalog.find("1").await.expect("find").expect("present");
        assert_eq!(profile.publications, vec!["p1".to_string()]);
    }

    #[tokio::test]
    async fn tolerates_documents_missing_either_section() {
        let catalog = catalog();
        catalog
            .store
            .write(&catalog.path, &json!({"authors": []}))
            .await
            .expect("seed");
        assert!(catalog.list().await.expect("list").is_empty());
        catalog
            .redeem_code("ANY", "emilio")
            .await
            .expect_err("no codes section");
    }
}
