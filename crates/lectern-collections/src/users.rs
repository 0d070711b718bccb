use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use lectern_core::storage::DocumentStore;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

/// Registered account. Password hashing and token verification belong to
/// the authentication layer; this type only carries what it is given.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: u64,
    pub username: String,
    pub password_hash: String,
    pub is_author: bool,
    /// Per-account secret compared against session claims; rotated on login.
    pub security_token: String,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

/// Accessor for the user directory: a bare array in `users.json`.
pub struct UserDirectory<S> {
    store: Arc<S>,
    path: PathBuf,
}

impl<S: DocumentStore> UserDirectory<S> {
    pub fn new(store: Arc<S>, path: impl Into<PathBuf>) -> Self {
        Self {
            store,
            path: path.into(),
        }
    }

    pub async fn list(&self) -> Result<Vec<User>> {
        let document = self.store.read(&self.path, json!([])).await?;
        Ok(serde_json::from_value(document)?)
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .find(|user| user.username == username))
    }

    pub async fn find(&self, id: u64) -> Result<Option<User>> {
        Ok(self.list().await?.into_iter().find(|user| user.id == id))
    }

    /// Register a new account. Usernames are unique; ids are sequential
    /// (`max(id) + 1`), matching the data already on disk.
    #[instrument(skip(self, password_hash))]
    pub async fn register(
        &self,
        username: &str,
        password_hash: &str,
        is_author: bool,
    ) -> Result<User> {
        let _guard = self.store.begin(&self.path).await?;
        let document = self.store.read(&self.path, json!([])).await?;
        let mut users: Vec<User> = serde_json::from_value(document)?;

        if users.iter().any(|user| user.username == username) {
            bail!("username already taken: {username}");
        }

        let id = users.iter().map(|user| user.id).max().unwrap_or(0) + 1;
        let user = User {
            id,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            is_author,
            security_token: fresh_token(),
            created_at: Utc::now(),
            last_login: None,
        };
        users.push(user.clone());

        self.store
            .write(&self.path, &serde_json::to_value(&users)?)
            .await?;
        Ok(user)
    }

    /// Stamp a successful login and rotate the account's security token,
    /// invalidating sessions minted before it.
    #[instrument(skip(self))]
    pub async fn record_login(&self, id: u64) -> Result<User> {
        let _guard = self.store.begin(&self.path).await?;
        let document = self.store.read(&self.path, json!([])).await?;
        let mut users: Vec<User> = serde_json::from_value(document)?;

        let Some(user) = users.iter_mut().find(|user| user.id == id) else {
            bail!("no user with id {id}");
        };
        user.last_login = Some(Utc::now());
        user.security_token = fresh_token();
        let updated = user.clone();

        self.store
            .write(&self.path, &serde_json::to_value(&users)?)
            .await?;
        Ok(updated)
    }
}

fn fresh_token() -> String {
    Uuid::new_v4().simple().to_string()
}
