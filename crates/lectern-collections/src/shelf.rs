use std::{collections::HashMap, path::PathBuf, sync::Arc};

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use lectern_core::storage::DocumentStore;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;

/// One book on a user's shelf.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ShelfEntry {
    pub book_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub thumbnail: Option<String>,
    pub pages: u32,
    /// 0 means unrated; set through `rate`, which enforces 1..=5.
    pub rating: u8,
    pub tags: Vec<String>,
    pub review: String,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Catalog data for a book being added; shelf-local fields start empty.
#[derive(Debug, Clone)]
pub struct NewShelfBook {
    pub book_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub thumbnail: Option<String>,
    pub pages: u32,
}

type ShelfDocument = HashMap<String, Vec<ShelfEntry>>;

/// Accessor for personal shelves: `shelf.json` is a map keyed by user id,
/// each value the user's list of books.
pub struct Shelf<S> {
    store: Arc<S>,
    path: PathBuf,
}

impl<S: DocumentStore> Shelf<S> {
    pub fn new(store: Arc<S>, path: impl Into<PathBuf>) -> Self {
        Self {
            store,
            path: path.into(),
        }
    }

    async fn load(&self) -> Result<ShelfDocument> {
        let document = self.store.read(&self.path, json!({})).await?;
        Ok(serde_json::from_value(document)?)
    }

    async fn save(&self, shelf: &ShelfDocument) -> Result<()> {
        self.store
            .write(&self.path, &serde_json::to_value(shelf)?)
            .await?;
        Ok(())
    }

    /// A user's books, optionally narrowed to one tag.
    pub async fn books_for(&self, user_id: &str, tag: Option<&str>) -> Result<Vec<ShelfEntry>> {
        let mut books = self.load().await?.remove(user_id).unwrap_or_default();
        if let Some(tag) = tag {
            books.retain(|entry| entry.tags.iter().any(|candidate| candidate == tag));
        }
        Ok(books)
    }

    /// Add a book to a user's shelf; a book can only be shelved once.
    #[instrument(skip(self, book))]
    pub async fn add(&self, user_id: &str, book: NewShelfBook) -> Result<ShelfEntry> {
        let _guard = self.store.begin(&self.path).await?;
        let mut shelf = self.load().await?;
        let books = shelf.entry(user_id.to_string()).or_default();

        if books.iter().any(|entry| entry.book_id == book.book_id) {
            bail!("book {} is already on the shelf", book.book_id);
        }

        let entry = ShelfEntry {
            book_id: book.book_id,
            title: book.title,
            authors: book.authors,
            thumbnail: book.thumbnail,
            pages: book.pages,
            rating: 0,
            tags: Vec::new(),
            review: String::new(),
            finished_at: None,
        };
        books.push(entry.clone());

        self.save(&shelf).await?;
        Ok(entry)
    }

    #[instrument(skip(self))]
    pub async fn rate(&self, user_id: &str, book_id: &str, rating: u8) -> Result<()> {
        if !(1..=5).contains(&rating) {
            bail!("rating must be between 1 and 5");
        }
        self.mutate_entry(user_id, book_id, |entry| entry.rating = rating)
            .await
    }

    #[instrument(skip(self, review))]
    pub async fn set_review(&self, user_id: &str, book_id: &str, review: &str) -> Result<()> {
        let review = review.to_string();
        self.mutate_entry(user_id, book_id, move |entry| entry.review = review)
            .await
    }

    #[instrument(skip(self))]
    pub async fn tag(&self, user_id: &str, book_id: &str, tag: &str) -> Result<()> {
        let tag = tag.trim().to_string();
        if tag.is_empty() {
            bail!("tag cannot be blank");
        }
        self.mutate_entry(user_id, book_id, move |entry| {
            if !entry.tags.contains(&tag) {
                entry.tags.push(tag);
            }
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn mark_finished(&self, user_id: &str, book_id: &str) -> Result<()> {
        self.mutate_entry(user_id, book_id, |entry| entry.finished_at = Some(Utc::now()))
            .await
    }

    /// Take a book off the shelf.
    #[instrument(skip(self))]
    pub async fn remove(&self, user_id: &str, book_id: &str) -> Result<()> {
        let _guard = self.store.begin(&self.path).await?;
        let mut shelf = self.load().await?;

        let Some(books) = shelf.get_mut(user_id) else {
            bail!("book {book_id} is not on the shelf");
        };
        let before = books.len();
        books.retain(|entry| entry.book_id != book_id);
        if books.len() == before {
            bail!("book {book_id} is not on the shelf");
        }

        self.save(&shelf).await
    }

    async fn mutate_entry<F>(&self, user_id: &str, book_id: &str, apply: F) -> Result<()>
    where
        F: FnOnce(&mut ShelfEntry) + Send,
    {
        let _guard = self.store.begin(&self.path).await?;
        let mut shelf = self.load().await?;

        let Some(entry) = shelf
            .get_mut(user_id)
            .and_then(|books| books.iter_mut().find(|entry| entry.book_id == book_id))
        else {
            bail!("book {book_id} is not on the shelf");
        };
        apply(entry);

        self.save(&shelf).await
    }
}
