use std::{collections::HashMap, path::PathBuf, sync::Arc};

use anyhow::{bail, Result};
use lectern_core::storage::DocumentStore;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;

/// Whether the user still plans to attend or already did.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Pending,
    Attended,
}

/// One event on a user's personal agenda.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventEntry {
    pub event_id: u64,
    pub status: AttendanceStatus,
}

type AgendaDocument = HashMap<String, Vec<EventEntry>>;

/// Accessor for per-user event agendas: `userEvents.json` is a map keyed
/// by user id.
pub struct EventAgenda<S> {
    store: Arc<S>,
    path: PathBuf,
}

impl<S: DocumentStore> EventAgenda<S> {
    pub fn new(store: Arc<S>, path: impl Into<PathBuf>) -> Self {
        Self {
            store,
            path: path.into(),
        }
    }

    async fn load(&self) -> Result<AgendaDocument> {
        let document = self.store.read(&self.path, json!({})).await?;
        Ok(serde_json::from_value(document)?)
    }

    pub async fn list(&self, user_id: &str) -> Result<Vec<EventEntry>> {
        Ok(self.load().await?.remove(user_id).unwrap_or_default())
    }

    /// Put an event on the user's agenda, initially pending.
    #[instrument(skip(self))]
    pub async fn add(&self, user_id: &str, event_id: u64) -> Result<EventEntry> {
        let _guard = self.store.begin(&self.path).await?;
        let mut agenda = self.load().await?;
        let entries = agenda.entry(user_id.to_string()).or_default();

        if entries.iter().any(|entry| entry.event_id == event_id) {
            bail!("event {event_id} is already on the agenda");
        }

        let entry = EventEntry {
            event_id,
            status: AttendanceStatus::Pending,
        };
        entries.push(entry.clone());

        self.store
            .write(&self.path, &serde_json::to_value(&agenda)?)
            .await?;
        Ok(entry)
    }

    #[instrument(skip(self))]
    pub async fn set_status(
        &self,
        user_id: &str,
        event_id: u64,
        status: AttendanceStatus,
    ) -> Result<EventEntry> {
        let _guard = self.store.begin(&self.path).await?;
        let mut agenda = self.load().await?;

        let Some(entry) = agenda
            .get_mut(user_id)
            .and_then(|entries| entries.iter_mut().find(|entry| entry.event_id == event_id))
        else {
            bail!("event {event_id} is not on the agenda");
        };
        entry.status = status;
        let updated = entry.clone();

        self.store
            .write(&self.path, &serde_json::to_value(&agenda)?)
            .await?;
        Ok(updated)
    }
}
