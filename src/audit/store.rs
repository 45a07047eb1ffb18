//! Audit sink
//!
//! Writes are append-only inserts plus the one-time decision update.

use crate::error::OrchestrationError;
use crate::models::{AuditLogEntry, OverrideRecord, UserDecision};
use crate::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[async_trait::async_trait]
pub trait AuditStore: Send + Sync {
    /// Append an entry; an existing id is an error.
    async fn insert_entry(&self, entry: AuditLogEntry) -> Result<Uuid>;

    async fn get_entry(&self, id: Uuid) -> Result<Option<AuditLogEntry>>;

    /// Set the decision of an open entry and append `override_record` in
    /// the same write. `false` if the entry is missing or already decided,
    /// in which case nothing is written.
    async fn decide(
        &self,
        id: Uuid,
        decision: UserDecision,
        override_record: Option<OverrideRecord>,
    ) -> Result<bool>;

    /// Entries with `request_timestamp` in `[start, end]`, any order
    async fn entries_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AuditLogEntry>>;

    /// Override records with `timestamp` in `[start, end]`, any order
    async fn overrides_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<OverrideRecord>>;
}

/// In-memory audit store for development and tests
pub struct InMemoryAuditStore {
    entries: Arc<RwLock<HashMap<Uuid, AuditLogEntry>>>,
    overrides: Arc<RwLock<Vec<OverrideRecord>>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            overrides: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl Default for InMemoryAuditStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn insert_entry(&self, entry: AuditLogEntry) -> Result<Uuid> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&entry.id) {
            return Err(OrchestrationError::AuditError(format!(
                "Audit entry {} already exists",
                entry.id
            )));
        }

        let id = entry.id;
        entries.insert(id, entry);
        Ok(id)
    }

    async fn get_entry(&self, id: Uuid) -> Result<Option<AuditLogEntry>> {
        Ok(self.entries.read().await.get(&id).cloned())
    }

    async fn decide(
        &self,
        id: Uuid,
        decision: UserDecision,
        override_record: Option<OverrideRecord>,
    ) -> Result<bool> {
        // entries before overrides, everywhere both are held
        let mut entries = self.entries.write().await;
        let mut overrides = self.overrides.write().await;

        match entries.get_mut(&id) {
            Some(entry) if entry.is_open() => {
                entry.decision = Some(decision);
                overrides.extend(override_record);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn entries_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AuditLogEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .values()
            .filter(|e| e.request_timestamp >= start && e.request_timestamp <= end)
            .cloned()
            .collect())
    }

    async fn overrides_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<OverrideRecord>> {
        let overrides = self.overrides.read().await;
        Ok(overrides
            .iter()
            .filter(|o| o.timestamp >= start && o.timestamp <= end)
            .cloned()
            .collect())
    }
}
