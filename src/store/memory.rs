//! In-process stores backed by tokio RwLock maps

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{ContentFilter, ContentStore, RecordStore, StoreError, TransitionJournal};
use crate::workflow::state_machine::TransitionRecord;
use crate::workflow::types::{ContentKey, RecordId, SubmissionContent, SubmissionRecord, SubmissionStatus};

#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<RecordId, SubmissionRecord>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn insert(&self, record: &SubmissionRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(StoreError::Duplicate {
                entity: "record",
                key: record.id.to_string(),
            });
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn get(&self, id: RecordId) -> Result<Option<SubmissionRecord>, StoreError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn commit(&self, record: &SubmissionRecord, expected: SubmissionStatus) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let current = records
            .get_mut(&record.id)
            .ok_or_else(|| StoreError::record_not_found(record.id))?;
        if current.status != expected {
            return Err(StoreError::Conflict {
                expected,
                actual: current.status,
            });
        }
        *current = record.clone();
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SubmissionRecord>, StoreError> {
        let mut records: Vec<SubmissionRecord> = self.records.read().await.values().cloned().collect();
        records.sort_by_key(|r| (r.created_at, r.id));
        Ok(records)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryContentStore {
    contents: RwLock<HashMap<ContentKey, SubmissionContent>>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn insert(&self, content: &SubmissionContent) -> Result<(), StoreError> {
        let mut contents = self.contents.write().await;
        if contents.contains_key(&content.key) {
            return Err(StoreError::Duplicate {
                entity: "content",
                key: content.key.to_string(),
            });
        }
        contents.insert(content.key, content.clone());
        Ok(())
    }

    async fn get(&self, key: ContentKey) -> Result<Option<SubmissionContent>, StoreError> {
        Ok(self.contents.read().await.get(&key).cloned())
    }

    async fn replace(&self, content: &SubmissionContent) -> Result<(), StoreError> {
        let mut contents = self.contents.write().await;
        let current = contents
            .get_mut(&content.key)
            .ok_or_else(|| StoreError::content_not_found(content.key))?;
        // The mirror belongs to the sync coordinator, never to the authoring flow
        let (mirror, deleted) = (current.status_mirror, current.is_deleted);
        *current = content.clone();
        current.status_mirror = mirror;
        current.is_deleted = deleted;
        Ok(())
    }

    async fn set_status_mirror(&self, key: ContentKey, status: SubmissionStatus) -> Result<(), StoreError> {
        let mut contents = self.contents.write().await;
        let current = contents
            .get_mut(&key)
            .ok_or_else(|| StoreError::content_not_found(key))?;
        current.apply_mirror(status, Utc::now());
        Ok(())
    }

    async fn list(&self, filter: &ContentFilter) -> Result<Vec<SubmissionContent>, StoreError> {
        let mut matching: Vec<SubmissionContent> = self
            .contents
            .read()
            .await
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        matching.sort_by_key(|c| (c.created_at, c.key));
        Ok(matching)
    }

    async fn list_provisional(&self) -> Result<Vec<SubmissionContent>, StoreError> {
        Ok(self
            .contents
            .read()
            .await
            .values()
            .filter(|c| c.is_provisional())
            .cloned()
            .collect())
    }

    async fn discard_provisional(&self, key: ContentKey) -> Result<bool, StoreError> {
        let mut contents = self.contents.write().await;
        match contents.get(&key) {
            Some(content) if content.is_provisional() => {
                contents.remove(&key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryTransitionJournal {
    entries: RwLock<Vec<TransitionRecord>>,
}

impl InMemoryTransitionJournal {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransitionJournal for InMemoryTransitionJournal {
    async fn append(&self, entry: &TransitionRecord) -> Result<(), StoreError> {
        self.entries.write().await.push(entry.clone());
        Ok(())
    }

    async fn entries_for(&self, id: RecordId) -> Result<Vec<TransitionRecord>, StoreError> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .filter(|e| e.record_id == id)
            .cloned()
            .collect())
    }
}
