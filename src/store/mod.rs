//! Storage seams for the workflow engine
//!
//! `RecordStore` is authoritative for workflow status. `ContentStore` holds the
//! schema-flexible content documents and a non-authoritative status mirror.
//! `TransitionJournal` is only used by the append-log history mode.

pub mod file;
pub mod memory;
#[cfg(feature = "database")]
pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

use crate::workflow::state_machine::TransitionRecord;
use crate::workflow::types::{
    Category, ContentKey, RecordId, SubmissionContent, SubmissionRecord, SubmissionStatus, UserId,
};

pub use file::{FileContentStore, FileRecordStore, FileTransitionJournal};
pub use memory::{InMemoryContentStore, InMemoryRecordStore, InMemoryTransitionJournal};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {key} not found")]
    NotFound { entity: &'static str, key: String },

    #[error("{entity} {key} already exists")]
    Duplicate { entity: &'static str, key: String },

    #[error("Conditional write refused: expected status {expected}, found {actual}")]
    Conflict {
        expected: SubmissionStatus,
        actual: SubmissionStatus,
    },

    #[error("Store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn record_not_found(id: RecordId) -> Self {
        StoreError::NotFound {
            entity: "record",
            key: id.to_string(),
        }
    }

    pub fn content_not_found(key: ContentKey) -> Self {
        StoreError::NotFound {
            entity: "content",
            key: key.to_string(),
        }
    }
}

/// Read-path filter over content documents. Matching uses the status mirror,
/// and provisional documents never match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentFilter {
    pub owners: Option<Vec<UserId>>,
    pub status: Option<SubmissionStatus>,
    pub category: Option<Category>,
    pub include_deleted: bool,
}

impl ContentFilter {
    pub fn matches(&self, content: &SubmissionContent) -> bool {
        let Some(mirror) = content.status_mirror else {
            return false;
        };
        if content.is_deleted && !self.include_deleted {
            return false;
        }
        if let Some(owners) = &self.owners {
            if !owners.contains(&content.owner) {
                return false;
            }
        }
        if let Some(status) = self.status {
            if mirror != status {
                return false;
            }
        }
        if let Some(category) = self.category {
            if content.category != category {
                return false;
            }
        }
        true
    }
}

/// Authoritative store of workflow records
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a new record; fails with `Duplicate` if the id is taken
    async fn insert(&self, record: &SubmissionRecord) -> Result<(), StoreError>;

    async fn get(&self, id: RecordId) -> Result<Option<SubmissionRecord>, StoreError>;

    /// Replace a record only if its stored status still equals `expected`.
    /// A stale precondition fails with `Conflict` and nothing is written.
    async fn commit(&self, record: &SubmissionRecord, expected: SubmissionStatus) -> Result<(), StoreError>;

    async fn list(&self) -> Result<Vec<SubmissionRecord>, StoreError>;
}

/// Content documents with a denormalized status mirror
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn insert(&self, content: &SubmissionContent) -> Result<(), StoreError>;

    async fn get(&self, key: ContentKey) -> Result<Option<SubmissionContent>, StoreError>;

    /// Replace the authored fields of an existing document
    async fn replace(&self, content: &SubmissionContent) -> Result<(), StoreError>;

    /// Copy an authoritative status into the mirror and soft-delete flag
    async fn set_status_mirror(&self, key: ContentKey, status: SubmissionStatus) -> Result<(), StoreError>;

    async fn list(&self, filter: &ContentFilter) -> Result<Vec<SubmissionContent>, StoreError>;

    /// Documents no record has claimed yet
    async fn list_provisional(&self) -> Result<Vec<SubmissionContent>, StoreError>;

    /// Remove a provisional document. Returns false if it is not provisional.
    async fn discard_provisional(&self, key: ContentKey) -> Result<bool, StoreError>;
}

/// Append-only log of committed transitions
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TransitionJournal: Send + Sync {
    async fn append(&self, entry: &TransitionRecord) -> Result<(), StoreError>;

    async fn entries_for(&self, id: RecordId) -> Result<Vec<TransitionRecord>, StoreError>;
}
