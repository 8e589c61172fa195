//! File-backed stores: one JSON snapshot per store plus a JSON-lines journal.
//!
//! Several processes may share a data directory, so no handle caches state.
//! Every call takes an advisory lock on the store's `.lock` file, reads the
//! snapshot from disk, and (for mutations) checks preconditions and rewrites
//! the snapshot through a temp file and a rename while still holding the lock.

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use super::{ContentFilter, ContentStore, RecordStore, StoreError, TransitionJournal};
use crate::workflow::state_machine::TransitionRecord;
use crate::workflow::types::{ContentKey, RecordId, SubmissionContent, SubmissionRecord, SubmissionStatus};

pub const SNAPSHOT_VERSION: &str = "1";
pub const RECORDS_FILE: &str = "records.json";
pub const CONTENTS_FILE: &str = "contents.json";
pub const JOURNAL_FILE: &str = "transitions.jsonl";

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot<T> {
    version: String,
    entries: Vec<T>,
}

trait SnapshotEntry: Serialize + DeserializeOwned + Send + 'static {
    type Key: Ord + Copy + Send + 'static;

    fn key(&self) -> Self::Key;
}

impl SnapshotEntry for SubmissionRecord {
    type Key = RecordId;

    fn key(&self) -> RecordId {
        self.id
    }
}

impl SnapshotEntry for SubmissionContent {
    type Key = ContentKey;

    fn key(&self) -> ContentKey {
        self.key
    }
}

type Entries<T> = BTreeMap<<T as SnapshotEntry>::Key, T>;

fn open_lock_file(path: &Path) -> Result<File, StoreError> {
    Ok(OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)?)
}

fn load_entries<T: SnapshotEntry>(path: &Path) -> Result<Entries<T>, StoreError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(e.into()),
    };
    let snapshot: Snapshot<T> = serde_json::from_str(&raw)?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(StoreError::Unavailable {
            reason: format!(
                "snapshot {} has version {}, expected {}",
                path.display(),
                snapshot.version,
                SNAPSHOT_VERSION
            ),
        });
    }
    Ok(snapshot.entries.into_iter().map(|e| (e.key(), e)).collect())
}

fn write_entries<T: SnapshotEntry>(path: &Path, entries: &Entries<T>) -> Result<(), StoreError> {
    let snapshot = Snapshot {
        version: SNAPSHOT_VERSION.to_string(),
        entries: entries.values().collect::<Vec<_>>(),
    };
    let json = serde_json::to_string_pretty(&snapshot)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Runs lock-holding file work off the async runtime
async fn run_blocking<R, F>(work: F) -> Result<R, StoreError>
where
    F: FnOnce() -> Result<R, StoreError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| StoreError::Unavailable {
            reason: format!("file store task failed: {e}"),
        })?
}

async fn ensure_dir(dir: &Path) -> Result<(), StoreError> {
    if !fs::try_exists(dir).await? {
        fs::create_dir_all(dir).await?;
        info!(path = %dir.display(), "Created data directory");
    }
    Ok(())
}

/// A snapshot file and the lock file that serializes access to it
#[derive(Debug)]
struct SnapshotFile<T> {
    path: PathBuf,
    lock_path: PathBuf,
    _entry: PhantomData<fn() -> T>,
}

impl<T: SnapshotEntry> SnapshotFile<T> {
    async fn open(data_dir: &Path, file: &str) -> Result<Self, StoreError> {
        ensure_dir(data_dir).await?;
        let path = data_dir.join(file);
        let snapshot = Self {
            lock_path: path.with_extension("lock"),
            path,
            _entry: PhantomData,
        };
        // surface unreadable or foreign-version snapshots at open time
        let count = snapshot.read(|entries| entries.len()).await?;
        debug!(path = %snapshot.path.display(), count, "Snapshot opened");
        Ok(snapshot)
    }

    /// Reads the current snapshot under a shared lock
    async fn read<R, F>(&self, view: F) -> Result<R, StoreError>
    where
        F: FnOnce(Entries<T>) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (path, lock_path) = (self.path.clone(), self.lock_path.clone());
        run_blocking(move || {
            let lock = fd_lock::RwLock::new(open_lock_file(&lock_path)?);
            let _guard = lock.read()?;
            Ok(view(load_entries::<T>(&path)?))
        })
        .await
    }

    /// Reloads the snapshot under an exclusive lock, applies `change` and
    /// writes the result. Nothing is written when `change` fails.
    async fn update<R, F>(&self, change: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut Entries<T>) -> Result<R, StoreError> + Send + 'static,
        R: Send + 'static,
    {
        let (path, lock_path) = (self.path.clone(), self.lock_path.clone());
        run_blocking(move || {
            let mut lock = fd_lock::RwLock::new(open_lock_file(&lock_path)?);
            let _guard = lock.write()?;
            let mut entries = load_entries::<T>(&path)?;
            let result = change(&mut entries)?;
            write_entries(&path, &entries)?;
            Ok(result)
        })
        .await
    }
}

#[derive(Debug)]
pub struct FileRecordStore {
    snapshot: SnapshotFile<SubmissionRecord>,
}

impl FileRecordStore {
    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(Self {
            snapshot: SnapshotFile::open(data_dir.as_ref(), RECORDS_FILE).await?,
        })
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn insert(&self, record: &SubmissionRecord) -> Result<(), StoreError> {
        let record = record.clone();
        self.snapshot
            .update(move |records| {
                if records.contains_key(&record.id) {
                    return Err(StoreError::Duplicate {
                        entity: "record",
                        key: record.id.to_string(),
                    });
                }
                records.insert(record.id, record);
                Ok(())
            })
            .await
    }

    async fn get(&self, id: RecordId) -> Result<Option<SubmissionRecord>, StoreError> {
        self.snapshot.read(move |mut records| records.remove(&id)).await
    }

    async fn commit(&self, record: &SubmissionRecord, expected: SubmissionStatus) -> Result<(), StoreError> {
        let record = record.clone();
        self.snapshot
            .update(move |records| {
                match records.get(&record.id) {
                    Some(current) if current.status != expected => {
                        return Err(StoreError::Conflict {
                            expected,
                            actual: current.status,
                        });
                    }
                    Some(_) => {}
                    None => return Err(StoreError::record_not_found(record.id)),
                }
                records.insert(record.id, record);
                Ok(())
            })
            .await
    }

    async fn list(&self) -> Result<Vec<SubmissionRecord>, StoreError> {
        self.snapshot
            .read(|records| {
                let mut records: Vec<SubmissionRecord> = records.into_values().collect();
                records.sort_by_key(|r| (r.created_at, r.id));
                records
            })
            .await
    }
}

#[derive(Debug)]
pub struct FileContentStore {
    snapshot: SnapshotFile<SubmissionContent>,
}

impl FileContentStore {
    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(Self {
            snapshot: SnapshotFile::open(data_dir.as_ref(), CONTENTS_FILE).await?,
        })
    }

    /// Applies `change` to one document of the freshly loaded snapshot
    async fn mutate<F>(&self, key: ContentKey, change: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut SubmissionContent) + Send + 'static,
    {
        self.snapshot
            .update(move |contents| {
                let current = contents
                    .get_mut(&key)
                    .ok_or_else(|| StoreError::content_not_found(key))?;
                change(current);
                Ok(())
            })
            .await
    }
}

#[async_trait]
impl ContentStore for FileContentStore {
    async fn insert(&self, content: &SubmissionContent) -> Result<(), StoreError> {
        let content = content.clone();
        self.snapshot
            .update(move |contents| {
                if contents.contains_key(&content.key) {
                    return Err(StoreError::Duplicate {
                        entity: "content",
                        key: content.key.to_string(),
                    });
                }
                contents.insert(content.key, content);
                Ok(())
            })
            .await
    }

    async fn get(&self, key: ContentKey) -> Result<Option<SubmissionContent>, StoreError> {
        self.snapshot.read(move |mut contents| contents.remove(&key)).await
    }

    async fn replace(&self, content: &SubmissionContent) -> Result<(), StoreError> {
        let replacement = content.clone();
        self.mutate(content.key, move |current| {
            let (mirror, deleted) = (current.status_mirror, current.is_deleted);
            *current = replacement;
            current.status_mirror = mirror;
            current.is_deleted = deleted;
        })
        .await
    }

    async fn set_status_mirror(&self, key: ContentKey, status: SubmissionStatus) -> Result<(), StoreError> {
        self.mutate(key, move |current| current.apply_mirror(status, Utc::now()))
            .await
    }

    async fn list(&self, filter: &ContentFilter) -> Result<Vec<SubmissionContent>, StoreError> {
        let filter = filter.clone();
        self.snapshot
            .read(move |contents| {
                let mut matching: Vec<SubmissionContent> =
                    contents.into_values().filter(|c| filter.matches(c)).collect();
                matching.sort_by_key(|c| (c.created_at, c.key));
                matching
            })
            .await
    }

    async fn list_provisional(&self) -> Result<Vec<SubmissionContent>, StoreError> {
        self.snapshot
            .read(|contents| contents.into_values().filter(|c| c.is_provisional()).collect())
            .await
    }

    async fn discard_provisional(&self, key: ContentKey) -> Result<bool, StoreError> {
        self.snapshot
            .update(move |contents| {
                let provisional = contents.get(&key).is_some_and(|c| c.is_provisional());
                if provisional {
                    contents.remove(&key);
                }
                Ok(provisional)
            })
            .await
    }
}

/// Append-only JSON-lines transition journal
#[derive(Debug)]
pub struct FileTransitionJournal {
    path: PathBuf,
    lock_path: PathBuf,
}

impl FileTransitionJournal {
    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        ensure_dir(data_dir.as_ref()).await?;
        let path = data_dir.as_ref().join(JOURNAL_FILE);
        Ok(Self {
            lock_path: path.with_extension("lock"),
            path,
        })
    }
}

#[async_trait]
impl TransitionJournal for FileTransitionJournal {
    async fn append(&self, entry: &TransitionRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let (path, lock_path) = (self.path.clone(), self.lock_path.clone());
        run_blocking(move || {
            let mut lock = fd_lock::RwLock::new(open_lock_file(&lock_path)?);
            let _guard = lock.write()?;
            let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
            file.write_all(line.as_bytes())?;
            file.flush()?;
            Ok(())
        })
        .await
    }

    async fn entries_for(&self, id: RecordId) -> Result<Vec<TransitionRecord>, StoreError> {
        let (path, lock_path) = (self.path.clone(), self.lock_path.clone());
        let raw = run_blocking(move || {
            let lock = fd_lock::RwLock::new(open_lock_file(&lock_path)?);
            let _guard = lock.read()?;
            match std::fs::read_to_string(&path) {
                Ok(raw) => Ok(raw),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
                Err(e) => Err(e.into()),
            }
        })
        .await?;

        let mut entries = Vec::new();
        for (line_no, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<TransitionRecord>(line) {
                Ok(entry) if entry.record_id == id => entries.push(entry),
                Ok(_) => {}
                Err(e) => {
                    // A torn final line from an interrupted append is skipped
                    warn!(path = %self.path.display(), line = line_no + 1, error = %e, "Skipping unreadable journal line");
                }
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::state_machine::{SubmissionStateMachine, Transition};
    use crate::workflow::types::UserId;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let record = SubmissionRecord::new_draft(UserId::from("stu-1"), ContentKey::new(), Utc::now());
        {
            let store = FileRecordStore::open(dir.path()).await.unwrap();
            store.insert(&record).await.unwrap();
        }

        let reopened = FileRecordStore::open(dir.path()).await.unwrap();
        assert_eq!(reopened.get(record.id).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_version_mismatch_is_reported() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(RECORDS_FILE),
            r#"{"version":"0","entries":[]}"#,
        )
        .unwrap();
        assert!(matches!(
            FileRecordStore::open(dir.path()).await,
            Err(StoreError::Unavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_journal_filters_by_record() {
        let dir = TempDir::new().unwrap();
        let journal = FileTransitionJournal::open(dir.path()).await.unwrap();
        let actor = UserId::from("stu-1");

        let first = SubmissionRecord::new_draft(actor.clone(), ContentKey::new(), Utc::now());
        let second = SubmissionRecord::new_draft(actor.clone(), ContentKey::new(), Utc::now());
        for record in [&first, &second] {
            let next = SubmissionStateMachine::apply(record, &Transition::Submit, Utc::now()).unwrap();
            journal
                .append(&TransitionRecord::new(record, &next, &Transition::Submit, &actor))
                .await
                .unwrap();
        }

        let entries = journal.entries_for(first.id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].to_status, SubmissionStatus::Submitted);
    }
}
