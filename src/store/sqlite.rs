//! SQLite-backed record store (`database` feature)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{migrate::MigrateDatabase, Row, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use super::{RecordStore, StoreError};
use crate::workflow::types::{ContentKey, RecordId, SubmissionRecord, SubmissionStatus, UserId};

pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    /// Connect, creating the database file and running migrations as needed
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        if !sqlx::Sqlite::database_exists(database_url).await? {
            info!("Creating database at {}", database_url);
            sqlx::Sqlite::create_database(database_url).await?;
        }

        let pool = SqlitePool::connect(database_url).await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Unavailable {
                reason: format!("migration failed: {e}"),
            })?;
        debug!("Record store migrations applied");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn parse_uuid(raw: &str, column: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(raw).map_err(|e| StoreError::Unavailable {
        reason: format!("corrupt {column} '{raw}': {e}"),
    })
}

fn parse_status(raw: &str) -> Result<SubmissionStatus, StoreError> {
    raw.parse().map_err(|e| StoreError::Unavailable {
        reason: format!("corrupt status: {e}"),
    })
}

fn record_from_row(row: &SqliteRow) -> Result<SubmissionRecord, StoreError> {
    let id: String = row.try_get("id")?;
    let content_key: String = row.try_get("content_key")?;
    let status: String = row.try_get("status")?;
    let decided_by: Option<String> = row.try_get("decided_by")?;

    Ok(SubmissionRecord {
        id: RecordId(parse_uuid(&id, "id")?),
        owner: UserId(row.try_get("owner")?),
        content_key: ContentKey(parse_uuid(&content_key, "content_key")?),
        status: parse_status(&status)?,
        submitted_at: row.try_get::<Option<DateTime<Utc>>, _>("submitted_at")?,
        decided_at: row.try_get::<Option<DateTime<Utc>>, _>("decided_at")?,
        decided_by: decided_by.map(UserId),
        rejection_note: row.try_get("rejection_note")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn insert(&self, record: &SubmissionRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO submission_records
                (id, owner, content_key, status, submitted_at, decided_at, decided_by, rejection_note, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.owner.as_str())
        .bind(record.content_key.to_string())
        .bind(record.status.as_str())
        .bind(record.submitted_at)
        .bind(record.decided_at)
        .bind(record.decided_by.as_ref().map(|u| u.as_str()))
        .bind(record.rejection_note.as_deref())
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Duplicate {
                entity: "record",
                key: record.id.to_string(),
            });
        }
        Ok(())
    }

    async fn get(&self, id: RecordId) -> Result<Option<SubmissionRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM submission_records WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn commit(&self, record: &SubmissionRecord, expected: SubmissionStatus) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE submission_records
            SET status = ?1, submitted_at = ?2, decided_at = ?3, decided_by = ?4,
                rejection_note = ?5, updated_at = ?6
            WHERE id = ?7 AND status = ?8
            "#,
        )
        .bind(record.status.as_str())
        .bind(record.submitted_at)
        .bind(record.decided_at)
        .bind(record.decided_by.as_ref().map(|u| u.as_str()))
        .bind(record.rejection_note.as_deref())
        .bind(record.updated_at)
        .bind(record.id.to_string())
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        // Zero rows: either the record is gone or its status moved on
        match self.get(record.id).await? {
            Some(current) => Err(StoreError::Conflict {
                expected,
                actual: current.status,
            }),
            None => Err(StoreError::record_not_found(record.id)),
        }
    }

    async fn list(&self) -> Result<Vec<SubmissionRecord>, StoreError> {
        let rows = sqlx::query("SELECT * FROM submission_records ORDER BY created_at, id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(record_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_conditional_update_only_applies_once() {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite://{}", dir.path().join("records.db").display());
        let store = SqliteRecordStore::connect(&url).await.unwrap();
        let record = SubmissionRecord::new_draft(UserId::from("stu-1"), ContentKey::new(), Utc::now());
        store.insert(&record).await.unwrap();

        let mut submitted = record.clone();
        submitted.status = SubmissionStatus::Submitted;
        submitted.submitted_at = Some(Utc::now());

        store.commit(&submitted, SubmissionStatus::Draft).await.unwrap();
        let err = store.commit(&submitted, SubmissionStatus::Draft).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { actual: SubmissionStatus::Submitted, .. }));

        let stored = store.get(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SubmissionStatus::Submitted);
        assert_eq!(stored.owner, record.owner);
    }
}
