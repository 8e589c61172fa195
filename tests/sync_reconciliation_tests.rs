//! Two-store protocol under content store outages: degraded outcomes, the
//! retry queue, reconciliation and orphan handling

mod fixtures;

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use achievement_workflow::shutdown::ShutdownCoordinator;
use achievement_workflow::store::{
    ContentFilter, ContentStore, InMemoryContentStore, InMemoryRecordStore, RecordStore, StoreError,
};
use achievement_workflow::workflow::{
    ContentKey, MirrorState, PropagationMode, Reconciler, RecordId, RetryPolicy, SubmissionContent,
    SubmissionQuery, SubmissionRecord, SubmissionStatus, UserId, WorkflowError, WorkflowService,
};
use fixtures::{advisor, publication, student};

/// Content store whose mirror writes fail while `down` is set
struct FlakyContentStore {
    inner: InMemoryContentStore,
    down: AtomicBool,
}

impl FlakyContentStore {
    fn new() -> Self {
        Self {
            inner: InMemoryContentStore::new(),
            down: AtomicBool::new(false),
        }
    }

    fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }
}

#[async_trait]
impl ContentStore for FlakyContentStore {
    async fn insert(&self, content: &SubmissionContent) -> Result<(), StoreError> {
        self.inner.insert(content).await
    }

    async fn get(&self, key: ContentKey) -> Result<Option<SubmissionContent>, StoreError> {
        self.inner.get(key).await
    }

    async fn replace(&self, content: &SubmissionContent) -> Result<(), StoreError> {
        self.inner.replace(content).await
    }

    async fn set_status_mirror(&self, key: ContentKey, status: SubmissionStatus) -> Result<(), StoreError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                reason: "content store offline".to_string(),
            });
        }
        self.inner.set_status_mirror(key, status).await
    }

    async fn list(&self, filter: &ContentFilter) -> Result<Vec<SubmissionContent>, StoreError> {
        self.inner.list(filter).await
    }

    async fn list_provisional(&self) -> Result<Vec<SubmissionContent>, StoreError> {
        self.inner.list_provisional().await
    }

    async fn discard_provisional(&self, key: ContentKey) -> Result<bool, StoreError> {
        self.inner.discard_provisional(key).await
    }
}

/// Record store that refuses every insert
struct ReadOnlyRecordStore(InMemoryRecordStore);

#[async_trait]
impl RecordStore for ReadOnlyRecordStore {
    async fn insert(&self, _record: &SubmissionRecord) -> Result<(), StoreError> {
        Err(StoreError::Unavailable {
            reason: "record store is read-only".to_string(),
        })
    }

    async fn get(&self, id: RecordId) -> Result<Option<SubmissionRecord>, StoreError> {
        self.0.get(id).await
    }

    async fn commit(&self, record: &SubmissionRecord, expected: SubmissionStatus) -> Result<(), StoreError> {
        self.0.commit(record, expected).await
    }

    async fn list(&self) -> Result<Vec<SubmissionRecord>, StoreError> {
        self.0.list().await
    }
}

struct Setup {
    service: WorkflowService,
    records: Arc<InMemoryRecordStore>,
    contents: Arc<FlakyContentStore>,
}

fn immediate_retries(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay_ms: 0,
        max_delay_ms: 0,
        multiplier: 1.0,
        jitter: false,
    }
}

fn setup() -> Setup {
    let records = Arc::new(InMemoryRecordStore::new());
    let contents = Arc::new(FlakyContentStore::new());
    let directory = fixtures::directory();
    let service = WorkflowService::new(records.clone(), contents.clone(), directory.clone(), directory)
        .with_retry_policy(immediate_retries(3));
    Setup {
        service,
        records,
        contents,
    }
}

impl Setup {
    async fn draft(&self) -> RecordId {
        let owner = student("stu-1");
        self.service
            .create_draft(&owner, &owner.id, publication("Sharded log replication"))
            .await
            .unwrap()
            .record
            .id
    }

    async fn mirror_of(&self, id: RecordId) -> Option<SubmissionStatus> {
        let record = self.records.get(id).await.unwrap().unwrap();
        self.contents.get(record.content_key).await.unwrap().unwrap().status_mirror
    }
}

#[tokio::test]
async fn test_mirror_outage_degrades_but_commits() {
    let setup = setup();
    let id = setup.draft().await;

    setup.contents.set_down(true);
    let outcome = setup.service.submit(&student("stu-1"), id).await.unwrap();
    assert!(outcome.is_degraded());
    assert!(matches!(outcome.mirror, MirrorState::Degraded { .. }));
    assert_eq!(outcome.record.status, SubmissionStatus::Submitted);

    // authoritative store moved on, the mirror did not
    let stored = setup.records.get(id).await.unwrap().unwrap();
    assert_eq!(stored.status, SubmissionStatus::Submitted);
    assert_eq!(setup.mirror_of(id).await, Some(SubmissionStatus::Draft));
    assert_eq!(setup.service.sync().pending_count().await, 1);

    // a second submit is still refused from the authoritative status
    let err = setup.service.submit(&student("stu-1"), id).await.unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidTransition { .. }));

    setup.contents.set_down(false);
    let summary = setup.service.sync().retry_pending().await;
    assert_eq!(summary.attempted, 1);
    assert_eq!(summary.repaired, 1);
    assert_eq!(setup.mirror_of(id).await, Some(SubmissionStatus::Submitted));
    assert_eq!(setup.service.sync().pending_count().await, 0);
}

#[tokio::test]
async fn test_stale_mirror_is_visible_on_read_path_until_repaired() {
    let setup = setup();
    let id = setup.draft().await;

    setup.contents.set_down(true);
    setup.service.submit(&student("stu-1"), id).await.unwrap();

    let query = SubmissionQuery {
        status: Some(SubmissionStatus::Submitted),
        ..Default::default()
    };
    let lecturer = advisor("lec-1");
    assert!(setup.service.list_submissions(&lecturer, &query).await.unwrap().is_empty());

    setup.contents.set_down(false);
    let report = setup.service.sync().reconcile().await.unwrap();
    assert_eq!(report.repaired, vec![id]);
    assert_eq!(setup.service.list_submissions(&lecturer, &query).await.unwrap().len(), 1);
    assert_eq!(setup.service.sync().pending_count().await, 0);
}

#[tokio::test]
async fn test_exhausted_retries_fall_back_to_reconciliation() {
    let setup = setup();
    let service = setup.service.clone().with_retry_policy(immediate_retries(2));
    let id = setup.draft().await;

    setup.contents.set_down(true);
    assert!(service.submit(&student("stu-1"), id).await.unwrap().is_degraded());

    let first = service.sync().retry_pending().await;
    assert_eq!(first.rescheduled, 1);
    let second = service.sync().retry_pending().await;
    assert_eq!(second.abandoned, 1);
    assert_eq!(service.sync().pending_count().await, 0);

    let failed = service.sync().reconcile().await.unwrap();
    assert_eq!(failed.failed, vec![id]);

    setup.contents.set_down(false);
    let repaired = service.sync().reconcile().await.unwrap();
    assert_eq!(repaired.repaired, vec![id]);
    assert_eq!(setup.mirror_of(id).await, Some(SubmissionStatus::Submitted));
    assert!(service.sync().reconcile().await.unwrap().is_clean());
}

#[tokio::test]
async fn test_retry_writes_latest_status_not_queued_one() {
    let setup = setup();
    let id = setup.draft().await;

    setup.contents.set_down(true);
    setup.service.submit(&student("stu-1"), id).await.unwrap();
    setup.service.reject(&advisor("lec-1"), id, "wrong venue").await.unwrap();

    setup.contents.set_down(false);
    setup.service.sync().retry_pending().await;
    assert_eq!(setup.mirror_of(id).await, Some(SubmissionStatus::Rejected));
}

#[tokio::test]
async fn test_detached_propagation_is_applied_by_worker() {
    let setup = setup();
    let service = setup.service.clone().with_propagation(PropagationMode::Detached);

    let owner = student("stu-1");
    let created = service
        .create_draft(&owner, &owner.id, publication("Async replication"))
        .await
        .unwrap();
    assert!(created.content.is_provisional());
    let id = created.record.id;

    let coordinator = ShutdownCoordinator::new();
    let handle = Reconciler::new(service.sync().clone(), Duration::from_secs(3600))
        .with_retry_interval(Duration::from_millis(10))
        .spawn(coordinator.subscribe());

    let outcome = service.submit(&owner, id).await.unwrap();
    assert_eq!(outcome.mirror, MirrorState::Detached);

    let mut mirrored = None;
    for _ in 0..100 {
        mirrored = setup.mirror_of(id).await;
        if mirrored == Some(SubmissionStatus::Submitted) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(mirrored, Some(SubmissionStatus::Submitted));

    coordinator.trigger();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("reconciler stops on shutdown")
        .unwrap();
}

#[tokio::test]
async fn test_failed_record_insert_discards_provisional_content() {
    let contents = Arc::new(InMemoryContentStore::new());
    let directory = fixtures::directory();
    let service = WorkflowService::new(
        Arc::new(ReadOnlyRecordStore(InMemoryRecordStore::new())),
        contents.clone(),
        directory.clone(),
        directory,
    );

    let owner = student("stu-1");
    let err = service
        .create_draft(&owner, &owner.id, publication("Never lands"))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Store(StoreError::Unavailable { .. })));
    assert!(contents.list_provisional().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_orphaned_provisional_content_is_reported_then_purged() {
    let setup = setup();
    let kept = setup.draft().await;

    let stale = SubmissionContent::provisional(
        UserId::from("stu-1"),
        publication("Abandoned upload"),
        Some(40),
        Utc::now() - chrono::Duration::hours(2),
    );
    let fresh = SubmissionContent::provisional(
        UserId::from("stu-1"),
        publication("In flight"),
        Some(40),
        Utc::now(),
    );
    setup.contents.insert(&stale).await.unwrap();
    setup.contents.insert(&fresh).await.unwrap();

    let reporting = setup
        .service
        .sync()
        .clone()
        .with_orphan_policy(chrono::Duration::minutes(5), false);
    let report = reporting.reconcile().await.unwrap();
    assert_eq!(report.orphaned, vec![stale.key]);
    assert!(report.purged.is_empty());
    assert!(setup.contents.get(stale.key).await.unwrap().is_some());

    let purging = reporting.with_orphan_policy(chrono::Duration::minutes(5), true);
    let report = purging.reconcile().await.unwrap();
    assert_eq!(report.purged, vec![stale.key]);
    assert!(setup.contents.get(stale.key).await.unwrap().is_none());
    assert!(setup.contents.get(fresh.key).await.unwrap().is_some());

    // provisional content never shows up in listings
    let listed = setup
        .service
        .list_submissions(&student("stu-1"), &SubmissionQuery::default())
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(setup.mirror_of(kept).await, Some(SubmissionStatus::Draft));
}

#[tokio::test]
async fn test_reconciler_run_once_reports_both_passes() {
    let setup = setup();
    let id = setup.draft().await;

    setup.contents.set_down(true);
    setup.service.submit(&student("stu-1"), id).await.unwrap();
    setup.contents.set_down(false);

    let reconciler = Reconciler::new(setup.service.sync().clone(), Duration::from_secs(60));
    let (retried, report) = reconciler.run_once().await.unwrap();
    assert_eq!(retried.repaired, 1);
    assert!(report.is_clean());
    assert_eq!(report.scanned, 1);
}
