//! Workflow operations exposed to the presentation layer.
//!
//! Every operation resolves the record first, authorizes the actor against
//! the record owner, and only then touches the state machine or the stores.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, Instrument};

use super::access::{AccessGuard, Action, Actor, DenyReason, Role};
use super::errors::WorkflowError;
use super::history::{HistoryEvent, HistoryMode, HistoryReconstructor};
use super::scoring::ScoringPolicy;
use super::state_machine::{SubmissionStateMachine, Transition};
use super::statistics::StatisticsReport;
use super::sync::{PropagationMode, RetryPolicy, SyncCoordinator, TransitionOutcome};
use super::types::{
    Category, ContentKey, ContentUpdate, NewSubmission, RecordId, Submission, SubmissionContent,
    SubmissionRecord, SubmissionStatus, UserId,
};
use crate::config::WorkflowConfig;
use crate::directory::{AcademicDirectory, PermissionDirectory};
use crate::observability::OperationTimer;
use crate::store::{ContentFilter, ContentStore, RecordStore, TransitionJournal};
use crate::telemetry::{create_submission_span, generate_correlation_id};

/// Read-path query; ownership scoping is added from the actor's role
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmissionQuery {
    pub status: Option<SubmissionStatus>,
    pub category: Option<Category>,
    /// Honoured for admins only
    pub include_deleted: bool,
}

#[derive(Clone)]
pub struct WorkflowService {
    sync: SyncCoordinator,
    access: AccessGuard,
    history_mode: HistoryMode,
}

impl WorkflowService {
    pub fn new(
        records: Arc<dyn RecordStore>,
        contents: Arc<dyn ContentStore>,
        permissions: Arc<dyn PermissionDirectory>,
        academic: Arc<dyn AcademicDirectory>,
    ) -> Self {
        Self {
            sync: SyncCoordinator::new(records, contents),
            access: AccessGuard::new(permissions, academic),
            history_mode: HistoryMode::Snapshot,
        }
    }

    pub fn from_config(
        config: &WorkflowConfig,
        records: Arc<dyn RecordStore>,
        contents: Arc<dyn ContentStore>,
        journal: Option<Arc<dyn TransitionJournal>>,
        permissions: Arc<dyn PermissionDirectory>,
        academic: Arc<dyn AcademicDirectory>,
    ) -> Self {
        let mut service = Self::new(records, contents, permissions, academic)
            .with_enforce_permissions(config.access.enforce_permissions);
        service.sync = service.sync.with_config(&config.sync);
        match (config.history.mode, journal) {
            (HistoryMode::AppendLog, Some(journal)) => service.with_journal(journal),
            _ => service,
        }
    }

    /// Enable the append-log history mode backed by `journal`
    pub fn with_journal(mut self, journal: Arc<dyn TransitionJournal>) -> Self {
        self.sync = self.sync.with_journal(journal);
        self.history_mode = HistoryMode::AppendLog;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.sync = self.sync.with_retry_policy(retry);
        self
    }

    pub fn with_propagation(mut self, propagation: PropagationMode) -> Self {
        self.sync = self.sync.with_propagation(propagation);
        self
    }

    pub fn with_enforce_permissions(mut self, enforce: bool) -> Self {
        self.access = self.access.with_enforce_permissions(enforce);
        self
    }

    pub fn sync(&self) -> &SyncCoordinator {
        &self.sync
    }

    pub fn history_mode(&self) -> HistoryMode {
        self.history_mode
    }

    async fn observe<T, F>(
        &self,
        operation: &'static str,
        record_id: Option<RecordId>,
        actor: &Actor,
        work: F,
    ) -> Result<T, WorkflowError>
    where
        F: Future<Output = Result<T, WorkflowError>>,
    {
        let correlation_id = generate_correlation_id();
        let span = create_submission_span(operation, record_id, &actor.id, &correlation_id);
        let timer = OperationTimer::new(operation);
        let result = work.instrument(span).await;
        timer.finish(result.is_ok());
        result
    }

    async fn authorize(&self, action: Action, actor: &Actor, owner: &UserId) -> Result<(), WorkflowError> {
        self.access
            .authorize(action, actor, owner)
            .await
            .map_err(WorkflowError::from)
    }

    async fn load(&self, id: RecordId) -> Result<SubmissionRecord, WorkflowError> {
        self.sync
            .records()
            .get(id)
            .await?
            .ok_or(WorkflowError::NotFound { id })
    }

    async fn load_content(&self, record: &SubmissionRecord) -> Result<SubmissionContent, WorkflowError> {
        self.sync
            .contents()
            .get(record.content_key)
            .await?
            .ok_or(WorkflowError::NotFound { id: record.id })
    }

    pub async fn create_draft(
        &self,
        actor: &Actor,
        owner: &UserId,
        submission: NewSubmission,
    ) -> Result<Submission, WorkflowError> {
        self.observe("create_draft", None, actor, async {
            self.authorize(Action::Create, actor, owner).await?;
            if submission.title.trim().is_empty() {
                return Err(WorkflowError::InvalidContent {
                    reason: "title must not be empty".to_string(),
                });
            }

            let points = ScoringPolicy::score(&submission.details);
            let content = SubmissionContent::provisional(owner.clone(), submission, Some(points), Utc::now());
            let outcome = self.sync.create(content).await?;
            debug!(record_id = %outcome.record.id, points, "Draft created");
            Ok(Submission {
                record: outcome.record,
                content: outcome.content,
            })
        })
        .await
    }

    pub async fn update_draft(
        &self,
        actor: &Actor,
        id: RecordId,
        update: ContentUpdate,
    ) -> Result<Submission, WorkflowError> {
        self.observe("update_draft", Some(id), actor, async {
            let record = self.load(id).await?;
            self.authorize(Action::UpdateDraft, actor, &record.owner).await?;
            if record.status != SubmissionStatus::Draft {
                return Err(WorkflowError::NotDraft { status: record.status });
            }
            if matches!(&update.title, Some(title) if title.trim().is_empty()) {
                return Err(WorkflowError::InvalidContent {
                    reason: "title must not be empty".to_string(),
                });
            }

            let mut content = self.load_content(&record).await?;
            content.apply_update(update, Utc::now());
            content.points = Some(ScoringPolicy::score_content(&content));
            self.sync.contents().replace(&content).await?;
            Ok(Submission { record, content })
        })
        .await
    }

    /// Submit a draft, or resubmit a rejected submission
    pub async fn submit(&self, actor: &Actor, id: RecordId) -> Result<TransitionOutcome, WorkflowError> {
        self.observe("submit", Some(id), actor, async {
            let record = self.load(id).await?;
            self.authorize(Action::Submit, actor, &record.owner).await?;
            let transition = SubmissionStateMachine::submission_for(record.status);
            self.sync.transition_from(record, transition, &actor.id).await
        })
        .await
    }

    pub async fn verify(&self, actor: &Actor, id: RecordId) -> Result<TransitionOutcome, WorkflowError> {
        self.observe("verify", Some(id), actor, async {
            let record = self.load(id).await?;
            self.authorize(Action::Verify, actor, &record.owner).await?;
            let transition = Transition::Verify {
                decided_by: actor.id.clone(),
            };
            self.sync.transition_from(record, transition, &actor.id).await
        })
        .await
    }

    pub async fn reject(&self, actor: &Actor, id: RecordId, note: &str) -> Result<TransitionOutcome, WorkflowError> {
        self.observe("reject", Some(id), actor, async {
            let record = self.load(id).await?;
            self.authorize(Action::Reject, actor, &record.owner).await?;
            let transition = Transition::Reject {
                decided_by: actor.id.clone(),
                note: note.to_string(),
            };
            self.sync.transition_from(record, transition, &actor.id).await
        })
        .await
    }

    pub async fn delete_draft(&self, actor: &Actor, id: RecordId) -> Result<TransitionOutcome, WorkflowError> {
        self.observe("delete_draft", Some(id), actor, async {
            let record = self.load(id).await?;
            self.authorize(Action::DeleteDraft, actor, &record.owner).await?;
            if record.status != SubmissionStatus::Draft {
                return Err(WorkflowError::NotDraft { status: record.status });
            }
            self.sync.transition_from(record, Transition::Delete, &actor.id).await
        })
        .await
    }

    /// Snapshot-derived history; identical in both history modes
    pub async fn get_history(&self, actor: &Actor, id: RecordId) -> Result<Vec<HistoryEvent>, WorkflowError> {
        self.observe("get_history", Some(id), actor, async {
            let record = self.load(id).await?;
            self.authorize(Action::Read, actor, &record.owner).await?;
            Ok(HistoryReconstructor::reconstruct(&record))
        })
        .await
    }

    /// Every committed transition, from the journal
    pub async fn audit_log(&self, actor: &Actor, id: RecordId) -> Result<Vec<HistoryEvent>, WorkflowError> {
        self.observe("audit_log", Some(id), actor, async {
            let journal = match (self.history_mode, self.sync.journal()) {
                (HistoryMode::AppendLog, Some(journal)) => journal.clone(),
                _ => return Err(WorkflowError::AuditLogDisabled),
            };
            let record = self.load(id).await?;
            self.authorize(Action::Read, actor, &record.owner).await?;
            let entries = journal.entries_for(id).await?;
            Ok(HistoryReconstructor::from_journal(&record, &entries))
        })
        .await
    }

    pub async fn get_submission(&self, actor: &Actor, id: RecordId) -> Result<Submission, WorkflowError> {
        self.observe("get_submission", Some(id), actor, async {
            let record = self.load(id).await?;
            self.authorize(Action::Read, actor, &record.owner).await?;
            let content = self.load_content(&record).await?;
            Ok(Submission { record, content })
        })
        .await
    }

    /// Owners whose submissions the actor may list. `None` means everyone.
    async fn visible_owners(&self, actor: &Actor) -> Result<Option<Vec<UserId>>, WorkflowError> {
        match &actor.role {
            Role::Admin => Ok(None),
            Role::Student => Ok(Some(vec![actor.id.clone()])),
            Role::Advisor => {
                let academic = self.access.academic();
                let Some(lecturer) = academic.lecturer_by_user(&actor.id).await? else {
                    return Ok(Some(Vec::new()));
                };
                let advisees = academic.advisees_of(&lecturer.id).await?;
                Ok(Some(advisees.into_iter().map(|s| s.user_id).collect()))
            }
            Role::Other(_) => Err(WorkflowError::from(DenyReason::RoleNotPermitted)),
        }
    }

    /// Listing filtered through the status mirror, scoped to what the actor may see
    pub async fn list_submissions(
        &self,
        actor: &Actor,
        query: &SubmissionQuery,
    ) -> Result<Vec<SubmissionContent>, WorkflowError> {
        self.observe("list_submissions", None, actor, async {
            let owners = self.visible_owners(actor).await?;
            if matches!(&owners, Some(list) if list.is_empty()) {
                return Ok(Vec::new());
            }
            let filter = ContentFilter {
                owners,
                status: query.status,
                category: query.category,
                include_deleted: query.include_deleted && actor.role == Role::Admin,
            };
            Ok(self.sync.contents().list(&filter).await?)
        })
        .await
    }

    pub async fn statistics(&self, actor: &Actor) -> Result<StatisticsReport, WorkflowError> {
        self.observe("statistics", None, actor, async {
            let owners = self.visible_owners(actor).await?;
            let records: Vec<SubmissionRecord> = self
                .sync
                .records()
                .list()
                .await?
                .into_iter()
                .filter(|r| owners.as_ref().map_or(true, |list| list.contains(&r.owner)))
                .collect();

            let mut contents: HashMap<ContentKey, SubmissionContent> = HashMap::with_capacity(records.len());
            for record in &records {
                if let Some(content) = self.sync.contents().get(record.content_key).await? {
                    contents.insert(content.key, content);
                }
            }
            Ok(StatisticsReport::compile(&records, &contents))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryDirectory;
    use crate::store::{InMemoryContentStore, InMemoryRecordStore, InMemoryTransitionJournal};
    use crate::workflow::history::HistoryEventKind;
    use crate::workflow::types::{AchievementDetails, CertificationDetails, CompetitionDetails, CompetitionLevel};

    fn service() -> WorkflowService {
        let directory = Arc::new(
            InMemoryDirectory::new()
                .with_default_grants()
                .with_user("admin-1", Role::Admin)
                .with_lecturer("L-01", "lec-1", "Dr. Rina")
                .with_student("S-01", "stu-1", "Budi", Some("L-01")),
        );
        WorkflowService::new(
            Arc::new(InMemoryRecordStore::new()),
            Arc::new(InMemoryContentStore::new()),
            directory.clone(),
            directory,
        )
    }

    fn certificate() -> NewSubmission {
        NewSubmission {
            title: "Cloud Practitioner".to_string(),
            description: Some("Vendor certification".to_string()),
            details: AchievementDetails::Certification(CertificationDetails::default()),
            attachments: vec![],
            tags: vec!["cloud".to_string()],
        }
    }

    #[tokio::test]
    async fn test_create_stamps_points_and_mirror() {
        let service = service();
        let student = Actor::student("stu-1");
        let created = service
            .create_draft(&student, &student.id, certificate())
            .await
            .unwrap();
        assert_eq!(created.record.status, SubmissionStatus::Draft);
        assert_eq!(created.content.points, Some(20));
        assert_eq!(created.content.status_mirror, Some(SubmissionStatus::Draft));
    }

    #[tokio::test]
    async fn test_update_restamps_points_and_locks_after_submit() {
        let service = service();
        let student = Actor::student("stu-1");
        let created = service.create_draft(&student, &student.id, certificate()).await.unwrap();

        let update = ContentUpdate {
            details: Some(AchievementDetails::Competition(CompetitionDetails {
                level: Some(CompetitionLevel::National),
                rank: Some(1),
                ..Default::default()
            })),
            ..Default::default()
        };
        let updated = service.update_draft(&student, created.record.id, update).await.unwrap();
        assert_eq!(updated.content.category, Category::Competition);
        assert_eq!(updated.content.points, Some(80));

        service.submit(&student, created.record.id).await.unwrap();
        let err = service
            .update_draft(&student, created.record.id, ContentUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::NotDraft { status: SubmissionStatus::Submitted }));
    }

    #[tokio::test]
    async fn test_empty_title_rejected() {
        let service = service();
        let student = Actor::student("stu-1");
        let mut submission = certificate();
        submission.title = "   ".to_string();
        let err = service.create_draft(&student, &student.id, submission).await.unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidContent { .. }));
    }

    #[tokio::test]
    async fn test_delete_after_submit_is_not_draft() {
        let service = service();
        let student = Actor::student("stu-1");
        let created = service.create_draft(&student, &student.id, certificate()).await.unwrap();
        service.submit(&student, created.record.id).await.unwrap();

        let err = service.delete_draft(&student, created.record.id).await.unwrap_err();
        assert!(matches!(err, WorkflowError::NotDraft { .. }));
    }

    #[tokio::test]
    async fn test_audit_log_requires_journal() {
        let service = service();
        let student = Actor::student("stu-1");
        let created = service.create_draft(&student, &student.id, certificate()).await.unwrap();
        let err = service
            .audit_log(&Actor::admin("admin-1"), created.record.id)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::AuditLogDisabled));

        let journaled = service.with_journal(Arc::new(InMemoryTransitionJournal::new()));
        journaled.submit(&student, created.record.id).await.unwrap();
        let events = journaled
            .audit_log(&Actor::advisor("lec-1"), created.record.id)
            .await
            .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].kind, HistoryEventKind::Submitted);
        assert_eq!(events[1].actor, Some(UserId::from("stu-1")));
    }

    #[tokio::test]
    async fn test_unknown_record_is_not_found() {
        let service = service();
        let err = service
            .get_history(&Actor::admin("admin-1"), RecordId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound { .. }));
    }
}
