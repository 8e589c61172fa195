//! Two-store transition protocol.
//!
//! The record store is committed first and is never rolled back. The content
//! store's status mirror is then propagated best-effort: a failed propagation
//! turns into a `MirrorState::Degraded` outcome plus a retry entry, and the
//! reconciliation scan repairs anything the retries could not.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::errors::WorkflowError;
use super::state_machine::{SubmissionStateMachine, Transition, TransitionRecord};
use super::types::{ContentKey, RecordId, SubmissionContent, SubmissionRecord, SubmissionStatus, UserId};
use crate::config::{RetryConfig, SyncConfig};
use crate::observability::workflow_metrics;
use crate::store::{ContentStore, RecordStore, StoreError, TransitionJournal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropagationMode {
    /// Propagate inside the request and report the mirror outcome
    #[default]
    Inline,
    /// Queue the propagation for the retry worker and return right after the commit
    Detached,
}

/// Exponential backoff for mirror propagation retries
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
            multiplier: config.multiplier,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Delay before retry number `attempt` (0-based), or `None` once the
    /// attempts are used up.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let raw = (self.base_delay_ms as f64) * self.multiplier.powi(exponent);
        let mut delay_ms = (raw as u64).min(self.max_delay_ms);
        if self.jitter && delay_ms > 0 {
            let factor: f64 = rand::rng().random_range(0.5..=1.0);
            delay_ms = ((delay_ms as f64) * factor) as u64;
        }
        Some(Duration::from_millis(delay_ms))
    }
}

/// What happened to the status mirror after a commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mirror", rename_all = "snake_case")]
pub enum MirrorState {
    Synced,
    /// Record committed, mirror stale; a retry is queued
    Degraded { reason: String },
    /// Propagation handed to the retry worker
    Detached,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub record: SubmissionRecord,
    pub mirror: MirrorState,
}

impl TransitionOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self.mirror, MirrorState::Degraded { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateOutcome {
    pub record: SubmissionRecord,
    pub content: SubmissionContent,
    pub mirror: MirrorState,
}

#[derive(Debug, Clone)]
struct PendingPropagation {
    attempts: u32,
    next_attempt_at: Instant,
    last_error: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetrySummary {
    pub attempted: usize,
    pub repaired: usize,
    pub rescheduled: usize,
    pub abandoned: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub scanned: usize,
    pub repaired: Vec<RecordId>,
    pub failed: Vec<RecordId>,
    /// Records whose content document cannot be found
    pub missing_content: Vec<RecordId>,
    /// Provisional content past the grace period that no record references
    pub orphaned: Vec<ContentKey>,
    pub purged: Vec<ContentKey>,
}

impl ReconciliationReport {
    pub fn is_clean(&self) -> bool {
        self.repaired.is_empty()
            && self.failed.is_empty()
            && self.missing_content.is_empty()
            && self.orphaned.is_empty()
    }
}

#[derive(Clone)]
pub struct SyncCoordinator {
    records: Arc<dyn RecordStore>,
    contents: Arc<dyn ContentStore>,
    journal: Option<Arc<dyn TransitionJournal>>,
    pending: Arc<Mutex<HashMap<RecordId, PendingPropagation>>>,
    retry: RetryPolicy,
    propagation: PropagationMode,
    orphan_grace: chrono::Duration,
    purge_orphans: bool,
}

impl SyncCoordinator {
    pub fn new(records: Arc<dyn RecordStore>, contents: Arc<dyn ContentStore>) -> Self {
        let defaults = SyncConfig::default();
        Self {
            records,
            contents,
            journal: None,
            pending: Arc::new(Mutex::new(HashMap::new())),
            retry: RetryPolicy::from(&defaults.retry),
            propagation: defaults.propagation,
            orphan_grace: chrono::Duration::seconds(defaults.orphan_grace_seconds as i64),
            purge_orphans: defaults.purge_orphans,
        }
    }

    pub fn with_config(mut self, config: &SyncConfig) -> Self {
        self.retry = RetryPolicy::from(&config.retry);
        self.propagation = config.propagation;
        self.orphan_grace = chrono::Duration::seconds(config.orphan_grace_seconds as i64);
        self.purge_orphans = config.purge_orphans;
        self
    }

    pub fn with_journal(mut self, journal: Arc<dyn TransitionJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_propagation(mut self, propagation: PropagationMode) -> Self {
        self.propagation = propagation;
        self
    }

    pub fn with_orphan_policy(mut self, grace: chrono::Duration, purge: bool) -> Self {
        self.orphan_grace = grace;
        self.purge_orphans = purge;
        self
    }

    pub fn records(&self) -> &Arc<dyn RecordStore> {
        &self.records
    }

    pub fn contents(&self) -> &Arc<dyn ContentStore> {
        &self.contents
    }

    pub fn journal(&self) -> Option<&Arc<dyn TransitionJournal>> {
        self.journal.as_ref()
    }

    /// Content first (provisional), then the record, then the mirror is
    /// promoted to `draft`. A failed record insert discards the provisional
    /// content best-effort; leftovers are reported by reconciliation.
    pub async fn create(&self, content: SubmissionContent) -> Result<CreateOutcome, StoreError> {
        let now = Utc::now();
        self.contents.insert(&content).await?;

        let record = SubmissionRecord::new_draft(content.owner.clone(), content.key, now);
        if let Err(e) = self.records.insert(&record).await {
            warn!(content_key = %content.key, error = %e, "Record insert failed, discarding provisional content");
            match self.contents.discard_provisional(content.key).await {
                Ok(_) => {}
                Err(discard) => warn!(
                    content_key = %content.key,
                    error = %discard,
                    "Provisional content left behind for reconciliation"
                ),
            }
            return Err(e);
        }
        debug!(record_id = %record.id, content_key = %content.key, "Draft record created");

        let mirror = self.mirror(&record).await;
        let mut content = content;
        if mirror == MirrorState::Synced {
            content.apply_mirror(SubmissionStatus::Draft, Utc::now());
        }
        Ok(CreateOutcome {
            record,
            content,
            mirror,
        })
    }

    /// Load, validate, commit and propagate one transition
    pub async fn transition(
        &self,
        id: RecordId,
        transition: Transition,
        actor: &UserId,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let current = self
            .records
            .get(id)
            .await?
            .ok_or(WorkflowError::NotFound { id })?;
        self.transition_from(current, transition, actor).await
    }

    /// Like `transition`, for a record the caller has already loaded. The
    /// commit is conditional on the loaded status, so a stale snapshot fails
    /// with `InvalidTransition` carrying the status actually stored.
    pub async fn transition_from(
        &self,
        current: SubmissionRecord,
        transition: Transition,
        actor: &UserId,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let next = match SubmissionStateMachine::apply(&current, &transition, Utc::now()) {
            Ok(next) => next,
            Err(e) => {
                workflow_metrics().record_refused();
                return Err(e.into());
            }
        };

        match self.records.commit(&next, current.status).await {
            Ok(()) => {}
            Err(StoreError::Conflict { expected, actual }) => {
                workflow_metrics().record_refused();
                debug!(
                    record_id = %current.id,
                    expected = %expected,
                    actual = %actual,
                    transition = transition.name(),
                    "Conditional commit refused"
                );
                return Err(WorkflowError::InvalidTransition {
                    from: actual,
                    to: transition.target(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        workflow_metrics().record_commit();
        info!(
            record_id = %next.id,
            from = %current.status,
            to = %next.status,
            actor = %actor,
            "Transition committed"
        );

        if let Some(journal) = &self.journal {
            let entry = TransitionRecord::new(&current, &next, &transition, actor);
            if let Err(e) = journal.append(&entry).await {
                warn!(record_id = %next.id, error = %e, "Failed to append transition to journal");
            }
        }

        let mirror = self.mirror(&next).await;
        Ok(TransitionOutcome { record: next, mirror })
    }

    async fn mirror(&self, record: &SubmissionRecord) -> MirrorState {
        match self.propagation {
            PropagationMode::Detached => {
                self.schedule(record.id, "detached propagation".to_string(), true).await;
                MirrorState::Detached
            }
            PropagationMode::Inline => match self.propagate(record.id).await {
                Ok(_) => {
                    self.pending.lock().await.remove(&record.id);
                    MirrorState::Synced
                }
                Err(e) => {
                    workflow_metrics().record_degraded();
                    warn!(
                        record_id = %record.id,
                        status = %record.status,
                        error = %e,
                        "Mirror propagation failed, sync degraded"
                    );
                    self.schedule(record.id, e.to_string(), false).await;
                    MirrorState::Degraded { reason: e.to_string() }
                }
            },
        }
    }

    /// Copy the current authoritative status into the mirror. Always re-reads
    /// the record so a late retry never writes a superseded status.
    pub async fn propagate(&self, id: RecordId) -> Result<SubmissionStatus, StoreError> {
        let record = self
            .records
            .get(id)
            .await?
            .ok_or_else(|| StoreError::record_not_found(id))?;
        self.contents
            .set_status_mirror(record.content_key, record.status)
            .await?;
        Ok(record.status)
    }

    async fn schedule(&self, id: RecordId, reason: String, immediate: bool) {
        let mut pending = self.pending.lock().await;
        let entry = pending.entry(id).or_insert_with(|| PendingPropagation {
            attempts: 0,
            next_attempt_at: Instant::now(),
            last_error: String::new(),
        });
        entry.last_error = reason;
        if !immediate {
            let delay = self.retry.delay_for(entry.attempts).unwrap_or_default();
            entry.next_attempt_at = Instant::now() + delay;
        }
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Retry every queued propagation that is due
    pub async fn retry_pending(&self) -> RetrySummary {
        let now = Instant::now();
        let due: Vec<RecordId> = self
            .pending
            .lock()
            .await
            .iter()
            .filter(|(_, p)| p.next_attempt_at <= now)
            .map(|(id, _)| *id)
            .collect();

        let mut summary = RetrySummary::default();
        for id in due {
            summary.attempted += 1;
            match self.propagate(id).await {
                Ok(status) => {
                    self.pending.lock().await.remove(&id);
                    workflow_metrics().record_repair();
                    summary.repaired += 1;
                    info!(record_id = %id, status = %status, "Mirror propagation retried successfully");
                }
                Err(e) => {
                    let mut pending = self.pending.lock().await;
                    let Some(entry) = pending.get_mut(&id) else {
                        continue;
                    };
                    entry.attempts += 1;
                    entry.last_error = e.to_string();
                    match self.retry.delay_for(entry.attempts) {
                        Some(delay) => {
                            entry.next_attempt_at = Instant::now() + delay;
                            summary.rescheduled += 1;
                            debug!(
                                record_id = %id,
                                attempts = entry.attempts,
                                delay_ms = delay.as_millis() as u64,
                                error = %e,
                                "Mirror propagation retry rescheduled"
                            );
                        }
                        None => {
                            let attempts = entry.attempts;
                            pending.remove(&id);
                            summary.abandoned += 1;
                            warn!(
                                record_id = %id,
                                attempts,
                                error = %e,
                                "Mirror retries exhausted, leaving record to reconciliation"
                            );
                        }
                    }
                }
            }
        }
        summary
    }

    /// Scan every record, repair mirrors that disagree with the authoritative
    /// status and report orphaned provisional content.
    pub async fn reconcile(&self) -> Result<ReconciliationReport, StoreError> {
        let records = self.records.list().await?;
        let mut report = ReconciliationReport {
            scanned: records.len(),
            ..Default::default()
        };

        let mut referenced: HashSet<ContentKey> = HashSet::with_capacity(records.len());
        for record in &records {
            referenced.insert(record.content_key);
            let content = match self.contents.get(record.content_key).await {
                Ok(Some(content)) => content,
                Ok(None) => {
                    warn!(record_id = %record.id, content_key = %record.content_key, "Record has no content document");
                    report.missing_content.push(record.id);
                    continue;
                }
                Err(e) => {
                    warn!(record_id = %record.id, error = %e, "Content lookup failed during reconciliation");
                    report.failed.push(record.id);
                    continue;
                }
            };

            if content.mirrors(record.status) {
                continue;
            }

            match self
                .contents
                .set_status_mirror(record.content_key, record.status)
                .await
            {
                Ok(()) => {
                    workflow_metrics().record_repair();
                    info!(
                        record_id = %record.id,
                        mirror = ?content.status_mirror,
                        status = %record.status,
                        "Reconciliation repaired status mirror"
                    );
                    self.pending.lock().await.remove(&record.id);
                    report.repaired.push(record.id);
                }
                Err(e) => {
                    warn!(record_id = %record.id, error = %e, "Reconciliation could not repair mirror");
                    report.failed.push(record.id);
                }
            }
        }

        let cutoff: DateTime<Utc> = Utc::now() - self.orphan_grace;
        for content in self.contents.list_provisional().await? {
            if referenced.contains(&content.key) || content.created_at > cutoff {
                continue;
            }
            report.orphaned.push(content.key);
            if self.purge_orphans {
                match self.contents.discard_provisional(content.key).await {
                    Ok(true) => {
                        info!(content_key = %content.key, "Purged orphaned provisional content");
                        report.purged.push(content.key);
                    }
                    Ok(false) => {}
                    Err(e) => warn!(content_key = %content.key, error = %e, "Failed to purge orphaned content"),
                }
            } else {
                warn!(content_key = %content.key, owner = %content.owner, "Orphaned provisional content");
            }
        }

        workflow_metrics().record_reconciliation();
        info!(
            scanned = report.scanned,
            repaired = report.repaired.len(),
            failed = report.failed.len(),
            orphaned = report.orphaned.len(),
            "Reconciliation pass finished"
        );
        Ok(report)
    }
}
