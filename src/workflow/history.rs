//! Lifecycle history of a submission
//!
//! The default history is rebuilt from the record snapshot alone, so only the
//! milestones of the record's current path survive: a rejection followed by a
//! resubmission and verification shows up as submitted then verified. The
//! optional append-log mode reads the transition journal instead and keeps
//! every step.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state_machine::TransitionRecord;
use super::types::{SubmissionRecord, SubmissionStatus, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryMode {
    #[default]
    Snapshot,
    AppendLog,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum HistoryEventKind {
    DraftCreated,
    Submitted,
    Verified,
    Rejected { note: Option<String> },
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEvent {
    #[serde(flatten)]
    pub kind: HistoryEventKind,
    pub at: DateTime<Utc>,
    /// Known only where the snapshot or journal records who acted
    pub actor: Option<UserId>,
}

impl HistoryEvent {
    fn new(kind: HistoryEventKind, at: DateTime<Utc>, actor: Option<UserId>) -> Self {
        Self { kind, at, actor }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HistoryReconstructor;

impl HistoryReconstructor {
    /// Ordered events, oldest first, derived from the snapshot fields
    pub fn reconstruct(record: &SubmissionRecord) -> Vec<HistoryEvent> {
        let mut events = vec![HistoryEvent::new(HistoryEventKind::DraftCreated, record.created_at, None)];

        if let Some(submitted_at) = record.submitted_at {
            events.push(HistoryEvent::new(HistoryEventKind::Submitted, submitted_at, None));
        }

        if let Some(decided_at) = record.decided_at {
            let decision = match record.status {
                SubmissionStatus::Verified => Some(HistoryEventKind::Verified),
                SubmissionStatus::Rejected => Some(HistoryEventKind::Rejected {
                    note: record.rejection_note.clone(),
                }),
                _ => None,
            };
            if let Some(kind) = decision {
                events.push(HistoryEvent::new(kind, decided_at, record.decided_by.clone()));
            }
        }

        if record.status == SubmissionStatus::Deleted {
            events.push(HistoryEvent::new(HistoryEventKind::Deleted, record.updated_at, None));
        }

        events
    }

    /// Full history from journal entries, for the append-log mode
    pub fn from_journal(record: &SubmissionRecord, entries: &[TransitionRecord]) -> Vec<HistoryEvent> {
        let mut events = vec![HistoryEvent::new(HistoryEventKind::DraftCreated, record.created_at, None)];

        let mut ordered: Vec<&TransitionRecord> = entries.iter().filter(|e| e.record_id == record.id).collect();
        ordered.sort_by_key(|e| e.at);

        for entry in ordered {
            let kind = match entry.to_status {
                SubmissionStatus::Submitted => HistoryEventKind::Submitted,
                SubmissionStatus::Verified => HistoryEventKind::Verified,
                SubmissionStatus::Rejected => HistoryEventKind::Rejected {
                    note: entry.note.clone(),
                },
                SubmissionStatus::Deleted => HistoryEventKind::Deleted,
                SubmissionStatus::Draft => continue,
            };
            events.push(HistoryEvent::new(kind, entry.at, Some(entry.actor.clone())));
        }

        events
    }
}
