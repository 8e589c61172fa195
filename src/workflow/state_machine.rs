use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{RecordId, SubmissionRecord, SubmissionStatus, UserId};

/// Named transitions of the submission lifecycle.
///
/// `Resubmit` is deliberately its own transition: a rejected submission goes
/// back to `submitted`, never to `draft`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transition", rename_all = "snake_case")]
pub enum Transition {
    Submit,
    Resubmit,
    Verify { decided_by: UserId },
    Reject { decided_by: UserId, note: String },
    Delete,
}

impl Transition {
    /// The only status this transition may start from
    pub fn source(&self) -> SubmissionStatus {
        match self {
            Transition::Submit | Transition::Delete => SubmissionStatus::Draft,
            Transition::Resubmit => SubmissionStatus::Rejected,
            Transition::Verify { .. } | Transition::Reject { .. } => SubmissionStatus::Submitted,
        }
    }

    pub fn target(&self) -> SubmissionStatus {
        match self {
            Transition::Submit | Transition::Resubmit => SubmissionStatus::Submitted,
            Transition::Verify { .. } => SubmissionStatus::Verified,
            Transition::Reject { .. } => SubmissionStatus::Rejected,
            Transition::Delete => SubmissionStatus::Deleted,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Transition::Submit => "submit",
            Transition::Resubmit => "resubmit",
            Transition::Verify { .. } => "verify",
            Transition::Reject { .. } => "reject",
            Transition::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        from: SubmissionStatus,
        to: SubmissionStatus,
    },
    #[error("Rejection requires a non-empty note")]
    MissingNote,
}

/// Journal entry written after a committed transition (append-log history mode)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub record_id: RecordId,
    pub transition: String,
    pub from_status: SubmissionStatus,
    pub to_status: SubmissionStatus,
    pub actor: UserId,
    pub note: Option<String>,
    pub at: DateTime<Utc>,
}

impl TransitionRecord {
    pub fn new(
        before: &SubmissionRecord,
        after: &SubmissionRecord,
        transition: &Transition,
        actor: &UserId,
    ) -> Self {
        Self {
            record_id: after.id,
            transition: transition.name().to_string(),
            from_status: before.status,
            to_status: after.status,
            actor: actor.clone(),
            note: after.rejection_note.clone(),
            at: after.updated_at,
        }
    }
}

/// Validates transitions and computes the next record snapshot.
///
/// The machine never writes; the caller commits the returned snapshot with a
/// conditional write on the status it was computed from.
#[derive(Debug, Default, Clone, Copy)]
pub struct SubmissionStateMachine;

impl SubmissionStateMachine {
    pub fn apply(
        record: &SubmissionRecord,
        transition: &Transition,
        at: DateTime<Utc>,
    ) -> Result<SubmissionRecord, TransitionError> {
        if let Transition::Reject { note, .. } = transition {
            if note.trim().is_empty() {
                return Err(TransitionError::MissingNote);
            }
        }

        let mut next = record.clone();
        match (record.status, transition) {
            (SubmissionStatus::Draft, Transition::Submit) => {
                next.submitted_at = Some(at);
            }
            (SubmissionStatus::Rejected, Transition::Resubmit) => {
                next.submitted_at = Some(at);
                next.rejection_note = None;
            }
            (SubmissionStatus::Submitted, Transition::Verify { decided_by }) => {
                next.decided_at = Some(at);
                next.decided_by = Some(decided_by.clone());
                next.rejection_note = None;
            }
            (SubmissionStatus::Submitted, Transition::Reject { decided_by, note }) => {
                next.decided_at = Some(at);
                next.decided_by = Some(decided_by.clone());
                next.rejection_note = Some(note.trim().to_string());
            }
            (SubmissionStatus::Draft, Transition::Delete) => {}
            (from, transition) => {
                tracing::debug!(
                    record_id = %record.id,
                    from = %from,
                    transition = transition.name(),
                    "Transition refused by state machine"
                );
                return Err(TransitionError::InvalidTransition {
                    from,
                    to: transition.target(),
                });
            }
        }

        next.status = transition.target();
        next.updated_at = at;
        Ok(next)
    }

    /// Picks the submission transition for the current status: a rejected
    /// record is resubmitted, anything else goes through plain `Submit`.
    pub fn submission_for(status: SubmissionStatus) -> Transition {
        match status {
            SubmissionStatus::Rejected => Transition::Resubmit,
            _ => Transition::Submit,
        }
    }

    pub fn legal_targets(status: SubmissionStatus) -> &'static [SubmissionStatus] {
        match status {
            SubmissionStatus::Draft => &[SubmissionStatus::Submitted, SubmissionStatus::Deleted],
            SubmissionStatus::Submitted => &[SubmissionStatus::Verified, SubmissionStatus::Rejected],
            SubmissionStatus::Rejected => &[SubmissionStatus::Submitted],
            SubmissionStatus::Verified | SubmissionStatus::Deleted => &[],
        }
    }
}
