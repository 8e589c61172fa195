use thiserror::Error;

use super::access::DenyReason;
use super::state_machine::TransitionError;
use super::types::{RecordId, SubmissionStatus};
use crate::directory::DirectoryError;
use crate::store::StoreError;

/// Errors surfaced by workflow operations
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        from: SubmissionStatus,
        to: SubmissionStatus,
    },

    /// The reason is kept for logs and tests only
    #[error("not authorized")]
    NotAuthorized { reason: DenyReason },

    #[error("Submission {id} not found")]
    NotFound { id: RecordId },

    #[error("Rejection requires a non-empty note")]
    MissingNote,

    #[error("Only drafts can be changed, submission is {status}")]
    NotDraft { status: SubmissionStatus },

    #[error("Invalid content: {reason}")]
    InvalidContent { reason: String },

    #[error("Audit log requires append-log history mode")]
    AuditLogDisabled,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),
}

impl From<TransitionError> for WorkflowError {
    fn from(error: TransitionError) -> Self {
        match error {
            TransitionError::InvalidTransition { from, to } => WorkflowError::InvalidTransition { from, to },
            TransitionError::MissingNote => WorkflowError::MissingNote,
        }
    }
}

impl From<DenyReason> for WorkflowError {
    fn from(reason: DenyReason) -> Self {
        WorkflowError::NotAuthorized { reason }
    }
}

impl WorkflowError {
    /// Stable kebab-case code printed by the CLI alongside exit status 2
    pub fn code(&self) -> &'static str {
        match self {
            WorkflowError::InvalidTransition { .. } => "invalid-transition",
            WorkflowError::NotAuthorized { .. } => "not-authorized",
            WorkflowError::NotFound { .. } => "not-found",
            WorkflowError::MissingNote => "missing-note",
            WorkflowError::NotDraft { .. } => "not-draft",
            WorkflowError::InvalidContent { .. } => "invalid-content",
            WorkflowError::AuditLogDisabled => "audit-log-disabled",
            WorkflowError::Store(_) => "store-error",
            WorkflowError::Directory(_) => "directory-error",
        }
    }
}
