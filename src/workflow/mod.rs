//! Achievement submission workflow: lifecycle state machine, two-store
//! synchronization, access control, scoring and history.

pub mod access;
pub mod errors;
pub mod history;
pub mod reconciler;
pub mod scoring;
pub mod service;
pub mod state_machine;
pub mod statistics;
pub mod sync;
pub mod types;

pub use access::{AccessEvaluator, AccessFacts, AccessGuard, Action, Actor, Decision, DenyReason, Role};
pub use errors::WorkflowError;
pub use history::{HistoryEvent, HistoryEventKind, HistoryMode, HistoryReconstructor};
pub use reconciler::Reconciler;
pub use scoring::{ScoringError, ScoringPolicy};
pub use service::{SubmissionQuery, WorkflowService};
pub use state_machine::{SubmissionStateMachine, Transition, TransitionError, TransitionRecord};
pub use statistics::StatisticsReport;
pub use sync::{
    CreateOutcome, MirrorState, PropagationMode, ReconciliationReport, RetryPolicy, RetrySummary,
    SyncCoordinator, TransitionOutcome,
};
pub use types::{
    AchievementDetails, Attachment, Category, CertificationDetails, CompetitionDetails, CompetitionLevel,
    ContentKey, ContentUpdate, NewSubmission, OtherDetails, PublicationDetails, RecordId, Submission,
    SubmissionContent, SubmissionRecord, SubmissionStatus, UserId,
};
