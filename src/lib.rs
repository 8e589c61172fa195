//! Achievement Workflow Library - submission lifecycle engine
//! This exposes the core components for the CLI and for integration tests

pub mod config;
pub mod directory;
pub mod observability;
pub mod shutdown;
pub mod store;
pub mod telemetry;
pub mod workflow;

// Re-export key types for easy access
pub use config::{config, init_config, WorkflowConfig};
pub use directory::{AcademicDirectory, DirectoryError, InMemoryDirectory, PermissionDirectory};
pub use observability::{workflow_metrics, OperationTimer, WorkflowMetrics};
pub use shutdown::{ShutdownCoordinator, ShutdownSignal};
pub use store::{ContentFilter, ContentStore, RecordStore, StoreError, TransitionJournal};
pub use telemetry::{create_submission_span, generate_correlation_id, init_telemetry};
pub use workflow::{
    Actor, MirrorState, Reconciler, Role, SubmissionStatus, SyncCoordinator, Transition, WorkflowError,
    WorkflowService,
};
