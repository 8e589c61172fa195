use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Workflow counters
#[derive(Debug, Default)]
pub struct WorkflowMetrics {
    pub transitions_committed: AtomicU64,
    pub transitions_refused: AtomicU64,
    pub access_denials: AtomicU64,
    pub mirror_degradations: AtomicU64,
    pub mirror_repairs: AtomicU64,
    pub reconciliation_runs: AtomicU64,
}

impl WorkflowMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_commit(&self) {
        self.transitions_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_refused(&self) {
        self.transitions_refused.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_denial(&self) {
        self.access_denials.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_degraded(&self) {
        self.mirror_degradations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_repair(&self) {
        self.mirror_repairs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconciliation(&self) {
        self.reconciliation_runs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> WorkflowStats {
        WorkflowStats {
            transitions_committed: self.transitions_committed.load(Ordering::Relaxed),
            transitions_refused: self.transitions_refused.load(Ordering::Relaxed),
            access_denials: self.access_denials.load(Ordering::Relaxed),
            mirror_degradations: self.mirror_degradations.load(Ordering::Relaxed),
            mirror_repairs: self.mirror_repairs.load(Ordering::Relaxed),
            reconciliation_runs: self.reconciliation_runs.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            committed = stats.transitions_committed,
            refused = stats.transitions_refused,
            denials = stats.access_denials,
            degraded = stats.mirror_degradations,
            repaired = stats.mirror_repairs,
            reconciliations = stats.reconciliation_runs,
            "Workflow metrics"
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkflowStats {
    pub transitions_committed: u64,
    pub transitions_refused: u64,
    pub access_denials: u64,
    pub mirror_degradations: u64,
    pub mirror_repairs: u64,
    pub reconciliation_runs: u64,
}

/// Global metrics instance
static WORKFLOW_METRICS: std::sync::LazyLock<WorkflowMetrics> =
    std::sync::LazyLock::new(WorkflowMetrics::new);

pub fn workflow_metrics() -> &'static WorkflowMetrics {
    &WORKFLOW_METRICS
}

/// Time an operation and log its duration when finished
pub struct OperationTimer {
    operation: &'static str,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }

    pub fn finish(self, succeeded: bool) {
        let duration = self.start.elapsed();
        debug!(
            operation = self.operation,
            duration_ms = duration.as_millis() as u64,
            succeeded,
            "Operation completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = WorkflowMetrics::new();
        metrics.record_commit();
        metrics.record_commit();
        metrics.record_degraded();
        metrics.record_repair();

        let stats = metrics.get_stats();
        assert_eq!(stats.transitions_committed, 2);
        assert_eq!(stats.mirror_degradations, 1);
        assert_eq!(stats.mirror_repairs, 1);
        assert_eq!(stats.access_denials, 0);
    }
}
