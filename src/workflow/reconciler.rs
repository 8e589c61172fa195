use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use super::sync::{ReconciliationReport, RetrySummary, SyncCoordinator};
use crate::shutdown::ShutdownSignal;

/// Background worker draining the mirror retry queue and running periodic
/// reconciliation passes until shutdown.
pub struct Reconciler {
    sync: SyncCoordinator,
    reconcile_every: Duration,
    retry_every: Duration,
}

impl Reconciler {
    pub fn new(sync: SyncCoordinator, reconcile_every: Duration) -> Self {
        Self {
            sync,
            reconcile_every,
            retry_every: Duration::from_secs(1),
        }
    }

    pub fn with_retry_interval(mut self, retry_every: Duration) -> Self {
        self.retry_every = retry_every;
        self
    }

    /// One retry sweep followed by one reconciliation pass
    pub async fn run_once(&self) -> Result<(RetrySummary, ReconciliationReport), crate::store::StoreError> {
        let retried = self.sync.retry_pending().await;
        let report = self.sync.reconcile().await?;
        Ok((retried, report))
    }

    pub async fn run_until_shutdown(self, mut shutdown: ShutdownSignal) {
        let mut reconcile = tokio::time::interval(self.reconcile_every);
        reconcile.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut retry = tokio::time::interval(self.retry_every);
        retry.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            reconcile_every_ms = self.reconcile_every.as_millis() as u64,
            retry_every_ms = self.retry_every.as_millis() as u64,
            "Reconciler started"
        );

        loop {
            tokio::select! {
                _ = shutdown.wait() => {
                    info!("Reconciler stopping");
                    break;
                }
                _ = retry.tick() => {
                    let summary = self.sync.retry_pending().await;
                    if summary.attempted > 0 {
                        debug!(?summary, "Retry sweep finished");
                    }
                }
                _ = reconcile.tick() => {
                    if let Err(e) = self.sync.reconcile().await {
                        error!(error = %e, "Reconciliation pass failed");
                    }
                }
            }
        }
    }

    pub fn spawn(self, shutdown: ShutdownSignal) -> JoinHandle<()> {
        tokio::spawn(self.run_until_shutdown(shutdown))
    }
}
