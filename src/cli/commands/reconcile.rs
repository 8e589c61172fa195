use anyhow::Result;
use serde_json::json;
use std::time::Duration;
use tracing::info;

use super::{print_json, Command, CommandContext};
use achievement_workflow::shutdown::ShutdownCoordinator;
use achievement_workflow::workflow::Reconciler;

pub struct ReconcileCommand {
    pub watch: bool,
}

impl Command for ReconcileCommand {
    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let interval = Duration::from_secs(ctx.config.sync.reconcile_interval_seconds.max(1));
        let reconciler = Reconciler::new(ctx.service.sync().clone(), interval);

        if !self.watch {
            let (retried, report) = reconciler.run_once().await?;
            return print_json(&json!({ "retried": retried, "report": report }));
        }

        let shutdown = ShutdownCoordinator::new();
        shutdown.install_signal_handler();
        info!(interval_seconds = interval.as_secs(), "Watching for mirror drift, Ctrl-C to stop");
        reconciler.spawn(shutdown.subscribe()).await?;
        Ok(())
    }
}
