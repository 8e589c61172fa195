use anyhow::Result;
use clap::Parser;

mod cli;

use achievement_workflow::config::WorkflowConfig;
use achievement_workflow::observability::workflow_metrics;
use achievement_workflow::telemetry::init_telemetry;
use achievement_workflow::workflow::WorkflowError;
use cli::commands::reconcile::ReconcileCommand;
use cli::commands::report::{score, ListCommand, ReportCommand};
use cli::commands::submission::{CreateCommand, LifecycleCommand, ReadCommand, UpdateCommand};
use cli::commands::{Command, CommandContext};
use cli::{Cli, Commands};

fn load_config(cli: &Cli) -> Result<WorkflowConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            WorkflowConfig::load_env_file()?;
            WorkflowConfig::load_from(Some(path))?
        }
        None => {
            achievement_workflow::init_config()?;
            achievement_workflow::config()?.clone()
        }
    };
    if let Some(data_dir) = &cli.data_dir {
        config.storage.data_dir = data_dir.clone();
    }
    if let Some(directory) = &cli.directory {
        config.directory.path = directory.clone();
    }
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_telemetry(&config.observability)?;

    // Scoring is pure and needs neither stores nor a directory
    if let Commands::Score { details } = &cli.command {
        return score(details);
    }

    let metrics_enabled = config.observability.metrics_enabled;
    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(async {
        let ctx = CommandContext::open(config, cli.actor.clone()).await?;
        let outcome = match cli.command {
            Commands::Create {
                owner,
                file,
                title,
                description,
                details,
                tags,
            } => {
                CreateCommand {
                    owner,
                    file,
                    title,
                    description,
                    details,
                    tags,
                }
                .execute(&ctx)
                .await
            }
            Commands::Update {
                id,
                title,
                description,
                details,
                tags,
            } => {
                UpdateCommand {
                    id,
                    title,
                    description,
                    details,
                    tags,
                }
                .execute(&ctx)
                .await
            }
            Commands::Submit { id } => LifecycleCommand::Submit { id }.execute(&ctx).await,
            Commands::Verify { id } => LifecycleCommand::Verify { id }.execute(&ctx).await,
            Commands::Reject { id, note } => LifecycleCommand::Reject { id, note }.execute(&ctx).await,
            Commands::Delete { id } => LifecycleCommand::Delete { id }.execute(&ctx).await,
            Commands::Show { id } => ReadCommand::Show { id }.execute(&ctx).await,
            Commands::History { id } => ReadCommand::History { id }.execute(&ctx).await,
            Commands::Audit { id } => ReadCommand::Audit { id }.execute(&ctx).await,
            Commands::List {
                status,
                category,
                include_deleted,
            } => {
                ListCommand {
                    status,
                    category,
                    include_deleted,
                }
                .execute(&ctx)
                .await
            }
            Commands::Report => ReportCommand.execute(&ctx).await,
            Commands::Reconcile { watch } => ReconcileCommand { watch }.execute(&ctx).await,
            Commands::Score { .. } => Ok(()),
        };
        ctx.flush_pending().await;
        outcome
    });

    if metrics_enabled {
        workflow_metrics().log_stats();
    }

    // Workflow refusals exit with 2 and a stable code; anything else is a plain failure
    if let Err(err) = &result {
        if let Some(workflow) = err.downcast_ref::<WorkflowError>() {
            eprintln!("Error [{}]: {workflow}", workflow.code());
            std::process::exit(2);
        }
    }
    result
}
