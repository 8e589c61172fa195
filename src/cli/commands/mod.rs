use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use achievement_workflow::config::{StorageBackend, WorkflowConfig};
use achievement_workflow::directory::{InMemoryDirectory, PermissionDirectory};
use achievement_workflow::store::{
    ContentStore, FileContentStore, FileRecordStore, FileTransitionJournal, InMemoryContentStore,
    InMemoryRecordStore, InMemoryTransitionJournal, RecordStore, TransitionJournal,
};
use achievement_workflow::workflow::{AchievementDetails, Actor, HistoryMode, RecordId, UserId, WorkflowService};

pub mod reconcile;
pub mod report;
pub mod submission;

#[allow(async_fn_in_trait)]
pub trait Command {
    async fn execute(&self, ctx: &CommandContext) -> Result<()>;
}

/// Stores, directory and service wired from configuration for one invocation
pub struct CommandContext {
    pub config: WorkflowConfig,
    pub service: WorkflowService,
    directory: Arc<InMemoryDirectory>,
    actor: Option<String>,
}

impl CommandContext {
    pub async fn open(config: WorkflowConfig, actor: Option<String>) -> Result<Self> {
        let directory_path = &config.directory.path;
        if !directory_path.exists() {
            bail!("directory file {} not found", directory_path.display());
        }
        let directory = Arc::new(
            InMemoryDirectory::load(directory_path)
                .await
                .with_context(|| format!("failed to load directory {}", directory_path.display()))?,
        );

        let (records, contents, journal) = open_stores(&config).await?;
        let service = WorkflowService::from_config(
            &config,
            records,
            contents,
            journal,
            directory.clone(),
            directory.clone(),
        );

        Ok(Self {
            config,
            service,
            directory,
            actor,
        })
    }

    /// Resolve `--actor` to an actor with the role the directory assigns
    pub async fn actor(&self) -> Result<Actor> {
        let id = self
            .actor
            .as_deref()
            .ok_or_else(|| anyhow!("--actor is required for this command"))?;
        let user = UserId::from(id);
        let role = self
            .directory
            .role_of(&user)
            .await?
            .ok_or_else(|| anyhow!("unknown actor '{id}'"))?;
        debug!(actor = %user, role = %role, "Actor resolved");
        Ok(Actor::new(user, role))
    }

    /// Apply mirror writes still queued in this process. The retry queue does
    /// not outlive the process, so whatever is left is reported for `reconcile`.
    pub async fn flush_pending(&self) {
        let sync = self.service.sync();
        if sync.pending_count().await == 0 {
            return;
        }
        let summary = sync.retry_pending().await;
        debug!(
            attempted = summary.attempted,
            repaired = summary.repaired,
            "Flushed queued mirror writes"
        );
        if sync.pending_count().await > 0 {
            eprintln!("warning: status mirror is stale; run 'achievement-workflow reconcile' to repair it");
        }
    }
}

type StoreSet = (
    Arc<dyn RecordStore>,
    Arc<dyn ContentStore>,
    Option<Arc<dyn TransitionJournal>>,
);

async fn open_stores(config: &WorkflowConfig) -> Result<StoreSet> {
    let append_log = config.history.mode == HistoryMode::AppendLog;
    let data_dir = &config.storage.data_dir;

    match config.storage.backend {
        StorageBackend::Memory => {
            let journal: Option<Arc<dyn TransitionJournal>> = if append_log {
                Some(Arc::new(InMemoryTransitionJournal::new()))
            } else {
                None
            };
            Ok((
                Arc::new(InMemoryRecordStore::new()),
                Arc::new(InMemoryContentStore::new()),
                journal,
            ))
        }
        StorageBackend::File => {
            let records = FileRecordStore::open(data_dir).await?;
            let contents = FileContentStore::open(data_dir).await?;
            Ok((Arc::new(records), Arc::new(contents), file_journal(config, append_log).await?))
        }
        StorageBackend::Sqlite => open_sqlite(config, append_log).await,
    }
}

async fn file_journal(config: &WorkflowConfig, append_log: bool) -> Result<Option<Arc<dyn TransitionJournal>>> {
    if !append_log {
        return Ok(None);
    }
    let journal = FileTransitionJournal::open(&config.storage.data_dir).await?;
    Ok(Some(Arc::new(journal)))
}

#[cfg(feature = "database")]
async fn open_sqlite(config: &WorkflowConfig, append_log: bool) -> Result<StoreSet> {
    use achievement_workflow::store::sqlite::SqliteRecordStore;

    let records = SqliteRecordStore::connect(&config.storage.database_url).await?;
    let contents = FileContentStore::open(&config.storage.data_dir).await?;
    Ok((Arc::new(records), Arc::new(contents), file_journal(config, append_log).await?))
}

#[cfg(not(feature = "database"))]
async fn open_sqlite(_config: &WorkflowConfig, _append_log: bool) -> Result<StoreSet> {
    bail!("the sqlite storage backend requires building with the 'database' feature")
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn parse_record_id(raw: &str) -> Result<RecordId> {
    raw.parse()
        .map_err(|e| anyhow!("invalid submission id '{raw}': {e}"))
}

pub fn parse_details(raw: &str) -> Result<AchievementDetails> {
    serde_json::from_str(raw).with_context(|| format!("invalid details JSON: {raw}"))
}
