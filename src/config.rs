use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::workflow::history::HistoryMode;
use crate::workflow::sync::PropagationMode;

pub const CONFIG_FILE_STEM: &str = "achievement-workflow";
pub const RC_FILE: &str = ".achievement-workflow-rc";
pub const ENV_PREFIX: &str = "ACHIEVEMENT_WORKFLOW";

/// Main configuration for the achievement workflow engine
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub storage: StorageConfig,
    pub sync: SyncConfig,
    pub access: AccessConfig,
    pub history: HistoryConfig,
    pub directory: DirectoryConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    #[default]
    File,
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Directory holding the JSON snapshots of the file backend
    pub data_dir: PathBuf,
    /// Record store location for the sqlite backend
    pub database_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            data_dir: PathBuf::from(".achievement-workflow"),
            database_url: "sqlite://.achievement-workflow/records.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 200,
            max_delay_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Whether mirror propagation runs inside the request or is handed to the retry queue
    pub propagation: PropagationMode,
    pub retry: RetryConfig,
    pub reconcile_interval_seconds: u64,
    /// Provisional content younger than this is never reported as orphaned
    pub orphan_grace_seconds: u64,
    pub purge_orphans: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            propagation: PropagationMode::Inline,
            retry: RetryConfig::default(),
            reconcile_interval_seconds: 60,
            orphan_grace_seconds: 300,
            purge_orphans: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Check `achievements:<action>` grants for non-admin roles
    pub enforce_permissions: bool,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            enforce_permissions: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub mode: HistoryMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// TOML file seeding users, roles, students and lecturers
    pub path: PathBuf,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("directory.toml"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub json_logs: bool,
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            json_logs: false,
            metrics_enabled: true,
        }
    }
}

impl WorkflowConfig {
    /// Load configuration with precedence:
    /// 1. Default values
    /// 2. Configuration files (achievement-workflow.toml, .achievement-workflow-rc)
    /// 3. An explicit file, when given
    /// 4. Environment variables (ACHIEVEMENT_WORKFLOW__SECTION__KEY)
    pub fn load_from(explicit: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&WorkflowConfig::default())?);

        if Path::new(&format!("{CONFIG_FILE_STEM}.toml")).exists() {
            builder = builder.add_source(File::with_name(CONFIG_FILE_STEM));
        }

        if Path::new(RC_FILE).exists() {
            builder = builder.add_source(File::new(RC_FILE, config::FileFormat::Toml));
        }

        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: WorkflowConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::debug!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<WorkflowConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        let _ = WorkflowConfig::load_env_file();
        WorkflowConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static WorkflowConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

/// Initialize configuration (called at startup)
pub fn init_config() -> Result<()> {
    let _config = config()?;
    tracing::debug!("Configuration loaded successfully");
    Ok(())
}
