use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

#[derive(Parser)]
#[command(name = "achievement-workflow")]
#[command(about = "Student achievement submission workflow")]
#[command(long_about = "Drives achievement submissions through draft, submission and advisor review. \
                       Records are authoritative; the content store keeps a status mirror that is \
                       repaired by 'achievement-workflow reconcile'.")]
pub struct Cli {
    /// Configuration file layered over the defaults
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// User acting on the submissions; the role comes from the directory
    #[arg(long, global = true)]
    pub actor: Option<String>,

    /// Override storage.data_dir
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Override directory.path
    #[arg(long, global = true)]
    pub directory: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a draft submission
    Create {
        /// Owner of the draft (defaults to the actor)
        #[arg(long)]
        owner: Option<String>,
        /// JSON file holding the full submission
        #[arg(long, conflicts_with_all = ["title", "details"])]
        file: Option<PathBuf>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Details as JSON, tagged by "type", e.g. '{"type":"publication"}'
        #[arg(long)]
        details: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Change the content of a draft
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        details: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Submit a draft or resubmit a rejected submission
    Submit { id: String },
    /// Verify a submitted achievement (advisor or admin)
    Verify { id: String },
    /// Reject a submitted achievement with a note (advisor or admin)
    Reject {
        id: String,
        #[arg(long)]
        note: String,
    },
    /// Delete a draft
    Delete { id: String },
    /// Show a submission with its content
    Show { id: String },
    /// Lifecycle history rebuilt from the record
    History { id: String },
    /// Full transition log (append_log history mode only)
    Audit { id: String },
    /// List visible submissions
    List {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        include_deleted: bool,
    },
    /// Aggregate counts and verified points
    Report,
    /// Score achievement details without storing anything
    Score {
        /// Details as JSON, tagged by "type"
        details: String,
    },
    /// Retry stale mirrors and run a reconciliation pass
    Reconcile {
        /// Keep running until interrupted
        #[arg(long)]
        watch: bool,
    },
}
