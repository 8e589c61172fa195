use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;

use super::{parse_details, parse_record_id, print_json, Command, CommandContext};
use achievement_workflow::workflow::{AchievementDetails, ContentUpdate, NewSubmission, OtherDetails, UserId};

pub struct CreateCommand {
    pub owner: Option<String>,
    pub file: Option<PathBuf>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub details: Option<String>,
    pub tags: Vec<String>,
}

impl CreateCommand {
    fn submission(&self) -> Result<NewSubmission> {
        if let Some(path) = &self.file {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            return serde_json::from_str(&raw).with_context(|| format!("invalid submission in {}", path.display()));
        }

        let title = self
            .title
            .clone()
            .ok_or_else(|| anyhow!("either --file or --title is required"))?;
        let details = match &self.details {
            Some(raw) => parse_details(raw)?,
            None => AchievementDetails::Other(OtherDetails::default()),
        };
        Ok(NewSubmission {
            title,
            description: self.description.clone(),
            details,
            attachments: Vec::new(),
            tags: self.tags.clone(),
        })
    }
}

impl Command for CreateCommand {
    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let actor = ctx.actor().await?;
        let owner = self
            .owner
            .as_deref()
            .map(UserId::from)
            .unwrap_or_else(|| actor.id.clone());
        let created = ctx.service.create_draft(&actor, &owner, self.submission()?).await?;
        print_json(&created)
    }
}

pub struct UpdateCommand {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub details: Option<String>,
    pub tags: Vec<String>,
}

impl Command for UpdateCommand {
    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let actor = ctx.actor().await?;
        let update = ContentUpdate {
            title: self.title.clone(),
            description: self.description.clone(),
            details: self.details.as_deref().map(parse_details).transpose()?,
            attachments: None,
            tags: (!self.tags.is_empty()).then(|| self.tags.clone()),
        };
        let updated = ctx
            .service
            .update_draft(&actor, parse_record_id(&self.id)?, update)
            .await?;
        print_json(&updated)
    }
}

/// Single-record lifecycle commands
pub enum LifecycleCommand {
    Submit { id: String },
    Verify { id: String },
    Reject { id: String, note: String },
    Delete { id: String },
}

impl Command for LifecycleCommand {
    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let actor = ctx.actor().await?;
        let service = &ctx.service;
        let outcome = match self {
            LifecycleCommand::Submit { id } => service.submit(&actor, parse_record_id(id)?).await?,
            LifecycleCommand::Verify { id } => service.verify(&actor, parse_record_id(id)?).await?,
            LifecycleCommand::Reject { id, note } => service.reject(&actor, parse_record_id(id)?, note).await?,
            LifecycleCommand::Delete { id } => service.delete_draft(&actor, parse_record_id(id)?).await?,
        };
        print_json(&outcome)
    }
}

pub enum ReadCommand {
    Show { id: String },
    History { id: String },
    Audit { id: String },
}

impl Command for ReadCommand {
    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let actor = ctx.actor().await?;
        let service = &ctx.service;
        match self {
            ReadCommand::Show { id } => print_json(&service.get_submission(&actor, parse_record_id(id)?).await?),
            ReadCommand::History { id } => print_json(&service.get_history(&actor, parse_record_id(id)?).await?),
            ReadCommand::Audit { id } => print_json(&service.audit_log(&actor, parse_record_id(id)?).await?),
        }
    }
}
