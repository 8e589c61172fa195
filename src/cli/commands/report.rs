use anyhow::{anyhow, Result};
use serde_json::json;

use super::{parse_details, print_json, Command, CommandContext};
use achievement_workflow::workflow::{Category, ScoringPolicy, SubmissionQuery, SubmissionStatus};

pub struct ListCommand {
    pub status: Option<String>,
    pub category: Option<String>,
    pub include_deleted: bool,
}

impl Command for ListCommand {
    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let actor = ctx.actor().await?;
        let status = self
            .status
            .as_deref()
            .map(|s| s.parse::<SubmissionStatus>())
            .transpose()
            .map_err(|e| anyhow!("{e}"))?;
        let category = self.category.as_deref().and_then(|c| c.parse::<Category>().ok());
        let query = SubmissionQuery {
            status,
            category,
            include_deleted: self.include_deleted,
        };
        print_json(&ctx.service.list_submissions(&actor, &query).await?)
    }
}

pub struct ReportCommand;

impl Command for ReportCommand {
    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let actor = ctx.actor().await?;
        print_json(&ctx.service.statistics(&actor).await?)
    }
}

/// Scoring needs no stores, so it runs without a context
pub fn score(details: &str) -> Result<()> {
    let details = parse_details(details)?;
    let strict = ScoringPolicy::evaluate(&details);
    print_json(&json!({
        "category": details.category(),
        "points": ScoringPolicy::score(&details),
        "complete": strict.is_ok(),
        "warning": strict.err().map(|e| e.to_string()),
    }))
}
