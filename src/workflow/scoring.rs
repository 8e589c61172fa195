//! Point values for achievements. Must stay a pure function of the details:
//! creation stamps points with it and reporting recomputes with it.

use thiserror::Error;

use super::types::{AchievementDetails, Category, CompetitionLevel, SubmissionContent};

/// Points awarded when the category is unknown or its inputs are incomplete
pub const DEFAULT_POINTS: u32 = 10;
pub const PUBLICATION_POINTS: u32 = 40;
pub const CERTIFICATION_POINTS: u32 = 20;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScoringError {
    #[error("Scoring input incomplete for {category}: missing {missing}")]
    InputIncomplete {
        category: Category,
        missing: &'static str,
    },
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ScoringPolicy;

impl ScoringPolicy {
    /// Strict evaluation; reports incomplete inputs instead of defaulting
    pub fn evaluate(details: &AchievementDetails) -> Result<u32, ScoringError> {
        match details {
            AchievementDetails::Competition(competition) => {
                let level = competition.level.ok_or(ScoringError::InputIncomplete {
                    category: Category::Competition,
                    missing: "level",
                })?;
                Ok(Self::competition_points(level, competition.rank))
            }
            AchievementDetails::Publication(_) => Ok(PUBLICATION_POINTS),
            AchievementDetails::Certification(_) => Ok(CERTIFICATION_POINTS),
            AchievementDetails::Other(_) => Ok(DEFAULT_POINTS),
        }
    }

    /// Lenient evaluation used by the workflow; incomplete input scores the default
    pub fn score(details: &AchievementDetails) -> u32 {
        Self::evaluate(details).unwrap_or_else(|e| {
            tracing::debug!(error = %e, points = DEFAULT_POINTS, "Falling back to default score");
            DEFAULT_POINTS
        })
    }

    pub fn score_content(content: &SubmissionContent) -> u32 {
        Self::score(&content.details)
    }

    /// International and national results scale with rank down to a floor for
    /// rank 4 and beyond (or no rank); regional and local ignore rank.
    pub fn competition_points(level: CompetitionLevel, rank: Option<u32>) -> u32 {
        match (level, rank) {
            (CompetitionLevel::International, Some(1)) => 100,
            (CompetitionLevel::International, Some(2)) => 80,
            (CompetitionLevel::International, Some(3)) => 60,
            (CompetitionLevel::International, _) => 40,
            (CompetitionLevel::National, Some(1)) => 80,
            (CompetitionLevel::National, Some(2)) => 60,
            (CompetitionLevel::National, Some(3)) => 40,
            (CompetitionLevel::National, _) => 20,
            (CompetitionLevel::Regional, _) => 10,
            (CompetitionLevel::Local, _) => 5,
        }
    }
}
