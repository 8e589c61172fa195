use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use super::scoring::ScoringPolicy;
use super::types::{Category, ContentKey, SubmissionContent, SubmissionRecord, SubmissionStatus, UserId};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StudentTotals {
    pub verified: usize,
    pub points: u32,
}

/// Aggregates over the submissions visible to one actor.
///
/// Status counts come from the authoritative records. Points are recomputed
/// from the content details at reporting time rather than read from the
/// stamped value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatisticsReport {
    pub total: usize,
    pub by_status: BTreeMap<SubmissionStatus, usize>,
    pub by_category: BTreeMap<Category, usize>,
    pub verified_points: u32,
    pub by_student: BTreeMap<UserId, StudentTotals>,
}

impl StatisticsReport {
    pub fn compile(records: &[SubmissionRecord], contents: &HashMap<ContentKey, SubmissionContent>) -> Self {
        let mut report = StatisticsReport::default();

        for record in records {
            *report.by_status.entry(record.status).or_default() += 1;
            if record.status == SubmissionStatus::Deleted {
                continue;
            }
            report.total += 1;

            let Some(content) = contents.get(&record.content_key) else {
                continue;
            };
            *report.by_category.entry(content.category).or_default() += 1;

            if record.status == SubmissionStatus::Verified {
                let points = ScoringPolicy::score_content(content);
                report.verified_points += points;
                let totals = report.by_student.entry(record.owner.clone()).or_default();
                totals.verified += 1;
                totals.points += points;
            }
        }

        report
    }
}
