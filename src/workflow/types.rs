//! Core types shared by the workflow engine and both stores

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Identity of a workflow record in the record store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub Uuid);

impl RecordId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Cross-store key linking a record to its content document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentKey(pub Uuid);

impl ContentKey {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContentKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a user as issued by the user directory
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Lifecycle status of a submission. The record store holds the authoritative copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Draft,
    Submitted,
    Verified,
    Rejected,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown submission status: {0}")]
pub struct UnknownStatus(pub String);

impl SubmissionStatus {
    pub const ALL: [SubmissionStatus; 5] = [
        SubmissionStatus::Draft,
        SubmissionStatus::Submitted,
        SubmissionStatus::Verified,
        SubmissionStatus::Rejected,
        SubmissionStatus::Deleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Draft => "draft",
            SubmissionStatus::Submitted => "submitted",
            SubmissionStatus::Verified => "verified",
            SubmissionStatus::Rejected => "rejected",
            SubmissionStatus::Deleted => "deleted",
        }
    }

    /// Statuses only reachable through a submission carry `submitted_at`
    pub fn requires_submission(&self) -> bool {
        matches!(
            self,
            SubmissionStatus::Submitted | SubmissionStatus::Verified | SubmissionStatus::Rejected
        )
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmissionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(SubmissionStatus::Draft),
            "submitted" => Ok(SubmissionStatus::Submitted),
            "verified" => Ok(SubmissionStatus::Verified),
            "rejected" => Ok(SubmissionStatus::Rejected),
            "deleted" => Ok(SubmissionStatus::Deleted),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Achievement category, derived from the details variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Competition,
    Publication,
    Certification,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Competition => "competition",
            Category::Publication => "publication",
            Category::Certification => "certification",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = std::convert::Infallible;

    /// Anything outside the known set is filed under `Other`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "competition" => Category::Competition,
            "publication" => Category::Publication,
            "certification" => Category::Certification,
            _ => Category::Other,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompetitionLevel {
    International,
    National,
    Regional,
    Local,
}

impl CompetitionLevel {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "international" => Some(CompetitionLevel::International),
            "national" => Some(CompetitionLevel::National),
            "regional" => Some(CompetitionLevel::Regional),
            "local" => Some(CompetitionLevel::Local),
            _ => None,
        }
    }
}

/// An unrecognized level reads as no level, which scoring treats as incomplete
fn lenient_level<'de, D>(deserializer: D) -> Result<Option<CompetitionLevel>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(serde_json::Value::as_str).and_then(CompetitionLevel::parse))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompetitionDetails {
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient_level")]
    pub level: Option<CompetitionLevel>,
    pub rank: Option<u32>,
    pub organizer: Option<String>,
    pub event_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublicationDetails {
    pub publication_type: Option<String>,
    pub venue: Option<String>,
    pub authors: Vec<String>,
    pub published_on: Option<NaiveDate>,
    pub doi: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificationDetails {
    pub name: Option<String>,
    pub issuer: Option<String>,
    pub certificate_number: Option<String>,
    pub issued_on: Option<NaiveDate>,
    pub expires_on: Option<NaiveDate>,
}

/// Free-form details for achievements outside the known categories
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OtherDetails {
    #[serde(flatten)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

/// Field of `OtherDetails` that keeps a `type` outside the known categories
pub const DECLARED_TYPE_FIELD: &str = "declared_type";

/// Category-specific structured details. Input with an unknown or missing
/// `type` is read as `Other`, keeping the declared type under `declared_type`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AchievementDetails {
    Competition(CompetitionDetails),
    Publication(PublicationDetails),
    Certification(CertificationDetails),
    Other(OtherDetails),
}

impl<'de> Deserialize<'de> for AchievementDetails {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error as _;
        use serde_json::Value;

        let mut fields = serde_json::Map::<String, Value>::deserialize(deserializer)?;
        let declared = match fields.remove("type") {
            Some(Value::String(kind)) => kind,
            Some(other) => other.to_string(),
            None => String::new(),
        };
        let category = declared.parse::<Category>().unwrap_or(Category::Other);

        let details = match category {
            Category::Competition => serde_json::from_value(Value::Object(fields)).map(AchievementDetails::Competition),
            Category::Publication => serde_json::from_value(Value::Object(fields)).map(AchievementDetails::Publication),
            Category::Certification => {
                serde_json::from_value(Value::Object(fields)).map(AchievementDetails::Certification)
            }
            Category::Other => {
                if !declared.is_empty() && !declared.trim().eq_ignore_ascii_case("other") {
                    fields.insert(DECLARED_TYPE_FIELD.to_string(), Value::String(declared));
                }
                Ok(AchievementDetails::Other(OtherDetails {
                    fields: fields.into_iter().collect(),
                }))
            }
        };
        details.map_err(D::Error::custom)
    }
}

impl AchievementDetails {
    pub fn category(&self) -> Category {
        match self {
            AchievementDetails::Competition(_) => Category::Competition,
            AchievementDetails::Publication(_) => Category::Publication,
            AchievementDetails::Certification(_) => Category::Certification,
            AchievementDetails::Other(_) => Category::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub file_name: String,
    pub url: String,
    #[serde(default)]
    pub file_type: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

/// Canonical workflow record, exclusively owned by the workflow engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub id: RecordId,
    pub owner: UserId,
    pub content_key: ContentKey,
    pub status: SubmissionStatus,
    pub submitted_at: Option<DateTime<Utc>>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decided_by: Option<UserId>,
    pub rejection_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubmissionRecord {
    pub fn new_draft(owner: UserId, content_key: ContentKey, now: DateTime<Utc>) -> Self {
        Self {
            id: RecordId::new(),
            owner,
            content_key,
            status: SubmissionStatus::Draft,
            submitted_at: None,
            decided_at: None,
            decided_by: None,
            rejection_note: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the first snapshot invariant this record breaks, if any
    pub fn invariant_violation(&self) -> Option<&'static str> {
        if self.decided_at.is_some() != self.decided_by.is_some() {
            return Some("decided_at and decided_by must be set together");
        }
        if self.rejection_note.is_some() != (self.status == SubmissionStatus::Rejected) {
            return Some("rejection_note is set iff status is rejected");
        }
        if self.status.requires_submission() && self.submitted_at.is_none() {
            return Some("submitted_at must be set once submitted");
        }
        if self.status == SubmissionStatus::Draft && self.submitted_at.is_some() {
            return Some("drafts carry no submitted_at");
        }
        None
    }
}

/// Content document for a submission, independently keyed in the content store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionContent {
    pub key: ContentKey,
    pub owner: UserId,
    pub category: Category,
    pub title: String,
    pub description: Option<String>,
    pub details: AchievementDetails,
    pub attachments: Vec<Attachment>,
    pub tags: Vec<String>,
    pub points: Option<u32>,
    /// Denormalized copy of the record status for read-path filtering. `None`
    /// while the content is provisional, i.e. no record references it yet.
    pub status_mirror: Option<SubmissionStatus>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubmissionContent {
    pub fn provisional(
        owner: UserId,
        submission: NewSubmission,
        points: Option<u32>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            key: ContentKey::new(),
            owner,
            category: submission.details.category(),
            title: submission.title.trim().to_string(),
            description: submission.description,
            details: submission.details,
            attachments: submission.attachments,
            tags: submission.tags,
            points,
            status_mirror: None,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_provisional(&self) -> bool {
        self.status_mirror.is_none()
    }

    /// True when both denormalized fields agree with the authoritative status
    pub fn mirrors(&self, status: SubmissionStatus) -> bool {
        self.status_mirror == Some(status) && self.is_deleted == (status == SubmissionStatus::Deleted)
    }

    pub fn apply_mirror(&mut self, status: SubmissionStatus, now: DateTime<Utc>) {
        self.status_mirror = Some(status);
        self.is_deleted = status == SubmissionStatus::Deleted;
        self.updated_at = now;
    }

    pub fn apply_update(&mut self, update: ContentUpdate, now: DateTime<Utc>) {
        if let Some(title) = update.title {
            self.title = title.trim().to_string();
        }
        if let Some(description) = update.description {
            self.description = Some(description);
        }
        if let Some(details) = update.details {
            self.category = details.category();
            self.details = details;
        }
        if let Some(attachments) = update.attachments {
            self.attachments = attachments;
        }
        if let Some(tags) = update.tags {
            self.tags = tags;
        }
        self.updated_at = now;
    }
}

/// Content supplied by the authoring flow when a draft is created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSubmission {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub details: AchievementDetails,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Partial update applied to a draft's content; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub details: Option<AchievementDetails>,
    pub attachments: Option<Vec<Attachment>>,
    pub tags: Option<Vec<String>>,
}

/// A record joined with its content document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub record: SubmissionRecord,
    pub content: SubmissionContent,
}
