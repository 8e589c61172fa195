//! Shared fixtures: a seeded directory, in-memory stores and sample submissions
#![allow(dead_code)]

use std::sync::Arc;

use achievement_workflow::directory::InMemoryDirectory;
use achievement_workflow::store::{ContentStore, InMemoryContentStore, InMemoryRecordStore, RecordStore};
use achievement_workflow::workflow::{
    AchievementDetails, Actor, CertificationDetails, CompetitionDetails, CompetitionLevel, NewSubmission,
    PublicationDetails, RecordId, SubmissionStatus, WorkflowService,
};

/// Two advisors, three students (one without an advisor) and an admin
pub const DIRECTORY_TOML: &str = r#"
[[users]]
id = "admin-1"
role = "admin"

[[lecturers]]
id = "L-01"
user_id = "lec-1"
name = "Dr. Rina Wulandari"

[[lecturers]]
id = "L-02"
user_id = "lec-2"
name = "Dr. Anton Siregar"

[[students]]
id = "S-01"
user_id = "stu-1"
name = "Budi Santoso"
advisor_id = "L-01"

[[students]]
id = "S-02"
user_id = "stu-2"
name = "Sari Dewi"
advisor_id = "L-02"

[[students]]
id = "S-03"
user_id = "stu-3"
name = "Tono Prasetyo"
"#;

pub fn directory() -> Arc<InMemoryDirectory> {
    Arc::new(InMemoryDirectory::from_toml_str(DIRECTORY_TOML).expect("fixture directory parses"))
}

pub fn admin() -> Actor {
    Actor::admin("admin-1")
}

pub fn student(id: &str) -> Actor {
    Actor::student(id)
}

pub fn advisor(id: &str) -> Actor {
    Actor::advisor(id)
}

pub struct Harness {
    pub service: WorkflowService,
    pub records: Arc<InMemoryRecordStore>,
    pub contents: Arc<InMemoryContentStore>,
}

impl Harness {
    pub fn new() -> Self {
        let records = Arc::new(InMemoryRecordStore::new());
        let contents = Arc::new(InMemoryContentStore::new());
        let directory = directory();
        let service = WorkflowService::new(records.clone(), contents.clone(), directory.clone(), directory);
        Self {
            service,
            records,
            contents,
        }
    }

    pub async fn status_of(&self, id: RecordId) -> SubmissionStatus {
        self.records.get(id).await.unwrap().unwrap().status
    }

    pub async fn mirror_of(&self, id: RecordId) -> Option<SubmissionStatus> {
        let record = self.records.get(id).await.unwrap().unwrap();
        self.contents
            .get(record.content_key)
            .await
            .unwrap()
            .unwrap()
            .status_mirror
    }

    /// Create a draft owned by `owner` and return its id
    pub async fn draft_for(&self, owner: &str) -> RecordId {
        let actor = student(owner);
        self.service
            .create_draft(&actor, &actor.id, publication("Distributed consensus survey"))
            .await
            .unwrap()
            .record
            .id
    }

    /// Create and submit a draft owned by `owner`
    pub async fn submitted_for(&self, owner: &str) -> RecordId {
        let id = self.draft_for(owner).await;
        self.service.submit(&student(owner), id).await.unwrap();
        id
    }
}

pub fn competition(level: CompetitionLevel, rank: Option<u32>) -> NewSubmission {
    NewSubmission {
        title: "National Programming Contest".to_string(),
        description: Some("Team final".to_string()),
        details: AchievementDetails::Competition(CompetitionDetails {
            name: Some("GEMASTIK".to_string()),
            level: Some(level),
            rank,
            organizer: Some("Puspresnas".to_string()),
            event_date: None,
        }),
        attachments: vec![],
        tags: vec!["programming".to_string()],
    }
}

pub fn publication(title: &str) -> NewSubmission {
    NewSubmission {
        title: title.to_string(),
        description: None,
        details: AchievementDetails::Publication(PublicationDetails {
            venue: Some("Jurnal Ilmu Komputer".to_string()),
            authors: vec!["Budi Santoso".to_string()],
            ..Default::default()
        }),
        attachments: vec![],
        tags: vec![],
    }
}

pub fn certification() -> NewSubmission {
    NewSubmission {
        title: "Cloud Practitioner".to_string(),
        description: None,
        details: AchievementDetails::Certification(CertificationDetails {
            issuer: Some("AWS".to_string()),
            ..Default::default()
        }),
        attachments: vec![],
        tags: vec![],
    }
}
