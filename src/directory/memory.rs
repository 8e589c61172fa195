//! In-memory directory, seeded programmatically or from a TOML file

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::info;

use super::{
    AcademicDirectory, DirectoryError, LecturerId, LecturerProfile, Permission,
    PermissionDirectory, StudentProfile,
};
use crate::workflow::access::{Action, Role};
use crate::workflow::types::UserId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSeed {
    pub id: UserId,
    pub role: Role,
}

/// On-disk shape of a directory file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectorySeed {
    pub users: Vec<UserSeed>,
    pub lecturers: Vec<LecturerProfile>,
    pub students: Vec<StudentProfile>,
    /// Role name to granted permissions; roles left out get the default grants
    pub permissions: HashMap<String, Vec<Permission>>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    roles: HashMap<UserId, Role>,
    grants: HashMap<Role, HashSet<Permission>>,
    lecturers: HashMap<UserId, LecturerProfile>,
    students: HashMap<UserId, StudentProfile>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grants each workflow role the capabilities matching its action set
    pub fn with_default_grants(mut self) -> Self {
        for role in [Role::Student, Role::Advisor] {
            let permissions = Action::allowed_for(&role)
                .iter()
                .map(|action| action.permission())
                .collect();
            self.grants.insert(role, permissions);
        }
        self
    }

    pub fn with_user(mut self, user: impl Into<UserId>, role: Role) -> Self {
        self.roles.insert(user.into(), role);
        self
    }

    pub fn with_grants(mut self, role: Role, permissions: impl IntoIterator<Item = Permission>) -> Self {
        self.grants.insert(role, permissions.into_iter().collect());
        self
    }

    pub fn with_lecturer(mut self, lecturer_id: &str, user: impl Into<UserId>, name: &str) -> Self {
        let user = user.into();
        self.roles.entry(user.clone()).or_insert(Role::Advisor);
        self.lecturers.insert(
            user.clone(),
            LecturerProfile {
                id: LecturerId(lecturer_id.to_string()),
                user_id: user,
                name: name.to_string(),
            },
        );
        self
    }

    pub fn with_student(
        mut self,
        student_id: &str,
        user: impl Into<UserId>,
        name: &str,
        advisor: Option<&str>,
    ) -> Self {
        let user = user.into();
        self.roles.entry(user.clone()).or_insert(Role::Student);
        self.students.insert(
            user.clone(),
            StudentProfile {
                id: student_id.to_string(),
                user_id: user,
                name: name.to_string(),
                advisor_id: advisor.map(|id| LecturerId(id.to_string())),
            },
        );
        self
    }

    pub fn from_seed(seed: DirectorySeed) -> Result<Self, DirectoryError> {
        let mut directory = Self::new().with_default_grants();

        for user in seed.users {
            directory.roles.insert(user.id, user.role);
        }
        for (role, permissions) in seed.permissions {
            directory.grants.insert(Role::from(role), permissions.into_iter().collect());
        }

        let lecturer_ids: HashSet<LecturerId> =
            seed.lecturers.iter().map(|l| l.id.clone()).collect();
        for student in &seed.students {
            if let Some(advisor) = &student.advisor_id {
                if !lecturer_ids.contains(advisor) {
                    return Err(DirectoryError::InvalidSeed {
                        reason: format!("student {} references unknown advisor {}", student.id, advisor),
                    });
                }
            }
        }

        for lecturer in seed.lecturers {
            directory.roles.entry(lecturer.user_id.clone()).or_insert(Role::Advisor);
            directory.lecturers.insert(lecturer.user_id.clone(), lecturer);
        }
        for student in seed.students {
            directory.roles.entry(student.user_id.clone()).or_insert(Role::Student);
            directory.students.insert(student.user_id.clone(), student);
        }

        Ok(directory)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, DirectoryError> {
        let seed: DirectorySeed = toml::from_str(contents)?;
        Self::from_seed(seed)
    }

    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self, DirectoryError> {
        let contents = tokio::fs::read_to_string(path.as_ref()).await?;
        let directory = Self::from_toml_str(&contents)?;
        info!(
            path = %path.as_ref().display(),
            users = directory.roles.len(),
            students = directory.students.len(),
            lecturers = directory.lecturers.len(),
            "Directory loaded"
        );
        Ok(directory)
    }
}

#[async_trait]
impl PermissionDirectory for InMemoryDirectory {
    async fn role_of(&self, user: &UserId) -> Result<Option<Role>, DirectoryError> {
        Ok(self.roles.get(user).cloned())
    }

    async fn permissions_for(&self, role: &Role) -> Result<HashSet<Permission>, DirectoryError> {
        Ok(self.grants.get(role).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl AcademicDirectory for InMemoryDirectory {
    async fn lecturer_by_user(&self, user: &UserId) -> Result<Option<LecturerProfile>, DirectoryError> {
        Ok(self.lecturers.get(user).cloned())
    }

    async fn student_by_user(&self, user: &UserId) -> Result<Option<StudentProfile>, DirectoryError> {
        Ok(self.students.get(user).cloned())
    }

    async fn advisees_of(&self, lecturer: &LecturerId) -> Result<Vec<StudentProfile>, DirectoryError> {
        let mut advisees: Vec<StudentProfile> = self
            .students
            .values()
            .filter(|s| s.advisor_id.as_ref() == Some(lecturer))
            .cloned()
            .collect();
        advisees.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(advisees)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: &str = r#"
[[users]]
id = "admin-1"
role = "admin"

[[lecturers]]
id = "L-01"
user_id = "lec-1"
name = "Dr. Rina"

[[students]]
id = "S-01"
user_id = "stu-1"
name = "Budi"
advisor_id = "L-01"

[[students]]
id = "S-02"
user_id = "stu-2"
name = "Sari"
"#;

    #[tokio::test]
    async fn test_seed_from_toml() {
        let directory = InMemoryDirectory::from_toml_str(SEED).unwrap();

        assert_eq!(directory.role_of(&UserId::from("admin-1")).await.unwrap(), Some(Role::Admin));
        assert_eq!(directory.role_of(&UserId::from("lec-1")).await.unwrap(), Some(Role::Advisor));
        assert_eq!(directory.role_of(&UserId::from("stu-2")).await.unwrap(), Some(Role::Student));
        assert_eq!(directory.role_of(&UserId::from("ghost")).await.unwrap(), None);

        let student = directory.student_by_user(&UserId::from("stu-1")).await.unwrap().unwrap();
        assert_eq!(student.advisor_id, Some(LecturerId("L-01".to_string())));

        let advisees = directory.advisees_of(&LecturerId("L-01".to_string())).await.unwrap();
        assert_eq!(advisees.len(), 1);
        assert_eq!(advisees[0].id, "S-01");
    }

    #[tokio::test]
    async fn test_default_grants_follow_action_sets() {
        let directory = InMemoryDirectory::from_toml_str(SEED).unwrap();
        let student = directory.permissions_for(&Role::Student).await.unwrap();
        assert!(student.contains(&Permission::new("achievements", "submit")));
        assert!(!student.contains(&Permission::new("achievements", "verify")));

        let advisor = directory.permissions_for(&Role::Advisor).await.unwrap();
        assert!(advisor.contains(&Permission::new("achievements", "verify")));
        assert!(directory.permissions_for(&Role::Admin).await.unwrap().is_empty());
    }

    #[test]
    fn test_unknown_advisor_is_rejected() {
        let seed = r#"
[[students]]
id = "S-09"
user_id = "stu-9"
name = "Tono"
advisor_id = "L-99"
"#;
        assert!(matches!(
            InMemoryDirectory::from_toml_str(seed),
            Err(DirectoryError::InvalidSeed { .. })
        ));
    }
}
