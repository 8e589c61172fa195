//! External directories consumed by the workflow engine
//!
//! The user/role/permission directory answers capability checks and the
//! student/lecturer directory answers the advisor relationship lookups used by
//! access control. Both are trait seams so the engine never depends on how
//! the directories are stored.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

use crate::workflow::access::Role;
use crate::workflow::types::UserId;

pub use memory::{DirectorySeed, InMemoryDirectory};

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Directory unavailable: {reason}")]
    Unavailable { reason: String },
    #[error("Invalid directory seed: {reason}")]
    InvalidSeed { reason: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// A `resource:action` capability granted to a role
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Permission {
    pub resource: String,
    pub action: String,
}

impl Permission {
    pub fn new(resource: &str, action: &str) -> Self {
        Self {
            resource: resource.to_string(),
            action: action.to_string(),
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource, self.action)
    }
}

impl FromStr for Permission {
    type Err = DirectoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once(':') {
            Some((resource, action)) if !resource.is_empty() && !action.is_empty() => {
                Ok(Permission::new(resource, action))
            }
            _ => Err(DirectoryError::InvalidSeed {
                reason: format!("permission '{s}' is not in resource:action form"),
            }),
        }
    }
}

impl TryFrom<String> for Permission {
    type Error = DirectoryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Permission> for String {
    fn from(value: Permission) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LecturerId(pub String);

impl fmt::Display for LecturerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LecturerProfile {
    pub id: LecturerId,
    pub user_id: UserId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentProfile {
    pub id: String,
    pub user_id: UserId,
    pub name: String,
    /// At most one advisor at any time
    #[serde(default)]
    pub advisor_id: Option<LecturerId>,
}

/// User/role/permission directory
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PermissionDirectory: Send + Sync {
    /// Role assigned to a user; every user has exactly one
    async fn role_of(&self, user: &UserId) -> Result<Option<Role>, DirectoryError>;

    /// Capabilities granted to a role
    async fn permissions_for(&self, role: &Role) -> Result<HashSet<Permission>, DirectoryError>;
}

/// Student/lecturer directory
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AcademicDirectory: Send + Sync {
    async fn lecturer_by_user(&self, user: &UserId) -> Result<Option<LecturerProfile>, DirectoryError>;

    async fn student_by_user(&self, user: &UserId) -> Result<Option<StudentProfile>, DirectoryError>;

    async fn advisees_of(&self, lecturer: &LecturerId) -> Result<Vec<StudentProfile>, DirectoryError>;
}
