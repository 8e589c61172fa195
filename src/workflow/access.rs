//! Access control for workflow actions.
//!
//! `AccessEvaluator` is the single, pure authorization table. `AccessGuard`
//! gathers the facts it needs (capabilities, advisor relationship) from the
//! directories and fails closed when a lookup errors or comes back empty.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

use super::types::UserId;
use crate::directory::{AcademicDirectory, LecturerId, Permission, PermissionDirectory};
use crate::observability::workflow_metrics;

pub const PERMISSION_RESOURCE: &str = "achievements";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Admin,
    Student,
    Advisor,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::Admin => "admin",
            Role::Student => "student",
            Role::Advisor => "advisor",
            Role::Other(name) => name,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" | "administrator" => Role::Admin,
            "student" => Role::Student,
            "advisor" | "lecturer" => Role::Advisor,
            _ => Role::Other(value),
        }
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.as_str().to_string()
    }
}

impl FromStr for Role {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Role::from(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    Create,
    UpdateDraft,
    Submit,
    DeleteDraft,
    Verify,
    Reject,
    Read,
}

const STUDENT_ACTIONS: &[Action] = &[
    Action::Create,
    Action::UpdateDraft,
    Action::Submit,
    Action::DeleteDraft,
];

const ADVISOR_ACTIONS: &[Action] = &[Action::Verify, Action::Reject, Action::Read];

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::UpdateDraft => "update-draft",
            Action::Submit => "submit",
            Action::DeleteDraft => "delete-draft",
            Action::Verify => "verify",
            Action::Reject => "reject",
            Action::Read => "read",
        }
    }

    /// Capability a non-admin role must hold to attempt this action
    pub fn permission(&self) -> Permission {
        let action = match self {
            Action::Create => "create",
            Action::UpdateDraft => "update",
            Action::Submit => "submit",
            Action::DeleteDraft => "delete",
            Action::Verify => "verify",
            Action::Reject => "reject",
            Action::Read => "read",
        };
        Permission::new(PERMISSION_RESOURCE, action)
    }

    /// Actions a role may attempt at all. Admin is unrestricted and has no list.
    pub fn allowed_for(role: &Role) -> &'static [Action] {
        match role {
            Role::Student => STUDENT_ACTIONS,
            Role::Advisor => ADVISOR_ACTIONS,
            Role::Admin | Role::Other(_) => &[],
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<UserId>, role: Role) -> Self {
        Self { id: id.into(), role }
    }

    pub fn admin(id: impl Into<UserId>) -> Self {
        Self::new(id, Role::Admin)
    }

    pub fn student(id: impl Into<UserId>) -> Self {
        Self::new(id, Role::Student)
    }

    pub fn advisor(id: impl Into<UserId>) -> Self {
        Self::new(id, Role::Advisor)
    }
}

/// Why a request was denied. Kept for logs; callers only ever see a generic denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DenyReason {
    RoleNotPermitted,
    NotOwner,
    NotAdvisor,
    EntityNotFound,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::RoleNotPermitted => "role-not-permitted",
            DenyReason::NotOwner => "not-owner",
            DenyReason::NotAdvisor => "not-advisor",
            DenyReason::EntityNotFound => "entity-not-found",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn into_result(self) -> Result<(), DenyReason> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(reason),
        }
    }
}

/// Facts resolved from the directories for one request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessFacts {
    pub capability_granted: bool,
    /// Lecturer profile of the acting user, if any
    pub acting_lecturer: Option<LecturerId>,
    /// Advisor of the record owner, if the owner resolves to a student with one
    pub owner_advisor: Option<LecturerId>,
}

impl AccessFacts {
    pub fn granted() -> Self {
        Self {
            capability_granted: true,
            ..Default::default()
        }
    }

    pub fn with_advisor_link(mut self, acting: Option<&str>, owner_advisor: Option<&str>) -> Self {
        self.acting_lecturer = acting.map(|id| LecturerId(id.to_string()));
        self.owner_advisor = owner_advisor.map(|id| LecturerId(id.to_string()));
        self
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AccessEvaluator;

impl AccessEvaluator {
    pub fn can_perform(action: Action, actor: &Actor, owner: &UserId, facts: &AccessFacts) -> Decision {
        match &actor.role {
            Role::Admin => Decision::Allow,
            Role::Student => {
                if !STUDENT_ACTIONS.contains(&action) || !facts.capability_granted {
                    Decision::Deny(DenyReason::RoleNotPermitted)
                } else if &actor.id != owner {
                    Decision::Deny(DenyReason::NotOwner)
                } else {
                    Decision::Allow
                }
            }
            Role::Advisor => {
                if !ADVISOR_ACTIONS.contains(&action) || !facts.capability_granted {
                    return Decision::Deny(DenyReason::RoleNotPermitted);
                }
                match (&facts.acting_lecturer, &facts.owner_advisor) {
                    (Some(lecturer), Some(advisor)) if lecturer == advisor => Decision::Allow,
                    (Some(_), Some(_)) => Decision::Deny(DenyReason::NotAdvisor),
                    _ => Decision::Deny(DenyReason::EntityNotFound),
                }
            }
            Role::Other(_) => Decision::Deny(DenyReason::RoleNotPermitted),
        }
    }
}

/// Resolves access facts from the directories and applies the evaluator
#[derive(Clone)]
pub struct AccessGuard {
    permissions: Arc<dyn PermissionDirectory>,
    academic: Arc<dyn AcademicDirectory>,
    enforce_permissions: bool,
}

impl AccessGuard {
    pub fn new(permissions: Arc<dyn PermissionDirectory>, academic: Arc<dyn AcademicDirectory>) -> Self {
        Self {
            permissions,
            academic,
            enforce_permissions: true,
        }
    }

    pub fn with_enforce_permissions(mut self, enforce: bool) -> Self {
        self.enforce_permissions = enforce;
        self
    }

    pub async fn authorize(&self, action: Action, actor: &Actor, owner: &UserId) -> Result<(), DenyReason> {
        let facts = self.resolve_facts(action, actor, owner).await;
        let decision = AccessEvaluator::can_perform(action, actor, owner, &facts);
        match decision {
            Decision::Allow => {
                debug!(action = %action, actor = %actor.id, owner = %owner, "Access granted");
                Ok(())
            }
            Decision::Deny(reason) => {
                workflow_metrics().record_denial();
                warn!(
                    action = %action,
                    actor = %actor.id,
                    role = %actor.role,
                    owner = %owner,
                    reason = %reason,
                    "Access denied"
                );
                Err(reason)
            }
        }
    }

    pub async fn resolve_facts(&self, action: Action, actor: &Actor, owner: &UserId) -> AccessFacts {
        if actor.role == Role::Admin {
            return AccessFacts::granted();
        }

        let mut facts = AccessFacts {
            capability_granted: self.capability_granted(action, &actor.role).await,
            ..Default::default()
        };

        if actor.role == Role::Advisor && ADVISOR_ACTIONS.contains(&action) {
            facts.acting_lecturer = match self.academic.lecturer_by_user(&actor.id).await {
                Ok(lecturer) => lecturer.map(|l| l.id),
                Err(e) => {
                    warn!(actor = %actor.id, error = %e, "Lecturer lookup failed, denying");
                    None
                }
            };
            facts.owner_advisor = match self.academic.student_by_user(owner).await {
                Ok(student) => student.and_then(|s| s.advisor_id),
                Err(e) => {
                    warn!(owner = %owner, error = %e, "Student lookup failed, denying");
                    None
                }
            };
        }

        facts
    }

    async fn capability_granted(&self, action: Action, role: &Role) -> bool {
        if !self.enforce_permissions {
            return true;
        }
        match self.permissions.permissions_for(role).await {
            Ok(granted) => granted.contains(&action.permission()),
            Err(e) => {
                warn!(role = %role, error = %e, "Permission lookup failed, denying");
                false
            }
        }
    }

    pub fn academic(&self) -> &Arc<dyn AcademicDirectory> {
        &self.academic
    }
}
