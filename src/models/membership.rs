use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::{Loggable, Severity};

/// Project-scoped role. Unrelated to [`GlobalRole`](super::GlobalRole):
/// a global Member can hold an Owner membership on their own project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectRole {
    Owner,
    Manager,
    Member,
    Viewer,
}

impl ProjectRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectRole::Owner => "owner",
            ProjectRole::Manager => "manager",
            ProjectRole::Member => "member",
            ProjectRole::Viewer => "viewer",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "owner" => Some(ProjectRole::Owner),
            "manager" => Some(ProjectRole::Manager),
            "member" => Some(ProjectRole::Member),
            "viewer" => Some(ProjectRole::Viewer),
            _ => None,
        }
    }

    /// Roles that may edit other members' records and manage the roster.
    pub fn manages_project(&self) -> bool {
        matches!(self, ProjectRole::Owner | ProjectRole::Manager)
    }
}

/// One row per (project, user) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub id: Uuid,
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub role: ProjectRole,
    pub can_edit_project: bool,
    pub can_view_reports: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Membership {
    pub fn new(project_id: Uuid, user_id: Uuid, role: ProjectRole) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            project_id,
            user_id,
            role,
            can_edit_project: false,
            can_view_reports: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn owner_of(project_id: Uuid, user_id: Uuid) -> Self {
        Self::new(project_id, user_id, ProjectRole::Owner)
    }
}

impl Loggable for Membership {
    fn entity_type() -> &'static str {
        "membership"
    }
    fn subject_id(&self) -> Uuid {
        self.id
    }
    fn severity(&self) -> Severity {
        Severity::Critical
    }
}
