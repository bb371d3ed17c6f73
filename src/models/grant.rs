use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::{Loggable, Severity};

/// Capability flags carried by a grant. Also the request shape for issuing one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantCapabilities {
    #[serde(default)]
    pub can_view_entries: bool,
    #[serde(default)]
    pub can_edit_entries: bool,
    #[serde(default)]
    pub can_view_reports: bool,
    #[serde(default)]
    pub can_edit_project: bool,
}

impl GrantCapabilities {
    pub fn view_entries() -> Self {
        Self {
            can_view_entries: true,
            ..Self::default()
        }
    }

    pub fn edit_entries() -> Self {
        Self {
            can_view_entries: true,
            can_edit_entries: true,
            ..Self::default()
        }
    }

    /// Whether any capability is set at all. A grant with none set reveals
    /// nothing, including the project record itself.
    pub fn any(&self) -> bool {
        self.can_view_entries || self.can_edit_entries || self.can_view_reports || self.can_edit_project
    }
}

/// Admin-issued capability delegation to a specific manager on a specific
/// project, independent of any membership. Unique per (manager, project).
///
/// A grant is never auto-revoked when the grantee's global role changes;
/// the resolver re-checks the role at evaluation time instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grant {
    pub id: Uuid,
    pub manager_id: Uuid,
    pub project_id: Uuid,
    #[serde(flatten)]
    pub capabilities: GrantCapabilities,
    pub granted_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Grant {
    pub fn new(
        manager_id: Uuid,
        project_id: Uuid,
        capabilities: GrantCapabilities,
        granted_by: Uuid,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            manager_id,
            project_id,
            capabilities,
            granted_by,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Loggable for Grant {
    fn entity_type() -> &'static str {
        "grant"
    }
    fn subject_id(&self) -> Uuid {
        self.id
    }
    fn severity(&self) -> Severity {
        Severity::Critical
    }
}
