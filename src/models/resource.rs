use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Project, TimeEntry};

/// Which part of a profile a write touches. Global role (and the active
/// flag) are privileged fields an actor may not change on themself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileField {
    General,
    Role,
}

/// The record an access decision is about. Carries just the ownership and
/// scoping facts the resolver needs, never the full row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Project { id: Uuid, created_by: Uuid },
    TimeEntry { id: Uuid, owner_id: Uuid, project_id: Uuid },
    Profile { subject_id: Uuid, field: ProfileField },
}

impl Resource {
    pub fn profile(subject_id: Uuid) -> Self {
        Resource::Profile {
            subject_id,
            field: ProfileField::General,
        }
    }

    pub fn profile_role(subject_id: Uuid) -> Self {
        Resource::Profile {
            subject_id,
            field: ProfileField::Role,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Project { .. } => ResourceKind::Project,
            Resource::TimeEntry { .. } => ResourceKind::TimeEntry,
            Resource::Profile { .. } => ResourceKind::Profile,
        }
    }

    /// The project this resource is scoped to, if any. Profiles are not
    /// project-scoped.
    pub fn project_id(&self) -> Option<Uuid> {
        match self {
            Resource::Project { id, .. } => Some(*id),
            Resource::TimeEntry { project_id, .. } => Some(*project_id),
            Resource::Profile { .. } => None,
        }
    }
}

impl From<&Project> for Resource {
    fn from(project: &Project) -> Self {
        Resource::Project {
            id: project.id,
            created_by: project.created_by,
        }
    }
}

impl From<&TimeEntry> for Resource {
    fn from(entry: &TimeEntry) -> Self {
        Resource::TimeEntry {
            id: entry.id,
            owner_id: entry.owner_id,
            project_id: entry.project_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Project,
    TimeEntry,
    Profile,
}
