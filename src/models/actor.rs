use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::{Loggable, Severity};

/// Account-wide role. An actor holds exactly one at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GlobalRole {
    Admin,
    Manager,
    Member,
}

impl GlobalRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            GlobalRole::Admin => "admin",
            GlobalRole::Manager => "manager",
            GlobalRole::Member => "member",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(GlobalRole::Admin),
            "manager" => Some(GlobalRole::Manager),
            "member" => Some(GlobalRole::Member),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub name: String,
    pub global_role: GlobalRole,
    /// Deactivated accounts keep their rows; they are never deleted.
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Actor {
    pub fn new(name: impl Into<String>, global_role: GlobalRole) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            global_role,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Loggable for Actor {
    fn entity_type() -> &'static str {
        "actor"
    }
    fn subject_id(&self) -> Uuid {
        self.id
    }
    fn severity(&self) -> Severity {
        Severity::Critical
    }
}
