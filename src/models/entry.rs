use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::Loggable;

/// A tracked block of time. Owned by exactly one actor; ownership changes
/// only through explicit reassignment, which is a privileged write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeEntry {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub project_id: Uuid,
    pub minutes: i64,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TimeEntry {
    pub fn new(owner_id: Uuid, project_id: Uuid, minutes: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            project_id,
            minutes,
            note: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

impl Loggable for TimeEntry {
    fn entity_type() -> &'static str {
        "entry"
    }
    fn subject_id(&self) -> Uuid {
        self.id
    }
}
