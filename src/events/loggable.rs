use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity levels for audit events. Controls retention and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Access-control mutations: long-term retention, never auto-delete
    Critical,
    /// Ordinary record changes: medium-term retention (default)
    Important,
    /// High-volume events: aggressively trimmed
    Noise,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Important => "important",
            Severity::Noise => "noise",
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Important
    }
}

/// Trait for entities that appear in the audit log.
pub trait Loggable: Serialize + Send + Sync {
    /// The entity type name, the prefix in event names like "grant.issued".
    fn entity_type() -> &'static str;

    /// The subject ID (usually the entity's primary key)
    fn subject_id(&self) -> Uuid;

    /// Severity level for logs (defaults to Important)
    fn severity(&self) -> Severity {
        Severity::Important
    }

    /// Override severity based on action (removals are always Critical)
    fn severity_for_action(&self, action: &str) -> Severity {
        match action {
            "deleted" | "removed" | "revoked" => Severity::Critical,
            _ => self.severity(),
        }
    }
}
