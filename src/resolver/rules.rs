use uuid::Uuid;

use super::{Action, Decision};
use crate::models::{ProfileField, Resource};

/// The rule list, as typed variants in their fixed evaluation order.
/// First Allow wins; `DefaultDeny` terminates the list unconditionally.
///
/// The order is load-bearing: `SelfAccess` consults no store at all, so an
/// actor touching their own rows never depends on a role lookup, and the
/// cheap direct-identity check of `AdminOverride` runs before any join-like
/// membership or grant check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    SelfAccess,
    AdminOverride,
    Membership,
    Grant,
    DefaultDeny,
}

impl Rule {
    pub const ORDER: [Rule; 5] = [
        Rule::SelfAccess,
        Rule::AdminOverride,
        Rule::Membership,
        Rule::Grant,
        Rule::DefaultDeny,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Rule::SelfAccess => "self_access",
            Rule::AdminOverride => "admin_override",
            Rule::Membership => "membership",
            Rule::Grant => "grant",
            Rule::DefaultDeny => "default_deny",
        }
    }
}

/// Rule 1. Owners read and write their own records without any lookup.
/// Privileged writes (role changes, ownership reassignment) never pass here,
/// and neither does a write to the privileged fields of one's own profile.
pub(super) fn self_access(actor_id: Uuid, action: Action, resource: &Resource) -> Option<Decision> {
    if action == Action::WritePrivileged {
        return None;
    }

    let owned = match resource {
        Resource::TimeEntry { owner_id, .. } => *owner_id == actor_id,
        Resource::Project { created_by, .. } => *created_by == actor_id,
        Resource::Profile { subject_id, field } => {
            *subject_id == actor_id && (action == Action::Read || *field == ProfileField::General)
        }
    };

    owned.then_some(Decision::Allow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_access_allows_own_entry_read_and_write() {
        let actor = Uuid::new_v4();
        let entry = Resource::TimeEntry {
            id: Uuid::new_v4(),
            owner_id: actor,
            project_id: Uuid::new_v4(),
        };

        assert_eq!(self_access(actor, Action::Read, &entry), Some(Decision::Allow));
        assert_eq!(self_access(actor, Action::Write, &entry), Some(Decision::Allow));
        assert_eq!(self_access(actor, Action::WritePrivileged, &entry), None);
    }

    #[test]
    fn self_access_never_touches_someone_elses_row() {
        let actor = Uuid::new_v4();
        let entry = Resource::TimeEntry {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
        };

        assert_eq!(self_access(actor, Action::Read, &entry), None);
    }

    #[test]
    fn self_access_excludes_own_role_field() {
        let actor = Uuid::new_v4();

        assert_eq!(
            self_access(actor, Action::Write, &Resource::profile(actor)),
            Some(Decision::Allow)
        );
        assert_eq!(
            self_access(actor, Action::Write, &Resource::profile_role(actor)),
            None
        );
        // Reading one's own profile is fine whatever the field marker says.
        assert_eq!(
            self_access(actor, Action::Read, &Resource::profile_role(actor)),
            Some(Decision::Allow)
        );
    }
}
