use std::collections::BTreeSet;

use uuid::Uuid;

use crate::models::Resource;

/// The WHERE-clause-equivalent produced by `enumerate`. List reads hand this
/// to the store so rows an actor may not see are filtered at the source and
/// never materialized.
///
/// Each variant is plain data; the sqlite backend renders it into SQL and the
/// in-memory backend applies [`Predicate::matches`] while iterating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Every row of the resource type.
    All,
    /// No row at all.
    Nothing,
    /// Time entries: rows the actor owns, or rows in the listed projects.
    OwnerOrProjects {
        owner_id: Uuid,
        project_ids: BTreeSet<Uuid>,
    },
    /// Projects: rows the actor created, or the listed projects.
    CreatorOrProjects {
        creator_id: Uuid,
        project_ids: BTreeSet<Uuid>,
    },
    /// Profiles: an explicit allow-list of subject ids (always includes the
    /// actor themself).
    Subjects(BTreeSet<Uuid>),
}

impl Predicate {
    /// Whether a concrete resource satisfies this predicate. A predicate
    /// built for one resource kind never matches another kind.
    pub fn matches(&self, resource: &Resource) -> bool {
        match (self, resource) {
            (Predicate::All, _) => true,
            (Predicate::Nothing, _) => false,
            (
                Predicate::OwnerOrProjects {
                    owner_id,
                    project_ids,
                },
                Resource::TimeEntry {
                    owner_id: row_owner,
                    project_id,
                    ..
                },
            ) => row_owner == owner_id || project_ids.contains(project_id),
            (
                Predicate::CreatorOrProjects {
                    creator_id,
                    project_ids,
                },
                Resource::Project { id, created_by },
            ) => created_by == creator_id || project_ids.contains(id),
            (Predicate::Subjects(ids), Resource::Profile { subject_id, .. }) => {
                ids.contains(subject_id)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrong_kind_never_matches() {
        let actor = Uuid::new_v4();
        let pred = Predicate::Subjects(BTreeSet::from([actor]));

        let entry = Resource::TimeEntry {
            id: Uuid::new_v4(),
            owner_id: actor,
            project_id: Uuid::new_v4(),
        };
        assert!(!pred.matches(&entry));
        assert!(pred.matches(&Resource::profile(actor)));
    }

    #[test]
    fn owner_or_projects_matches_either_leg() {
        let owner = Uuid::new_v4();
        let project = Uuid::new_v4();
        let pred = Predicate::OwnerOrProjects {
            owner_id: owner,
            project_ids: BTreeSet::from([project]),
        };

        let own = Resource::TimeEntry {
            id: Uuid::new_v4(),
            owner_id: owner,
            project_id: Uuid::new_v4(),
        };
        let in_project = Resource::TimeEntry {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            project_id: project,
        };
        let neither = Resource::TimeEntry {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
        };

        assert!(pred.matches(&own));
        assert!(pred.matches(&in_project));
        assert!(!pred.matches(&neither));
    }
}
